//! Demo data
//!
//! Generates sales spaced at a fixed interval going back from a point in
//! time, each with a random seller and a random four-digit amount.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;

use crate::sale::Sale;

pub const USER_NAMES: [&str; 5] = ["Ashish", "Kushal", "Sameer", "Jyoti", "Sandeep"];

/// Number of sales the seeding endpoint creates
pub const DEFAULT_SEED_COUNT: usize = 10_001;

/// Minutes between consecutive generated sales
pub const SEED_INTERVAL_MINUTES: i64 = 15;

/// Builds `count` sales; the `i`-th is dated `now - i * 15 minutes`
pub fn random_sales<R: Rng + ?Sized>(rng: &mut R, count: usize, now: DateTime<Utc>) -> Vec<Sale> {
    (0..count)
        .map(|i| {
            let user_name = USER_NAMES.choose(rng).copied().unwrap_or(USER_NAMES[0]);
            let amount = Decimal::from(rng.gen_range(1000..=9999_i64));
            let date = now - Duration::minutes(SEED_INTERVAL_MINUTES * i as i64);
            Sale::new(user_name, amount, date)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    proptest! {
        #[test]
        fn prop_generated_sales_are_well_formed(seed in any::<u64>(), count in 0usize..200) {
            let now = Utc::now();
            let sales = random_sales(&mut StdRng::seed_from_u64(seed), count, now);

            prop_assert_eq!(sales.len(), count);
            for (i, sale) in sales.iter().enumerate() {
                prop_assert!(USER_NAMES.contains(&sale.user_name.as_str()));
                prop_assert!(sale.amount >= Decimal::from(1000) && sale.amount <= Decimal::from(9999));
                prop_assert_eq!(sale.date, now - Duration::minutes(15 * i as i64));
            }
        }
    }
}
