//! PostgreSQL document store tests
//!
//! These run against a throwaway container and are ignored by default.

use std::sync::Arc;

use rust_decimal_macros::dec;
use serde_json::json;

use domain_sales::{ReportBucket, SalePatch, SalesRepository, StatsType};
use infra_db::{
    Accumulator, DocumentStore, Filter, FindQuery, GroupKey, InMemoryDocumentStore, Pipeline, SortField,
};
use test_utils::{assert_newest_first, db_test, TemporalFixtures, TestSaleBuilder};

db_test!(test_crud_round_trip, |store| {
    let sales = SalesRepository::new(store as Arc<dyn DocumentStore>);
    let created = sales
        .create(&TestSaleBuilder::new().with_user_name("Ashish").with_amount(dec!(10.50)).build())
        .await
        .unwrap();

    let found = sales.find_by_id(&created.id.to_string()).await.unwrap();
    assert_eq!(found.data, created.data);

    let patch = SalePatch {
        amount: Some(dec!(20)),
        ..SalePatch::default()
    };
    let updated = sales.update(&created.id.to_string(), &patch).await.unwrap();
    assert_eq!(updated.data.amount, dec!(20));
    assert_eq!(updated.data.user_name, "Ashish");
    assert!(updated.updated_at >= created.updated_at);

    let removed = sales.delete(&created.id.to_string()).await.unwrap();
    assert_eq!(removed.id, created.id);
    assert!(sales.find_by_id(&created.id.to_string()).await.unwrap_err().is_not_found());
});

db_test!(test_list_is_newest_first_and_paginated, |store| {
    let sales = SalesRepository::new(store as Arc<dyn DocumentStore>);
    for sale in TestSaleBuilder::new().build_series(25, 15) {
        sales.create(&sale).await.unwrap();
    }

    let first = sales.list(1, 10).await.unwrap();
    assert_eq!(first.data.len(), 10);
    assert_eq!(first.pagination.total_count, 25);
    assert!(first.pagination.has_next);
    assert_newest_first(&first.data);

    let last = sales.list(3, 10).await.unwrap();
    assert_eq!(last.data.len(), 5);
    assert!(last.pagination.has_previous);
    assert!(!last.pagination.has_next);
});

db_test!(test_nested_filters_and_sort, |store| {
    let customers = store.clone();
    for (name, city, age) in [("Ada", "Pune", 36), ("Grace", "Delhi", 45), ("Linus", "Pune", 28)] {
        let body = json!({ "name": name, "address": { "city": city }, "age": age });
        customers
            .insert("customers", body.as_object().unwrap().clone())
            .await
            .unwrap();
    }

    let filter = Filter::eq("address.city", "Pune");
    assert_eq!(customers.count("customers", &filter).await.unwrap(), 2);

    let query = FindQuery::new(filter).sort(vec![SortField::desc("age")]);
    let docs = customers.fetch("customers", &query).await.unwrap();
    let names: Vec<_> = docs.iter().map(|d| d.body["name"].clone()).collect();
    assert_eq!(names, vec![json!("Ada"), json!("Linus")]);
});

db_test!(test_daily_report_groups_by_hour, |store| {
    let sales = SalesRepository::new(store as Arc<dyn DocumentStore>);
    let day = TemporalFixtures::reference_day_start();
    for (minutes, amount) in [(5, dec!(100)), (50, dec!(100)), (125, dec!(7.25))] {
        let sale = TestSaleBuilder::new()
            .with_date(day)
            .offset_minutes(minutes)
            .with_amount(amount)
            .build();
        sales.create(&sale).await.unwrap();
    }
    let outside = TestSaleBuilder::new().with_date(TemporalFixtures::end_of_previous_month()).build();
    sales.create(&outside).await.unwrap();

    let report = sales
        .sales_report(StatsType::Daily, TemporalFixtures::reference_now())
        .await
        .unwrap();
    let buckets: Vec<_> = report.iter().map(|e| (e.bucket, e.total_amount)).collect();
    assert_eq!(
        buckets,
        vec![(ReportBucket::Hour(0), dec!(200)), (ReportBucket::Hour(2), dec!(7.25))]
    );
});

db_test!(test_grouped_aggregation_agrees_with_memory_store, |store| {
    let memory = InMemoryDocumentStore::new();
    let people = [
        json!({ "name": "Ada", "address": { "city": "Pune" }, "age": 36 }),
        json!({ "name": "Grace", "address": { "city": "Delhi" }, "age": 45 }),
        json!({ "name": "Linus", "address": { "city": "Pune" }, "age": 28 }),
        json!({ "name": "Mo", "address": { "city": "Pune" } }),
        json!({ "name": "Nomad", "age": "unknown" }),
    ];
    for person in &people {
        let body = person.as_object().unwrap().clone();
        store.insert("customers", body.clone()).await.unwrap();
        memory.insert("customers", body).await.unwrap();
    }

    let pipeline = Pipeline::new()
        .group(
            GroupKey::Field("address.city".into()),
            vec![
                ("count".into(), Accumulator::Count),
                ("totalAge".into(), Accumulator::Sum("age".into())),
                ("avgAge".into(), Accumulator::Avg("age".into())),
                ("youngest".into(), Accumulator::Min("age".into())),
                ("oldest".into(), Accumulator::Max("age".into())),
            ],
        )
        .sort(vec![SortField::asc("_id")])
        .project(vec![
            ("city".into(), "_id".into()),
            ("count".into(), "count".into()),
            ("totalAge".into(), "totalAge".into()),
            ("avgAge".into(), "avgAge".into()),
            ("youngest".into(), "youngest".into()),
            ("oldest".into(), "oldest".into()),
        ])
        .limit(3);

    let from_sql = store.aggregate("customers", &pipeline).await.unwrap();
    let from_memory = memory.aggregate("customers", &pipeline).await.unwrap();
    assert_eq!(from_sql, from_memory);
    assert_eq!(
        from_sql[2],
        json!({ "city": "Pune", "count": 3, "totalAge": 64, "avgAge": 32, "youngest": 28, "oldest": 36 })
    );
});

db_test!(test_ensure_index_is_idempotent, |store| {
    store.ensure_index("sales", "date").await.unwrap();
    store.ensure_index("sales", "date").await.unwrap();
});
