//! Request and response bodies

pub mod sales;
