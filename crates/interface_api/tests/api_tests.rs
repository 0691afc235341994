//! HTTP API tests over the in-memory store

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{Timelike, Utc};
use serde_json::{json, Value};

use infra_db::{DocumentStore, InMemoryDocumentStore};
use interface_api::config::{ApiConfig, StorageKind};
use interface_api::create_router;
use test_utils::SaleFixtures;

fn server_with(store: InMemoryDocumentStore) -> TestServer {
    let config = ApiConfig {
        storage: StorageKind::Memory,
        seed_count: 40,
        ..ApiConfig::default()
    };
    TestServer::new(create_router(Arc::new(store) as Arc<dyn DocumentStore>, config)).unwrap()
}

fn server() -> TestServer {
    server_with(InMemoryDocumentStore::new())
}

async fn create(server: &TestServer, name: &str, amount: f64) -> Value {
    let response = server
        .post("/sales")
        .json(&json!({ "userName": name, "amount": amount }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()
}

// ============================================================================
// Health
// ============================================================================

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let response = server().get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readiness_follows_store() {
        let store = InMemoryDocumentStore::new();
        let server = server_with(store.clone());

        server.get("/health/ready").await.assert_status_ok();

        store.set_unavailable(true);
        let response = server.get("/health/ready").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json::<Value>()["status"], "unavailable");
    }
}

// ============================================================================
// CRUD
// ============================================================================

mod crud_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_returns_record() {
        let server = server();
        let before = Utc::now();
        let response = server.post("/sales").json(&SaleFixtures::create_request()).await;

        response.assert_status(StatusCode::CREATED);
        let body = response.json::<Value>();
        assert_eq!(body["userName"], "Ashish");
        assert_eq!(body["amount"], 4521.75);
        assert!(body["id"].is_string());
        let date: chrono::DateTime<Utc> = body["date"].as_str().unwrap().parse().unwrap();
        assert!(date >= before - chrono::Duration::milliseconds(1));
        assert_eq!(body["createdAt"], body["updatedAt"]);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_bodies() {
        let server = server();

        server
            .post("/sales")
            .json(&json!({ "userName": "", "amount": 10 }))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        server
            .post("/sales")
            .json(&json!({ "userName": "Rahul" }))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let response = server
            .post("/sales")
            .json(&json!({ "userName": "Rahul", "amount": -5 }))
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<Value>()["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_get_update_delete() {
        let server = server();
        let created = create(&server, "Pankaj", 12.5).await;
        let id = created["id"].as_str().unwrap().to_string();

        let fetched = server.get(&format!("/sales/{id}")).await;
        fetched.assert_status_ok();
        assert_eq!(fetched.json::<Value>()["userName"], "Pankaj");

        let updated = server
            .put(&format!("/sales/{id}"))
            .json(&json!({ "amount": 99.99 }))
            .await;
        updated.assert_status_ok();
        let updated = updated.json::<Value>();
        assert_eq!(updated["amount"], 99.99);
        assert_eq!(updated["userName"], "Pankaj");
        assert_eq!(updated["date"], created["date"]);

        let deleted = server.delete(&format!("/sales/{id}")).await;
        deleted.assert_status_ok();
        assert_eq!(deleted.json::<Value>()["id"], created["id"]);

        server
            .get(&format!("/sales/{id}"))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids() {
        let server = server();

        server
            .get("/sales/0191d5e4-7f7a-7cc0-8c3b-2f5a1f0e9a11")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .delete("/sales/0191d5e4-7f7a-7cc0-8c3b-2f5a1f0e9a11")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get("/sales/not-an-id")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_undecodable_id_is_a_json_bad_request() {
        let server = server();

        for response in [
            server.get("/sales/%FF").await,
            server.delete("/sales/%FF").await,
            server.put("/sales/%FF").json(&json!({ "amount": 1 })).await,
        ] {
            response.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(response.json::<Value>()["error"], "bad_request");
        }
    }

    #[tokio::test]
    async fn test_empty_update_is_rejected() {
        let server = server();
        let created = create(&server, "Priya", 1.0).await;
        let id = created["id"].as_str().unwrap();

        server
            .put(&format!("/sales/{id}"))
            .json(&json!({}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_503() {
        let store = InMemoryDocumentStore::new();
        let server = server_with(store.clone());
        store.set_unavailable(true);

        let response = server.get("/sales").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json::<Value>()["error"], "service_unavailable");
    }
}

// ============================================================================
// Listing
// ============================================================================

mod list_tests {
    use super::*;

    #[tokio::test]
    async fn test_default_page() {
        let server = server();
        for i in 0..12 {
            create(&server, "Sandeep", f64::from(i)).await;
        }

        let response = server.get("/sales").await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["data"].as_array().unwrap().len(), 10);
        assert_eq!(body["pagination"]["page"], 1);
        assert_eq!(body["pagination"]["perPage"], 10);
        assert_eq!(body["pagination"]["totalCount"], 12);
        assert_eq!(body["pagination"]["hasNext"], true);
        assert_eq!(body["pagination"]["hasPrevious"], false);
    }

    #[tokio::test]
    async fn test_explicit_page() {
        let server = server();
        for i in 0..5 {
            create(&server, "Amit", f64::from(i)).await;
        }

        let response = server
            .get("/sales")
            .add_query_param("page", 2)
            .add_query_param("perPage", 2)
            .await;
        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["pagination"]["hasPrevious"], true);
        assert_eq!(body["pagination"]["hasNext"], true);
    }

    #[tokio::test]
    async fn test_rejects_bad_page_parameters() {
        let server = server();

        for (key, value) in [("page", "0"), ("perPage", "0"), ("page", "abc"), ("perPage", "-1")] {
            server
                .get("/sales")
                .add_query_param(key, value)
                .await
                .assert_status(StatusCode::BAD_REQUEST);
        }
    }
}

// ============================================================================
// Reports and seeding
// ============================================================================

mod report_tests {
    use super::*;

    #[tokio::test]
    async fn test_daily_report_includes_new_sales() {
        let server = server();
        create(&server, "Ashish", 10.0).await;
        create(&server, "Rahul", 2.5).await;
        let hour = Utc::now().hour();

        let response = server
            .get("/sales/reports")
            .add_query_param("statsType", "daily")
            .await;
        response.assert_status_ok();
        let report = response.json::<Value>();
        let entries = report.as_array().unwrap();
        let total: f64 = entries.iter().map(|e| e["totalAmount"].as_f64().unwrap()).sum();
        assert_eq!(total, 12.5);
        // Both sales land in the current hour unless the test straddles an hour boundary
        assert!(entries.iter().any(|e| e["bucket"] == hour || e["bucket"] == (hour + 23) % 24));
    }

    #[tokio::test]
    async fn test_monthly_report_buckets_by_day() {
        let server = server();
        create(&server, "Ashish", 10.0).await;

        let response = server
            .get("/sales/reports")
            .add_query_param("statsType", "monthly")
            .await;
        response.assert_status_ok();
        let report = response.json::<Value>();
        let bucket = report[0]["bucket"].as_str().unwrap();
        assert!(chrono::NaiveDate::parse_from_str(bucket, "%Y-%m-%d").is_ok());
    }

    #[tokio::test]
    async fn test_invalid_stats_type() {
        let server = server();

        server
            .get("/sales/reports")
            .add_query_param("statsType", "weekly")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        server
            .get("/sales/reports")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_generate_random_data() {
        let server = server();

        let response = server.post("/sales/generate_random_data").await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<Value>()["created"], 40);

        let listed = server.get("/sales").await.json::<Value>();
        assert_eq!(listed["pagination"]["totalCount"], 40);
    }
}

mod request_id_tests {
    use super::*;

    #[tokio::test]
    async fn test_request_id_is_returned() {
        let response = server().get("/health").await;
        assert!(response.headers().get("x-request-id").is_some());
    }
}
