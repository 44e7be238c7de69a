//! # Integration Tests
//!
//! These tests verify the HTTP endpoints by sending requests to an in-process
//! server built with `create_app` on the in-memory store. No database or
//! running service is required.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test integration
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::{json, Value};
    use uuid::Uuid;

    use repair_workflow::audit::{AuditDispatcher, TracingAuditSink};
    use repair_workflow::routes::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
    use repair_workflow::store::MemoryStore;
    use repair_workflow::{create_app, AppState};

    struct TestServer {
        base_url: String,
        client: reqwest::Client,
    }

    impl TestServer {
        async fn start() -> Self {
            let store = Arc::new(MemoryStore::new());
            let (audit, _handle) = AuditDispatcher::spawn(Arc::new(TracingAuditSink), 64);
            let app = create_app(AppState::new(store, audit));

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind test listener");
            let addr = listener.local_addr().expect("No local address");
            tokio::spawn(async move {
                axum::serve(listener, app).await.expect("Server failed");
            });

            Self {
                base_url: format!("http://{}", addr),
                client: reqwest::Client::new(),
            }
        }

        fn request(&self, method: reqwest::Method, path: &str, actor: (Uuid, &str)) -> reqwest::RequestBuilder {
            self.client
                .request(method, format!("{}{}", self.base_url, path))
                .header(ACTOR_ID_HEADER, actor.0.to_string())
                .header(ACTOR_ROLE_HEADER, actor.1)
        }

        async fn post(&self, path: &str, actor: (Uuid, &str), body: Value) -> (u16, Value) {
            let res = self
                .request(reqwest::Method::POST, path, actor)
                .json(&body)
                .send()
                .await
                .expect("Failed to send request");
            let status = res.status().as_u16();
            (status, res.json().await.expect("Failed to parse response"))
        }

        async fn put(&self, path: &str, actor: (Uuid, &str), body: Value) -> (u16, Value) {
            let res = self
                .request(reqwest::Method::PUT, path, actor)
                .json(&body)
                .send()
                .await
                .expect("Failed to send request");
            let status = res.status().as_u16();
            (status, res.json().await.expect("Failed to parse response"))
        }

        async fn get(&self, path: &str, actor: (Uuid, &str)) -> (u16, Value) {
            let res = self
                .request(reqwest::Method::GET, path, actor)
                .send()
                .await
                .expect("Failed to send request");
            let status = res.status().as_u16();
            (status, res.json().await.expect("Failed to parse response"))
        }
    }

    fn payment_method_body() -> Value {
        json!({
            "name": "Workshop account",
            "method_type": "BANK_TRANSFER",
            "provider": "Bank Central Asia",
            "account_number": "8800123456",
            "account_name": "Repair Co"
        })
    }

    /// Registers a bank account as `admin` and returns its id.
    async fn payment_method(server: &TestServer, admin: (Uuid, &str)) -> String {
        let (status, body) = server
            .post("/api/v1/payment-methods", admin, payment_method_body())
            .await;
        assert_eq!(status, 201, "Expected 201 Created");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    fn order_body(technician_id: Uuid, payment_method_id: &str, coupon_code: Option<&str>) -> Value {
        json!({
            "technician_id": technician_id,
            "item_name": "Road bike",
            "item_condition": "Rear derailleur bent",
            "issue_description": "Chain skips on the three smallest cogs",
            "desired_service_date": (Utc::now().date_naive() + chrono::Duration::days(5)).to_string(),
            "payment_method_id": payment_method_id,
            "coupon_code": coupon_code,
        })
    }

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::start().await;
        let res = server
            .client
            .get(format!("{}/health", server.base_url))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let server = TestServer::start().await;
        let res = server
            .client
            .get(format!("{}/api/v1/repair-orders", server.base_url))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(res.status(), 401, "Expected 401 Unauthorized");

        let body: Value = res.json().await.expect("Failed to parse response");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_report_lifecycle_over_http() {
        let server = TestServer::start().await;
        let admin = (Uuid::new_v4(), "ADMIN");
        let customer = (Uuid::new_v4(), "CUSTOMER");
        let technician = (Uuid::new_v4(), "TECHNICIAN");

        let (status, _) = server
            .post(
                "/api/v1/coupons",
                admin,
                json!({"code": "BIKE5000", "discount_amount": 5000, "max_usage": 10, "valid_until": null}),
            )
            .await;
        assert_eq!(status, 201, "Expected 201 Created");
        let payment_method_id = payment_method(&server, admin).await;

        let (status, body) = server
            .post(
                "/api/v1/repair-orders",
                customer,
                order_body(technician.0, &payment_method_id, Some("BIKE5000")),
            )
            .await;
        assert_eq!(status, 201, "Expected 201 Created");
        let order_id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["status"], "PENDING_CONFIRMATION");

        let (status, body) = server
            .get("/api/v1/technician-reports/incoming-repair-orders", technician)
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = server
            .post(
                "/api/v1/technician-reports",
                technician,
                json!({
                    "repair_order_id": order_id,
                    "diagnosis": "Bent hanger",
                    "action_plan": "Straighten hanger and re-index gears",
                    "estimated_cost": 45000,
                    "estimated_time_seconds": 3600
                }),
            )
            .await;
        assert_eq!(status, 201, "Expected 201 Created");
        let report_id = body["data"]["report_id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["status"], "DRAFT");

        // Customers never see drafts.
        let (status, _) = server
            .get("/api/v1/technician-reports/for-customer?status=DRAFT", customer)
            .await;
        assert_eq!(status, 400, "Expected 400 Bad Request");

        let (status, body) = server
            .post(&format!("/api/v1/technician-reports/{}/submit", report_id), technician, json!({}))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["status"], "SUBMITTED");

        let (status, body) = server
            .put(
                &format!("/api/v1/technician-reports/{}", report_id),
                technician,
                json!({"diagnosis": "Changed my mind"}),
            )
            .await;
        assert_eq!(status, 409, "Expected 409 Conflict");
        assert_eq!(body["message"], "cannot update a report in SUBMITTED state");

        let (status, body) = server
            .get("/api/v1/technician-reports/for-customer?status=submitted", customer)
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"][0]["estimated_cost"], 40000);

        let (status, _) = server
            .post(&format!("/api/v1/technician-reports/{}/accept", report_id), technician, json!({}))
            .await;
        assert_eq!(status, 403, "Expected 403 Forbidden");

        let (status, _) = server
            .post(&format!("/api/v1/technician-reports/{}/accept", report_id), customer, json!({}))
            .await;
        assert_eq!(status, 200);

        let (status, body) = server
            .post(&format!("/api/v1/technician-reports/{}/reject", report_id), customer, json!({}))
            .await;
        assert_eq!(status, 409, "Expected 409 Conflict");
        assert_eq!(body["message"], "cannot reject a report in APPROVED state");

        for step in ["start", "complete"] {
            let (status, _) = server
                .post(&format!("/api/v1/technician-reports/{}/{}", report_id, step), technician, json!({}))
                .await;
            assert_eq!(status, 200, "{} failed", step);
        }

        let (status, body) = server
            .get(&format!("/api/v1/repair-orders/{}", order_id), customer)
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["status"], "COMPLETED");
    }

    #[tokio::test]
    async fn test_unknown_payment_method_is_bad_request() {
        let server = TestServer::start().await;
        let customer = (Uuid::new_v4(), "CUSTOMER");
        let technician = Uuid::new_v4();

        let unknown = Uuid::new_v4().to_string();
        let (status, body) = server
            .post("/api/v1/repair-orders", customer, order_body(technician, &unknown, None))
            .await;
        assert_eq!(status, 400, "Expected 400 Bad Request");
        assert_eq!(body["message"], "Invalid payment method");

        let (status, _) = server
            .post("/api/v1/payment-methods", customer, payment_method_body())
            .await;
        assert_eq!(status, 403, "Expected 403 Forbidden");
    }

    #[tokio::test]
    async fn test_get_report_not_found() {
        let server = TestServer::start().await;
        let technician = (Uuid::new_v4(), "TECHNICIAN");
        let (status, body) = server
            .get(&format!("/api/v1/technician-reports/{}", Uuid::new_v4()), technician)
            .await;
        assert_eq!(status, 404, "Expected 404 Not Found");
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_coupon_management_requires_admin() {
        let server = TestServer::start().await;
        let customer = (Uuid::new_v4(), "CUSTOMER");
        let (status, _) = server
            .post(
                "/api/v1/coupons",
                customer,
                json!({"code": "SNEAKY01", "discount_amount": 100, "max_usage": 1, "valid_until": null}),
            )
            .await;
        assert_eq!(status, 403, "Expected 403 Forbidden");

        let (status, body) = server.get("/api/v1/coupons", customer).await;
        assert_eq!(status, 200);
        assert!(body["data"].as_array().unwrap().is_empty());
    }
}
