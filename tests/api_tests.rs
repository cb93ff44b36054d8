//! HTTP API tests driving the router with in-memory collaborators

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use loandesk_server::auth::{
        generate_session_token, HttpIdentityProvider, OAuthProviderConfig, OAuthService,
        SessionSettings, SignupPolicy, UserStore,
    };
    use loandesk_server::loan::{LoanService, LoanSettings, Partner};
    use loandesk_server::models::{NewUser, UserRole};
    use loandesk_server::routes::build_router;
    use loandesk_server::state::AppState;
    use loandesk_server::store::MemoryStore;

    const SECRET: &str = "api-test-secret";

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        partner_id: Uuid,
        staff_token: String,
        portal_token: String,
    }

    async fn token_for(store: &MemoryStore, login: &str, role: UserRole) -> String {
        let user = store
            .create_user(NewUser {
                login: login.to_string(),
                name: login.to_string(),
                email: Some(login.to_string()),
                role,
                oauth_provider_id: None,
                oauth_uid: None,
                oauth_access_token: None,
            })
            .await
            .unwrap();
        generate_session_token(&user, SECRET, 600).unwrap()
    }

    async fn setup() -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let partner_id = Uuid::new_v4();
        store
            .add_partner(Partner {
                id: partner_id,
                name: "Jane Doe".to_string(),
                email: Some("jane@example.com".to_string()),
            })
            .await;

        let loan_service = Arc::new(LoanService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            LoanSettings {
                mail_sender: "loans@example.com".to_string(),
                interest_account_id: "7700".to_string(),
                repayment_account_id: "2200".to_string(),
            },
        ));
        let oauth_service = Arc::new(OAuthService::new(
            store.clone(),
            Arc::new(HttpIdentityProvider::default()),
            OAuthProviderConfig {
                id: "azure".to_string(),
                client_id: String::new(),
                client_secret: String::new(),
                token_endpoint: "http://127.0.0.1:9/token".to_string(),
                profile_endpoint: "http://127.0.0.1:9/me".to_string(),
                redirect_uri: String::new(),
            },
            SignupPolicy::default(),
            SessionSettings {
                jwt_secret: SECRET.to_string(),
                ttl_seconds: 600,
            },
        ));

        let staff_token = token_for(&store, "officer@example.com", UserRole::Internal).await;
        let portal_token = token_for(&store, "portal@example.com", UserRole::Portal).await;

        TestApp {
            router: build_router(AppState::new(loan_service, oauth_service)),
            store,
            partner_id,
            staff_token,
            portal_token,
        }
    }

    async fn send(
        app: &TestApp,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_loan_type(app: &TestApp) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/loan-types",
            Some(&app.staff_token),
            Some(json!({
                "name": "Personal",
                "loan_amount": "12000",
                "tenure": 12,
                "interest_rate_percentage": "4.69",
                "processing_fee": "200"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_loan(app: &TestApp, loan_type_id: &str) -> (StatusCode, Value) {
        send(
            app,
            "POST",
            "/api/loans",
            Some(&app.portal_token),
            Some(json!({
                "partner_id": app.partner_id,
                "loan_type_id": loan_type_id,
                "currency": "EUR",
                "issue_date": "2024-01-15"
            })),
        )
        .await
    }

    #[tokio::test]
    async fn test_health_and_security_headers() {
        let app = setup().await;
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert!(response.headers().contains_key("x-request-id"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_loans_require_session() {
        let app = setup().await;
        let (status, body) = send(&app, "GET", "/api/loans", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "MISSING_TOKEN");

        let (status, body) = send(&app, "GET", "/api/loans", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_portal_user_cannot_define_loan_types() {
        let app = setup().await;
        let (status, _) = send(
            &app,
            "POST",
            "/api/loan-types",
            Some(&app.portal_token),
            Some(json!({"name": "Nope", "loan_amount": "1", "tenure": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_loan_type_exposes_derived_figures() {
        let app = setup().await;
        let id = create_loan_type(&app).await;

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/loan-types/{}", id),
            Some(&app.portal_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["disbursal_amount"], "11800");
        assert_eq!(body["data"]["tenure_plan"], "monthly");
    }

    #[tokio::test]
    async fn test_invalid_loan_type_is_bad_request() {
        let app = setup().await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/loan-types",
            Some(&app.staff_token),
            Some(json!({"name": "", "loan_amount": "100", "tenure": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_out_of_range_loan_type_figures_are_bad_request() {
        let app = setup().await;
        let invalid = [
            json!({"name": "Neg", "loan_amount": "-100", "tenure": 12}),
            json!({"name": "Fee", "loan_amount": "100", "processing_fee": "-1", "tenure": 12}),
            json!({"name": "Rate", "loan_amount": "100", "interest_rate": "-0.1", "tenure": 12}),
            json!({
                "name": "Huge",
                "loan_amount": "1000000000000000000000",
                "interest_rate": "1000000000",
                "tenure": 12
            }),
            json!({"name": "Long", "loan_amount": "100", "tenure": 2147483647}),
        ];

        for body in invalid {
            let (status, response) = send(
                &app,
                "POST",
                "/api/loan-types",
                Some(&app.staff_token),
                Some(body.clone()),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {}", body);
            assert_eq!(response["error"]["code"], "VALIDATION_ERROR");
        }

        let (_, listed) = send(&app, "GET", "/api/loan-types", Some(&app.staff_token), None).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_deactivated_user_session_is_refused() {
        let app = setup().await;
        let (status, _) = send(&app, "GET", "/api/loans", Some(&app.portal_token), None).await;
        assert_eq!(status, StatusCode::OK);

        let portal = app
            .store
            .find_user_by_login("portal@example.com")
            .await
            .unwrap()
            .unwrap();
        app.store.set_user_active(portal.id, false).await;

        let (status, body) = send(&app, "GET", "/api/loans", Some(&app.portal_token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "ACCOUNT_DISABLED");
    }

    #[tokio::test]
    async fn test_request_approval_advisory_over_http() {
        let app = setup().await;
        let loan_type_id = create_loan_type(&app).await;
        let (status, body) = create_loan(&app, &loan_type_id).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["reference"], "LOAN/00001");
        let loan_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/request-approval", loan_id),
            Some(&app.portal_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "advisory");
        assert_eq!(
            body["data"]["message"],
            "Compute the repayments before requesting"
        );

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/compute-repayment", loan_id),
            Some(&app.portal_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 12);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/request-approval", loan_id),
            Some(&app.portal_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "applied");
        assert_eq!(body["data"]["loan"]["state"], "waiting");
    }

    #[tokio::test]
    async fn test_ongoing_loan_is_conflict() {
        let app = setup().await;
        let loan_type_id = create_loan_type(&app).await;
        let (_, body) = create_loan(&app, &loan_type_id).await;
        let loan_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/confirm", loan_id),
            Some(&app.portal_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = create_loan(&app, &loan_type_id).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "POLICY_VIOLATION");
        assert_eq!(
            body["error"]["message"],
            "The partner has already an ongoing loan."
        );
    }

    #[tokio::test]
    async fn test_approval_requires_staff() {
        let app = setup().await;
        let loan_type_id = create_loan_type(&app).await;
        let (_, body) = create_loan(&app, &loan_type_id).await;
        let loan_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/approve", loan_id),
            Some(&app.portal_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/approve", loan_id),
            Some(&app.staff_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_reject_with_reason_over_http() {
        let app = setup().await;
        let loan_type_id = create_loan_type(&app).await;
        let (_, body) = create_loan(&app, &loan_type_id).await;
        let loan_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/reject", loan_id),
            Some(&app.staff_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["loan_reference"], "LOAN/00001");

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/reject/reason", loan_id),
            Some(&app.staff_token),
            Some(json!({"reason": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/reject/reason", loan_id),
            Some(&app.staff_token),
            Some(json!({"reason": "Incomplete file"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["loan"]["state"], "rejected");
        assert_eq!(body["data"]["loan"]["reject_reason"], "Incomplete file");
    }

    #[tokio::test]
    async fn test_unknown_loan_is_not_found() {
        let app = setup().await;
        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/loans/{}", Uuid::new_v4()),
            Some(&app.portal_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_current_user() {
        let app = setup().await;
        let (status, body) = send(&app, "GET", "/auth/me", Some(&app.staff_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["login"], "officer@example.com");
        assert_eq!(body["data"]["role"], "internal");
    }

    #[tokio::test]
    async fn test_signin_without_code_is_unauthorized() {
        let app = setup().await;
        let (status, body) = send(&app, "GET", "/auth/oauth/signin", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }
}
