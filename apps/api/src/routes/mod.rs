pub mod health;

use axum::{
    routing::{get, patch, post, put},
    Router,
};

use crate::profile::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session
        .route(
            "/api/v1/session",
            post(handlers::handle_sign_in).delete(handlers::handle_sign_out),
        )
        // Profile
        .route(
            "/api/v1/profile",
            get(handlers::handle_get_profile).patch(handlers::handle_update_profile),
        )
        .route("/api/v1/profile/refresh", post(handlers::handle_refresh))
        .route("/api/v1/profile/flush", post(handlers::handle_flush))
        .route("/api/v1/profile/completion", get(handlers::handle_completion))
        .route("/api/v1/profile/events", get(handlers::handle_events))
        // Lists
        .route(
            "/api/v1/profile/lists/:field",
            post(handlers::handle_append_entry),
        )
        .route(
            "/api/v1/profile/lists/:field/:index",
            patch(handlers::handle_update_entry).delete(handlers::handle_remove_entry),
        )
        // Inline field editing
        .route(
            "/api/v1/profile/fields/:path",
            get(handlers::handle_field_state),
        )
        .route(
            "/api/v1/profile/fields/:path/edit",
            post(handlers::handle_begin_edit),
        )
        .route(
            "/api/v1/profile/fields/:path/draft",
            put(handlers::handle_edit_draft),
        )
        .route(
            "/api/v1/profile/fields/:path/commit",
            post(handlers::handle_commit_edit),
        )
        .route(
            "/api/v1/profile/fields/:path/cancel",
            post(handlers::handle_cancel_edit),
        )
        .route("/api/v1/validate", post(handlers::handle_validate))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `oneshot`

    use super::*;
    use crate::config::{Config, StoreBackend};
    use crate::profile::events::EventBus;
    use crate::profile::service::ProfileService;
    use crate::profile::store::MemoryProfileStore;

    fn test_config() -> Config {
        Config {
            database_url: None,
            store_backend: StoreBackend::Memory,
            port: 0,
            rust_log: "debug".to_string(),
            autosave_delay_ms: 2000,
            inline_save_delay_ms: 1000,
            event_channel_capacity: 16,
        }
    }

    fn setup_app() -> (Router, MemoryProfileStore) {
        let store = MemoryProfileStore::new();
        let config = test_config();
        let events = EventBus::new(config.event_channel_capacity);
        let profiles = Arc::new(ProfileService::new(
            Arc::new(store.clone()),
            Arc::new(events.clone()),
            config.session_settings(),
        ));
        let app = build_router(AppState {
            profiles,
            events,
            config,
        });
        (app, store)
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", "user-1")
            .header("x-user-email", "ada@example.com")
            .header("x-user-name", "Ada Lovelace");
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn signed_in() -> (Router, MemoryProfileStore) {
        let (app, store) = setup_app();
        let (status, _) = send(&app, request("POST", "/api/v1/session", None)).await;
        assert_eq!(status, StatusCode::OK);
        (app, store)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = setup_app();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "craftly-api");
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (app, _) = setup_app();
        let req = Request::builder()
            .uri("/api/v1/profile")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_profile_requires_sign_in() {
        let (app, _) = setup_app();
        let (status, body) = send(&app, request("GET", "/api/v1/profile", None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "NOT_INITIALIZED");
    }

    #[tokio::test]
    async fn test_sign_in_creates_profile() {
        let (app, store) = setup_app();
        let (status, body) = send(&app, request("POST", "/api/v1/session", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["personalInfo"]["firstName"], "Ada");
        assert_eq!(body["profile"]["personalInfo"]["lastName"], "Lovelace");
        assert_eq!(body["profile"]["metadata"]["version"], 1);
        assert_eq!(body["isUpdating"], false);
        assert!(store.snapshot("user-1").is_some());
    }

    #[tokio::test]
    async fn test_immediate_patch_persists() {
        let (app, store) = signed_in().await;
        let (status, body) = send(
            &app,
            request(
                "PATCH",
                "/api/v1/profile",
                Some(json!({
                    "updates": [
                        { "path": "summary.headline", "value": "Analyst" },
                        { "path": "personalInfo.location.city", "value": "London" }
                    ],
                    "mode": "immediate"
                })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["summary"]["headline"], "Analyst");
        assert_eq!(body["profile"]["metadata"]["version"], 2);
        let stored = store.snapshot("user-1").unwrap();
        assert_eq!(stored.personal_info.location.city, "London");
    }

    #[tokio::test]
    async fn test_autosave_patch_is_pending() {
        let (app, store) = signed_in().await;
        let (status, body) = send(
            &app,
            request(
                "PATCH",
                "/api/v1/profile",
                Some(json!({ "updates": [{ "path": "summary.headline", "value": "Analyst" }] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["autosavePending"], true);
        assert_eq!(body["profile"]["summary"]["headline"], "Analyst");
        assert_eq!(store.writes(), 1);

        let (status, body) = send(&app, request("POST", "/api/v1/profile/flush", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["autosavePending"], false);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_invalid_patch_reports_fields() {
        let (app, store) = signed_in().await;
        let (status, body) = send(
            &app,
            request(
                "PATCH",
                "/api/v1/profile",
                Some(json!({
                    "updates": [{ "path": "personalInfo.email", "value": "nope" }],
                    "mode": "immediate"
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["fields"]["personalInfo.email"],
            "Please enter a valid email address"
        );
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_unknown_path_is_rejected() {
        let (app, _) = signed_in().await;
        let (status, _) = send(
            &app,
            request(
                "PATCH",
                "/api/v1/profile",
                Some(json!({ "updates": [{ "path": "personalInfo.ssn", "value": "x" }] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back() {
        let (app, store) = signed_in().await;
        store.fail_next(1);
        let (status, body) = send(
            &app,
            request(
                "PATCH",
                "/api/v1/profile",
                Some(json!({
                    "updates": [{ "path": "summary.headline", "value": "Analyst" }],
                    "mode": "immediate"
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "COMMIT_FAILED");

        let (_, body) = send(&app, request("GET", "/api/v1/profile", None)).await;
        assert_eq!(body["profile"]["summary"]["headline"], "");
        assert!(body["lastError"]
            .as_str()
            .unwrap()
            .starts_with("Failed to save profile"));
    }

    #[tokio::test]
    async fn test_list_routes() {
        let (app, _) = signed_in().await;
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/v1/profile/lists/education",
                Some(json!({
                    "institution": "University of London",
                    "degree": "Mathematics",
                    "location": "London",
                    "startDate": "1840-09",
                    "gpa": 3.9
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["profile"]["education"][0]["degree"], "Mathematics");
        assert!(body["profile"]["education"][0]["id"].as_str().is_some());

        let (status, body) = send(
            &app,
            request(
                "PATCH",
                "/api/v1/profile/lists/education/0",
                Some(json!({ "gpa": 5.0 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["fields"]["education[0].gpa"],
            "GPA must be between 0.0 and 4.0"
        );

        let (status, _) = send(
            &app,
            request("DELETE", "/api/v1/profile/lists/education/3", None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            request("DELETE", "/api/v1/profile/lists/education/0", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["education"], json!([]));
    }

    #[tokio::test]
    async fn test_inline_edit_routes() {
        let (app, store) = signed_in().await;
        let base = "/api/v1/profile/fields/summary.headline";

        let (status, body) = send(&app, request("POST", &format!("{base}/edit"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "editing");

        let (_, body) = send(
            &app,
            request("PUT", &format!("{base}/draft"), Some(json!({ "value": "Analyst" }))),
        )
        .await;
        assert_eq!(body["value"], "Analyst");

        let (status, body) = send(&app, request("POST", &format!("{base}/commit"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "viewing");
        assert_eq!(body["isSaving"], false);
        assert_eq!(store.snapshot("user-1").unwrap().summary.headline, "Analyst");

        let (_, body) = send(&app, request("GET", base, None)).await;
        assert_eq!(body["value"], "Analyst");
    }

    #[tokio::test]
    async fn test_blank_entry_then_inline_edit_its_fields() {
        let (app, store) = signed_in().await;
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/v1/profile/lists/experience",
                Some(json!({ "position": "", "company": "", "startDate": "", "description": "" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        // experience[0].company
        let base = "/api/v1/profile/fields/experience%5B0%5D.company";
        let (status, body) = send(&app, request("POST", &format!("{base}/edit"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "editing");

        send(
            &app,
            request("PUT", &format!("{base}/draft"), Some(json!({ "value": "Analytical Engines" }))),
        )
        .await;
        let (status, body) = send(&app, request("POST", &format!("{base}/commit"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "viewing");

        let stored = store.snapshot("user-1").unwrap();
        assert_eq!(stored.experience[0].company, "Analytical Engines");
        assert_eq!(stored.experience[0].position, "");

        let (status, _) = send(
            &app,
            request("POST", "/api/v1/profile/fields/experience%5B4%5D.company/edit", None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_commit_without_edit_conflicts() {
        let (app, _) = signed_in().await;
        let (status, body) = send(
            &app,
            request("POST", "/api/v1/profile/fields/personalInfo.phone/commit", None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_validate_route() {
        let (app, _) = setup_app();
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/v1/validate",
                Some(json!({ "kind": "field", "path": "personalInfo.phone", "value": "123" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);
        assert_eq!(
            body["errors"]["personalInfo.phone"],
            "Phone number must be at least 10 digits"
        );

        let (_, body) = send(
            &app,
            request(
                "POST",
                "/api/v1/validate",
                Some(json!({ "kind": "skillLevel", "value": "Expert" })),
            ),
        )
        .await;
        assert_eq!(body["valid"], true);
    }

    #[tokio::test]
    async fn test_completion_and_sign_out() {
        let (app, _) = signed_in().await;
        let (status, body) = send(&app, request("GET", "/api/v1/profile/completion", None)).await;
        assert_eq!(status, StatusCode::OK);
        // first name, last name and email of 22 scored fields
        assert_eq!(body["completionPercentage"], 14);

        let (status, _) = send(&app, request("DELETE", "/api/v1/session", None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, request("GET", "/api/v1/profile", None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
