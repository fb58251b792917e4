use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use ingest_plugin::PluginRegistry;
use ingest_secrets::Encryptor;
use ingest_store::{CatalogSink, RunStore, ScheduleStore};
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::AppState;

#[allow(clippy::too_many_arguments)]
pub fn build_app(
    schedule_store: Arc<dyn ScheduleStore>,
    run_store: Arc<dyn RunStore>,
    catalog: Arc<dyn CatalogSink>,
    registry: Arc<PluginRegistry>,
    encryptor: Option<Arc<Encryptor>>,
    auth_token: Arc<String>,
) -> Router {
    let state = AppState { schedule_store, run_store, catalog, registry, encryptor, auth_token };

    let unauthenticated = Router::new().route("/health", get(handlers::health)).route("/ready", get(handlers::ready));

    let authenticated = Router::new()
        .route("/ingestion/schedules", post(handlers::create_schedule).get(handlers::list_schedules))
        .route(
            "/ingestion/schedules/:id",
            get(handlers::get_schedule).put(handlers::update_schedule).delete(handlers::delete_schedule),
        )
        .route("/ingestion/schedules/:id/run", post(handlers::run_schedule_now))
        .route("/ingestion/jobs", get(handlers::list_jobs))
        .route("/ingestion/jobs/:id/cancel", post(handlers::cancel_job))
        .route("/ingestion/validate", post(handlers::post_validate))
        .route("/pipelines/:name", axum::routing::delete(handlers::destroy_pipeline))
        .route("/plugins", get(handlers::list_plugins))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token));

    unauthenticated.merge(authenticated).layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use ingest_plugin::DemoSource;
    use ingest_store::{InMemoryCatalog, InMemoryStore};
    use serde_json::json;
    use tower::util::ServiceExt;

    const TEST_TOKEN: &str = "test-token";

    fn test_app() -> Router {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(PluginRegistry::new());
        let app = app_with(store, registry);
        app
    }

    fn app_with(store: Arc<InMemoryStore>, registry: Arc<PluginRegistry>) -> Router {
        build_app(store.clone(), store, Arc::new(InMemoryCatalog::new()), registry, None, Arc::new(TEST_TOKEN.to_string()))
    }

    fn authed(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.header("Authorization", format!("Bearer {}", TEST_TOKEN))
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = test_app();
        let resp = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn schedules_require_auth() {
        let app = test_app();
        let resp = app.oneshot(Request::builder().uri("/ingestion/schedules").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_token_returns_401() {
        let app = test_app();
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/ingestion/schedules")
                    .header("Authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_schedules_empty() {
        let app = test_app();
        let resp = app.oneshot(authed(Request::builder().uri("/ingestion/schedules")).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_schedule_unknown_plugin_returns_404() {
        let app = test_app();
        let body = json!({
            "name": "p1",
            "plugin_id": "does-not-exist",
            "config": {},
            "cron_expression": "* * * * *",
        });
        let resp = app
            .oneshot(
                authed(Request::builder().method(Method::POST).uri("/ingestion/schedules").header("content-type", "application/json"))
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_schedule_with_known_plugin_succeeds() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(DemoSource::new())).await.unwrap();
        let app = app_with(store, registry);

        let body = json!({
            "name": "p1",
            "plugin_id": "demo",
            "config": { "root_path": "/tmp" },
            "cron_expression": "* * * * *",
        });
        let resp = app
            .oneshot(
                authed(Request::builder().method(Method::POST).uri("/ingestion/schedules").header("content-type", "application/json"))
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invalid_cron_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(PluginRegistry::new());
        registry.register(Arc::new(DemoSource::new())).await.unwrap();
        let app = app_with(store, registry);

        let body = json!({
            "name": "p1",
            "plugin_id": "demo",
            "config": { "root_path": "/tmp" },
            "cron_expression": "not a cron",
        });
        let resp = app
            .oneshot(
                authed(Request::builder().method(Method::POST).uri("/ingestion/schedules").header("content-type", "application/json"))
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn plugins_list_returns_200() {
        let app = test_app();
        let resp = app.oneshot(authed(Request::builder().uri("/plugins")).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
