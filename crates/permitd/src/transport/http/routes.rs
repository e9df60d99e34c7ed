//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PermitError;
use crate::health::Health;
use crate::permit::PoolStats;
use crate::service::{BrokerService, HealthSnapshot, ServiceError};

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: Health,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub stats: PoolStats,
}

impl From<HealthSnapshot> for HealthCheckResponse {
    fn from(snapshot: HealthSnapshot) -> Self {
        Self {
            status: snapshot.state,
            version: snapshot.version,
            started_at: snapshot.started_at,
            stats: snapshot.stats,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PermitRequest {
    pub provider_id: String,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    pub total: i64,
}

/// Error envelope shared by every rejected call.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct PoolSize {
    total: u64,
    available: u64,
}

fn error_response(err: &ServiceError) -> Response {
    let status = match err {
        ServiceError::Stopping => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Permit(PermitError::InvalidArgument(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Permit(PermitError::NotFound { .. }) => StatusCode::NOT_FOUND,
        ServiceError::Permit(PermitError::Conflict { .. }) => StatusCode::CONFLICT,
    };
    tracing::debug!(kind = err.kind(), error = %err, "Rejected permit operation");
    let body = ErrorBody {
        error: err.to_string(),
        kind: err.kind(),
    };
    (status, Json(body)).into_response()
}

/// Body the JSON extractor refused before any operation ran.
fn rejection_response(rejection: JsonRejection) -> Response {
    tracing::debug!(
        status = %rejection.status(),
        error = %rejection.body_text(),
        "Rejected request body"
    );
    let body = ErrorBody {
        error: rejection.body_text(),
        kind: "invalid_body",
    };
    (rejection.status(), Json(body)).into_response()
}

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn health_check(State(service): State<Arc<BrokerService>>) -> Json<HealthCheckResponse> {
    Json(service.health().into())
}

async fn stats(State(service): State<Arc<BrokerService>>) -> Json<PoolStats> {
    Json(service.stats())
}

async fn allocations(State(service): State<Arc<BrokerService>>) -> impl IntoResponse {
    Json(service.allocations())
}

async fn request_permits(
    State(service): State<Arc<BrokerService>>,
    body: Result<Json<PermitRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(body)) => respond(service.request(&body.provider_id, body.count)),
        Err(rejection) => rejection_response(rejection),
    }
}

async fn release_permits(
    State(service): State<Arc<BrokerService>>,
    body: Result<Json<PermitRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(body)) => respond(service.release(&body.provider_id, body.count)),
        Err(rejection) => rejection_response(rejection),
    }
}

async fn revoke_permits(
    State(service): State<Arc<BrokerService>>,
    body: Result<Json<RevokeRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(body)) => Json(service.revoke(body.count)).into_response(),
        Err(rejection) => rejection_response(rejection),
    }
}

async fn resize_pool(
    State(service): State<Arc<BrokerService>>,
    body: Result<Json<ResizeRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(body)) => respond(service.resize(body.total).map(|stats| PoolSize {
            total: stats.total,
            available: stats.available,
        })),
        Err(rejection) => rejection_response(rejection),
    }
}

async fn shutdown(State(service): State<Arc<BrokerService>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

pub fn routes(service: Arc<BrokerService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/stats", get(stats))
        .route("/allocations", get(allocations))
        .route("/permits/request", post(request_permits))
        .route("/permits/release", post(release_permits))
        .route("/permits/revoke", post(revoke_permits))
        .route("/pool", put(resize_pool))
        .route("/shutdown", post(shutdown))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permit::PermitManager;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_service(total: i64) -> Arc<BrokerService> {
        Arc::new(BrokerService::new(Arc::new(PermitManager::new(total))))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_check_returns_status_and_stats() {
        let app = routes(create_service(10));

        let response = app
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "READY");
        assert_eq!(json["stats"]["total"], 10);
        assert!(json["version"].is_string());
        assert!(json["started_at"].is_string());
    }

    #[tokio::test]
    async fn health_check_saturated_when_pool_exhausted() {
        let service = create_service(2);
        service.request("nvd", 2).unwrap();
        let app = routes(service);

        let response = app
            .oneshot(Request::get("/health-check").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let json = response_json(response).await;
        assert_eq!(json["status"], "SATURATED");
    }

    #[tokio::test]
    async fn request_returns_grant_triple() {
        let app = routes(create_service(10));

        let response = app
            .oneshot(post_json("/permits/request", r#"{"provider_id":"nvd","count":15}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(
            json,
            serde_json::json!({"granted": 10, "available": 0, "provider_id": "nvd"})
        );
    }

    #[tokio::test]
    async fn request_with_invalid_count_is_422() {
        let app = routes(create_service(10));

        let response = app
            .oneshot(post_json("/permits/request", r#"{"provider_id":"nvd","count":0}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = response_json(response).await;
        assert_eq!(json["kind"], "invalid_argument");
    }

    #[tokio::test]
    async fn release_returns_released_amount() {
        let service = create_service(10);
        service.request("cwe", 4).unwrap();
        let app = routes(service);

        let response = app
            .oneshot(post_json("/permits/release", r#"{"provider_id":"cwe","count":99}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["released"], 4);
        assert_eq!(json["available"], 10);
    }

    #[tokio::test]
    async fn release_unknown_provider_is_404() {
        let app = routes(create_service(10));

        let response = app
            .oneshot(post_json("/permits/release", r#"{"provider_id":"ghost","count":1}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = response_json(response).await;
        assert_eq!(json["kind"], "not_found");
        assert!(json["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn revoke_returns_per_provider_map() {
        let service = create_service(10);
        service.request("a", 4).unwrap();
        service.request("b", 4).unwrap();
        let app = routes(service);

        let response = app
            .oneshot(post_json("/permits/revoke", r#"{"count":4}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json, serde_json::json!({"a": 2, "b": 2}));
    }

    #[tokio::test]
    async fn revoke_with_nothing_allocated_is_empty_object() {
        let app = routes(create_service(10));

        let response = app
            .oneshot(post_json("/permits/revoke", r#"{"count":3}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn resize_conflict_is_409() {
        let service = create_service(10);
        service.request("x", 8).unwrap();
        let app = routes(Arc::clone(&service));

        let response = app
            .oneshot(
                Request::put("/pool")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"total":5}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = response_json(response).await;
        assert_eq!(json["kind"], "conflict");
        assert_eq!(service.stats().total, 10);
    }

    #[tokio::test]
    async fn resize_grows_headroom() {
        let service = create_service(10);
        service.request("x", 8).unwrap();
        let app = routes(service);

        let response = app
            .oneshot(
                Request::put("/pool")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"total":20}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json, serde_json::json!({"total": 20, "available": 12}));
    }

    #[tokio::test]
    async fn stats_and_allocations_reflect_grants() {
        let service = create_service(10);
        service.request("capec", 3).unwrap();

        let response = routes(Arc::clone(&service))
            .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = response_json(response).await;
        assert_eq!(json["allocated"], 3);
        assert_eq!(json["total_requests"], 1);

        let response = routes(service)
            .oneshot(Request::get("/allocations").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response_json(response).await, serde_json::json!({"capec": 3}));
    }

    #[tokio::test]
    async fn shutdown_triggers_service_shutdown() {
        let service = create_service(10);
        let mut rx = service.shutdown_rx();
        let app = routes(Arc::clone(&service));

        assert!(!*rx.borrow());

        let response = app
            .oneshot(Request::post("/shutdown").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());

        let response = routes(service)
            .oneshot(post_json("/permits/request", r#"{"provider_id":"nvd","count":1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response_json(response).await["kind"], "stopping");
    }

    #[tokio::test]
    async fn malformed_body_uses_error_envelope() {
        let service = create_service(10);

        let response = routes(Arc::clone(&service))
            .oneshot(post_json("/permits/request", r#"{"provider_id":"nvd","count":"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["kind"], "invalid_body");

        let response = routes(Arc::clone(&service))
            .oneshot(post_json("/permits/release", r#"{"provider_id":"nvd"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = response_json(response).await;
        assert_eq!(json["kind"], "invalid_body");
        assert!(json["error"].is_string());

        let response = routes(Arc::clone(&service))
            .oneshot(post_json("/permits/revoke", r#"{"count":99999999999999999999}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response_json(response).await["kind"], "invalid_body");

        assert_eq!(service.stats().total_requests, 0);
        assert_eq!(service.stats().revoke_calls, 0);
    }

    #[tokio::test]
    async fn missing_content_type_uses_error_envelope() {
        let app = routes(create_service(10));

        let response = app
            .oneshot(Request::put("/pool").body(Body::from(r#"{"total":20}"#)).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(response_json(response).await["kind"], "invalid_body");
    }
}
