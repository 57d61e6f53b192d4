//! HTTP API of the reconciliation daemon
//!
//! Minimal JSON surface, no authentication:
//!
//! - `GET  /tdpctl/api/v1.0/version`
//! - `GET  /tdpctl/api/v1.0/power_limit[?mode=msr|mmio]`
//! - `PUT  /tdpctl/api/v1.0/power_limit`
//! - `GET  /tdpctl/api/v1.0/config`
//! - `PUT  /tdpctl/api/v1.0/config`
//!
//! Handlers call into the daemon, whose critical section serializes every
//! request that touches hardware.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::Daemon;
use crate::daemon::config::DaemonConfig;
use crate::error::TdpctlError;
use crate::limits::types::PowerLimitUpdate;
use crate::platform::RegisterSpace;

pub fn router(daemon: Arc<Daemon>) -> Router {
    Router::new()
        .route("/tdpctl/api/v1.0/version", get(version))
        .route(
            "/tdpctl/api/v1.0/power_limit",
            get(get_power_limit).put(put_power_limit),
        )
        .route(
            "/tdpctl/api/v1.0/config",
            get(get_config).put(put_config),
        )
        .layer(axum::middleware::from_fn(access_log))
        .with_state(daemon)
}

async fn access_log(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    tracing::info!("[access] {} {}", request.method(), request.uri());
    next.run(request).await
}

/// Error wrapper mapping the taxonomy onto status codes
struct ApiError(TdpctlError);

impl From<TdpctlError> for ApiError {
    fn from(err: TdpctlError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TdpctlError::Validation(_) | TdpctlError::Unsupported(_) | TdpctlError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, &self.0.to_string())
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({ "code": status.as_u16(), "message": message })),
    )
        .into_response()
}

async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Deserialize)]
struct ModeQuery {
    mode: Option<String>,
}

async fn get_power_limit(
    State(daemon): State<Arc<Daemon>>,
    Query(query): Query<ModeQuery>,
) -> Result<Response, ApiError> {
    let space = match query.mode.as_deref() {
        None | Some("") => None,
        Some(mode) => match RegisterSpace::from_mode(mode) {
            Some(space) => Some(space),
            None => return Ok(error_response(StatusCode::BAD_REQUEST, "invalid mode")),
        },
    };

    let limit = daemon.read_power_limit(space).await?;
    Ok(Json(limit).into_response())
}

async fn put_power_limit(
    State(daemon): State<Arc<Daemon>>,
    Json(update): Json<PowerLimitUpdate>,
) -> Result<StatusCode, ApiError> {
    daemon.submit_target(update).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_config(State(daemon): State<Arc<Daemon>>) -> Json<DaemonConfig> {
    Json(daemon.config().await)
}

async fn put_config(
    State(daemon): State<Arc<Daemon>>,
    Json(config): Json<DaemonConfig>,
) -> Result<StatusCode, ApiError> {
    daemon.set_config(config).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::stub::StubPlatform;
    use crate::platform::Platform;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> (Router, Arc<Daemon>) {
        let daemon = Daemon::new(
            Platform::Stub(StubPlatform::default()),
            DaemonConfig::default(),
        );
        (router(Arc::clone(&daemon)), daemon)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_version_endpoint() {
        let (router, _) = test_router();
        let response = router
            .oneshot(
                Request::get("/tdpctl/api/v1.0/version")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_power_limit() {
        let (router, _) = test_router();
        let response = router
            .oneshot(
                Request::get("/tdpctl/api/v1.0/power_limit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["pl1"]["power"], 28.0);
        assert_eq!(body["pl2"]["power"], 64.0);
        assert_eq!(body["locked"], false);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_mode_is_rejected() {
        let (router, _) = test_router();
        let response = router
            .oneshot(
                Request::get("/tdpctl/api/v1.0/power_limit?mode=pci")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], 400);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mode_on_non_intel_platform_is_rejected() {
        let (router, _) = test_router();
        let response = router
            .oneshot(
                Request::get("/tdpctl/api/v1.0/power_limit?mode=mmio")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_power_limit_updates_target() {
        let (router, daemon) = test_router();
        let response = router
            .oneshot(
                Request::put("/tdpctl/api/v1.0/power_limit")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"pl1": {"power": 45}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(daemon.target().await.unwrap().pl1.power, Some(45));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_power_limit_out_of_range() {
        let (router, _) = test_router();
        let response = router
            .oneshot(
                Request::put("/tdpctl/api/v1.0/power_limit")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"pl1": {"power": 500}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("out of range"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_config_round_trip() {
        let (router, daemon) = test_router();
        let response = router
            .clone()
            .oneshot(
                Request::put("/tdpctl/api/v1.0/config")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"interval": 30}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(daemon.config().await.interval, 30);

        let response = router
            .oneshot(
                Request::get("/tdpctl/api/v1.0/config")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["interval"], 30);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_interval_is_rejected() {
        let (router, _) = test_router();
        let response = router
            .oneshot(
                Request::put("/tdpctl/api/v1.0/config")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"interval": 0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
