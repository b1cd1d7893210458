//! HTTP server implementation using axum.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use katmon_cmc::{ArrayView, MonitorSnapshot};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::state::DashboardState;
use crate::types::{CmcList, CmcSummary, ErrorBody};

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    dashboard_state: DashboardState,
    config: Arc<DashboardConfig>,
}

impl AppState {
    pub fn new(dashboard_state: DashboardState, config: DashboardConfig) -> Self {
        Self {
            dashboard_state,
            config: Arc::new(config),
        }
    }
}

/// Handler failure, rendered as a JSON error body.
#[derive(Debug)]
enum ApiError {
    Unauthorized,
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"katmon\"")],
                Json(ErrorBody::new("unauthorized")),
            )
                .into_response(),
            ApiError::NotFound(what) => {
                (StatusCode::NOT_FOUND, Json(ErrorBody::new(what))).into_response()
            }
            ApiError::Internal(reason) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(reason))).into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/cmcs", get(list_cmcs))
        .route("/api/cmcs/{cmc}", get(get_cmc))
        .route("/api/cmcs/{cmc}/arrays/{array}", get(get_cmc_array))
        .route("/api/arrays/{rank}", get(get_ranked_array))
        .route("/metrics", get(get_metrics))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    if state.config.auth_enabled() && !check_basic_auth(headers, &state.config) {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Positions and ranks are 1-based; anything else names nothing.
fn parse_position(raw: &str, what: &str) -> ApiResult<usize> {
    raw.parse::<usize>()
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| ApiError::NotFound(format!("no {what} {raw}")))
}

async fn serve_index(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Html<&'static str>> {
    authorize(&state, &headers)?;
    Ok(Html(include_str!("../static/index.html")))
}

async fn list_cmcs(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<CmcList>> {
    authorize(&state, &headers)?;
    let snapshot = state.dashboard_state.snapshot();
    Ok(Json(CmcList::from(snapshot.as_ref())))
}

async fn get_cmc(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(cmc): Path<String>,
) -> ApiResult<Json<CmcSummary>> {
    authorize(&state, &headers)?;
    let position = parse_position(&cmc, "cmc")?;
    let snapshot = state.dashboard_state.snapshot();
    snapshot
        .cmc(position)
        .map(|view| Json(CmcSummary::from(view)))
        .ok_or_else(|| ApiError::NotFound(format!("no cmc {cmc}")))
}

async fn get_cmc_array(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((cmc, array)): Path<(String, String)>,
) -> ApiResult<Json<ArrayView>> {
    authorize(&state, &headers)?;
    let position = parse_position(&cmc, "cmc")?;
    let snapshot = state.dashboard_state.snapshot();
    found_array(&snapshot, |s| s.array(position, &array))
        .ok_or_else(|| ApiError::NotFound(format!("no array {array} on cmc {cmc}")))
}

async fn get_ranked_array(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(rank): Path<String>,
) -> ApiResult<Json<ArrayView>> {
    authorize(&state, &headers)?;
    let position = parse_position(&rank, "array ranked")?;
    let snapshot = state.dashboard_state.snapshot();
    found_array(&snapshot, |s| s.ranked_array(position))
        .ok_or_else(|| ApiError::NotFound(format!("no array ranked {rank}")))
}

fn found_array(
    snapshot: &MonitorSnapshot,
    lookup: impl FnOnce(&MonitorSnapshot) -> Option<&ArrayView>,
) -> Option<Json<ArrayView>> {
    lookup(snapshot).map(|view| Json(view.clone()))
}

async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    authorize(&state, &headers)?;
    let body = katmon_telemetry::gather_text().map_err(|e| {
        warn!(error = %e, "Failed to encode metrics");
        ApiError::Internal(e.to_string())
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

async fn not_found() -> ApiError {
    ApiError::NotFound("no such route".to_string())
}

/// Check basic authentication.
fn check_basic_auth(headers: &HeaderMap, config: &DashboardConfig) -> bool {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return false;
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return false;
    };
    let Some(encoded) = auth_str.strip_prefix("Basic ") else {
        return false;
    };
    let Some(decoded) = decode_credentials(encoded.trim()) else {
        debug!("Undecodable basic auth header");
        return false;
    };

    decoded == format!("{}:{}", config.username, config.password)
}

/// Decode the credentials part of a basic auth header.
fn decode_credentials(encoded: &str) -> Option<String> {
    let bytes = STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Run the dashboard HTTP server until `shutdown` resolves.
pub async fn run_server<F>(
    dashboard_state: DashboardState,
    config: DashboardConfig,
    shutdown: F,
) -> DashboardResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = config.listen_address();
    let app = create_router(AppState::new(dashboard_state, config));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| DashboardError::Bind {
            address: address.clone(),
            source,
        })?;
    info!(address = %address, "Starting dashboard server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Dashboard server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use katmon_cmc::{CmcServer, SubscriptionPlan, DEFAULT_CMC_PORT};
    use katmon_katcp::testing::MockConnector;
    use tower::ServiceExt;

    fn published() -> DashboardState {
        let connector = MockConnector::new();
        let mut cmc = CmcServer::new(
            "cmc1",
            DEFAULT_CMC_PORT,
            Arc::new(SubscriptionPlan::default()),
            &connector,
            0,
        );
        let handle = connector.handle("cmc1", DEFAULT_CMC_PORT).unwrap();
        handle.connect();
        handle.deliver_line("#array-list small 7150,7151,g1,g2");
        handle.deliver_line("#array-list big 7148,7149,g1,g2,g3,g4,g5,g6,g7,g8");
        cmc.handle_received_lines(&connector);

        let state = DashboardState::new();
        state.publish(MonitorSnapshot::capture(&[cmc]));
        state
    }

    fn app(config: DashboardConfig) -> Router {
        create_router(AppState::new(published(), config))
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[test]
    fn test_decode_credentials() {
        assert_eq!(decode_credentials("b3BzOnNlY3JldA==").as_deref(), Some("ops:secret"));
        assert_eq!(decode_credentials("YQ==").as_deref(), Some("a"));
        assert_eq!(decode_credentials("not*base64"), None);
        // Truncated padding is rejected rather than decoded leniently.
        assert_eq!(decode_credentials("YQ="), None);
        assert_eq!(decode_credentials("/w=="), None);
    }

    #[tokio::test]
    async fn test_index_is_html() {
        let response = app(DashboardConfig::default())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_list_cmcs() {
        let (status, json) = get(app(DashboardConfig::default()), "/api/cmcs").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cmcs"][0]["address"], "cmc1");
        assert_eq!(json["cmcs"][0]["arrays"][0]["name"], "big");
        assert_eq!(json["ranked"][0]["name"], "big");
        assert_eq!(json["ranked"][1]["antenna_count"], 1);
    }

    #[tokio::test]
    async fn test_cmc_by_position() {
        let (status, json) = get(app(DashboardConfig::default()), "/api/cmcs/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["position"], 1);
        assert_eq!(json["arrays"][1]["name"], "small");

        for uri in ["/api/cmcs/0", "/api/cmcs/2", "/api/cmcs/cmc1"] {
            let (status, json) = get(app(DashboardConfig::default()), uri).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert!(json["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_array_by_name_or_position() {
        let (status, json) = get(app(DashboardConfig::default()), "/api/cmcs/1/arrays/small").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["antenna_count"], 1);

        let (status, json) = get(app(DashboardConfig::default()), "/api/cmcs/1/arrays/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "big");
        assert_eq!(json["teams"][0]["hosts"][0]["name"], "fhost00");

        let (status, _) = get(app(DashboardConfig::default()), "/api/cmcs/1/arrays/3").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_array_by_rank() {
        let (status, json) = get(app(DashboardConfig::default()), "/api/arrays/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "small");

        let (status, _) = get(app(DashboardConfig::default()), "/api/arrays/3").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let (status, json) = get(app(DashboardConfig::default()), "/api/nothing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "no such route");
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        katmon_telemetry::Metrics::arrays_set(2);
        let response = app(DashboardConfig::default())
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("katmon_arrays"));
    }

    #[tokio::test]
    async fn test_basic_auth() {
        let config = DashboardConfig {
            username: "ops".to_string(),
            password: "secret".to_string(),
            ..Default::default()
        };

        let (status, _) = get(app(config.clone()), "/api/cmcs").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let response = app(config)
            .oneshot(
                Request::get("/api/cmcs")
                    .header(header::AUTHORIZATION, "Basic b3BzOnNlY3JldA==")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
