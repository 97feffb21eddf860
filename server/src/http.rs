//! HTTP surface: `GET /analysis` and `GET /health`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use postpulse_core::{AggregateService, PostSource};
use postpulse_sse::{EventHub, HubMetrics, HubState};

use crate::config::AnalysisHandlerConfig;

const INTERNAL_ERROR_MESSAGE: &str = "The server is not able to perform the request";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    service: Arc<AggregateService<Arc<dyn PostSource>>>,
    hub: Arc<EventHub>,
    authorized_dimensions: Arc<[String]>,
}

impl AppState {
    pub fn new(hub: Arc<EventHub>, source: Arc<dyn PostSource>, config: &AnalysisHandlerConfig) -> Self {
        Self {
            service: Arc::new(AggregateService::new(source)),
            hub,
            authorized_dimensions: config.authorized_dimensions.clone().into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analysis", get(get_analysis))
        .route("/health", get(get_health))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AnalysisQuery {
    duration: Option<String>,
    dimension: Option<String>,
}

fn bad_request(message: &'static str) -> Response {
    (StatusCode::BAD_REQUEST, Json(message)).into_response()
}

async fn get_analysis(State(state): State<AppState>, Query(query): Query<AnalysisQuery>) -> Response {
    let Some(raw_duration) = query.duration else {
        return bad_request("Query parameter duration is missing");
    };

    if let Some(magnitude) = raw_duration.strip_prefix('-') {
        if humantime::parse_duration(magnitude).is_ok() {
            error!(duration = %raw_duration, "negative duration");
            return bad_request("Query parameter duration must be a positive value");
        }
    }

    let window = match humantime::parse_duration(&raw_duration) {
        Ok(window) => window,
        Err(e) => {
            error!(duration = %raw_duration, error = %e, "can't parse duration");
            return bad_request("Query parameter duration is not a valid duration");
        }
    };

    let Some(dimension) = query.dimension else {
        return bad_request("Query parameter dimension is missing");
    };

    if !state.authorized_dimensions.iter().any(|d| *d == dimension) {
        error!(supplied_dimension = %dimension, "unauthorized dimension");
        return bad_request("Unauthorized dimension");
    }

    match state.service.aggregate(window, &dimension).await {
        Ok(aggregation) => (StatusCode::OK, Json(aggregation)).into_response(),
        Err(e) => {
            let window_ms = window.as_millis() as u64;
            if e.is_validation() {
                warn!(error = %e, %dimension, window_ms, "analysis rejected");
            } else {
                error!(error = %e, %dimension, window_ms, "analysis failed");
            }
            (StatusCode::INTERNAL_SERVER_ERROR, Json(INTERNAL_ERROR_MESSAGE)).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthReport {
    state: HubState,
    upstream: String,
    metrics: HubMetrics,
}

async fn get_health(State(state): State<AppState>) -> Response {
    let hub_state = state.hub.state();
    let status = match hub_state {
        HubState::Closed | HubState::Failed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    let report = HealthReport {
        state: hub_state,
        upstream: state.hub.url().to_string(),
        metrics: state.hub.metrics(),
    };
    (status, Json(report)).into_response()
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request served"
    );
    response
}
