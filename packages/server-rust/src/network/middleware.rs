//! HTTP layers in front of the note routes, plus the drain gate.
//!
//! Every response carries the caller's `x-request-id` (or a fresh UUID),
//! which the note handlers also copy into the `CallContext` so service
//! log records can be joined with the HTTP trace.

use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::codec::encode_error_message;
use super::config::NetworkConfig;
use super::handlers::AppState;
use super::shutdown::HealthState;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

type HttpLayers = Stack<
    PropagateRequestIdLayer,
    Stack<
        TimeoutLayer,
        Stack<
            CorsLayer,
            Stack<
                CompressionLayer,
                Stack<
                    TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
                    Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>,
                >,
            >,
        >,
    >,
>;

/// Layers shared by every route, outermost first.
///
/// The request id is assigned before the trace span opens so the span
/// records it. A request that outlives `request_timeout` answers 408 with an
/// empty body, which the client decodes as a retryable failure.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            x_request_id.clone(),
            MakeRequestUuid,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// `"*"` allows any origin; anything else is an allowlist, and entries
/// that are not valid header values are skipped.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any)
}

/// Tracks note requests as in-flight and refuses new ones once draining.
///
/// Applied to the `/notes` routes only; health probes stay reachable
/// during shutdown.
pub async fn track_in_flight(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if matches!(
        state.shutdown.health_state(),
        HealthState::Draining | HealthState::Stopped
    ) {
        return encode_error_message(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down")
            .into_response();
    }
    let _guard = state.shutdown.in_flight_guard();
    next.run(req).await
}
