//! `/notes` handlers: decode the HTTP request, call the server endpoint,
//! encode the typed response.

use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use datasvc_core::{CallContext, Endpoint, Failer, ServiceError};
use serde::Serialize;
use tracing::warn;

use super::AppState;
use crate::network::codec::{
    decode_delete_note_request, decode_get_note_request, decode_patch_note_request,
    decode_post_note_request, decode_put_note_request, encode_error, encode_response,
};
use crate::network::middleware::REQUEST_ID_HEADER;

fn call_context(headers: &HeaderMap) -> CallContext {
    let ctx = CallContext::new();
    match headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(request_id) => ctx.with_request_id(request_id),
        None => ctx,
    }
}

fn path_id(path: Result<Path<String>, PathRejection>) -> Option<String> {
    match path {
        Ok(Path(id)) => Some(id),
        Err(rejection) => {
            warn!(%rejection, "route matched but note id could not be extracted");
            None
        }
    }
}

/// Runs one endpoint call. The context is cancelled if the handler future
/// is dropped (client went away, request timeout).
async fn dispatch<Req, Resp>(endpoint: &Endpoint<Req, Resp>, headers: &HeaderMap, req: Req) -> Response
where
    Req: Send + 'static,
    Resp: Failer + Serialize + Send + 'static,
{
    let ctx = call_context(headers);
    let _cancel_on_drop = ctx.cancellation_token().clone().drop_guard();
    match endpoint.call(ctx, req).await {
        Ok(response) => encode_response(&response),
        Err(err) => {
            warn!(%err, "server endpoint failed");
            encode_error(&ServiceError::Unavailable(err))
        }
    }
}

/// `POST /notes`
pub async fn post_note_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match decode_post_note_request(&body) {
        Ok(req) => dispatch(&state.endpoints.post_note, &headers, req).await,
        Err(err) => err.into_response(),
    }
}

/// `GET /notes/{id}`
pub async fn get_note_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
) -> Response {
    match decode_get_note_request(path_id(path)) {
        Ok(req) => dispatch(&state.endpoints.get_note, &headers, req).await,
        Err(err) => err.into_response(),
    }
}

/// `PUT /notes/{id}`
pub async fn put_note_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
    body: Bytes,
) -> Response {
    match decode_put_note_request(path_id(path), &body) {
        Ok(req) => dispatch(&state.endpoints.put_note, &headers, req).await,
        Err(err) => err.into_response(),
    }
}

/// `PATCH /notes/{id}`
pub async fn patch_note_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
    body: Bytes,
) -> Response {
    match decode_patch_note_request(path_id(path), &body) {
        Ok(req) => dispatch(&state.endpoints.patch_note, &headers, req).await,
        Err(err) => err.into_response(),
    }
}

/// `DELETE /notes/{id}`
pub async fn delete_note_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
) -> Response {
    match decode_delete_note_request(path_id(path)) {
        Ok(req) => dispatch(&state.endpoints.delete_note, &headers, req).await,
        Err(err) => err.into_response(),
    }
}
