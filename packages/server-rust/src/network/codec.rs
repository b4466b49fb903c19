//! Server-side HTTP codec: request decoding and response/error encoding.
//!
//! Status mapping for business errors:
//! - `NotFound` -> 404
//! - `AlreadyExists`, `InconsistentIds` -> 400
//! - anything else, including routing anomalies and undecodable bodies -> 500
//!
//! Every non-2xx body is `{"error": "<message>"}`.

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use datasvc_core::messages::{
    DeleteNoteRequest, ErrorBody, GetNoteRequest, PatchNoteRequest, PostNoteRequest,
    PutNoteRequest,
};
use datasvc_core::{Failer, Note, ServiceError};
use serde::Serialize;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Failure to turn an HTTP request into a typed request.
#[derive(Debug, thiserror::Error)]
pub enum DecodeRequestError {
    /// The route matched but the `{id}` parameter could not be extracted.
    #[error("inconsistent mapping between route and handler (programming error)")]
    BadRouting,
    #[error("invalid request body: {0}")]
    Body(#[from] serde_json::Error),
}

impl IntoResponse for DecodeRequestError {
    fn into_response(self) -> Response {
        encode_error_message(StatusCode::INTERNAL_SERVER_ERROR, &self.to_string())
    }
}

/// Maps a business error onto its HTTP status code.
#[must_use]
pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotFound => StatusCode::NOT_FOUND,
        ServiceError::AlreadyExists | ServiceError::InconsistentIds => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Encodes `{"error": message}` with the given status.
#[must_use]
pub fn encode_error_message(status: StatusCode, message: &str) -> Response {
    let body = ErrorBody {
        error: message.to_string(),
    };
    match serde_json::to_vec(&body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response(),
        Err(_) => status.into_response(),
    }
}

/// Encodes a service error using the status mapping above.
#[must_use]
pub fn encode_error(err: &ServiceError) -> Response {
    encode_error_message(status_for(err), &err.to_string())
}

/// Encodes a typed response: its embedded error if it failed, otherwise
/// 200 with the serialized success payload.
pub fn encode_response<R>(response: &R) -> Response
where
    R: Failer + Serialize,
{
    if let Some(err) = response.failed() {
        return encode_error(err);
    }
    match serde_json::to_vec(response) {
        Ok(bytes) => (StatusCode::OK, [(CONTENT_TYPE, JSON_CONTENT_TYPE)], bytes).into_response(),
        Err(e) => encode_error_message(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn decode_note(body: &[u8]) -> Result<Note, DecodeRequestError> {
    Ok(serde_json::from_slice(body)?)
}

fn require_id(id: Option<String>) -> Result<String, DecodeRequestError> {
    id.ok_or(DecodeRequestError::BadRouting)
}

/// `POST /notes` with a note body.
///
/// # Errors
///
/// `Body` if the body is not a JSON note.
pub fn decode_post_note_request(body: &[u8]) -> Result<PostNoteRequest, DecodeRequestError> {
    Ok(PostNoteRequest {
        note: decode_note(body)?,
    })
}

/// `GET /notes/{id}`.
///
/// # Errors
///
/// `BadRouting` if the id is missing.
pub fn decode_get_note_request(id: Option<String>) -> Result<GetNoteRequest, DecodeRequestError> {
    Ok(GetNoteRequest {
        id: require_id(id)?,
    })
}

/// `PUT /notes/{id}` with a note body.
///
/// # Errors
///
/// `BadRouting` if the id is missing, `Body` if the body is not a JSON note.
pub fn decode_put_note_request(
    id: Option<String>,
    body: &[u8],
) -> Result<PutNoteRequest, DecodeRequestError> {
    Ok(PutNoteRequest {
        id: require_id(id)?,
        note: decode_note(body)?,
    })
}

/// `PATCH /notes/{id}` with a partial note body.
///
/// # Errors
///
/// `BadRouting` if the id is missing, `Body` if the body is not a JSON note.
pub fn decode_patch_note_request(
    id: Option<String>,
    body: &[u8],
) -> Result<PatchNoteRequest, DecodeRequestError> {
    Ok(PatchNoteRequest {
        id: require_id(id)?,
        note: decode_note(body)?,
    })
}

/// `DELETE /notes/{id}`.
///
/// # Errors
///
/// `BadRouting` if the id is missing.
pub fn decode_delete_note_request(
    id: Option<String>,
) -> Result<DeleteNoteRequest, DecodeRequestError> {
    Ok(DeleteNoteRequest {
        id: require_id(id)?,
    })
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use datasvc_core::messages::{GetNoteResponse, PutNoteResponse};
    use datasvc_core::EndpointError;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(status_for(&ServiceError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&ServiceError::AlreadyExists), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&ServiceError::InconsistentIds), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&ServiceError::BadRouting),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&ServiceError::Unavailable(EndpointError::Canceled)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn failed_response_encodes_error_body() {
        let response = encode_response(&PutNoteResponse {
            err: Some(ServiceError::InconsistentIds),
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "inconsistent IDs"})
        );
    }

    #[tokio::test]
    async fn successful_get_encodes_note() {
        let response = encode_response(&GetNoteResponse {
            note: Some(Note::new("1", "a", "t", "x")),
            err: None,
        });
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(body_json(response).await["note"]["author"], "a");
    }

    #[test]
    fn missing_id_is_bad_routing() {
        let err = decode_delete_note_request(None).unwrap_err();
        assert!(matches!(err, DecodeRequestError::BadRouting));
        assert_eq!(
            ServiceError::from_message(&err.to_string()),
            ServiceError::BadRouting
        );
    }

    #[tokio::test]
    async fn malformed_body_is_not_swallowed() {
        let err = decode_put_note_request(Some("1".into()), b"{not json").unwrap_err();
        assert!(matches!(err, DecodeRequestError::Body(_)));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid request body"));
    }

    #[test]
    fn partial_body_decodes_as_patch() {
        let req = decode_patch_note_request(Some("1".into()), br#"{"author":"b"}"#).unwrap();
        assert_eq!(req.id, "1");
        assert_eq!(req.note, Note::new("", "b", "", ""));
    }
}
