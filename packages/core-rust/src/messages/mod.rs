//! Request/response pairs, one per `NoteService` operation.
//!
//! Responses embed the business outcome in `err`. Serialization of a
//! response writes only the success payload (`{}` or `{"note": ...}`); the
//! transport codecs turn `err` into a status code plus `{"error": ...}`.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::note::Note;

/// Implemented by every response so transports and resilience layers can
/// see whether the business operation failed.
pub trait Failer {
    fn failed(&self) -> Option<&ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostNoteRequest {
    pub note: Note,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostNoteResponse {
    #[serde(skip)]
    pub err: Option<ServiceError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetNoteRequest {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GetNoteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<Note>,
    #[serde(skip)]
    pub err: Option<ServiceError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutNoteRequest {
    pub id: String,
    pub note: Note,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PutNoteResponse {
    #[serde(skip)]
    pub err: Option<ServiceError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchNoteRequest {
    pub id: String,
    pub note: Note,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchNoteResponse {
    #[serde(skip)]
    pub err: Option<ServiceError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNoteRequest {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteNoteResponse {
    #[serde(skip)]
    pub err: Option<ServiceError>,
}

/// Body of any non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Body of a successful `GET /notes/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GetNoteBody {
    pub note: Note,
}

/// Body of the other successful responses. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EmptyBody {}

macro_rules! impl_failer {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Failer for $ty {
                fn failed(&self) -> Option<&ServiceError> {
                    self.err.as_ref()
                }
            }
        )+
    };
}

impl_failer!(
    PostNoteResponse,
    GetNoteResponse,
    PutNoteResponse,
    PatchNoteResponse,
    DeleteNoteResponse,
);
