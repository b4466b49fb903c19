//! Pipeline composition: wraps the store-backed service with its middleware.

use std::sync::Arc;

use datasvc_core::NoteService;
use tower::ServiceBuilder;

use super::logging::LoggingLayer;
use crate::service::inmem::InMemoryNoteService;
use crate::storage::NoteStore;

/// Builds the service stack served over HTTP.
///
/// Layer order (outermost to innermost):
/// 1. `LoggingLayer` -- timing, outcome and metrics for every call
/// 2. `InMemoryNoteService` -- business logic over the shared store
#[must_use]
pub fn build_service(store: Arc<NoteStore>) -> Arc<dyn NoteService> {
    Arc::new(
        ServiceBuilder::new()
            .layer(LoggingLayer)
            .service(InMemoryNoteService::new(store)),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
