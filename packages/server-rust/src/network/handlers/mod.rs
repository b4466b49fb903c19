//! HTTP handler definitions for the datasvc server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;
pub mod notes;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use notes::{
    delete_note_handler, get_note_handler, patch_note_handler, post_note_handler,
    put_note_handler,
};

use std::sync::Arc;
use std::time::Instant;

use datasvc_core::Endpoints;

use super::ShutdownController;
use crate::storage::NoteStore;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Server-side endpoints wrapping the service stack.
    pub endpoints: Arc<Endpoints>,
    /// The instance's store, read by the health report.
    pub store: Arc<NoteStore>,
    /// Readiness and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Builds the state for a store, wiring the logging-decorated service
    /// behind the server endpoints.
    #[must_use]
    pub fn new(store: Arc<NoteStore>, shutdown: Arc<ShutdownController>) -> Self {
        let service = crate::service::build_service(Arc::clone(&store));
        Self {
            endpoints: Arc::new(datasvc_core::make_server_endpoints(service)),
            store,
            shutdown,
            start_time: Instant::now(),
        }
    }
}
