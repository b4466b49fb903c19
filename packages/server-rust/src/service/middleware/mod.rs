//! Service middleware for `NoteService`.
//!
//! - [`logging`]: per-call timing, outcome logging and request metrics
//! - [`pipeline`]: composes the layers over the in-memory service

pub mod logging;
pub mod pipeline;

pub use logging::{LoggingLayer, LoggingMiddleware};
pub use pipeline::build_service;
