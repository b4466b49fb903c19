//! Business layer for notes.
//!
//! 1. **In-memory service** (`inmem`): `NoteService` over the `NoteStore`
//! 2. **Middleware** (`middleware`): decorators such as logging, composed
//!    with tower `Layer`s into the stack exposed over HTTP

pub mod inmem;
pub mod middleware;

pub use inmem::InMemoryNoteService;
pub use middleware::{build_service, LoggingLayer, LoggingMiddleware};
