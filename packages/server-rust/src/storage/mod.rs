//! Process-local storage for notes.
//!
//! Each server instance owns one [`NoteStore`]; nothing is persisted or
//! shared across instances.

pub mod store;

pub use store::NoteStore;
