//! datasvc core: note model, error taxonomy, call context, typed endpoints
//! and the `NoteService` contract shared by server and client.

pub mod context;
pub mod endpoint;
pub mod endpoints;
pub mod error;
pub mod messages;
pub mod note;
pub mod traits;

pub use context::CallContext;
pub use endpoint::{BoxedFuture, Endpoint};
pub use endpoints::{make_server_endpoints, Endpoints};
pub use error::{EndpointError, ServiceError};
pub use messages::Failer;
pub use note::Note;
pub use traits::NoteService;

/// Path of the notes collection.
pub const NOTES_PATH: &str = "/notes";
