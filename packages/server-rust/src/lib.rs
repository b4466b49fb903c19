//! datasvc server: note store, logging-decorated service, HTTP transport
//! and Consul self-registration.

pub mod network;
pub mod registrar;
pub mod service;
pub mod storage;

pub use network::{HealthState, NetworkConfig, NetworkModule, ShutdownController};
pub use registrar::{ConsulRegistrar, RegistrationConfig, RegistrationError};
pub use service::{build_service, InMemoryNoteService};
pub use storage::NoteStore;
