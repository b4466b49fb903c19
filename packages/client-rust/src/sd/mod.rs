//! Service discovery pipeline: backend -> instancer -> endpointer ->
//! balancer -> retry.

pub mod backend;
pub mod balancer;
pub mod endpointer;
pub mod instancer;
pub mod retry;

pub use backend::{
    ConsulBackend, DiscoveryBackend, DiscoveryError, InstanceQuery, Lookup, ServiceInstance,
    StaticBackend,
};
pub use balancer::{Balancer, RoundRobin};
pub use endpointer::{Endpointer, Factory};
pub use instancer::{Instancer, InstancerConfig};
pub use retry::retry;
