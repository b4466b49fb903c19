//! `NoteService` backed by discovered remote instances.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use datasvc_core::{CallContext, Endpoint, EndpointError, Endpoints, Note, NoteService, ServiceError};

use crate::sd::{
    retry, ConsulBackend, DiscoveryBackend, DiscoveryError, Endpointer, Factory, Instancer,
    InstancerConfig, RoundRobin,
};
use crate::transport;

/// Service name looked up in discovery.
pub const SERVICE_NAME: &str = "datasvc";
/// Tag an instance must carry.
pub const SERVICE_TAG: &str = "prod";
/// Only instances whose health checks pass are used.
pub const PASSING_ONLY: bool = true;
/// Attempts per logical call.
pub const MAX_ATTEMPTS: usize = 3;
/// Wall-clock budget for all attempts of one call.
pub const RETRY_BUDGET: Duration = Duration::from_millis(500);

/// Remote note service: every operation is dispatched through its own
/// endpointer, round-robin balancer and retry wrapper, all fed by one
/// instancer.
#[derive(Debug)]
pub struct Client {
    endpoints: Endpoints,
    instancer: Instancer,
}

fn balanced<Req, Resp>(
    instancer: &Instancer,
    factory: Factory<Endpoint<Req, Resp>>,
) -> Endpoint<Req, Resp>
where
    Req: Clone + Send + Sync + 'static,
    Resp: Send + 'static,
{
    let endpointer = Arc::new(Endpointer::new(instancer, factory));
    retry(MAX_ATTEMPTS, RETRY_BUDGET, Arc::new(RoundRobin::new(endpointer)))
}

impl Client {
    /// Discovers instances through the Consul agent at `consul_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is unusable. An unreachable agent is
    /// not an error here; calls fail with `NoEndpoints` until it answers.
    pub async fn connect(consul_addr: &str) -> Result<Self, DiscoveryError> {
        let backend = ConsulBackend::new(consul_addr)?;
        Ok(Self::with_backend(Arc::new(backend)).await)
    }

    /// Discovers instances through any backend, with the fixed client policy.
    pub async fn with_backend(backend: Arc<dyn DiscoveryBackend>) -> Self {
        let config = InstancerConfig {
            service: SERVICE_NAME.to_string(),
            tags: vec![SERVICE_TAG.to_string()],
            passing_only: PASSING_ONLY,
            ..InstancerConfig::default()
        };
        let instancer = Instancer::new(backend, config).await;

        let endpoints = Endpoints {
            post_note: balanced(&instancer, Arc::new(transport::make_post_note_endpoint)),
            get_note: balanced(&instancer, Arc::new(transport::make_get_note_endpoint)),
            put_note: balanced(&instancer, Arc::new(transport::make_put_note_endpoint)),
            patch_note: balanced(&instancer, Arc::new(transport::make_patch_note_endpoint)),
            delete_note: balanced(&instancer, Arc::new(transport::make_delete_note_endpoint)),
        };

        Self {
            endpoints,
            instancer,
        }
    }

    /// Addresses currently considered live.
    #[must_use]
    pub fn instances(&self) -> Vec<String> {
        self.instancer.instances()
    }

    /// The retrying endpoints, for callers that want the raw responses.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

#[async_trait]
impl NoteService for Client {
    async fn post_note(&self, ctx: &CallContext, note: Note) -> Result<(), ServiceError> {
        self.endpoints.post_note(ctx, note).await
    }

    async fn get_note(&self, ctx: &CallContext, id: &str) -> Result<Note, ServiceError> {
        self.endpoints.get_note(ctx, id).await
    }

    async fn put_note(&self, ctx: &CallContext, id: &str, note: Note) -> Result<(), ServiceError> {
        self.endpoints.put_note(ctx, id, note).await
    }

    async fn patch_note(&self, ctx: &CallContext, id: &str, note: Note) -> Result<(), ServiceError> {
        self.endpoints.patch_note(ctx, id, note).await
    }

    async fn delete_note(&self, ctx: &CallContext, id: &str) -> Result<(), ServiceError> {
        self.endpoints.delete_note(ctx, id).await
    }
}

/// Whether a client error means the call never reached a live instance.
#[must_use]
pub fn is_unavailable(err: &ServiceError) -> bool {
    matches!(
        err,
        ServiceError::Unavailable(
            EndpointError::RetryExhausted { .. } | EndpointError::NoEndpoints
        )
    )
}
