//! Retry wrapper: re-issues a call against freshly balanced endpoints.
//!
//! A response is final as soon as the call completes, even if it embeds a
//! business error. Only call-level failures that another endpoint might not
//! hit ([`EndpointError::is_transient`]) are retried, bounded by an attempt
//! count and a wall-clock budget shared by all attempts of one call.

use std::sync::Arc;
use std::time::Duration;

use datasvc_core::{CallContext, Endpoint, EndpointError};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use super::balancer::Balancer;

/// Wraps `balancer` into a single endpoint with retries.
///
/// The budget starts when the call is made; a context deadline that falls
/// earlier takes precedence. Cancelling the context aborts the in-flight
/// attempt and returns [`EndpointError::Canceled`].
pub fn retry<Req, Resp>(
    max_attempts: usize,
    budget: Duration,
    balancer: Arc<dyn Balancer<Endpoint<Req, Resp>>>,
) -> Endpoint<Req, Resp>
where
    Req: Clone + Send + Sync + 'static,
    Resp: Send + 'static,
{
    Endpoint::new(move |ctx: CallContext, req: Req| {
        let balancer = Arc::clone(&balancer);
        async move {
            tokio::select! {
                biased;
                () = ctx.cancelled() => Err(EndpointError::Canceled),
                result = attempt_all(max_attempts, budget, balancer.as_ref(), &ctx, &req) => result,
            }
        }
    })
}

async fn attempt_all<Req, Resp>(
    max_attempts: usize,
    budget: Duration,
    balancer: &dyn Balancer<Endpoint<Req, Resp>>,
    ctx: &CallContext,
    req: &Req,
) -> Result<Resp, EndpointError>
where
    Req: Clone + Send + Sync + 'static,
    Resp: Send + 'static,
{
    let mut deadline = Instant::now() + budget;
    if let Some(ctx_deadline) = ctx.deadline() {
        deadline = deadline.min(Instant::from_std(ctx_deadline));
    }
    let attempt_ctx = ctx.clone().with_deadline(deadline.into_std());

    let mut last = EndpointError::NoEndpoints;
    let mut attempts = 0;

    while attempts < max_attempts && Instant::now() < deadline {
        attempts += 1;
        let result = match balancer.endpoint() {
            Ok(endpoint) => {
                match timeout_at(deadline, endpoint.call(attempt_ctx.clone(), req.clone())).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(EndpointError::Timeout(budget)),
                }
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(response) => return Ok(response),
            Err(err) if err.is_transient() => {
                debug!(attempt = attempts, %err, "attempt failed");
                last = err;
            }
            Err(err) => return Err(err),
        }
    }

    Err(EndpointError::RetryExhausted {
        attempts,
        last: Box::new(last),
    })
}
