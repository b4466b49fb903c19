//! The uniform dispatch shape every layer operates on.
//!
//! An [`Endpoint`] is a shared async function `(CallContext, Req) ->
//! Result<Resp, EndpointError>`. Server adapters, HTTP client codecs, the
//! round-robin balancer and the retry wrapper all produce and consume this
//! one type, so they compose without knowing about each other.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::CallContext;
use crate::error::EndpointError;

/// Boxed future returned by an endpoint call.
pub type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type EndpointFn<Req, Resp> =
    dyn Fn(CallContext, Req) -> BoxedFuture<Result<Resp, EndpointError>> + Send + Sync;

/// A cheaply cloneable, type-safe remote or local call.
pub struct Endpoint<Req, Resp> {
    inner: Arc<EndpointFn<Req, Resp>>,
}

impl<Req, Resp> Endpoint<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Wraps an async function as an endpoint.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, EndpointError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(
                move |ctx: CallContext, req: Req| -> BoxedFuture<Result<Resp, EndpointError>> {
                    Box::pin(f(ctx, req))
                },
            ),
        }
    }

    /// Invokes the endpoint.
    pub fn call(&self, ctx: CallContext, req: Req) -> BoxedFuture<Result<Resp, EndpointError>> {
        (self.inner)(ctx, req)
    }

    /// Returns `true` when both handles point at the same function.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<Req, Resp> Clone for Endpoint<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Req, Resp> fmt::Debug for Endpoint<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("request", &std::any::type_name::<Req>())
            .field("response", &std::any::type_name::<Resp>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_invokes_wrapped_function() {
        let double = Endpoint::new(|_ctx, n: u32| async move { Ok::<_, EndpointError>(n * 2) });
        assert_eq!(double.call(CallContext::new(), 21).await, Ok(42));
    }

    #[tokio::test]
    async fn clones_share_the_same_function() {
        let ep = Endpoint::new(|_ctx, (): ()| async { Err::<(), _>(EndpointError::NoEndpoints) });
        let clone = ep.clone();
        assert!(ep.ptr_eq(&clone));
        assert_eq!(
            clone.call(CallContext::new(), ()).await,
            Err(EndpointError::NoEndpoints)
        );
    }
}
