//! Turns an instance set into a live set of endpoints.
//!
//! One background task owns the `address -> endpoint` table. On every
//! instance-set change it creates endpoints for new addresses through the
//! factory, drops the ones whose instance vanished, keeps the rest, and
//! publishes an immutable snapshot through `ArcSwap`. Readers never wait on
//! the writer.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use datasvc_core::EndpointError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::instancer::Instancer;

/// Builds the endpoint for one `host:port`.
pub type Factory<E> = Arc<dyn Fn(&str) -> Result<E, EndpointError> + Send + Sync>;

/// Live endpoints for the instances published by an [`Instancer`].
///
/// Dropping the endpointer stops its update task.
pub struct Endpointer<E> {
    snapshot: Arc<ArcSwap<Vec<E>>>,
    cancel: CancellationToken,
}

impl<E> Endpointer<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Subscribes to `instancer`. Must be called within a tokio runtime.
    #[must_use]
    pub fn new(instancer: &Instancer, factory: Factory<E>) -> Self {
        Self::from_receiver(instancer.subscribe(), factory)
    }

    /// Subscribes to any instance-set channel. The current set is applied
    /// before returning.
    #[must_use]
    pub fn from_receiver(mut instances: watch::Receiver<Vec<String>>, factory: Factory<E>) -> Self {
        let mut table = BTreeMap::new();
        let initial = instances.borrow_and_update().clone();
        update_table(&mut table, &initial, &factory);

        let snapshot = Arc::new(ArcSwap::from_pointee(table.values().cloned().collect()));
        let cancel = CancellationToken::new();

        tokio::spawn(update_loop(
            instances,
            factory,
            table,
            Arc::clone(&snapshot),
            cancel.clone(),
        ));

        Self { snapshot, cancel }
    }

    /// The current endpoints, ordered by instance address.
    #[must_use]
    pub fn endpoints(&self) -> Arc<Vec<E>> {
        self.snapshot.load_full()
    }
}

impl<E> Drop for Endpointer<E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<E> std::fmt::Debug for Endpointer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpointer")
            .field("endpoints", &self.snapshot.load().len())
            .finish_non_exhaustive()
    }
}

fn update_table<E>(table: &mut BTreeMap<String, E>, instances: &[String], factory: &Factory<E>) {
    table.retain(|address, _| {
        let keep = instances.contains(address);
        if !keep {
            debug!(instance = %address, "endpoint removed");
        }
        keep
    });

    for address in instances {
        if table.contains_key(address) {
            continue;
        }
        match factory(address) {
            Ok(endpoint) => {
                debug!(instance = %address, "endpoint added");
                table.insert(address.clone(), endpoint);
            }
            Err(err) => warn!(instance = %address, %err, "endpoint factory failed; instance skipped"),
        }
    }
}

async fn update_loop<E>(
    mut instances: watch::Receiver<Vec<String>>,
    factory: Factory<E>,
    mut table: BTreeMap<String, E>,
    snapshot: Arc<ArcSwap<Vec<E>>>,
    cancel: CancellationToken,
) where
    E: Clone + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = instances.changed() => {
                if changed.is_err() {
                    // Instancer gone; keep serving the last snapshot.
                    break;
                }
            }
        }
        let current = instances.borrow_and_update().clone();
        update_table(&mut table, &current, &factory);
        snapshot.store(Arc::new(table.values().cloned().collect()));
    }
}
