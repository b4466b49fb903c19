//! Watches a discovery backend and publishes the live instance set.
//!
//! The set is a sorted `Vec` of `host:port` strings sent through a
//! `tokio::sync::watch` channel, and only re-published when membership
//! actually changes. Backend errors never clear the set: subscribers keep
//! the last known instances while the loop backs off and retries.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::{DiscoveryBackend, InstanceQuery, Lookup};

/// Configuration for an [`Instancer`].
#[derive(Debug, Clone)]
pub struct InstancerConfig {
    pub service: String,
    pub tags: Vec<String>,
    pub passing_only: bool,
    /// First delay after a backend error.
    pub initial_backoff: Duration,
    /// Upper bound for the error backoff.
    pub max_backoff: Duration,
}

impl Default for InstancerConfig {
    fn default() -> Self {
        Self {
            service: "datasvc".to_string(),
            tags: vec!["prod".to_string()],
            passing_only: true,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl InstancerConfig {
    fn query(&self) -> InstanceQuery {
        InstanceQuery {
            service: self.service.clone(),
            tags: self.tags.clone(),
            passing_only: self.passing_only,
        }
    }
}

/// Exponential backoff: each step doubles and applies a 0.5x-1.5x jitter,
/// capped at `max`.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let jitter: f64 = rand::rng().random_range(0.5..1.5);
        self.current = self.current.mul_f64(2.0 * jitter).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// The next blocking-query index after a successful lookup.
///
/// An index that goes backwards means the backend's state was reset, so
/// start over. The result is never below 1: index 0 turns the next query
/// into a non-blocking one, and a backend that omits its index would make
/// the watch loop spin.
fn next_index(previous: u64, reported: u64) -> u64 {
    if reported < previous {
        1
    } else {
        reported.max(1)
    }
}

fn addresses(query: &InstanceQuery, lookup: &Lookup) -> Vec<String> {
    let mut addresses: Vec<String> = lookup
        .instances
        .iter()
        .filter(|instance| query.matches(instance))
        .map(|instance| instance.address.clone())
        .collect();
    addresses.sort();
    addresses.dedup();
    addresses
}

fn publish(tx: &watch::Sender<Vec<String>>, instances: Vec<String>) -> bool {
    tx.send_if_modified(|current| {
        if *current == instances {
            false
        } else {
            *current = instances;
            true
        }
    })
}

/// Background watcher of one service's instance set.
///
/// Dropping the instancer stops its watch loop.
#[derive(Debug)]
pub struct Instancer {
    rx: watch::Receiver<Vec<String>>,
    cancel: CancellationToken,
}

impl Instancer {
    /// Performs the initial lookup, then spawns the watch loop.
    ///
    /// An initial lookup failure is logged and the set starts empty; the
    /// loop keeps retrying. Must be called within a tokio runtime.
    pub async fn new(backend: Arc<dyn DiscoveryBackend>, config: InstancerConfig) -> Self {
        let query = config.query();
        let (tx, rx) = watch::channel(Vec::new());

        let index = match backend.lookup(&query, 0).await {
            Ok(lookup) => {
                publish(&tx, addresses(&query, &lookup));
                info!(
                    service = %query.service,
                    instances = tx.borrow().len(),
                    "initial instance set"
                );
                next_index(0, lookup.index)
            }
            Err(err) => {
                warn!(service = %query.service, %err, "initial instance lookup failed");
                0
            }
        };

        let cancel = CancellationToken::new();
        tokio::spawn(watch_loop(
            backend,
            query,
            Backoff::new(config.initial_backoff, config.max_backoff),
            tx,
            index,
            cancel.clone(),
        ));

        Self { rx, cancel }
    }

    /// A receiver of the instance set; the current value is marked seen
    /// only once the caller borrows it.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.rx.clone()
    }

    /// Snapshot of the current instance set.
    #[must_use]
    pub fn instances(&self) -> Vec<String> {
        self.rx.borrow().clone()
    }

    /// Stops the watch loop. Subscribers keep the last published set.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Instancer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watch_loop(
    backend: Arc<dyn DiscoveryBackend>,
    query: InstanceQuery,
    mut backoff: Backoff,
    tx: watch::Sender<Vec<String>>,
    mut index: u64,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = backend.lookup(&query, index) => result,
        };

        match result {
            Ok(lookup) => {
                backoff.reset();
                index = next_index(index, lookup.index);
                let instances = addresses(&query, &lookup);
                let count = instances.len();
                if publish(&tx, instances) {
                    info!(service = %query.service, instances = count, "instance set changed");
                }
            }
            Err(err) => {
                let delay = backoff.next_delay();
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                warn!(service = %query.service, %err, delay_ms, "instance watch failed");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    debug!(service = %query.service, "instance watch stopped");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::sd::backend::{DiscoveryError, ServiceInstance, StaticBackend};

    fn fast_config() -> InstancerConfig {
        InstancerConfig {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..InstancerConfig::default()
        }
    }

    /// Replays a script of answers, then parks forever.
    struct Scripted {
        script: Mutex<VecDeque<Result<Lookup, DiscoveryError>>>,
        calls: AtomicUsize,
        indexes: Mutex<Vec<u64>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<Lookup, DiscoveryError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                indexes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DiscoveryBackend for Scripted {
        async fn lookup(&self, _query: &InstanceQuery, after: u64) -> Result<Lookup, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.indexes.lock().push(after);
            let next = self.script.lock().pop_front();
            match next {
                Some(answer) => answer,
                None => std::future::pending().await,
            }
        }
    }

    fn lookup(addresses: &[&str], index: u64) -> Lookup {
        Lookup {
            instances: addresses
                .iter()
                .map(|a| ServiceInstance::new(*a, &["prod"]))
                .collect(),
            index,
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        let second = backoff.next_delay();
        assert!(second >= Duration::from_millis(10) && second <= Duration::from_millis(30));
        for _ in 0..20 {
            assert!(backoff.next_delay() <= Duration::from_millis(100));
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn index_resets_when_it_goes_backwards() {
        assert_eq!(next_index(0, 5), 5);
        assert_eq!(next_index(5, 5), 5);
        assert_eq!(next_index(9, 3), 1);
    }

    #[test]
    fn index_never_drops_to_zero() {
        assert_eq!(next_index(0, 0), 1);
        assert_eq!(next_index(4, 0), 1);
    }

    #[test]
    fn addresses_are_filtered_sorted_and_unique() {
        let query = InstancerConfig::default().query();
        let mut sick = ServiceInstance::new("c:3", &["prod"]);
        sick.healthy = false;
        let found = Lookup {
            instances: vec![
                ServiceInstance::new("b:2", &["prod"]),
                ServiceInstance::new("a:1", &["prod"]),
                ServiceInstance::new("a:1", &["prod"]),
                ServiceInstance::new("d:4", &["dev"]),
                sick,
            ],
            index: 1,
        };
        assert_eq!(addresses(&query, &found), vec!["a:1", "b:2"]);
    }

    #[tokio::test]
    async fn initial_lookup_is_published_before_new_returns() {
        let backend = Arc::new(StaticBackend::from_addresses(&["b:2", "a:1"], &["prod"]));
        let instancer = Instancer::new(backend, fast_config()).await;
        assert_eq!(instancer.instances(), vec!["a:1", "b:2"]);
    }

    #[tokio::test]
    async fn membership_changes_are_published() {
        let backend = Arc::new(StaticBackend::from_addresses(&["a:1"], &["prod"]));
        let instancer = Instancer::new(Arc::clone(&backend) as _, fast_config()).await;
        let mut rx = instancer.subscribe();
        rx.borrow_and_update();

        backend.set_instances(vec![
            ServiceInstance::new("a:1", &["prod"]),
            ServiceInstance::new("b:2", &["prod"]),
        ]);
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow(), vec!["a:1", "b:2"]);
    }

    #[tokio::test]
    async fn errors_keep_last_known_set() {
        let backend = Arc::new(Scripted::new(vec![
            Ok(lookup(&["a:1"], 1)),
            Err(DiscoveryError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR)),
            Err(DiscoveryError::Decode("garbage".to_string())),
            Ok(lookup(&["a:1", "b:2"], 2)),
        ]));
        let instancer = Instancer::new(Arc::clone(&backend) as _, fast_config()).await;
        let mut rx = instancer.subscribe();
        assert_eq!(*rx.borrow_and_update(), vec!["a:1"]);

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        // The two failures in between never produced an empty set.
        assert_eq!(*rx.borrow(), vec!["a:1", "b:2"]);
        assert!(backend.calls.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn initial_failure_starts_empty_then_recovers() {
        let backend = Arc::new(Scripted::new(vec![
            Err(DiscoveryError::Decode("down".to_string())),
            Ok(lookup(&["a:1"], 3)),
        ]));
        let instancer = Instancer::new(backend, fast_config()).await;
        let mut rx = instancer.subscribe();
        assert!(rx.borrow_and_update().is_empty());

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow(), vec!["a:1"]);
    }

    #[tokio::test]
    async fn dropping_the_instancer_stops_the_loop() {
        let backend = Arc::new(StaticBackend::from_addresses(&["a:1"], &["prod"]));
        let instancer = Instancer::new(Arc::clone(&backend) as _, fast_config()).await;
        let mut rx = instancer.subscribe();
        drop(instancer);

        // The loop exits and drops its sender; the channel closes.
        tokio::time::timeout(Duration::from_secs(2), async {
            while rx.changed().await.is_ok() {}
        })
        .await
        .unwrap();
        assert_eq!(*rx.borrow(), vec!["a:1"]);
    }

    #[tokio::test]
    async fn missing_index_still_issues_blocking_queries() {
        let backend = Arc::new(Scripted::new(vec![
            Ok(lookup(&["a:1"], 0)),
            Ok(lookup(&["a:1"], 0)),
            Ok(lookup(&["a:1", "b:2"], 0)),
        ]));
        let instancer = Instancer::new(Arc::clone(&backend) as _, fast_config()).await;
        let mut rx = instancer.subscribe();
        rx.borrow_and_update();

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        // First query is the only non-blocking one.
        assert_eq!(&backend.indexes.lock()[..3], &[0, 1, 1]);
    }
}
