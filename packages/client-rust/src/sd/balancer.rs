//! Endpoint selection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use datasvc_core::EndpointError;

use super::endpointer::Endpointer;

/// Picks one endpoint per call.
pub trait Balancer<E>: Send + Sync {
    /// # Errors
    ///
    /// `NoEndpoints` when nothing is available.
    fn endpoint(&self) -> Result<E, EndpointError>;
}

impl<E, F> Balancer<E> for F
where
    F: Fn() -> Result<E, EndpointError> + Send + Sync,
{
    fn endpoint(&self) -> Result<E, EndpointError> {
        self()
    }
}

/// Cycles through the endpointer's current snapshot.
///
/// Each pick reads one snapshot and indexes it with an atomic cursor, so
/// concurrent callers never see a half-updated set.
#[derive(Debug)]
pub struct RoundRobin<E> {
    endpointer: Arc<Endpointer<E>>,
    cursor: AtomicUsize,
}

impl<E> RoundRobin<E>
where
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(endpointer: Arc<Endpointer<E>>) -> Self {
        Self {
            endpointer,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl<E> Balancer<E> for RoundRobin<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn endpoint(&self) -> Result<E, EndpointError> {
        let endpoints = self.endpointer.endpoints();
        if endpoints.is_empty() {
            return Err(EndpointError::NoEndpoints);
        }
        let position = self.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(endpoints[position % endpoints.len()].clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tokio::sync::watch;

    use super::*;
    use crate::sd::endpointer::Factory;

    fn identity_factory() -> Factory<String> {
        Arc::new(|address: &str| Ok(address.to_string()))
    }

    fn balancer_over(addresses: &[&str]) -> (watch::Sender<Vec<String>>, RoundRobin<String>) {
        let (tx, rx) = watch::channel(addresses.iter().map(ToString::to_string).collect());
        let endpointer = Arc::new(Endpointer::from_receiver(rx, identity_factory()));
        (tx, RoundRobin::new(endpointer))
    }

    #[tokio::test]
    async fn empty_snapshot_is_no_endpoints() {
        let (_tx, balancer) = balancer_over(&[]);
        assert_eq!(balancer.endpoint(), Err(EndpointError::NoEndpoints));
    }

    #[tokio::test]
    async fn picks_in_rotation() {
        let (_tx, balancer) = balancer_over(&["a:1", "b:2", "c:3"]);
        let picks: Vec<String> = (0..6).map(|_| balancer.endpoint().unwrap()).collect();
        assert_eq!(picks, vec!["a:1", "b:2", "c:3", "a:1", "b:2", "c:3"]);
    }

    #[tokio::test]
    async fn distribution_is_fair() {
        let (_tx, balancer) = balancer_over(&["a:1", "b:2", "c:3", "d:4"]);
        let balancer = Arc::new(balancer);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let balancer = Arc::clone(&balancer);
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| balancer.endpoint().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for pick in handle.join().unwrap() {
                *counts.entry(pick).or_default() += 1;
            }
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&n| n == 250), "{counts:?}");
    }

    #[test]
    fn closures_are_balancers() {
        let fixed = || Ok::<_, EndpointError>("only");
        assert_eq!(Balancer::endpoint(&fixed), Ok("only"));
    }
}
