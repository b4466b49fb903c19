//! Discovery backends: where the instance set comes from.
//!
//! A backend answers "which instances of this service exist" and supports
//! blocking queries keyed on a change index: a call with `after_index`
//! greater than zero may wait until the set changes past that index (or the
//! backend's own wait expires) before answering.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::debug;

/// Failure to query a discovery backend.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("discovery backend answered {0}")]
    Status(StatusCode),
    #[error("invalid discovery response: {0}")]
    Decode(String),
    #[error("invalid discovery address: {0}")]
    Address(String),
}

/// One registered instance as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub id: String,
    /// `host:port`.
    pub address: String,
    pub tags: Vec<String>,
    /// Every health check reported passing.
    pub healthy: bool,
}

impl ServiceInstance {
    /// A healthy instance with the given tags; id and address are the same.
    #[must_use]
    pub fn new(address: impl Into<String>, tags: &[&str]) -> Self {
        let address = address.into();
        Self {
            id: address.clone(),
            address,
            tags: tags.iter().map(ToString::to_string).collect(),
            healthy: true,
        }
    }
}

/// What to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceQuery {
    pub service: String,
    /// Every tag must be present on a matching instance.
    pub tags: Vec<String>,
    pub passing_only: bool,
}

impl InstanceQuery {
    /// Client-side filter; backends may pre-filter, this is the final word.
    #[must_use]
    pub fn matches(&self, instance: &ServiceInstance) -> bool {
        (!self.passing_only || instance.healthy)
            && self
                .tags
                .iter()
                .all(|tag| instance.tags.iter().any(|t| t == tag))
    }
}

/// A backend answer together with the index to block on next time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub instances: Vec<ServiceInstance>,
    pub index: u64,
}

#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Returns the current instances. With `after_index > 0` the call may
    /// block until the backend's index moves past it.
    async fn lookup(&self, query: &InstanceQuery, after_index: u64) -> Result<Lookup, DiscoveryError>;
}

// ---------------------------------------------------------------------------
// Consul
// ---------------------------------------------------------------------------

const CONSUL_INDEX_HEADER: &str = "x-consul-index";
const CHECK_PASSING: &str = "passing";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulEntry {
    node: ConsulNode,
    service: ConsulService,
    #[serde(default)]
    checks: Vec<ConsulCheck>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulNode {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulService {
    #[serde(rename = "ID")]
    id: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    address: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ConsulCheck {
    status: String,
}

impl From<ConsulEntry> for ServiceInstance {
    fn from(entry: ConsulEntry) -> Self {
        let host = if entry.service.address.is_empty() {
            entry.node.address
        } else {
            entry.service.address
        };
        Self {
            id: entry.service.id,
            address: format!("{host}:{}", entry.service.port),
            tags: entry.service.tags.unwrap_or_default(),
            healthy: entry.checks.iter().all(|c| c.status == CHECK_PASSING),
        }
    }
}

/// Consul health API backend (`/v1/health/service/{name}`).
#[derive(Debug, Clone)]
pub struct ConsulBackend {
    http: reqwest::Client,
    base: Url,
    wait: Duration,
}

impl ConsulBackend {
    /// Default blocking-query wait.
    pub const DEFAULT_WAIT: Duration = Duration::from_secs(30);

    /// # Errors
    ///
    /// `Address` if `consul_addr` is not a URL, `Http` if no client can be built.
    pub fn new(consul_addr: &str) -> Result<Self, DiscoveryError> {
        let raw = if consul_addr.starts_with("http") {
            consul_addr.to_string()
        } else {
            format!("http://{consul_addr}")
        };
        let base = Url::parse(&raw).map_err(|e| DiscoveryError::Address(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(DiscoveryError::Address(raw));
        }
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base,
            wait: Self::DEFAULT_WAIT,
        })
    }

    /// Overrides the blocking-query wait.
    #[must_use]
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    fn health_url(&self, query: &InstanceQuery, after_index: u64) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", "health", "service", query.service.as_str()]);
        }
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(tag) = query.tags.first() {
                pairs.append_pair("tag", tag);
            }
            if query.passing_only {
                pairs.append_pair("passing", "true");
            }
            if after_index > 0 {
                pairs.append_pair("index", &after_index.to_string());
                pairs.append_pair("wait", &format!("{}s", self.wait.as_secs().max(1)));
            }
        }
        url
    }
}

#[async_trait]
impl DiscoveryBackend for ConsulBackend {
    async fn lookup(&self, query: &InstanceQuery, after_index: u64) -> Result<Lookup, DiscoveryError> {
        let url = self.health_url(query, after_index);
        debug!(%url, "consul health query");

        // Consul may hold the request for wait + wait/16.
        let response = self
            .http
            .get(url)
            .timeout(self.wait + self.wait / 16 + Duration::from_secs(5))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Status(response.status()));
        }
        let index = response
            .headers()
            .get(CONSUL_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let body = response.bytes().await?;
        let entries: Vec<ConsulEntry> =
            serde_json::from_slice(&body).map_err(|e| DiscoveryError::Decode(e.to_string()))?;

        Ok(Lookup {
            instances: entries.into_iter().map(ServiceInstance::from).collect(),
            index,
        })
    }
}

// ---------------------------------------------------------------------------
// Static
// ---------------------------------------------------------------------------

/// In-process backend whose instance set is changed by hand.
///
/// Every [`StaticBackend::set_instances`] bumps the index, waking blocked
/// lookups. Used for fixed deployments and tests.
#[derive(Debug)]
pub struct StaticBackend {
    state: watch::Sender<Lookup>,
}

impl StaticBackend {
    #[must_use]
    pub fn new(instances: Vec<ServiceInstance>) -> Self {
        let (state, _) = watch::channel(Lookup {
            instances,
            index: 1,
        });
        Self { state }
    }

    /// Healthy instances at the given addresses, all carrying `tags`.
    #[must_use]
    pub fn from_addresses<S: AsRef<str>>(addresses: &[S], tags: &[&str]) -> Self {
        Self::new(
            addresses
                .iter()
                .map(|a| ServiceInstance::new(a.as_ref(), tags))
                .collect(),
        )
    }

    /// Replaces the instance set.
    pub fn set_instances(&self, instances: Vec<ServiceInstance>) {
        self.state.send_modify(|state| {
            state.instances = instances;
            state.index += 1;
        });
    }
}

#[async_trait]
impl DiscoveryBackend for StaticBackend {
    async fn lookup(&self, _query: &InstanceQuery, after_index: u64) -> Result<Lookup, DiscoveryError> {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let current = rx
            .wait_for(|state| state.index > after_index)
            .await
            .map_err(|e| DiscoveryError::Decode(e.to_string()))?;
        Ok(current.clone())
    }
}
