//! Self-registration with a Consul agent.
//!
//! The instance registers once after binding and deregisters after its
//! in-flight requests have drained. Consul polls `/health/ready`, so the
//! instance drops out of the passing set as soon as it starts draining.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// Failure talking to the Consul agent.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("consul request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("consul rejected {operation} with status {status}")]
    Rejected {
        operation: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("invalid consul address: {0}")]
    Address(String),
}

/// How this instance announces itself.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Base URL of the Consul agent, e.g. `http://127.0.0.1:8500`.
    pub consul_addr: String,
    pub service_name: String,
    pub tags: Vec<String>,
    /// Address other hosts use to reach this instance.
    pub advertise_host: String,
    /// Interval between Consul's readiness probes.
    pub check_interval: Duration,
    /// Consul reaps the registration after the check stays critical this long.
    pub deregister_after: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            consul_addr: "http://127.0.0.1:8500".to_string(),
            service_name: "datasvc".to_string(),
            tags: vec!["prod".to_string()],
            advertise_host: "127.0.0.1".to_string(),
            check_interval: Duration::from_secs(10),
            deregister_after: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentCheck {
    #[serde(rename = "HTTP")]
    http: String,
    interval: String,
    deregister_critical_service_after: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    tags: &'a [String],
    address: &'a str,
    port: u16,
    check: AgentCheck,
}

fn consul_duration(duration: Duration) -> String {
    format!("{}s", duration.as_secs().max(1))
}

/// A registered (or about to be registered) instance.
#[derive(Debug)]
pub struct ConsulRegistrar {
    http: reqwest::Client,
    config: RegistrationConfig,
    service_id: String,
    port: u16,
}

impl ConsulRegistrar {
    /// Prepares a registration for the instance listening on `port` with a
    /// fresh `<service>-<uuid>` id.
    #[must_use]
    pub fn new(config: RegistrationConfig, port: u16) -> Self {
        let service_id = format!("{}-{}", config.service_name, Uuid::new_v4());
        Self {
            http: reqwest::Client::new(),
            config,
            service_id,
            port,
        }
    }

    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    fn agent_url(&self, segments: &[&str]) -> Result<reqwest::Url, RegistrationError> {
        let mut url = reqwest::Url::parse(&self.config.consul_addr)
            .map_err(|e| RegistrationError::Address(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| RegistrationError::Address(self.config.consul_addr.clone()))?
            .pop_if_empty()
            .extend(["v1", "agent", "service"])
            .extend(segments);
        Ok(url)
    }

    fn registration(&self) -> AgentServiceRegistration<'_> {
        AgentServiceRegistration {
            id: &self.service_id,
            name: &self.config.service_name,
            tags: &self.config.tags,
            address: &self.config.advertise_host,
            port: self.port,
            check: AgentCheck {
                http: format!(
                    "http://{}:{}/health/ready",
                    self.config.advertise_host, self.port
                ),
                interval: consul_duration(self.config.check_interval),
                deregister_critical_service_after: consul_duration(self.config.deregister_after),
            },
        }
    }

    /// Registers the instance and its readiness check.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is unreachable or rejects the request.
    pub async fn register(&self) -> Result<(), RegistrationError> {
        let url = self.agent_url(&["register"])?;
        debug!(%url, "registering with consul");
        let response = self
            .http
            .put(url)
            .json(&self.registration())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RegistrationError::Rejected {
                operation: "register",
                status: response.status(),
            });
        }
        info!(
            service_id = %self.service_id,
            service = %self.config.service_name,
            port = self.port,
            "registered with consul"
        );
        Ok(())
    }

    /// Removes the registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent is unreachable or rejects the request.
    pub async fn deregister(&self) -> Result<(), RegistrationError> {
        let url = self.agent_url(&["deregister", &self.service_id])?;
        let response = self.http.put(url).send().await?;
        if !response.status().is_success() {
            return Err(RegistrationError::Rejected {
                operation: "deregister",
                status: response.status(),
            });
        }
        info!(service_id = %self.service_id, "deregistered from consul");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Bytes;
    use axum::extract::{OriginalUri, State};
    use axum::http::StatusCode;
    use axum::routing::put;
    use axum::Router;
    use parking_lot::Mutex;
    use tokio::net::TcpListener;

    use super::*;

    type Calls = Arc<Mutex<Vec<(String, Bytes)>>>;

    async fn record(
        State(calls): State<Calls>,
        OriginalUri(uri): OriginalUri,
        body: Bytes,
    ) -> StatusCode {
        calls.lock().push((uri.path().to_string(), body));
        StatusCode::OK
    }

    async fn fake_agent() -> (String, Calls) {
        let calls: Calls = Arc::default();
        let router = Router::new()
            .route("/v1/agent/service/register", put(record))
            .route("/v1/agent/service/deregister/{id}", put(record))
            .with_state(Arc::clone(&calls));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), calls)
    }

    #[test]
    fn service_id_is_prefixed_with_service_name() {
        let registrar = ConsulRegistrar::new(RegistrationConfig::default(), 8080);
        assert!(registrar.service_id().starts_with("datasvc-"));
        let other = ConsulRegistrar::new(RegistrationConfig::default(), 8080);
        assert_ne!(registrar.service_id(), other.service_id());
    }

    #[test]
    fn agent_url_tolerates_trailing_slash() {
        let config = RegistrationConfig {
            consul_addr: "http://consul:8500/".to_string(),
            ..RegistrationConfig::default()
        };
        let registrar = ConsulRegistrar::new(config, 1);
        let url = registrar.agent_url(&["register"]).unwrap();
        assert_eq!(url.as_str(), "http://consul:8500/v1/agent/service/register");
    }

    #[tokio::test]
    async fn register_then_deregister() {
        let (consul_addr, calls) = fake_agent().await;
        let config = RegistrationConfig {
            consul_addr,
            advertise_host: "10.0.0.5".to_string(),
            ..RegistrationConfig::default()
        };
        let registrar = ConsulRegistrar::new(config, 9000);

        registrar.register().await.unwrap();
        registrar.deregister().await.unwrap();

        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "/v1/agent/service/register");
        let body: serde_json::Value = serde_json::from_slice(&calls[0].1).unwrap();
        assert_eq!(body["ID"], registrar.service_id());
        assert_eq!(body["Name"], "datasvc");
        assert_eq!(body["Tags"], serde_json::json!(["prod"]));
        assert_eq!(body["Port"], 9000);
        assert_eq!(body["Check"]["HTTP"], "http://10.0.0.5:9000/health/ready");
        assert_eq!(body["Check"]["Interval"], "10s");
        assert_eq!(
            calls[1].0,
            format!("/v1/agent/service/deregister/{}", registrar.service_id())
        );
    }

    #[tokio::test]
    async fn unreachable_agent_is_an_http_error() {
        let config = RegistrationConfig {
            consul_addr: "http://127.0.0.1:1".to_string(),
            ..RegistrationConfig::default()
        };
        let err = ConsulRegistrar::new(config, 1).register().await.unwrap_err();
        assert!(matches!(err, RegistrationError::Http(_)));
    }
}
