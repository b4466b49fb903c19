//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves. The
//! split lets the binary learn the bound port (and register it with
//! discovery) before traffic starts flowing.

use std::future::{Future, IntoFuture};
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use datasvc_core::NOTES_PATH;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    delete_note_handler, get_note_handler, health_handler, liveness_handler, patch_note_handler,
    post_note_handler, put_note_handler, readiness_handler, AppState,
};
use super::middleware::{build_http_layers, track_in_flight};
use super::shutdown::ShutdownController;
use crate::storage::NoteStore;

/// Assembles the axum router for a given state.
///
/// Routes:
/// - `POST /notes` -- create
/// - `GET|PUT|PATCH|DELETE /notes/{id}` -- read, replace, partial update, delete
/// - `GET /health` -- detailed health JSON
/// - `GET /health/live` -- liveness probe
/// - `GET /health/ready` -- readiness probe (also the discovery health check)
pub fn build_router(state: AppState, config: &NetworkConfig) -> Router {
    let notes = Router::new()
        .route(NOTES_PATH, post(post_note_handler))
        .route(
            &format!("{NOTES_PATH}/{{id}}"),
            get(get_note_handler)
                .put(put_note_handler)
                .patch(patch_note_handler)
                .delete(delete_note_handler),
        )
        .route_layer(from_fn_with_state(state.clone(), track_in_flight));

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .merge(notes)
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Manages the HTTP server lifecycle for one instance.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    store: Arc<NoteStore>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, store: Arc<NoteStore>) -> Self {
        Self {
            config,
            listener: None,
            store,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Builds the router over this module's store and controller.
    pub fn build_router(&self) -> Router {
        let state = AppState::new(Arc::clone(&self.store), Arc::clone(&self.shutdown));
        build_router(state, &self.config)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured
    /// port when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then drains.
    ///
    /// After the shutdown signal the health state moves to Draining and new
    /// note requests get 503. Open connections are given up to
    /// `drain_timeout` to finish; past that `serve` returns and leaves them
    /// behind.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();
        let controller = Arc::clone(&self.shutdown);
        let drain_timeout = self.config.drain_timeout;
        let triggered = Arc::new(Notify::new());

        controller.set_ready();
        info!("serving note requests");

        let signal_controller = Arc::clone(&controller);
        let signal = Arc::clone(&triggered);
        let server = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                signal_controller.trigger_shutdown();
                signal.notify_one();
            })
            .into_future();
        let drain_deadline = async {
            triggered.notified().await;
            tokio::time::sleep(drain_timeout).await;
        };

        tokio::select! {
            result = server => {
                result?;
                controller.set_stopped();
                info!("all connections drained");
            }
            () = drain_deadline => {
                warn!(
                    in_flight = controller.in_flight_count(),
                    drain_timeout_ms = u64::try_from(drain_timeout.as_millis()).unwrap_or(u64::MAX),
                    "drain timeout expired with requests remaining"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use std::time::{Duration, Instant};

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    use super::*;
    use crate::network::HealthState;

    fn ready_router() -> (Router, Arc<ShutdownController>) {
        let module = NetworkModule::new(NetworkConfig::default(), Arc::new(NoteStore::new()));
        let controller = module.shutdown_controller();
        controller.set_ready();
        (module.build_router(), controller)
    }

    async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
        let body = body.map_or_else(Body::empty, |value| Body::from(value.to_string()));
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        router.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = NetworkModule::new(NetworkConfig::default(), Arc::new(NoteStore::new()));
        assert!(module.listener.is_none());
    }

    #[test]
    fn shutdown_controller_returns_shared_arc() {
        let module = NetworkModule::new(NetworkConfig::default(), Arc::new(NoteStore::new()));
        assert!(Arc::ptr_eq(
            &module.shutdown_controller(),
            &module.shutdown_controller()
        ));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = NetworkModule::new(NetworkConfig::default(), Arc::new(NoteStore::new()));
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let module = NetworkModule::new(NetworkConfig::default(), Arc::new(NoteStore::new()));
        let err = module.serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn note_lifecycle_over_http() {
        let (router, _controller) = ready_router();
        let note = json!({"id": "1", "author": "a", "title": "t", "text": "x"});

        let created = send(&router, Method::POST, "/notes", Some(note.clone())).await;
        assert_eq!(created.status(), StatusCode::OK);
        assert!(created.headers().contains_key("x-request-id"));

        let fetched = send(&router, Method::GET, "/notes/1", None).await;
        assert_eq!(fetched.status(), StatusCode::OK);
        assert_eq!(json_body(fetched).await, json!({ "note": note }));

        let patched = send(&router, Method::PATCH, "/notes/1", Some(json!({"author": "b"}))).await;
        assert_eq!(patched.status(), StatusCode::OK);

        let fetched = json_body(send(&router, Method::GET, "/notes/1", None).await).await;
        assert_eq!(
            fetched,
            json!({"note": {"id": "1", "author": "b", "title": "t", "text": "x"}})
        );

        let deleted = send(&router, Method::DELETE, "/notes/1", None).await;
        assert_eq!(deleted.status(), StatusCode::OK);

        let gone = send(&router, Method::GET, "/notes/1", None).await;
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(gone).await, json!({"error": "not found"}));
    }

    #[tokio::test]
    async fn duplicate_create_is_bad_request() {
        let (router, _controller) = ready_router();
        let note = json!({"id": "1", "author": "a"});
        send(&router, Method::POST, "/notes", Some(note.clone())).await;

        let again = send(&router, Method::POST, "/notes", Some(note)).await;
        assert_eq!(again.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(again).await, json!({"error": "already exists"}));
    }

    #[tokio::test]
    async fn put_with_mismatched_id_is_bad_request() {
        let (router, _controller) = ready_router();
        let response = send(&router, Method::PUT, "/notes/1", Some(json!({"id": "2"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({"error": "inconsistent IDs"}));
    }

    #[tokio::test]
    async fn put_upserts_missing_note() {
        let (router, _controller) = ready_router();
        let response = send(
            &router,
            Method::PUT,
            "/notes/7",
            Some(json!({"id": "7", "title": "fresh"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let fetched = json_body(send(&router, Method::GET, "/notes/7", None).await).await;
        assert_eq!(fetched["note"]["title"], "fresh");
    }

    #[tokio::test]
    async fn patch_and_delete_of_missing_note_are_not_found() {
        let (router, _controller) = ready_router();
        let patched = send(&router, Method::PATCH, "/notes/9", Some(json!({"text": "y"}))).await;
        assert_eq!(patched.status(), StatusCode::NOT_FOUND);
        let deleted = send(&router, Method::DELETE, "/notes/9", None).await;
        assert_eq!(deleted.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_body_is_server_error() {
        let (router, _controller) = ready_router();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/notes")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn request_id_is_propagated_from_caller() {
        let (router, _controller) = ready_router();
        let request = Request::builder()
            .uri("/notes/none")
            .header("x-request-id", "req-42")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[tokio::test]
    async fn draining_refuses_note_requests_but_serves_health() {
        let (router, controller) = ready_router();
        controller.trigger_shutdown();
        assert_eq!(controller.health_state(), HealthState::Draining);

        let refused = send(&router, Method::GET, "/notes/1", None).await;
        assert_eq!(refused.status(), StatusCode::SERVICE_UNAVAILABLE);

        let ready = send(&router, Method::GET, "/health/ready", None).await;
        assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
        let live = send(&router, Method::GET, "/health/live", None).await;
        assert_eq!(live.status(), StatusCode::OK);
    }

    // -- Shutdown over a real socket ----------------------------------------

    fn local_config(drain_timeout: Duration) -> NetworkConfig {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            drain_timeout,
            ..NetworkConfig::default()
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn idle_server_stops_promptly() {
        let mut module =
            NetworkModule::new(local_config(Duration::from_secs(30)), Arc::new(NoteStore::new()));
        let controller = module.shutdown_controller();
        module.start().await.unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async {
            let _ = stopped.await;
        }));
        wait_until(|| controller.health_state() == HealthState::Ready).await;

        stop.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("serve should return")
            .unwrap()
            .unwrap();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn drain_timeout_bounds_a_stuck_request() {
        let drain_timeout = Duration::from_millis(100);
        let mut module =
            NetworkModule::new(local_config(drain_timeout), Arc::new(NoteStore::new()));
        let controller = module.shutdown_controller();
        let port = module.start().await.unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async {
            let _ = stopped.await;
        }));
        wait_until(|| controller.health_state() == HealthState::Ready).await;

        // Headers promise a body that never fully arrives, so the handler
        // stays in flight.
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(
                b"POST /notes HTTP/1.1\r\nhost: localhost\r\n\
                  content-type: application/json\r\ncontent-length: 100\r\n\r\n{\"id\"",
            )
            .await
            .unwrap();
        wait_until(|| controller.in_flight_count() == 1).await;

        let started = Instant::now();
        stop.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("serve should give up after the drain timeout")
            .unwrap()
            .unwrap();
        assert!(started.elapsed() >= drain_timeout);
        assert_eq!(controller.health_state(), HealthState::Draining);
        assert_eq!(controller.in_flight_count(), 1);
        drop(stream);
    }
}
