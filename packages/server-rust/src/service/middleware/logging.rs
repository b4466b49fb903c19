//! Logging middleware for `NoteService`.
//!
//! Records method, note id, duration and outcome for every call via
//! `tracing`, plus a request counter and a latency histogram through the
//! `metrics` facade. The record is emitted from a drop guard, so a call that
//! is abandoned (future dropped) or panics is still logged.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use datasvc_core::{CallContext, Note, NoteService, ServiceError};
use tower::Layer;

// ---------------------------------------------------------------------------
// LoggingLayer
// ---------------------------------------------------------------------------

/// Tower layer producing [`LoggingMiddleware`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer;

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingMiddleware { next: inner }
    }
}

// ---------------------------------------------------------------------------
// LoggingMiddleware
// ---------------------------------------------------------------------------

/// Decorates a `NoteService` without altering results.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware<S> {
    next: S,
}

impl<S> LoggingMiddleware<S> {
    #[must_use]
    pub fn new(next: S) -> Self {
        Self { next }
    }

    #[must_use]
    pub fn inner(&self) -> &S {
        &self.next
    }
}

#[derive(Debug)]
enum Outcome {
    Pending,
    Ok,
    Err(ServiceError),
}

/// Drop guard carrying one call's log record.
struct CallLog {
    method: &'static str,
    id: String,
    request_id: Option<String>,
    begin: Instant,
    outcome: Outcome,
}

impl CallLog {
    fn start(method: &'static str, id: &str, ctx: &CallContext) -> Self {
        Self {
            method,
            id: id.to_string(),
            request_id: ctx.request_id.clone(),
            begin: Instant::now(),
            outcome: Outcome::Pending,
        }
    }

    fn record<T>(&mut self, result: &Result<T, ServiceError>) {
        self.outcome = match result {
            Ok(_) => Outcome::Ok,
            Err(err) => Outcome::Err(err.clone()),
        };
    }
}

impl Drop for CallLog {
    fn drop(&mut self) {
        let took = self.begin.elapsed();
        #[allow(clippy::cast_possible_truncation)]
        let took_us = took.as_micros() as u64;
        let request_id = self.request_id.as_deref().unwrap_or("-");

        let label = match &self.outcome {
            Outcome::Ok => {
                tracing::info!(
                    method = self.method,
                    id = %self.id,
                    request_id,
                    took_us,
                    "call complete"
                );
                "ok"
            }
            Outcome::Err(ServiceError::BadRouting) => {
                tracing::warn!(
                    method = self.method,
                    id = %self.id,
                    request_id,
                    took_us,
                    err = %ServiceError::BadRouting,
                    "routing anomaly"
                );
                "error"
            }
            Outcome::Err(err) => {
                tracing::info!(
                    method = self.method,
                    id = %self.id,
                    request_id,
                    took_us,
                    err = %err,
                    "call complete"
                );
                if err.is_business() {
                    "rejected"
                } else {
                    "error"
                }
            }
            Outcome::Pending => {
                tracing::warn!(
                    method = self.method,
                    id = %self.id,
                    request_id,
                    took_us,
                    "call abandoned before completion"
                );
                "abandoned"
            }
        };

        record_metrics(self.method, label, took);
    }
}

fn record_metrics(method: &'static str, outcome: &'static str, took: Duration) {
    metrics::counter!("datasvc_requests_total", "method" => method, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("datasvc_request_duration_seconds", "method" => method)
        .record(took.as_secs_f64());
}

#[async_trait]
impl<S: NoteService> NoteService for LoggingMiddleware<S> {
    async fn post_note(&self, ctx: &CallContext, note: Note) -> Result<(), ServiceError> {
        let mut log = CallLog::start("PostNote", &note.id, ctx);
        let result = self.next.post_note(ctx, note).await;
        log.record(&result);
        result
    }

    async fn get_note(&self, ctx: &CallContext, id: &str) -> Result<Note, ServiceError> {
        let mut log = CallLog::start("GetNote", id, ctx);
        let result = self.next.get_note(ctx, id).await;
        log.record(&result);
        result
    }

    async fn put_note(
        &self,
        ctx: &CallContext,
        id: &str,
        note: Note,
    ) -> Result<(), ServiceError> {
        let mut log = CallLog::start("PutNote", id, ctx);
        let result = self.next.put_note(ctx, id, note).await;
        log.record(&result);
        result
    }

    async fn patch_note(
        &self,
        ctx: &CallContext,
        id: &str,
        note: Note,
    ) -> Result<(), ServiceError> {
        let mut log = CallLog::start("PatchNote", id, ctx);
        let result = self.next.patch_note(ctx, id, note).await;
        log.record(&result);
        result
    }

    async fn delete_note(&self, ctx: &CallContext, id: &str) -> Result<(), ServiceError> {
        let mut log = CallLog::start("DeleteNote", id, ctx);
        let result = self.next.delete_note(ctx, id).await;
        log.record(&result);
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
