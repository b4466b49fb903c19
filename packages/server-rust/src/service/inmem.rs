//! `NoteService` backed by the process-local [`NoteStore`].

use std::sync::Arc;

use async_trait::async_trait;
use datasvc_core::{CallContext, EndpointError, Note, NoteService, ServiceError};

use crate::storage::NoteStore;

/// Plain business service: delegates each operation to the store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNoteService {
    store: Arc<NoteStore>,
}

impl InMemoryNoteService {
    #[must_use]
    pub fn new(store: Arc<NoteStore>) -> Self {
        Self { store }
    }

    /// Shared handle to the underlying store.
    #[must_use]
    pub fn store(&self) -> Arc<NoteStore> {
        Arc::clone(&self.store)
    }
}

/// A call whose caller already gave up never touches the store.
fn ensure_live(ctx: &CallContext) -> Result<(), ServiceError> {
    if ctx.is_cancelled() {
        return Err(EndpointError::Canceled.into());
    }
    Ok(())
}

#[async_trait]
impl NoteService for InMemoryNoteService {
    async fn post_note(&self, ctx: &CallContext, note: Note) -> Result<(), ServiceError> {
        ensure_live(ctx)?;
        self.store.create(note)
    }

    async fn get_note(&self, ctx: &CallContext, id: &str) -> Result<Note, ServiceError> {
        ensure_live(ctx)?;
        self.store.read(id)
    }

    async fn put_note(
        &self,
        ctx: &CallContext,
        id: &str,
        note: Note,
    ) -> Result<(), ServiceError> {
        ensure_live(ctx)?;
        self.store.replace(id, note)
    }

    async fn patch_note(
        &self,
        ctx: &CallContext,
        id: &str,
        note: Note,
    ) -> Result<(), ServiceError> {
        ensure_live(ctx)?;
        self.store.partial_update(id, &note)
    }

    async fn delete_note(&self, ctx: &CallContext, id: &str) -> Result<(), ServiceError> {
        ensure_live(ctx)?;
        self.store.delete(id)
    }
}
