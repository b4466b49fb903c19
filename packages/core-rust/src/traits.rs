use std::sync::Arc;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::ServiceError;
use crate::note::Note;

/// CRUD contract for notes.
///
/// Implemented by the in-memory service, by decorators such as the logging
/// middleware, and by remote dispatchers (`Endpoints`, the discovery client).
#[async_trait]
pub trait NoteService: Send + Sync {
    /// Creates a note. Fails with `AlreadyExists` if the id is taken.
    async fn post_note(&self, ctx: &CallContext, note: Note) -> Result<(), ServiceError>;

    /// Reads a note by id. Fails with `NotFound`.
    async fn get_note(&self, ctx: &CallContext, id: &str) -> Result<Note, ServiceError>;

    /// Creates or overwrites a note. Fails with `InconsistentIds` when
    /// `note.id != id`.
    async fn put_note(&self, ctx: &CallContext, id: &str, note: Note)
        -> Result<(), ServiceError>;

    /// Merges the non-empty fields of `note` into an existing note.
    async fn patch_note(
        &self,
        ctx: &CallContext,
        id: &str,
        note: Note,
    ) -> Result<(), ServiceError>;

    /// Removes a note. Fails with `NotFound`.
    async fn delete_note(&self, ctx: &CallContext, id: &str) -> Result<(), ServiceError>;
}

#[async_trait]
impl<T: NoteService + ?Sized> NoteService for Arc<T> {
    async fn post_note(&self, ctx: &CallContext, note: Note) -> Result<(), ServiceError> {
        (**self).post_note(ctx, note).await
    }

    async fn get_note(&self, ctx: &CallContext, id: &str) -> Result<Note, ServiceError> {
        (**self).get_note(ctx, id).await
    }

    async fn put_note(
        &self,
        ctx: &CallContext,
        id: &str,
        note: Note,
    ) -> Result<(), ServiceError> {
        (**self).put_note(ctx, id, note).await
    }

    async fn patch_note(
        &self,
        ctx: &CallContext,
        id: &str,
        note: Note,
    ) -> Result<(), ServiceError> {
        (**self).patch_note(ctx, id, note).await
    }

    async fn delete_note(&self, ctx: &CallContext, id: &str) -> Result<(), ServiceError> {
        (**self).delete_note(ctx, id).await
    }
}
