//! In-memory note store guarded by a single reader-writer lock.
//!
//! Writers (`create`, `replace`, `partial_update`, `delete`) take the lock
//! exclusively; `read` takes it shared. Guards are scoped, so the lock is
//! released on every exit path.

use std::collections::HashMap;

use datasvc_core::{Note, ServiceError};
use parking_lot::RwLock;

/// Concurrent `id -> Note` mapping enforcing the CRUD invariants.
#[derive(Debug, Default)]
pub struct NoteStore {
    notes: RwLock<HashMap<String, Note>>,
}

impl NoteStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new note.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if a note with the same id is present.
    pub fn create(&self, note: Note) -> Result<(), ServiceError> {
        let mut notes = self.notes.write();
        if notes.contains_key(&note.id) {
            return Err(ServiceError::AlreadyExists);
        }
        notes.insert(note.id.clone(), note);
        Ok(())
    }

    /// Returns a copy of the note.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub fn read(&self, id: &str) -> Result<Note, ServiceError> {
        self.notes
            .read()
            .get(id)
            .cloned()
            .ok_or(ServiceError::NotFound)
    }

    /// Inserts or overwrites unconditionally.
    ///
    /// # Errors
    ///
    /// `InconsistentIds` if `note.id != id`.
    pub fn replace(&self, id: &str, note: Note) -> Result<(), ServiceError> {
        if note.id != id {
            return Err(ServiceError::InconsistentIds);
        }
        self.notes.write().insert(id.to_string(), note);
        Ok(())
    }

    /// Merges the non-empty fields of `patch` into the existing note.
    ///
    /// # Errors
    ///
    /// `InconsistentIds` if `patch.id` is set and differs from `id`;
    /// `NotFound` if there is nothing to patch.
    pub fn partial_update(&self, id: &str, patch: &Note) -> Result<(), ServiceError> {
        if !patch.id.is_empty() && patch.id != id {
            return Err(ServiceError::InconsistentIds);
        }
        let mut notes = self.notes.write();
        let existing = notes.get_mut(id).ok_or(ServiceError::NotFound)?;
        existing.apply_patch(patch);
        Ok(())
    }

    /// Removes a note.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent.
    pub fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.notes
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or(ServiceError::NotFound)
    }

    /// Number of stored notes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.notes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.read().is_empty()
    }
}
