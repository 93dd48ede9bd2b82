//! In-memory storage backend.
//!
//! Thread-safe in-memory implementation of [`SessionStore`], intended for
//! embedded usage, tests, and as a reference implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::concept::QuestionId;
use crate::mastery::ConceptMasteryState;
use crate::session::{AnswerRecord, SessionId};
use crate::storage::traits::{SessionSnapshot, SessionStore, StoreError};

fn lock_err(context: &'static str) -> StoreError {
    StoreError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug)]
struct SessionRecord {
    snapshot: SessionSnapshot,
    updated_at: DateTime<Utc>,
}

impl SessionRecord {
    fn new() -> Self {
        Self {
            snapshot: SessionSnapshot::default(),
            updated_at: Utc::now(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Thread-safe in-memory session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    state: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl InMemorySessionStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last write time of a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` or a poisoned-lock backend error.
    pub fn updated_at(&self, id: SessionId) -> Result<DateTime<Utc>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("session.updated_at"))?;
        state
            .get(&id)
            .map(|r| r.updated_at)
            .ok_or(StoreError::SessionNotFound(id))
    }

    fn with_record<T>(
        &self,
        id: SessionId,
        context: &'static str,
        f: impl FnOnce(&mut SessionRecord) -> T,
    ) -> Result<T, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err(context))?;
        let record = state.get_mut(&id).ok_or(StoreError::SessionNotFound(id))?;
        let out = f(record);
        record.touch();
        Ok(out)
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self, id: SessionId) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("session.create"))?;
        if state.contains_key(&id) {
            return Err(StoreError::DuplicateSession(id));
        }
        state.insert(id, SessionRecord::new());
        Ok(())
    }

    fn exists(&self, id: SessionId) -> Result<bool, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("session.exists"))?;
        Ok(state.contains_key(&id))
    }

    fn delete(&self, id: SessionId) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("session.delete"))?;
        state
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::SessionNotFound(id))
    }

    fn load(&self, id: SessionId) -> Result<SessionSnapshot, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("session.load"))?;
        state
            .get(&id)
            .map(|r| r.snapshot.clone())
            .ok_or(StoreError::SessionNotFound(id))
    }

    fn get_mastery(&self, id: SessionId) -> Result<Vec<ConceptMasteryState>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("session.get_mastery"))?;
        state
            .get(&id)
            .map(|r| r.snapshot.mastery.clone())
            .ok_or(StoreError::SessionNotFound(id))
    }

    fn set_mastery(&self, id: SessionId, mastery: Vec<ConceptMasteryState>) -> Result<(), StoreError> {
        self.with_record(id, "session.set_mastery", |r| r.snapshot.mastery = mastery)
    }

    fn answered_question_ids(&self, id: SessionId) -> Result<Vec<QuestionId>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("session.answered_question_ids"))?;
        state
            .get(&id)
            .map(|r| {
                r.snapshot
                    .answers
                    .iter()
                    .map(|a| a.response.question.clone())
                    .collect()
            })
            .ok_or(StoreError::SessionNotFound(id))
    }

    fn record_answer(
        &self,
        id: SessionId,
        answer: AnswerRecord,
        mastery: Vec<ConceptMasteryState>,
    ) -> Result<(), StoreError> {
        self.with_record(id, "session.record_answer", |r| {
            r.snapshot.answers.push(answer);
            r.snapshot.mastery = mastery;
        })
    }

    fn reset(&self, id: SessionId) -> Result<(), StoreError> {
        self.with_record(id, "session.reset", |r| r.snapshot = SessionSnapshot::default())
    }

    fn session_ids(&self) -> Result<Vec<SessionId>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("session.session_ids"))?;
        let mut ids: Vec<SessionId> = state.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
