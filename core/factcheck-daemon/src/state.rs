//! In-memory check state owned by the daemon.
//!
//! One `PersistedState` is shared by all connections. Every transition is
//! written through to SQLite and then pushed to subscribers while the lock is
//! held, so subscribers see frames in the order the state changed.

use chrono::Utc;
use factcheck_protocol::{
    CheckError, CheckResult, CheckStatus, ErrorKind, PersistedState, SelectionRequest, Theme,
};
use std::os::unix::net::UnixStream;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::broadcast::Subscribers;
use crate::db::Db;

pub const INTERRUPTED_MESSAGE: &str = "Check interrupted by daemon restart";

pub struct SharedState {
    db: Db,
    current: Mutex<PersistedState>,
    subscribers: Subscribers,
}

impl SharedState {
    pub fn new(db: Db) -> Self {
        let mut current = match db.load_state() {
            Ok(Some(state)) => state,
            Ok(None) => PersistedState::default(),
            Err(err) => {
                tracing::warn!(error = %err, "Failed to load stored state; starting idle");
                PersistedState::default()
            }
        };

        if current.status == CheckStatus::Analyzing {
            tracing::warn!(
                request_id = current.request_id,
                "Found check left running by a previous daemon"
            );
            current.fail(CheckError::service(None, INTERRUPTED_MESSAGE));
            if let Err(err) = db.save_state(&current) {
                tracing::warn!(error = %err, "Failed to persist interrupted check");
            }
        }

        tracing::info!(
            request_id = current.request_id,
            status = current.status.as_str(),
            "Check state loaded"
        );

        Self {
            db,
            current: Mutex::new(current),
            subscribers: Subscribers::default(),
        }
    }

    pub fn snapshot(&self) -> PersistedState {
        self.lock().clone()
    }

    pub fn selected_text(&self) -> Option<String> {
        self.lock().selected_text.clone()
    }

    /// Moves to `analyzing` under a fresh request id and announces it.
    pub fn begin_request(&self, request: &SelectionRequest) -> u64 {
        let mut current = self.lock();
        let request_id = current.request_id + 1;
        let next = current.analyzing(request_id, &request.text, request.requested_at);
        *current = next;
        tracing::info!(
            request_id,
            chars = request.text.chars().count(),
            "Check started"
        );
        self.persist_and_announce(&current);
        request_id
    }

    /// Applies the outcome of `request_id` if it is still the latest request.
    /// Returns false when a newer request has superseded it.
    pub fn finish_request(
        &self,
        request_id: u64,
        outcome: Result<CheckResult, CheckError>,
    ) -> bool {
        let mut current = self.lock();
        if current.request_id != request_id {
            tracing::info!(
                request_id,
                latest = current.request_id,
                "Dropping outcome of superseded check"
            );
            return false;
        }

        match outcome {
            Ok(result) => {
                tracing::info!(
                    request_id,
                    truth_percentage = result.truth_percentage,
                    sources = result.sources.len(),
                    "Check completed"
                );
                current.complete(result, Utc::now());
            }
            Err(error) => {
                tracing::warn!(
                    request_id,
                    code = error.kind.code(),
                    status = ?error.status,
                    message = %error.message,
                    "Check failed"
                );
                current.fail(error);
            }
        }
        self.persist_and_announce(&current);
        true
    }

    pub fn set_theme(&self, theme: Theme) -> PersistedState {
        let mut current = self.lock();
        current.theme = theme;
        self.persist(&current);
        current.clone()
    }

    pub fn subscribe(&self, stream: UnixStream) {
        self.subscribers.add(stream);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn persist_and_announce(&self, state: &PersistedState) {
        self.persist(state);
        if let Some(push) = state.to_push() {
            self.subscribers.broadcast(&push);
        }
    }

    fn persist(&self, state: &PersistedState) {
        if let Err(err) = self.db.save_state(state) {
            tracing::warn!(
                code = ErrorKind::Storage.code(),
                request_id = state.request_id,
                error = %err,
                "Failed to persist check state"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, PersistedState> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
