use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

use gembot_core::types::{SessionKey, Turn};

use crate::error::{Result, SessionError};

type TurnLog = Arc<Mutex<Vec<Turn>>>;

/// In-memory conversation store, one ordered turn log per [`SessionKey`].
///
/// Every key owns its own async mutex. A request that must read history,
/// call the model and record both turns holds [`SessionGuard`] for the whole
/// sequence, so concurrent requests on the same key never interleave.
/// Requests on different keys proceed independently.
///
/// Nothing is persisted; all conversations are lost on restart.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionKey, TurnLog>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or lazily create) the turn log for `key`.
    ///
    /// The map shard lock is released before the caller awaits the log mutex.
    fn log(&self, key: &SessionKey) -> TurnLog {
        Arc::clone(self.sessions.entry(key.clone()).or_default().value())
    }

    /// Enter the critical section for `key`.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn lock(&self, key: &SessionKey) -> SessionGuard {
        let turns = self.log(key).lock_owned().await;
        debug!(turns = turns.len(), "session locked");
        SessionGuard {
            key: key.clone(),
            turns,
            appended: 0,
        }
    }

    /// Append a single turn, waiting for any in-flight request on `key`.
    pub async fn append(&self, key: &SessionKey, turn: Turn) {
        self.lock(key).await.append(turn);
    }

    /// Discard every turn of `key`. Returns how many were removed.
    ///
    /// Waits for an in-flight request to finish so a request is never cut in half.
    /// The emptied entry is dropped unless another request is already waiting on it.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn reset(&self, key: &SessionKey) -> usize {
        let removed = {
            let mut guard = self.lock(key).await;
            let removed = guard.turns.len();
            guard.turns.clear();
            removed
        };
        // Only the map holds an idle log; waiters keep a clone of the Arc.
        let dropped = self
            .sessions
            .remove_if(key, |_, log| {
                Arc::strong_count(log) == 1
                    && log.try_lock().map(|turns| turns.is_empty()).unwrap_or(false)
            })
            .is_some();
        debug!(removed, dropped, "session reset");
        removed
    }

    /// Point-in-time copy of the turns of `key`, in conversation order.
    ///
    /// Unknown keys yield an empty history without creating an entry.
    pub async fn snapshot(&self, key: &SessionKey) -> Vec<Turn> {
        let Some(log) = self.sessions.get(key).map(|entry| Arc::clone(entry.value())) else {
            return Vec::new();
        };
        let turns = log.lock().await;
        turns.clone()
    }

    /// Number of sessions that currently hold at least one turn.
    ///
    /// Sessions locked by an in-flight request count as active.
    pub fn active_sessions(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .try_lock()
                    .map(|turns| !turns.is_empty())
                    .unwrap_or(true)
            })
            .count()
    }

    /// Number of keys currently tracked, including idle empty ones.
    pub fn tracked_keys(&self) -> usize {
        self.sessions.len()
    }
}

/// Exclusive access to one session for the duration of a logical request.
///
/// Dropping the guard releases the session.
pub struct SessionGuard {
    key: SessionKey,
    turns: OwnedMutexGuard<Vec<Turn>>,
    appended: usize,
}

impl SessionGuard {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Turns recorded so far, including ones appended through this guard.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.appended += 1;
    }

    /// Remove the most recent turn appended through this guard.
    ///
    /// Turns recorded by earlier requests cannot be retracted.
    pub fn retract_last(&mut self) -> Result<Turn> {
        if self.appended == 0 {
            return Err(SessionError::NothingToRetract {
                key: self.key.to_string(),
            });
        }
        self.appended -= 1;
        self.turns
            .pop()
            .ok_or_else(|| SessionError::NothingToRetract {
                key: self.key.to_string(),
            })
    }
}
