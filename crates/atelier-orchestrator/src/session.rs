//! Session handle - serialized mutate-then-persist updates
//!
//! Every mutation of a ceremony goes through [`SessionHandle::apply`], which
//! holds the session's mutex across both the mutation and the ledger write.
//! Concurrent applies against one session are therefore totally ordered, and
//! the in-memory state never observably diverges from the ledger. Sessions of
//! different ceremonies share nothing and proceed fully in parallel.

use atelier_core::{CeremonySession, CeremonyStatus, Result};
use atelier_ledger::write_ledger;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to one ceremony session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<CeremonySession>>,
}

impl SessionHandle {
    pub fn new(session: CeremonySession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Apply a mutation and persist the result, all-or-nothing.
    ///
    /// The mutation runs against a draft copy; only after the rendered ledger
    /// has been written in full does the draft replace the in-memory state.
    /// A failed write leaves both the file and the session untouched.
    pub async fn apply<F, T>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut CeremonySession) -> T,
    {
        let mut guard = self.inner.lock().await;
        let mut draft = guard.clone();
        let value = mutate(&mut draft);

        // Ceremony identity is immutable after creation.
        draft.ceremony_id = guard.ceremony_id.clone();
        draft.ledger_path = guard.ledger_path.clone();

        write_ledger(&draft).await?;
        *guard = draft;
        Ok(value)
    }

    /// Clone the current session state
    pub async fn snapshot(&self) -> CeremonySession {
        self.inner.lock().await.clone()
    }

    pub async fn ceremony_id(&self) -> String {
        self.inner.lock().await.ceremony_id.clone()
    }

    pub async fn status(&self) -> CeremonyStatus {
        self.inner.lock().await.status
    }
}
