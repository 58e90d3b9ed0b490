//! In-flight request table.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use {moltis_protocol::ResponseFrame, tokio::sync::oneshot};

/// Requests awaiting a `res` frame, keyed by request id.
///
/// Each entry owns the sender half of a oneshot. Dropping the sender (on
/// [`fail_all`](Self::fail_all)) wakes the waiting caller with a receive
/// error, which the client reports as a closed connection.
#[derive(Default, Clone)]
pub(crate) struct PendingRequests {
    inner: Arc<Mutex<HashMap<String, oneshot::Sender<ResponseFrame>>>>,
}

impl PendingRequests {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<ResponseFrame>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `id`. The entry is removed when the returned guard drops,
    /// so a timed-out or cancelled caller never leaves a stale entry behind.
    pub(crate) fn register(&self, id: &str) -> (PendingGuard, oneshot::Receiver<ResponseFrame>) {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id.to_string(), tx);
        (
            PendingGuard {
                id: id.to_string(),
                pending: self.clone(),
            },
            rx,
        )
    }

    /// Deliver a response to its waiter. Returns `false` for unknown ids.
    pub(crate) fn complete(&self, response: ResponseFrame) -> bool {
        let Some(tx) = self.lock().remove(&response.id) else {
            return false;
        };
        // The receiver may already be gone if the caller was cancelled.
        let _ = tx.send(response);
        true
    }

    /// Reject every in-flight request. Returns how many were pending.
    pub(crate) fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        drained.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn remove(&self, id: &str) {
        self.lock().remove(id);
    }
}

pub(crate) struct PendingGuard {
    id: String,
    pending: PendingRequests,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
