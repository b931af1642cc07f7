//! Correlation table for outstanding backend commands.
//!
//! Every correlated command gets a fresh wrapping message id and a
//! deadline. A matching reply completes the entry exactly once; a periodic
//! sweep fails entries whose deadline passed, so a reply that never comes
//! cannot leak its entry forever.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::warn;

use crate::error::LinkError;

type ReplyTx = oneshot::Sender<Result<u8, LinkError>>;

struct Entry {
    tx: ReplyTx,
    deadline: Instant,
}

/// Outstanding command table keyed by message id.
pub(crate) struct PendingReplies {
    deadline: Duration,
    next_id: u8,
    entries: HashMap<u8, Entry>,
}

impl PendingReplies {
    pub(crate) fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    /// Registers a new outstanding command and returns its message id.
    ///
    /// Ids wrap at 255 and skip ids still in flight. In the pathological
    /// case of 255 simultaneous outstanding commands the sender is handed
    /// back so the caller can fail it explicitly.
    pub(crate) fn insert(&mut self, tx: ReplyTx) -> Result<u8, ReplyTx> {
        for _ in 0..=u8::MAX {
            let id = self.next_id;
            // 0 is reserved for uncorrelated records.
            self.next_id = if self.next_id == u8::MAX { 1 } else { self.next_id + 1 };
            if !self.entries.contains_key(&id) {
                self.entries.insert(
                    id,
                    Entry {
                        tx,
                        deadline: Instant::now() + self.deadline,
                    },
                );
                return Ok(id);
            }
        }
        warn!("pending-reply table full");
        Err(tx)
    }

    /// Completes the entry for `msg_id` with the reply status.
    ///
    /// Returns `false` for an unknown id (stale or duplicate reply).
    pub(crate) fn complete(&mut self, msg_id: u8, status: u8) -> bool {
        match self.entries.remove(&msg_id) {
            Some(entry) => {
                // The waiter may have given up; a dead receiver is fine.
                let _ = entry.tx.send(Ok(status));
                true
            }
            None => {
                warn!(msg_id, "reply for unknown or already-completed command");
                false
            }
        }
    }

    /// Fails every entry whose deadline has passed. Returns the expired ids.
    pub(crate) fn sweep(&mut self, now: Instant) -> Vec<u8> {
        let expired: Vec<u8> = self
            .entries
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(entry) = self.entries.remove(id) {
                let _ = entry.tx.send(Err(LinkError::ReplyTimeout { msg_id: *id }));
            }
        }
        expired
    }

    /// Fails every outstanding entry. Used on connection teardown.
    pub(crate) fn fail_all(&mut self, error: &LinkError) {
        for (_, entry) in self.entries.drain() {
            let _ = entry.tx.send(Err(error.clone()));
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PendingReplies {
        PendingReplies::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_ids_are_unique_per_call() {
        let mut pending = table();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        let a = pending.insert(tx1).unwrap();
        let b = pending.insert(tx2).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, 0);
        assert_ne!(b, 0);
    }

    #[tokio::test]
    async fn test_complete_invokes_once_and_removes() {
        let mut pending = table();
        let (tx, rx) = oneshot::channel();
        let id = pending.insert(tx).unwrap();

        assert!(pending.complete(id, 0));
        assert_eq!(rx.await.unwrap().unwrap(), 0);

        // Second reply for the same id is rejected.
        assert!(!pending.complete(id, 0));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_sweep_times_out_expired_entries() {
        let mut pending = PendingReplies::new(Duration::from_millis(0));
        let (tx, rx) = oneshot::channel();
        let id = pending.insert(tx).unwrap();

        let expired = pending.sweep(Instant::now() + Duration::from_millis(1));
        assert_eq!(expired, vec![id]);
        assert!(matches!(
            rx.await.unwrap().unwrap_err(),
            LinkError::ReplyTimeout { .. }
        ));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_entries() {
        let mut pending = table();
        let (tx, _rx) = oneshot::channel();
        pending.insert(tx).unwrap();

        assert!(pending.sweep(Instant::now()).is_empty());
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_all_on_teardown() {
        let mut pending = table();
        let (tx, rx) = oneshot::channel();
        pending.insert(tx).unwrap();

        pending.fail_all(&LinkError::connection_lost("backend hang-up"));
        assert!(matches!(
            rx.await.unwrap().unwrap_err(),
            LinkError::ConnectionLost { .. }
        ));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn test_full_table_hands_sender_back() {
        let mut pending = table();
        let mut receivers = Vec::new();
        for _ in 0..255 {
            let (tx, rx) = oneshot::channel();
            pending.insert(tx).unwrap();
            receivers.push(rx);
        }
        assert_eq!(pending.len(), 255);

        // The 256th caller gets its sender back and can fail it explicitly.
        let (tx, rx) = oneshot::channel();
        let tx = pending.insert(tx).unwrap_err();
        let _ = tx.send(Err(LinkError::protocol("correlation table full")));
        assert!(matches!(
            rx.await.unwrap().unwrap_err(),
            LinkError::Protocol { .. }
        ));
    }

    #[tokio::test]
    async fn test_id_wraps_without_reusing_outstanding() {
        let mut pending = table();
        let mut receivers = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..300 {
            let (tx, rx) = oneshot::channel();
            let id = pending.insert(tx).unwrap();
            assert_ne!(id, 0);
            seen.insert(id);
            pending.complete(id, 0);
            receivers.push(rx);
        }
        // Wrapped past 255 without ever handing out 0.
        assert!(seen.len() <= 255);
    }
}
