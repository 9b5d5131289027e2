// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use concerto_events::{ConcertoError, Reply, RequestId, RequestKind};
use std::{
    collections::HashMap,
    sync::RwLock,
};
use tokio::sync::oneshot;

/// Per request kind, the map from an in-flight request id to its reply
/// channel. An entry's lifetime brackets exactly one outstanding
/// request: registered immediately before the request is sent, removed
/// when the one expected reply is consumed (or the wait gives up).
///
/// Scoped to the owning party rather than process-wide so parties can
/// be built and torn down freely in tests.
#[derive(Default)]
pub struct PendingRequests {
    tables: RwLock<HashMap<RequestKind, HashMap<RequestId, oneshot::Sender<Reply>>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reply channel for a request about to be sent.
    pub fn register(&self, kind: RequestKind, id: RequestId) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.tables
            .write()
            .expect("pending table poisoned")
            .entry(kind)
            .or_default()
            .insert(id, tx);
        rx
    }

    /// Deliver a reply to whoever is waiting on its request id. The
    /// entry is removed before the send, so at most one reply ever
    /// reaches a given channel; a second reply for the same id is
    /// reported as `NotFound`.
    pub fn resolve(&self, reply: Reply) -> Result<(), ConcertoError> {
        let sender = self
            .tables
            .write()
            .expect("pending table poisoned")
            .get_mut(&reply.kind)
            .and_then(|table| table.remove(&reply.request_id))
            .ok_or_else(|| {
                ConcertoError::NotFound(format!(
                    "no pending {} request {}",
                    reply.kind, reply.request_id
                ))
            })?;
        // The waiter may have timed out and dropped its receiver.
        let _ = sender.send(reply);
        Ok(())
    }

    /// Drop an entry whose waiter has given up.
    pub fn forget(&self, kind: RequestKind, id: RequestId) {
        if let Some(table) = self
            .tables
            .write()
            .expect("pending table poisoned")
            .get_mut(&kind)
        {
            table.remove(&id);
        }
    }

    /// Number of in-flight requests across all kinds.
    pub fn outstanding(&self) -> usize {
        self.tables
            .read()
            .expect("pending table poisoned")
            .values()
            .map(HashMap::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concerto_events::{ReplyBody, SessionId};

    fn reply(kind: RequestKind, id: RequestId) -> Reply {
        Reply::ok(id, SessionId::new("s1"), kind, ReplyBody::None)
    }

    #[tokio::test]
    async fn delivers_exactly_one_reply_per_request() {
        let pending = PendingRequests::new();
        let id = RequestId::new();
        let rx = pending.register(RequestKind::Sum, id);

        pending.resolve(reply(RequestKind::Sum, id)).unwrap();
        assert!(rx.await.is_ok());

        // The entry is gone: a duplicate reply has nowhere to go.
        assert!(matches!(
            pending.resolve(reply(RequestKind::Sum, id)),
            Err(ConcertoError::NotFound(_))
        ));
        assert_eq!(pending.outstanding(), 0);
    }

    #[tokio::test]
    async fn kinds_do_not_share_tables() {
        let pending = PendingRequests::new();
        let id = RequestId::new();
        let _rx = pending.register(RequestKind::Sum, id);

        assert!(pending.resolve(reply(RequestKind::Multiply, id)).is_err());
        assert_eq!(pending.outstanding(), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_all_resolve_and_table_drains() {
        let pending = std::sync::Arc::new(PendingRequests::new());
        let mut waiters = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..32 {
            let id = RequestId::new();
            ids.push(id);
            waiters.push(pending.register(RequestKind::Refresh, id));
        }
        for id in ids {
            pending.resolve(reply(RequestKind::Refresh, id)).unwrap();
        }
        for rx in waiters {
            assert!(rx.await.is_ok());
        }
        assert_eq!(pending.outstanding(), 0);
    }

    #[test]
    fn forget_clears_abandoned_entries() {
        let pending = PendingRequests::new();
        let id = RequestId::new();
        let _rx = pending.register(RequestKind::Rotate, id);
        pending.forget(RequestKind::Rotate, id);
        assert_eq!(pending.outstanding(), 0);
    }
}
