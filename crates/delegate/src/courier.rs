// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use concerto_events::{
    CiphertextId, ComputeRequest, ConcertoError, Envelope, PartyId, Reply, ReplyBody, RequestId,
    RequestKind, SessionId,
};
use concerto_fhe::Ciphertext;
use concerto_net::NetCommand;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::debug;

use crate::PendingRequests;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one request to one party and awaits the one correlated reply.
///
/// Every remote wait is wrapped in the same fixed timeout; expiry is
/// terminal for the request and surfaces as `DelegationFailed`. There
/// is no retry anywhere in the fabric.
#[derive(Clone)]
pub struct Courier {
    me: PartyId,
    cmds: mpsc::Sender<NetCommand>,
    pending: Arc<PendingRequests>,
    timeout: Duration,
}

impl Courier {
    pub fn new(
        me: PartyId,
        cmds: mpsc::Sender<NetCommand>,
        pending: Arc<PendingRequests>,
        timeout: Duration,
    ) -> Self {
        Self {
            me,
            cmds,
            pending,
            timeout,
        }
    }

    pub fn me(&self) -> &PartyId {
        &self.me
    }

    pub fn pending(&self) -> &Arc<PendingRequests> {
        &self.pending
    }

    /// Register, send, block on the reply channel, deregister. A reply
    /// with `valid == false` becomes `DelegationFailed`.
    pub async fn exchange(
        &self,
        target: &PartyId,
        request: ComputeRequest,
    ) -> Result<Reply, ConcertoError> {
        let kind = request.kind();
        let request_id = request.request_id();
        let rx = self.pending.register(kind, request_id);
        debug!(me = %self.me, to = %target, %kind, request = %request_id, "Delegating request");

        let sent = self
            .cmds
            .send(NetCommand::Send {
                to: target.clone(),
                envelope: Envelope::Request(request),
            })
            .await;
        if sent.is_err() {
            self.pending.forget(kind, request_id);
            return Err(ConcertoError::delegation_failed(kind, "transport closed"));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Err(_) => {
                self.pending.forget(kind, request_id);
                Err(ConcertoError::delegation_failed(
                    kind,
                    format!("no reply from {target} within {:?}", self.timeout),
                ))
            }
            Ok(Err(_)) => Err(ConcertoError::delegation_failed(
                kind,
                "reply channel dropped",
            )),
            Ok(Ok(reply)) if reply.valid => Ok(reply),
            Ok(Ok(_)) => Err(ConcertoError::delegation_failed(
                kind,
                format!("{target} refused the operation"),
            )),
        }
    }

    /// Retrieve a ciphertext value from its owner. Only the owner may
    /// answer, so the request always goes to `id.owner()`.
    pub async fn fetch_ciphertext(
        &self,
        session_id: &SessionId,
        id: &CiphertextId,
    ) -> Result<Ciphertext, ConcertoError> {
        let owner = id.owner().clone();
        let reply = self
            .exchange(
                &owner,
                ComputeRequest::FetchCiphertext {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    operand: id.clone(),
                },
            )
            .await?;
        let ReplyBody::Value(bytes) = reply.body else {
            return Err(ConcertoError::delegation_failed(
                RequestKind::FetchCiphertext,
                "malformed reply body",
            ));
        };
        bincode::deserialize(&bytes).map_err(|e| {
            ConcertoError::delegation_failed(
                RequestKind::FetchCiphertext,
                format!("undecodable ciphertext: {e}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(i: usize) -> PartyId {
        PartyId::new(format!("party{i}"), vec![i as u8])
    }

    fn request() -> ComputeRequest {
        ComputeRequest::ResolveName {
            request_id: RequestId::new(),
            session_id: SessionId::new("s1"),
            name: "a".into(),
        }
    }

    fn courier(timeout: Duration) -> (Courier, mpsc::Receiver<NetCommand>) {
        let (cmds, wire) = mpsc::channel(8);
        let courier = Courier::new(party(0), cmds, Arc::new(PendingRequests::new()), timeout);
        (courier, wire)
    }

    #[tokio::test]
    async fn exchange_returns_the_correlated_reply() {
        let (courier, mut wire) = courier(Duration::from_secs(5));
        let pending = Arc::clone(courier.pending());

        tokio::spawn(async move {
            let Some(NetCommand::Send {
                envelope: Envelope::Request(req),
                ..
            }) = wire.recv().await
            else {
                panic!("expected an outbound request");
            };
            let reply = Reply::ok(
                req.request_id(),
                req.session_id().clone(),
                req.kind(),
                ReplyBody::None,
            );
            pending.resolve(reply).unwrap();
        });

        let request = request();
        let expected_id = request.request_id();
        let reply = courier.exchange(&party(1), request).await.unwrap();
        assert_eq!(reply.request_id, expected_id);
        assert!(reply.valid);
    }

    #[tokio::test]
    async fn silence_expires_into_delegation_failed() {
        let (courier, _wire) = courier(Duration::from_millis(20));
        let err = courier.exchange(&party(1), request()).await.unwrap_err();
        assert!(matches!(err, ConcertoError::DelegationFailed { .. }));
        // Expiry deregisters: a straggler reply finds no waiter.
        assert_eq!(courier.pending().outstanding(), 0);
    }

    #[tokio::test]
    async fn negative_reply_is_delegation_failed() {
        let (courier, mut wire) = courier(Duration::from_secs(5));
        let pending = Arc::clone(courier.pending());

        tokio::spawn(async move {
            let Some(NetCommand::Send {
                envelope: Envelope::Request(req),
                ..
            }) = wire.recv().await
            else {
                panic!("expected an outbound request");
            };
            pending
                .resolve(Reply::refused(
                    req.request_id(),
                    req.session_id().clone(),
                    req.kind(),
                ))
                .unwrap();
        });

        let err = courier.exchange(&party(1), request()).await.unwrap_err();
        assert!(matches!(err, ConcertoError::DelegationFailed { .. }));
    }
}
