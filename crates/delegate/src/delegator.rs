// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use concerto_events::{
    CiphertextId, ComputeRequest, ConcertoError, PartyId, Reply, ReplyBody, RequestId, RequestKind,
    Rotation, SessionId, SharesId,
};
use concerto_session::SessionStore;
use std::sync::Arc;

use crate::{Courier, Handler};

/// Client side of the delegation layer: routes each operation to the
/// party that owns the data and awaits the correlated reply.
///
/// Routing is deterministic so both parties agree where computation
/// happens: binary operations go to the owner of the *second* operand
/// (an arbitrary but fixed tie-break), unary operations to the sole
/// operand's owner, and shares-to-encryption to a roster member chosen
/// at random since a shared value has no single owner.
#[derive(Clone)]
pub struct Delegator {
    courier: Courier,
    handler: Arc<Handler>,
    sessions: Arc<SessionStore>,
}

impl Delegator {
    pub fn new(courier: Courier, handler: Arc<Handler>, sessions: Arc<SessionStore>) -> Self {
        Self {
            courier,
            handler,
            sessions,
        }
    }

    pub fn me(&self) -> &PartyId {
        self.courier.me()
    }

    /// Route a request; when this party is the target there is no
    /// self-network-hop, the local handler runs directly.
    async fn dispatch(
        &self,
        target: &PartyId,
        request: ComputeRequest,
    ) -> Result<Reply, ConcertoError> {
        if target == self.courier.me() {
            let kind = request.kind();
            let reply = self.handler.handle(self.courier.me().clone(), request).await;
            if reply.valid {
                Ok(reply)
            } else {
                Err(ConcertoError::delegation_failed(
                    kind,
                    "local handler refused the operation",
                ))
            }
        } else {
            self.courier.exchange(target, request).await
        }
    }

    pub async fn sum(
        &self,
        session_id: &SessionId,
        lhs: CiphertextId,
        rhs: CiphertextId,
    ) -> Result<CiphertextId, ConcertoError> {
        check_operand(&lhs)?;
        check_operand(&rhs)?;
        let target = rhs.owner().clone();
        let reply = self
            .dispatch(
                &target,
                ComputeRequest::Sum {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    lhs,
                    rhs,
                },
            )
            .await?;
        expect_ciphertext(reply)
    }

    pub async fn multiply(
        &self,
        session_id: &SessionId,
        lhs: CiphertextId,
        rhs: CiphertextId,
    ) -> Result<CiphertextId, ConcertoError> {
        check_operand(&lhs)?;
        check_operand(&rhs)?;
        let target = rhs.owner().clone();
        let reply = self
            .dispatch(
                &target,
                ComputeRequest::Multiply {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    lhs,
                    rhs,
                },
            )
            .await?;
        expect_ciphertext(reply)
    }

    pub async fn relinearize(
        &self,
        session_id: &SessionId,
        operand: CiphertextId,
    ) -> Result<CiphertextId, ConcertoError> {
        check_operand(&operand)?;
        let target = operand.owner().clone();
        let reply = self
            .dispatch(
                &target,
                ComputeRequest::Relinearize {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    operand,
                },
            )
            .await?;
        expect_ciphertext(reply)
    }

    pub async fn rotate(
        &self,
        session_id: &SessionId,
        operand: CiphertextId,
        rotation: Rotation,
    ) -> Result<CiphertextId, ConcertoError> {
        check_operand(&operand)?;
        let target = operand.owner().clone();
        let reply = self
            .dispatch(
                &target,
                ComputeRequest::Rotate {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    operand,
                    rotation,
                },
            )
            .await?;
        expect_ciphertext(reply)
    }

    pub async fn refresh(
        &self,
        session_id: &SessionId,
        operand: CiphertextId,
    ) -> Result<CiphertextId, ConcertoError> {
        check_operand(&operand)?;
        let target = operand.owner().clone();
        let reply = self
            .dispatch(
                &target,
                ComputeRequest::Refresh {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    operand,
                },
            )
            .await?;
        expect_ciphertext(reply)
    }

    pub async fn public_key_switch(
        &self,
        session_id: &SessionId,
        operand: CiphertextId,
        target_key: Vec<u8>,
    ) -> Result<CiphertextId, ConcertoError> {
        check_operand(&operand)?;
        let target = operand.owner().clone();
        let reply = self
            .dispatch(
                &target,
                ComputeRequest::Switch {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    operand,
                    target_key,
                },
            )
            .await?;
        expect_ciphertext(reply)
    }

    pub async fn encryption_to_shares(
        &self,
        session_id: &SessionId,
        operand: CiphertextId,
    ) -> Result<SharesId, ConcertoError> {
        check_operand(&operand)?;
        let target = operand.owner().clone();
        let reply = self
            .dispatch(
                &target,
                ComputeRequest::EncryptionToShares {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    operand,
                },
            )
            .await?;
        match reply.body {
            ReplyBody::Shares(id) => Ok(id),
            _ => Err(ConcertoError::delegation_failed(
                RequestKind::EncryptionToShares,
                "malformed reply body",
            )),
        }
    }

    pub async fn shares_to_encryption(
        &self,
        session_id: &SessionId,
        operand: SharesId,
    ) -> Result<CiphertextId, ConcertoError> {
        let target = self.sessions.get(session_id)?.random_member();
        let reply = self
            .dispatch(
                &target,
                ComputeRequest::SharesToEncryption {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    operand,
                },
            )
            .await?;
        expect_ciphertext(reply)
    }

    /// Ask `owner` which ciphertext id a variable name is bound to.
    pub async fn resolve_name(
        &self,
        session_id: &SessionId,
        owner: &PartyId,
        name: &str,
    ) -> Result<CiphertextId, ConcertoError> {
        let reply = self
            .dispatch(
                owner,
                ComputeRequest::ResolveName {
                    request_id: RequestId::new(),
                    session_id: session_id.clone(),
                    name: name.to_string(),
                },
            )
            .await?;
        expect_ciphertext(reply)
    }
}

fn check_operand(id: &CiphertextId) -> Result<(), ConcertoError> {
    if id.is_nil() {
        Err(ConcertoError::InvalidOperand("nil ciphertext id".into()))
    } else {
        Ok(())
    }
}

fn expect_ciphertext(reply: Reply) -> Result<CiphertextId, ConcertoError> {
    match reply.body {
        ReplyBody::Ciphertext(id) => Ok(id),
        _ => Err(ConcertoError::delegation_failed(
            reply.kind,
            "malformed reply body",
        )),
    }
}
