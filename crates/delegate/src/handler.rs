// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use concerto_aggregate::AggEngine;
use concerto_events::{
    CiphertextId, ComputeRequest, ConcertoError, PartyId, Reply, ReplyBody, SharesId,
};
use concerto_fhe::{
    normalize_rotation, Ciphertext, HomomorphicSuite, ProtocolOutput, ProtocolParams,
    RELINEARIZABLE_DEGREE,
};
use concerto_session::{Session, SessionStore};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Courier;

/// Owner-side execution of delegated operations. Every feasibility
/// check failure becomes a negative reply (`valid = false`), never a
/// torn connection; the requester observes `DelegationFailed`.
pub struct Handler {
    me: PartyId,
    sessions: Arc<SessionStore>,
    suite: Arc<dyn HomomorphicSuite>,
    engine: Arc<AggEngine>,
    courier: Courier,
}

impl Handler {
    pub fn new(
        me: PartyId,
        sessions: Arc<SessionStore>,
        suite: Arc<dyn HomomorphicSuite>,
        engine: Arc<AggEngine>,
        courier: Courier,
    ) -> Arc<Self> {
        Arc::new(Self {
            me,
            sessions,
            suite,
            engine,
            courier,
        })
    }

    /// Execute one request and produce the correlated reply.
    pub async fn handle(&self, from: PartyId, request: ComputeRequest) -> Reply {
        let request_id = request.request_id();
        let session_id = request.session_id().clone();
        let kind = request.kind();
        debug!(me = %self.me, %from, %kind, request = %request_id, "Handling delegated request");

        match self.perform(request).await {
            Ok(body) => Reply::ok(request_id, session_id, kind, body),
            Err(e) => {
                warn!(me = %self.me, %kind, request = %request_id, "Refusing request: {e}");
                Reply::refused(request_id, session_id, kind)
            }
        }
    }

    async fn perform(&self, request: ComputeRequest) -> Result<ReplyBody, ConcertoError> {
        let session = self.sessions.get(request.session_id())?;
        match request {
            ComputeRequest::Sum { lhs, rhs, .. } => {
                let (a, b) = self.binary_operands(&session, &lhs, &rhs).await?;
                let result = self
                    .suite
                    .add(&a, &b)
                    .map_err(|e| ConcertoError::InvalidOperand(format!("add failed: {e:#}")))?;
                Ok(ReplyBody::Ciphertext(session.store(result)?))
            }
            ComputeRequest::Multiply { lhs, rhs, .. } => {
                let (a, b) = self.binary_operands(&session, &lhs, &rhs).await?;
                let result = self.suite.multiply(&a, &b).map_err(|e| {
                    ConcertoError::InvalidOperand(format!("multiply failed: {e:#}"))
                })?;
                Ok(ReplyBody::Ciphertext(session.store(result)?))
            }
            ComputeRequest::Relinearize { operand, .. } => {
                let ct = self.owned_operand(&session, &operand)?;
                if ct.degree != RELINEARIZABLE_DEGREE {
                    return Err(ConcertoError::InvalidOperand(format!(
                        "degree {} is not relinearizable",
                        ct.degree
                    )));
                }
                let key = session.evaluation_key().ok_or_else(|| {
                    ConcertoError::NotFound("evaluation key not generated".into())
                })?;
                let result = self.suite.relinearize(&ct, &key).map_err(|e| {
                    ConcertoError::InvalidOperand(format!("relinearize failed: {e:#}"))
                })?;
                Ok(ReplyBody::Ciphertext(session.store(result)?))
            }
            ComputeRequest::Rotate {
                operand, rotation, ..
            } => {
                let ct = self.owned_operand(&session, &operand)?;
                let steps = normalize_rotation(rotation, self.suite.period());
                if steps == 0 {
                    // Identity rotation: no key needed, but a fresh id
                    // is minted like for every successful operation.
                    return Ok(ReplyBody::Ciphertext(session.store(ct)?));
                }
                let key = session.rotation_key(steps).ok_or_else(|| {
                    ConcertoError::NotFound(format!("rotation key for {steps} steps"))
                })?;
                let result = self.suite.rotate_left(&ct, steps, &key).map_err(|e| {
                    ConcertoError::InvalidOperand(format!("rotate failed: {e:#}"))
                })?;
                Ok(ReplyBody::Ciphertext(session.store(result)?))
            }
            ComputeRequest::Refresh { operand, .. } => {
                let ct = self.owned_operand(&session, &operand)?;
                let output = self.initiate(&session, ProtocolParams::refresh(ct)).await?;
                self.store_ciphertext_output(&session, output)
            }
            ComputeRequest::Switch {
                operand, target_key, ..
            } => {
                let ct = self.owned_operand(&session, &operand)?;
                let output = self
                    .initiate(&session, ProtocolParams::key_switch(ct, target_key))
                    .await?;
                self.store_ciphertext_output(&session, output)
            }
            ComputeRequest::EncryptionToShares { operand, .. } => {
                let ct = self.owned_operand(&session, &operand)?;
                let shares_id = SharesId::mint();
                let output = self
                    .initiate(&session, ProtocolParams::encryption_to_shares(ct, shares_id))
                    .await?;
                match output {
                    ProtocolOutput::Shares(_) => Ok(ReplyBody::Shares(shares_id)),
                    other => Err(ConcertoError::ProtocolAborted(format!(
                        "expected shares output, got {other:?}"
                    ))),
                }
            }
            ComputeRequest::SharesToEncryption { operand, .. } => {
                let value = session.get_shares(&operand)?;
                let output = self
                    .initiate(&session, ProtocolParams::shares_to_encryption(value))
                    .await?;
                self.store_ciphertext_output(&session, output)
            }
            ComputeRequest::FetchCiphertext { operand, .. } => {
                let ct = self.owned_operand(&session, &operand)?;
                let bytes = bincode::serialize(&ct).map_err(|e| {
                    ConcertoError::InvalidOperand(format!("unserializable ciphertext: {e}"))
                })?;
                Ok(ReplyBody::Value(bytes))
            }
            ComputeRequest::ResolveName { name, .. } => {
                Ok(ReplyBody::Ciphertext(session.resolve_name(&name)?))
            }
        }
    }

    async fn initiate(
        &self,
        session: &Arc<Session>,
        params: ProtocolParams,
    ) -> Result<ProtocolOutput, ConcertoError> {
        self.engine
            .initiate(session, params)
            .await
            .map_err(|e| ConcertoError::ProtocolAborted(format!("{e:#}")))
    }

    fn store_ciphertext_output(
        &self,
        session: &Arc<Session>,
        output: ProtocolOutput,
    ) -> Result<ReplyBody, ConcertoError> {
        match output {
            ProtocolOutput::Ciphertext(ct) => Ok(ReplyBody::Ciphertext(session.store(ct)?)),
            other => Err(ConcertoError::ProtocolAborted(format!(
                "expected ciphertext output, got {other:?}"
            ))),
        }
    }

    /// An operand this party must own. Requests routed to the wrong
    /// party are refused: no party answers on behalf of another owner.
    fn owned_operand(
        &self,
        session: &Arc<Session>,
        id: &CiphertextId,
    ) -> Result<Ciphertext, ConcertoError> {
        if id.is_nil() {
            return Err(ConcertoError::InvalidOperand("nil ciphertext id".into()));
        }
        if id.owner() != &self.me {
            return Err(ConcertoError::InvalidOperand(format!(
                "{id} is owned by {}, not by {}",
                id.owner(),
                self.me
            )));
        }
        session.get(id)
    }

    /// Resolve both operands of a binary operation. The second operand
    /// must be local (that is where the request was routed); the first
    /// is fetched from its owner when it lives elsewhere.
    async fn binary_operands(
        &self,
        session: &Arc<Session>,
        lhs: &CiphertextId,
        rhs: &CiphertextId,
    ) -> Result<(Ciphertext, Ciphertext), ConcertoError> {
        let b = self.owned_operand(session, rhs)?;
        let a = if lhs.is_nil() {
            return Err(ConcertoError::InvalidOperand("nil ciphertext id".into()));
        } else if lhs.owner() == &self.me {
            session.get(lhs)?
        } else {
            self.courier.fetch_ciphertext(session.id(), lhs).await?
        };
        Ok((a, b))
    }
}
