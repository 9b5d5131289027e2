// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use serde::{Deserialize, Serialize};

use crate::{CiphertextId, RequestId, SessionId, SharesId};

/// A requested slot rotation. Right rotations are normalized to left
/// rotations by the crypto layer before touching any rotation key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    Left(u64),
    Right(u64),
}

/// The finite set of delegated operation kinds. Each kind has its own
/// pending-request table on the requester side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum RequestKind {
    Sum,
    Multiply,
    Relinearize,
    Rotate,
    Refresh,
    Switch,
    EncryptionToShares,
    SharesToEncryption,
    FetchCiphertext,
    ResolveName,
}

/// One variant per delegated operation. Every variant carries the
/// request id echoed back by the reply and the session the operands are
/// scoped to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ComputeRequest {
    Sum {
        request_id: RequestId,
        session_id: SessionId,
        lhs: CiphertextId,
        rhs: CiphertextId,
    },
    Multiply {
        request_id: RequestId,
        session_id: SessionId,
        lhs: CiphertextId,
        rhs: CiphertextId,
    },
    Relinearize {
        request_id: RequestId,
        session_id: SessionId,
        operand: CiphertextId,
    },
    Rotate {
        request_id: RequestId,
        session_id: SessionId,
        operand: CiphertextId,
        rotation: Rotation,
    },
    Refresh {
        request_id: RequestId,
        session_id: SessionId,
        operand: CiphertextId,
    },
    /// Switch a ciphertext to an externally supplied public key.
    Switch {
        request_id: RequestId,
        session_id: SessionId,
        operand: CiphertextId,
        target_key: Vec<u8>,
    },
    EncryptionToShares {
        request_id: RequestId,
        session_id: SessionId,
        operand: CiphertextId,
    },
    SharesToEncryption {
        request_id: RequestId,
        session_id: SessionId,
        operand: SharesId,
    },
    /// Retrieve the raw ciphertext value from its owner. Used by an
    /// owner computing a binary operation whose first operand lives
    /// elsewhere.
    FetchCiphertext {
        request_id: RequestId,
        session_id: SessionId,
        operand: CiphertextId,
    },
    /// Resolve a variable name to the ciphertext id bound to it at the
    /// target party.
    ResolveName {
        request_id: RequestId,
        session_id: SessionId,
        name: String,
    },
}

impl ComputeRequest {
    pub fn request_id(&self) -> RequestId {
        use ComputeRequest as R;
        match self {
            R::Sum { request_id, .. }
            | R::Multiply { request_id, .. }
            | R::Relinearize { request_id, .. }
            | R::Rotate { request_id, .. }
            | R::Refresh { request_id, .. }
            | R::Switch { request_id, .. }
            | R::EncryptionToShares { request_id, .. }
            | R::SharesToEncryption { request_id, .. }
            | R::FetchCiphertext { request_id, .. }
            | R::ResolveName { request_id, .. } => *request_id,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        use ComputeRequest as R;
        match self {
            R::Sum { session_id, .. }
            | R::Multiply { session_id, .. }
            | R::Relinearize { session_id, .. }
            | R::Rotate { session_id, .. }
            | R::Refresh { session_id, .. }
            | R::Switch { session_id, .. }
            | R::EncryptionToShares { session_id, .. }
            | R::SharesToEncryption { session_id, .. }
            | R::FetchCiphertext { session_id, .. }
            | R::ResolveName { session_id, .. } => session_id,
        }
    }

    pub fn kind(&self) -> RequestKind {
        use ComputeRequest as R;
        match self {
            R::Sum { .. } => RequestKind::Sum,
            R::Multiply { .. } => RequestKind::Multiply,
            R::Relinearize { .. } => RequestKind::Relinearize,
            R::Rotate { .. } => RequestKind::Rotate,
            R::Refresh { .. } => RequestKind::Refresh,
            R::Switch { .. } => RequestKind::Switch,
            R::EncryptionToShares { .. } => RequestKind::EncryptionToShares,
            R::SharesToEncryption { .. } => RequestKind::SharesToEncryption,
            R::FetchCiphertext { .. } => RequestKind::FetchCiphertext,
            R::ResolveName { .. } => RequestKind::ResolveName,
        }
    }
}

/// Payload of a positive reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ReplyBody {
    Ciphertext(CiphertextId),
    Shares(SharesId),
    /// Raw bytes, e.g. a fetched ciphertext value.
    Value(Vec<u8>),
    None,
}

/// Reply to a [`ComputeRequest`], correlated by the echoed request id.
/// `valid == false` means the owner refused or failed the operation;
/// the body is then [`ReplyBody::None`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub request_id: RequestId,
    pub session_id: SessionId,
    pub kind: RequestKind,
    pub body: ReplyBody,
    pub valid: bool,
}

impl Reply {
    pub fn ok(request_id: RequestId, session_id: SessionId, kind: RequestKind, body: ReplyBody) -> Self {
        Self {
            request_id,
            session_id,
            kind,
            body,
            valid: true,
        }
    }

    pub fn refused(request_id: RequestId, session_id: SessionId, kind: RequestKind) -> Self {
        Self {
            request_id,
            session_id,
            kind,
            body: ReplyBody::None,
            valid: false,
        }
    }
}
