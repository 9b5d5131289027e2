// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use serde::{Deserialize, Serialize};

use crate::{PartyId, ProtocolId, SessionId};

/// The multi-party sub-protocols that instantiate the aggregation
/// skeleton.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum AggKind {
    CollectiveKeyGen,
    RelinKeyGen,
    RotKeyGen,
    Refresh,
    KeySwitch,
    EncryptionToShares,
    SharesToEncryption,
}

/// Messages exchanged during one aggregation run over the spanning
/// tree. Parameter and share payloads are protocol-specific and travel
/// as opaque bincode bytes; the skeleton never interprets them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AggMessage {
    /// Distributed top-down from the initiator. Carries the initiator so
    /// every receiver can derive the same spanning tree for this run.
    Parameters {
        protocol_id: ProtocolId,
        session_id: SessionId,
        kind: AggKind,
        initiator: PartyId,
        params: Vec<u8>,
    },
    /// Sent child to parent once the child's subtree has been folded.
    PartialShare {
        protocol_id: ProtocolId,
        session_id: SessionId,
        kind: AggKind,
        from: PartyId,
        share: Vec<u8>,
    },
    /// Sent parent to children once the root has finalized.
    CollectiveResult {
        protocol_id: ProtocolId,
        session_id: SessionId,
        kind: AggKind,
        result: Vec<u8>,
    },
}

impl AggMessage {
    pub fn protocol_id(&self) -> ProtocolId {
        use AggMessage as M;
        match self {
            M::Parameters { protocol_id, .. }
            | M::PartialShare { protocol_id, .. }
            | M::CollectiveResult { protocol_id, .. } => *protocol_id,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        use AggMessage as M;
        match self {
            M::Parameters { session_id, .. }
            | M::PartialShare { session_id, .. }
            | M::CollectiveResult { session_id, .. } => session_id,
        }
    }

    pub fn kind(&self) -> AggKind {
        use AggMessage as M;
        match self {
            M::Parameters { kind, .. }
            | M::PartialShare { kind, .. }
            | M::CollectiveResult { kind, .. } => *kind,
        }
    }
}
