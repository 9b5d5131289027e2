// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::RequestKind;

/// Error taxonomy shared by every crate in the workspace. Local checks
/// at an owner are converted into a negative reply rather than crossing
/// the wire as an error; the requester then observes `DelegationFailed`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConcertoError {
    /// Session, circuit, ciphertext, shares value or key absent locally.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote owner reported `valid = false`, was unreachable, or
    /// the reply wait timed out.
    #[error("delegation failed for {kind}: {reason}")]
    DelegationFailed { kind: RequestKind, reason: String },

    /// Malformed circuit description.
    #[error("parse error at byte {offset}: found {found}, expected {expected}")]
    ParseError {
        offset: usize,
        found: String,
        expected: String,
    },

    /// A local-share computation failed mid-aggregation, or a protocol
    /// channel was torn down under a running party.
    #[error("protocol aborted: {0}")]
    ProtocolAborted(String),

    /// Nil id passed to an operation, ciphertext degree out of bounds,
    /// or a required evaluation/rotation key is missing.
    #[error("invalid operand: {0}")]
    InvalidOperand(String),
}

impl ConcertoError {
    pub fn delegation_failed(kind: RequestKind, reason: impl Into<String>) -> Self {
        Self::DelegationFailed {
            kind,
            reason: reason.into(),
        }
    }
}
