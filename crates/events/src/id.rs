// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::PartyId;

/// Random 128-bit serial. Serials cross the wire between independently
/// started processes, so they are drawn from the thread RNG rather than
/// a process-local counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Serial(u128);

impl Serial {
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub const fn nil() -> Self {
        Self(0)
    }

    pub fn is_nil(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Correlates one in-flight request with its single expected reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        Self(rand::random())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Correlates the messages of one aggregation protocol run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolId(u64);

impl ProtocolId {
    pub fn new() -> Self {
        Self(rand::random())
    }
}

impl Default for ProtocolId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identifies one instance of the joint computation: fixed roster, fixed
/// crypto parameters, fixed key-share set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique ciphertext identifier. The owner field encodes where
/// the ciphertext lives: it is retrievable only by sending a request to
/// `owner`, and no party may answer on behalf of another owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CiphertextId {
    owner: PartyId,
    serial: Serial,
}

impl CiphertextId {
    pub fn mint(owner: PartyId) -> Self {
        Self {
            owner,
            serial: Serial::generate(),
        }
    }

    /// The "operation failed, no result" sentinel.
    pub fn nil() -> Self {
        Self {
            owner: PartyId::nil(),
            serial: Serial::nil(),
        }
    }

    pub fn is_nil(&self) -> bool {
        self.serial.is_nil()
    }

    pub fn owner(&self) -> &PartyId {
        &self.owner
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }
}

impl fmt::Display for CiphertextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "ct:nil")
        } else {
            write!(f, "ct:{}@{}", self.serial, self.owner)
        }
    }
}

/// Identifier for an additively shared value. Valid across all parties
/// simultaneously, so unlike [`CiphertextId`] it carries no owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SharesId(Serial);

impl SharesId {
    pub fn mint() -> Self {
        Self(Serial::generate())
    }

    pub fn serial(&self) -> Serial {
        self.0
    }
}

impl fmt::Display for SharesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sh:{}", self.0)
    }
}

/// Identifies one parsed-and-registered operation graph, scoped to a
/// session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitId(Serial);

impl CircuitId {
    pub fn mint() -> Self {
        Self(Serial::generate())
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "circuit:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_ciphertext_id_is_nil() {
        assert!(CiphertextId::nil().is_nil());
        assert!(!CiphertextId::mint(PartyId::new("p0", b"k".to_vec())).is_nil());
    }

    #[test]
    fn minted_ids_are_distinct() {
        let owner = PartyId::new("p0", b"k".to_vec());
        let a = CiphertextId::mint(owner.clone());
        let b = CiphertextId::mint(owner);
        assert_ne!(a, b);
    }
}
