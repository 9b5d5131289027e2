// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{Context, Result};
use concerto_events::{AggKind, Seed, SharesId};
use serde::{Deserialize, Serialize};

/// Only degree-2 ciphertexts (fresh products) can be relinearized.
pub const RELINEARIZABLE_DEGREE: u8 = 2;

/// An encrypted value under the collective public key. Opaque to the
/// fabric beyond its identity, owner and degree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub data: Vec<u8>,
    pub degree: u8,
}

impl Ciphertext {
    pub fn new(data: Vec<u8>, degree: u8) -> Self {
        Self { data, degree }
    }
}

/// Parameters for one aggregation run, distributed top-down from the
/// initiator. One struct for every protocol kind; the per-kind fields
/// are optional and the suite rejects runs missing the ones it needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParams {
    pub kind: AggKind,
    pub seed: Seed,
    pub ciphertext: Option<Ciphertext>,
    pub shares: Option<Vec<u8>>,
    /// For encryption-to-shares: the id every party installs the
    /// resulting shared value under.
    pub shares_id: Option<SharesId>,
    pub target_key: Option<Vec<u8>>,
    pub steps: Option<u64>,
}

impl ProtocolParams {
    fn bare(kind: AggKind) -> Self {
        Self {
            kind,
            seed: Seed::generate(),
            ciphertext: None,
            shares: None,
            shares_id: None,
            target_key: None,
            steps: None,
        }
    }

    pub fn collective_keygen() -> Self {
        Self::bare(AggKind::CollectiveKeyGen)
    }

    pub fn relin_keygen() -> Self {
        Self::bare(AggKind::RelinKeyGen)
    }

    pub fn rot_keygen(steps: u64) -> Self {
        Self {
            steps: Some(steps),
            ..Self::bare(AggKind::RotKeyGen)
        }
    }

    pub fn refresh(ciphertext: Ciphertext) -> Self {
        Self {
            ciphertext: Some(ciphertext),
            ..Self::bare(AggKind::Refresh)
        }
    }

    pub fn key_switch(ciphertext: Ciphertext, target_key: Vec<u8>) -> Self {
        Self {
            ciphertext: Some(ciphertext),
            target_key: Some(target_key),
            ..Self::bare(AggKind::KeySwitch)
        }
    }

    pub fn encryption_to_shares(ciphertext: Ciphertext, shares_id: SharesId) -> Self {
        Self {
            ciphertext: Some(ciphertext),
            shares_id: Some(shares_id),
            ..Self::bare(AggKind::EncryptionToShares)
        }
    }

    pub fn shares_to_encryption(shares: Vec<u8>) -> Self {
        Self {
            shares: Some(shares),
            ..Self::bare(AggKind::SharesToEncryption)
        }
    }
}

/// What one aggregation run produces once the root's accumulator is
/// finalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProtocolOutput {
    /// A collectively generated public, evaluation or rotation key.
    Key(Vec<u8>),
    /// A refreshed, switched or re-encrypted ciphertext.
    Ciphertext(Ciphertext),
    /// An additively shared value.
    Shares(Vec<u8>),
}

/// The lattice-based homomorphic encryption library behind the fabric.
/// Consumed as an opaque collaborator: the fabric moves bytes and ids
/// around, the suite does the ring arithmetic.
///
/// `combine` must be associative and commutative for every kind: the
/// skeleton folds child shares in arrival order.
pub trait HomomorphicSuite: Send + Sync + 'static {
    /// Number of plaintext slots. Rotation amounts are reduced modulo
    /// this period.
    fn period(&self) -> u64;

    fn encrypt(&self, plaintext: &[u8], public_key: &[u8]) -> Result<Ciphertext>;

    fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext>;

    /// Homomorphic product. Raises the result degree; relinearization
    /// brings it back down.
    fn multiply(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext>;

    fn rotate_left(&self, operand: &Ciphertext, steps: u64, rotation_key: &[u8])
        -> Result<Ciphertext>;

    fn relinearize(&self, operand: &Ciphertext, evaluation_key: &[u8]) -> Result<Ciphertext>;

    /// This party's contribution to the given protocol run. Pure in the
    /// sense required by the skeleton: no protocol state outside the
    /// arguments.
    fn local_share(&self, params: &ProtocolParams, key_share: &[u8]) -> Result<Vec<u8>>;

    /// Fold two partial contributions of the same run.
    fn combine(&self, kind: AggKind, acc: Vec<u8>, incoming: Vec<u8>) -> Vec<u8>;

    /// Turn the fully combined contribution into the protocol output.
    fn finalize(&self, params: &ProtocolParams, combined: Vec<u8>) -> Result<ProtocolOutput>;
}

/// Slot-vector helpers shared by suite implementations and tests.
pub fn encode_slots(slots: &[u64]) -> Vec<u8> {
    bincode::serialize(&slots.to_vec()).expect("slot vectors always serialize")
}

pub fn decode_slots(bytes: &[u8]) -> Result<Vec<u64>> {
    bincode::deserialize(bytes).context("Could not decode slot vector")
}
