// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{bail, Context, Result};
use concerto_events::AggKind;
use concerto_fhe::{
    decode_slots, encode_slots, Ciphertext, HomomorphicSuite, ProtocolOutput, ProtocolParams,
};

/// Plaintext slot count of the [`PlainSuite`].
pub const PLAIN_PERIOD: u64 = 8;

/// A "homomorphic" suite with no cryptography at all: ciphertexts hold
/// the slot vector in the clear, multi-party ceremonies fold
/// deterministic pseudo-shares. The point is to exercise the fabric —
/// routing, aggregation, correlation, degrees — with results that can
/// be checked by eye.
#[derive(Default)]
pub struct PlainSuite;

impl PlainSuite {
    pub fn new() -> Self {
        Self
    }
}

/// Encode plaintext slots the way [`PlainSuite::encrypt`] expects them.
pub fn plain(slots: &[u64]) -> Vec<u8> {
    encode_slots(slots)
}

/// Read the slots straight out of a [`PlainSuite`] ciphertext.
pub fn decrypt(ciphertext: &Ciphertext) -> Result<Vec<u64>> {
    decode_slots(&ciphertext.data)
}

/// Read the slots out of a shared value produced by
/// encryption-to-shares.
pub fn decrypt_shares(value: &[u8]) -> Result<Vec<u64>> {
    decode_slots(value)
}

/// Deterministic 32-byte mix of a key share and a ceremony seed.
/// Folding mixes with XOR is commutative and associative, which is all
/// the skeleton requires of `combine`.
fn mix32(key_share: &[u8], seed: &[u8]) -> Vec<u8> {
    let mut out = [0u8; 32];
    for (i, b) in key_share.iter().chain(seed.iter()).enumerate() {
        out[i % 32] ^= b.rotate_left((i % 7) as u32);
    }
    out.to_vec()
}

fn xor_fold(mut acc: Vec<u8>, incoming: Vec<u8>) -> Vec<u8> {
    if acc.len() < incoming.len() {
        acc.resize(incoming.len(), 0);
    }
    for (a, b) in acc.iter_mut().zip(incoming) {
        *a ^= b;
    }
    acc
}

fn slots_of(ciphertext: &Ciphertext) -> Result<Vec<u64>> {
    decode_slots(&ciphertext.data)
}

impl HomomorphicSuite for PlainSuite {
    fn period(&self) -> u64 {
        PLAIN_PERIOD
    }

    fn encrypt(&self, plaintext: &[u8], _public_key: &[u8]) -> Result<Ciphertext> {
        // Validate the encoding up front so a bad test input fails here
        // rather than deep inside an operation.
        decode_slots(plaintext).context("plaintext is not a slot vector")?;
        Ok(Ciphertext::new(plaintext.to_vec(), 1))
    }

    fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        let (a, b) = (slots_of(lhs)?, slots_of(rhs)?);
        if a.len() != b.len() {
            bail!("slot count mismatch: {} vs {}", a.len(), b.len());
        }
        let sum: Vec<u64> = a
            .iter()
            .zip(&b)
            .map(|(x, y)| x.wrapping_add(*y))
            .collect();
        Ok(Ciphertext::new(
            encode_slots(&sum),
            lhs.degree.max(rhs.degree),
        ))
    }

    fn multiply(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        let (a, b) = (slots_of(lhs)?, slots_of(rhs)?);
        if a.len() != b.len() {
            bail!("slot count mismatch: {} vs {}", a.len(), b.len());
        }
        let product: Vec<u64> = a
            .iter()
            .zip(&b)
            .map(|(x, y)| x.wrapping_mul(*y))
            .collect();
        Ok(Ciphertext::new(
            encode_slots(&product),
            lhs.degree.saturating_add(rhs.degree),
        ))
    }

    fn rotate_left(
        &self,
        operand: &Ciphertext,
        steps: u64,
        _rotation_key: &[u8],
    ) -> Result<Ciphertext> {
        let mut slots = slots_of(operand)?;
        if slots.is_empty() {
            bail!("cannot rotate an empty slot vector");
        }
        let by = (steps as usize) % slots.len();
        slots.rotate_left(by);
        Ok(Ciphertext::new(encode_slots(&slots), operand.degree))
    }

    fn relinearize(&self, operand: &Ciphertext, _evaluation_key: &[u8]) -> Result<Ciphertext> {
        Ok(Ciphertext::new(operand.data.clone(), 1))
    }

    fn local_share(&self, params: &ProtocolParams, key_share: &[u8]) -> Result<Vec<u8>> {
        match params.kind {
            AggKind::CollectiveKeyGen | AggKind::RelinKeyGen | AggKind::RotKeyGen => {
                Ok(mix32(key_share, params.seed.as_bytes()))
            }
            // Value-carrying ceremonies contribute nothing in the clear
            // model; the value itself travels in the parameters.
            AggKind::Refresh
            | AggKind::KeySwitch
            | AggKind::EncryptionToShares
            | AggKind::SharesToEncryption => Ok(Vec::new()),
        }
    }

    fn combine(&self, _kind: AggKind, acc: Vec<u8>, incoming: Vec<u8>) -> Vec<u8> {
        xor_fold(acc, incoming)
    }

    fn finalize(&self, params: &ProtocolParams, combined: Vec<u8>) -> Result<ProtocolOutput> {
        match params.kind {
            AggKind::CollectiveKeyGen | AggKind::RelinKeyGen | AggKind::RotKeyGen => {
                Ok(ProtocolOutput::Key(combined))
            }
            AggKind::Refresh => {
                let ct = params
                    .ciphertext
                    .as_ref()
                    .context("refresh needs a ciphertext")?;
                Ok(ProtocolOutput::Ciphertext(Ciphertext::new(
                    ct.data.clone(),
                    1,
                )))
            }
            AggKind::KeySwitch => {
                let ct = params
                    .ciphertext
                    .as_ref()
                    .context("key switch needs a ciphertext")?;
                params
                    .target_key
                    .as_ref()
                    .context("key switch needs a target key")?;
                Ok(ProtocolOutput::Ciphertext(Ciphertext::new(
                    ct.data.clone(),
                    1,
                )))
            }
            AggKind::EncryptionToShares => {
                let ct = params
                    .ciphertext
                    .as_ref()
                    .context("encryption-to-shares needs a ciphertext")?;
                Ok(ProtocolOutput::Shares(ct.data.clone()))
            }
            AggKind::SharesToEncryption => {
                let shares = params
                    .shares
                    .as_ref()
                    .context("shares-to-encryption needs the shared value")?;
                Ok(ProtocolOutput::Ciphertext(Ciphertext::new(
                    shares.clone(),
                    1,
                )))
            }
        }
    }
}
