// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{bail, Result};
use concerto_events::{CiphertextId, ConcertoError, PartyId, SessionId, SharesId};
use concerto_fhe::Ciphertext;
use rand::Rng;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        RwLock,
    },
};
use tracing::debug;

/// Per-computation ledger: crypto parameters, this party's key share,
/// the collectively generated keys once they exist, and the maps from
/// ciphertext/shares id to value.
///
/// Locks are scoped to the single map operation; none is held across an
/// await or a cryptographic computation.
pub struct Session {
    id: SessionId,
    me: PartyId,
    roster: Vec<PartyId>,
    params: Vec<u8>,
    key_share: Vec<u8>,
    public_key: RwLock<Option<Vec<u8>>>,
    evaluation_key: RwLock<Option<Vec<u8>>>,
    rotation_keys: RwLock<HashMap<u64, Vec<u8>>>,
    ciphertexts: RwLock<HashMap<CiphertextId, Ciphertext>>,
    shares: RwLock<HashMap<SharesId, Vec<u8>>>,
    names: RwLock<HashMap<String, CiphertextId>>,
    closed: AtomicBool,
}

impl Session {
    pub fn new(
        id: SessionId,
        me: PartyId,
        roster: Vec<PartyId>,
        params: Vec<u8>,
        key_share: Vec<u8>,
    ) -> Result<Self> {
        if roster.is_empty() {
            bail!("Session {} requires a non-empty roster", id);
        }
        if !roster.contains(&me) {
            bail!("Session {} roster does not contain this party {}", id, me);
        }
        Ok(Self {
            id,
            me,
            roster,
            params,
            key_share,
            public_key: RwLock::new(None),
            evaluation_key: RwLock::new(None),
            rotation_keys: RwLock::new(HashMap::new()),
            ciphertexts: RwLock::new(HashMap::new()),
            shares: RwLock::new(HashMap::new()),
            names: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn me(&self) -> &PartyId {
        &self.me
    }

    /// The fixed, ordered set of parties for this session. Circuit
    /// variable suffixes (`@index`) index into this list.
    pub fn roster(&self) -> &[PartyId] {
        &self.roster
    }

    pub fn party_at(&self, index: usize) -> Result<PartyId, ConcertoError> {
        self.roster
            .get(index)
            .cloned()
            .ok_or_else(|| ConcertoError::NotFound(format!("roster index {index}")))
    }

    /// A roster member drawn uniformly at random. Used to route
    /// shares-to-encryption, where the value has no single owner.
    pub fn random_member(&self) -> PartyId {
        let idx = rand::thread_rng().gen_range(0..self.roster.len());
        self.roster[idx].clone()
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    pub fn key_share(&self) -> &[u8] {
        &self.key_share
    }

    /// Store a ciphertext under a freshly minted id owned by this party.
    pub fn store(&self, ciphertext: Ciphertext) -> Result<CiphertextId, ConcertoError> {
        self.ensure_open()?;
        let id = CiphertextId::mint(self.me.clone());
        self.ciphertexts
            .write()
            .expect("ciphertext map poisoned")
            .insert(id.clone(), ciphertext);
        debug!(session = %self.id, ct = %id, "Ciphertext stored");
        Ok(id)
    }

    pub fn get(&self, id: &CiphertextId) -> Result<Ciphertext, ConcertoError> {
        self.ciphertexts
            .read()
            .expect("ciphertext map poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConcertoError::NotFound(format!("ciphertext {id}")))
    }

    pub fn ciphertext_count(&self) -> usize {
        self.ciphertexts.read().expect("ciphertext map poisoned").len()
    }

    pub fn store_shares(&self, value: Vec<u8>) -> Result<SharesId, ConcertoError> {
        let id = SharesId::mint();
        self.store_shares_at(id, value)?;
        Ok(id)
    }

    /// Install a shared value under an id minted elsewhere. Shared
    /// values have no single owner: after an encryption-to-shares run
    /// every roster member installs the outcome under the same id.
    pub fn store_shares_at(&self, id: SharesId, value: Vec<u8>) -> Result<(), ConcertoError> {
        self.ensure_open()?;
        self.shares
            .write()
            .expect("shares map poisoned")
            .insert(id, value);
        debug!(session = %self.id, shares = %id, "Shares stored");
        Ok(())
    }

    pub fn get_shares(&self, id: &SharesId) -> Result<Vec<u8>, ConcertoError> {
        self.shares
            .read()
            .expect("shares map poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConcertoError::NotFound(format!("shares {id}")))
    }

    pub fn set_public_key(&self, key: Vec<u8>) {
        *self.public_key.write().expect("public key poisoned") = Some(key);
    }

    pub fn public_key(&self) -> Option<Vec<u8>> {
        self.public_key.read().expect("public key poisoned").clone()
    }

    pub fn set_evaluation_key(&self, key: Vec<u8>) {
        *self.evaluation_key.write().expect("evaluation key poisoned") = Some(key);
    }

    pub fn evaluation_key(&self) -> Option<Vec<u8>> {
        self.evaluation_key
            .read()
            .expect("evaluation key poisoned")
            .clone()
    }

    pub fn set_rotation_key(&self, steps: u64, key: Vec<u8>) {
        self.rotation_keys
            .write()
            .expect("rotation keys poisoned")
            .insert(steps, key);
    }

    pub fn rotation_key(&self, steps: u64) -> Option<Vec<u8>> {
        self.rotation_keys
            .read()
            .expect("rotation keys poisoned")
            .get(&steps)
            .cloned()
    }

    /// Bind a variable name to a ciphertext id so local circuits and
    /// remote `ResolveName` requests can find it.
    pub fn bind_name(
        &self,
        name: impl Into<String>,
        id: CiphertextId,
    ) -> Result<(), ConcertoError> {
        self.ensure_open()?;
        self.names
            .write()
            .expect("name table poisoned")
            .insert(name.into(), id);
        Ok(())
    }

    pub fn resolve_name(&self, name: &str) -> Result<CiphertextId, ConcertoError> {
        self.names
            .read()
            .expect("name table poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| ConcertoError::NotFound(format!("variable {name}")))
    }

    fn ensure_open(&self) -> Result<(), ConcertoError> {
        if self.is_closed() {
            return Err(ConcertoError::NotFound(format!(
                "session {} (closed)",
                self.id
            )));
        }
        Ok(())
    }

    /// Tear the session down. All ids owned by this party become
    /// unresolvable; subsequent gets return `NotFound`, and a stale
    /// handle can no longer store or bind anything.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.ciphertexts
            .write()
            .expect("ciphertext map poisoned")
            .clear();
        self.shares.write().expect("shares map poisoned").clear();
        self.names.write().expect("name table poisoned").clear();
        debug!(session = %self.id, "Session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
