// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Identity of one participant in the joint computation: its network
/// address plus its public identity bytes. Opaque to the rest of the
/// system beyond comparison and display; always passed by value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyId {
    addr: String,
    pubkey: Vec<u8>,
}

impl PartyId {
    pub fn new(addr: impl Into<String>, pubkey: impl Into<Vec<u8>>) -> Self {
        Self {
            addr: addr.into(),
            pubkey: pubkey.into(),
        }
    }

    /// The nil party, used only inside the nil ciphertext sentinel.
    pub fn nil() -> Self {
        Self {
            addr: String::new(),
            pubkey: vec![],
        }
    }

    pub fn is_nil(&self) -> bool {
        self.addr.is_empty()
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn pubkey(&self) -> &[u8] {
        &self.pubkey
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pubkey.is_empty() {
            write!(f, "{}", self.addr)
        } else {
            let head = &self.pubkey[..self.pubkey.len().min(4)];
            write!(f, "{}#{}", self.addr, hex::encode(head))
        }
    }
}
