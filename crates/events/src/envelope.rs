// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{AggMessage, ComputeRequest, Reply};

/// Everything that crosses the wire between parties. Receivers dispatch
/// by matching on the variant; there is no type-name sniffing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Envelope {
    Request(ComputeRequest),
    Reply(Reply),
    Aggregation(AggMessage),
}

impl Envelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).context("Could not serialize Envelope")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).context("Could not deserialize Envelope")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CiphertextId, PartyId, RequestId, SessionId};

    #[test]
    fn envelope_roundtrips_through_bytes() {
        let env = Envelope::Request(ComputeRequest::Refresh {
            request_id: RequestId::new(),
            session_id: SessionId::new("s1"),
            operand: CiphertextId::mint(PartyId::new("p0", b"k0".to_vec())),
        });
        let bytes = env.to_bytes().unwrap();
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), env);
    }
}
