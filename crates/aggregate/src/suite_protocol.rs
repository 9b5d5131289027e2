// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use concerto_events::AggKind;
use concerto_fhe::{HomomorphicSuite, ProtocolParams};
use std::sync::Arc;

use crate::Protocol;

/// Binds the aggregation skeleton to the homomorphic suite: every
/// cryptographic sub-protocol (key generation, refresh, key switch,
/// relinearization/rotation key generation, encryption↔shares) is this
/// one instantiation with a different [`AggKind`] in the parameters.
pub struct SuiteProtocol {
    suite: Arc<dyn HomomorphicSuite>,
    kind: AggKind,
}

impl SuiteProtocol {
    pub fn new(suite: Arc<dyn HomomorphicSuite>, kind: AggKind) -> Self {
        Self { suite, kind }
    }
}

impl Protocol for SuiteProtocol {
    type Params = ProtocolParams;
    type Share = Vec<u8>;

    fn local_share(&self, params: &ProtocolParams, key_share: &[u8]) -> Result<Vec<u8>> {
        self.suite.local_share(params, key_share)
    }

    fn combine(&self, acc: Vec<u8>, incoming: Vec<u8>) -> Vec<u8> {
        self.suite.combine(self.kind, acc, incoming)
    }
}
