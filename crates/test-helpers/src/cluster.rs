// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{bail, Result};
use concerto_events::{PartyId, Rotation, SessionId};
use concerto_fhe::normalize_rotation;
use concerto_net::LocalNetwork;
use concerto_node::Party;
use concerto_session::Session;
use std::{sync::Arc, time::Duration};

use crate::{PlainSuite, PLAIN_PERIOD};

/// Deterministic roster for tests: `party0`, `party1`, ... with one-byte
/// identity keys.
pub fn roster(n: usize) -> Vec<PartyId> {
    (0..n)
        .map(|i| PartyId::new(format!("party{i}"), vec![i as u8]))
        .collect()
}

/// N parties over an in-process network, all members of one session and
/// all running the [`PlainSuite`]. Dropping the cluster aborts every
/// party's event loop.
pub struct Cluster {
    pub net: LocalNetwork,
    pub parties: Vec<Arc<Party>>,
    pub session_id: SessionId,
}

impl Cluster {
    pub fn start(n: usize) -> Result<Self> {
        Self::start_with_timeout(n, Duration::from_secs(5))
    }

    /// Tests exercising unreachable parties use a short timeout so the
    /// failure surfaces quickly.
    pub fn start_with_timeout(n: usize, request_timeout: Duration) -> Result<Self> {
        concerto_logger::setup_test_tracing();
        let net = LocalNetwork::new();
        let session_id = SessionId::new("test-session");
        let roster = roster(n);

        let mut parties = Vec::with_capacity(n);
        for (i, me) in roster.iter().enumerate() {
            let handle = net.attach(me.clone());
            let party = Party::attach_with_timeout(
                me.clone(),
                Arc::new(PlainSuite::new()),
                handle,
                request_timeout,
            );
            party.create_session(
                session_id.clone(),
                roster.clone(),
                Vec::new(),
                format!("key-share-{i}").into_bytes(),
            )?;
            parties.push(party);
        }

        Ok(Self {
            net,
            parties,
            session_id,
        })
    }

    pub fn party(&self, index: usize) -> &Arc<Party> {
        &self.parties[index]
    }

    pub fn member(&self, index: usize) -> PartyId {
        self.parties[index].me().clone()
    }

    /// Run the key ceremonies every circuit needs: collective public
    /// key and evaluation key, initiated by party 0. Returns once every
    /// member has installed both keys.
    pub async fn generate_keys(&self) -> Result<()> {
        self.party(0).generate_public_key(&self.session_id).await?;
        self.party(0)
            .generate_evaluation_key(&self.session_id)
            .await?;
        self.settle(|s| s.public_key().is_some() && s.evaluation_key().is_some())
            .await
    }

    /// Run the rotation-key ceremony from party 0 and wait for every
    /// member to hold the key for the normalized amount.
    pub async fn generate_rotation_key(&self, rotation: Rotation) -> Result<()> {
        self.party(0)
            .ensure_rotation_key(&self.session_id, rotation)
            .await?;
        let steps = normalize_rotation(rotation, PLAIN_PERIOD);
        if steps == 0 {
            return Ok(());
        }
        self.settle(|s| s.rotation_key(steps).is_some()).await
    }

    /// Non-initiators apply a ceremony's output after relaying the
    /// collective result down the tree, so the initiator can return
    /// before every member has installed it. Poll until the condition
    /// holds at every party.
    pub async fn settle(&self, ready: impl Fn(&Session) -> bool) -> Result<()> {
        for _ in 0..200 {
            let mut done = true;
            for party in &self.parties {
                let session = party.sessions().get(&self.session_id)?;
                if !ready(&session) {
                    done = false;
                    break;
                }
            }
            if done {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        bail!("cluster did not settle within the deadline")
    }
}
