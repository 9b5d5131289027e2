// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use concerto_events::PartyId;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::{NetCommand, NetEvent, NetHandle};

const CHANNEL_CAPACITY: usize = 256;

/// In-process message router standing behind the transport seam: every
/// attached party gets the same [`NetHandle`] pair it would get from a
/// real overlay. Used by multi-party tests and single-process
/// deployments.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    inboxes: Arc<RwLock<HashMap<PartyId, broadcast::Sender<NetEvent>>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a party and spawn its routing task. Messages to parties
    /// that are not attached (or have been detached) are dropped with a
    /// warning, which a requester observes as a timeout.
    pub fn attach(&self, me: PartyId) -> NetHandle {
        let (event_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.inboxes
            .write()
            .expect("inbox map poisoned")
            .insert(me.clone(), event_tx.clone());

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<NetCommand>(CHANNEL_CAPACITY);
        let inboxes = self.inboxes.clone();
        tokio::spawn(async move {
            while let Some(NetCommand::Send { to, envelope }) = cmd_rx.recv().await {
                let inbox = {
                    let map = inboxes.read().expect("inbox map poisoned");
                    map.get(&to).cloned()
                };
                match inbox {
                    Some(tx) => {
                        // A send error just means the party stopped listening.
                        let _ = tx.send(NetEvent::Message {
                            from: me.clone(),
                            envelope,
                        });
                    }
                    None => warn!(from = %me, to = %to, "Dropping message to unknown party"),
                }
            }
        });

        NetHandle::new(cmd_tx, event_tx)
    }

    /// Make a party unreachable. In-flight waits on it will time out.
    pub fn detach(&self, party: &PartyId) {
        self.inboxes
            .write()
            .expect("inbox map poisoned")
            .remove(party);
    }
}
