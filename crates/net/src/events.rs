// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use concerto_events::{Envelope, PartyId};
use tokio::sync::{broadcast, mpsc};

/// Commands are sent to the transport over an mpsc channel. The overlay
/// that actually delivers messages between named parties is an external
/// collaborator; this channel pair is the whole seam.
#[derive(Clone, Debug)]
pub enum NetCommand {
    Send { to: PartyId, envelope: Envelope },
}

/// NetEvents are broadcast to whoever wishes to listen. The transport is
/// trusted to report the authenticated sender.
#[derive(Clone, Debug)]
pub enum NetEvent {
    Message { from: PartyId, envelope: Envelope },
}

/// One party's pair of transport channels.
#[derive(Clone)]
pub struct NetHandle {
    pub cmds: mpsc::Sender<NetCommand>,
    events: broadcast::Sender<NetEvent>,
}

impl NetHandle {
    pub fn new(cmds: mpsc::Sender<NetCommand>, events: broadcast::Sender<NetEvent>) -> Self {
        Self { cmds, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetEvent> {
        self.events.subscribe()
    }
}
