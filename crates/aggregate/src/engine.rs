// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{Context, Result};
use concerto_events::{AggKind, AggMessage, PartyId, ProtocolId};
use concerto_fhe::{HomomorphicSuite, ProtocolOutput, ProtocolParams};
use concerto_net::{tree_position, NetCommand};
use concerto_session::{Session, SessionStore};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{run_party, AggRun, SuiteProtocol};

const MAILBOX_CAPACITY: usize = 64;

/// Runs aggregation protocols for one party: as initiator on behalf of
/// the delegation layer, and as responder whenever another party's
/// `Parameters` message arrives. Live runs are keyed by protocol id so
/// concurrent runs never see each other's messages.
pub struct AggEngine {
    me: PartyId,
    suite: Arc<dyn HomomorphicSuite>,
    sessions: Arc<SessionStore>,
    cmds: mpsc::Sender<NetCommand>,
    runs: Mutex<HashMap<ProtocolId, mpsc::Sender<AggMessage>>>,
}

impl AggEngine {
    pub fn new(
        me: PartyId,
        suite: Arc<dyn HomomorphicSuite>,
        sessions: Arc<SessionStore>,
        cmds: mpsc::Sender<NetCommand>,
    ) -> Arc<Self> {
        Arc::new(Self {
            me,
            suite,
            sessions,
            cmds,
            runs: Mutex::new(HashMap::new()),
        })
    }

    fn register(
        &self,
        protocol_id: ProtocolId,
    ) -> (mpsc::Sender<AggMessage>, mpsc::Receiver<AggMessage>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.runs
            .lock()
            .expect("run map poisoned")
            .insert(protocol_id, tx.clone());
        (tx, rx)
    }

    fn deregister(&self, protocol_id: &ProtocolId) {
        self.runs
            .lock()
            .expect("run map poisoned")
            .remove(protocol_id);
    }

    fn run_sender(&self, protocol_id: &ProtocolId) -> Option<mpsc::Sender<AggMessage>> {
        self.runs
            .lock()
            .expect("run map poisoned")
            .get(protocol_id)
            .cloned()
    }

    /// Initiate a protocol run over the session's whole roster, rooted
    /// at this party, and block until it completes. The root seeds its
    /// own inbound mailbox with the `Parameters` message; everything
    /// after that is the skeleton.
    pub async fn initiate(
        &self,
        session: &Arc<Session>,
        params: ProtocolParams,
    ) -> Result<ProtocolOutput> {
        let protocol_id = ProtocolId::new();
        let run = AggRun {
            protocol_id,
            session_id: session.id().clone(),
            kind: params.kind,
            initiator: self.me.clone(),
        };
        info!(protocol = %protocol_id, kind = %params.kind, session = %session.id(), "Initiating aggregation run");

        let (seed_tx, mut mailbox) = self.register(protocol_id);
        let seeded = AggMessage::Parameters {
            protocol_id,
            session_id: session.id().clone(),
            kind: params.kind,
            initiator: self.me.clone(),
            params: bincode::serialize(&params).context("Could not serialize protocol params")?,
        };
        seed_tx.send(seeded).await.ok();

        let position = tree_position(session.roster(), &self.me, &self.me)?;
        let protocol = SuiteProtocol::new(self.suite.clone(), params.kind);
        let outcome = run_party(
            &protocol,
            session.key_share(),
            &position,
            &run,
            &mut mailbox,
            &self.cmds,
        )
        .await;
        self.deregister(&protocol_id);

        let combined = outcome?;
        let output = self.suite.finalize(&params, combined)?;
        apply_output(session, &params, &output)?;
        Ok(output)
    }

    /// Deliver an inbound aggregation message from the party event
    /// loop. Messages for live runs are forwarded to their mailbox; a
    /// `Parameters` message for an unknown run starts a responder.
    pub async fn deliver(self: &Arc<Self>, msg: AggMessage) {
        let protocol_id = msg.protocol_id();
        if let Some(tx) = self.run_sender(&protocol_id) {
            if tx.send(msg).await.is_err() {
                warn!(protocol = %protocol_id, "Run mailbox closed before message arrived");
            }
            return;
        }

        let AggMessage::Parameters {
            ref session_id,
            ref initiator,
            kind,
            ref params,
            ..
        } = msg
        else {
            warn!(protocol = %protocol_id, "Dropping non-parameters message for unknown run");
            return;
        };

        let session = match self.sessions.get(session_id) {
            Ok(session) => session,
            Err(e) => {
                warn!(protocol = %protocol_id, session = %session_id, "Cannot join run: {e}");
                return;
            }
        };
        let params: ProtocolParams = match bincode::deserialize(params) {
            Ok(params) => params,
            Err(e) => {
                warn!(protocol = %protocol_id, "Undecodable protocol params: {e}");
                return;
            }
        };
        let run = AggRun {
            protocol_id,
            session_id: session_id.clone(),
            kind,
            initiator: initiator.clone(),
        };

        let (seed_tx, mut mailbox) = self.register(protocol_id);
        seed_tx.send(msg).await.ok();

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = engine.respond(session, params, run, &mut mailbox).await {
                warn!("Responder run failed: {e:#}");
            }
        });
    }

    async fn respond(
        self: Arc<Self>,
        session: Arc<Session>,
        params: ProtocolParams,
        run: AggRun,
        mailbox: &mut mpsc::Receiver<AggMessage>,
    ) -> Result<()> {
        let protocol_id = run.protocol_id;
        let position = tree_position(session.roster(), &run.initiator, &self.me)?;
        let protocol = SuiteProtocol::new(self.suite.clone(), run.kind);
        let outcome = run_party(
            &protocol,
            session.key_share(),
            &position,
            &run,
            mailbox,
            &self.cmds,
        )
        .await;
        self.deregister(&protocol_id);

        // Non-initiators also finalize: collectively generated keys are
        // installed at every party, other outputs stay with the
        // initiator.
        let output = self.suite.finalize(&params, outcome?)?;
        apply_output(&session, &params, &output)?;
        info!(protocol = %protocol_id, kind = %run.kind, "Responder run complete");
        Ok(())
    }
}

fn apply_output(
    session: &Arc<Session>,
    params: &ProtocolParams,
    output: &ProtocolOutput,
) -> Result<()> {
    match output {
        // Collectively generated keys are installed at every party.
        ProtocolOutput::Key(key) => match params.kind {
            AggKind::CollectiveKeyGen => session.set_public_key(key.clone()),
            AggKind::RelinKeyGen => session.set_evaluation_key(key.clone()),
            AggKind::RotKeyGen => {
                if let Some(steps) = params.steps {
                    session.set_rotation_key(steps, key.clone());
                }
            }
            _ => {}
        },
        // A shared value has no single owner: every party installs it
        // under the id the initiator minted into the parameters.
        ProtocolOutput::Shares(value) => {
            if let Some(id) = params.shares_id {
                session.store_shares_at(id, value.clone())?;
            }
        }
        // Refreshed/switched/re-encrypted ciphertexts stay with the
        // initiator, who stores and owns them.
        ProtocolOutput::Ciphertext(_) => {}
    }
    Ok(())
}
