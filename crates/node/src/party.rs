// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{anyhow, Context, Result};
use concerto_aggregate::AggEngine;
use concerto_circuit::CircuitRegistry;
use concerto_config::NodeConfig;
use concerto_delegate::{Courier, Delegator, Handler, PendingRequests, DEFAULT_REQUEST_TIMEOUT};
use concerto_events::{
    CiphertextId, CircuitId, ConcertoError, Envelope, PartyId, Rotation, SessionId, SharesId,
};
use concerto_fhe::{normalize_rotation, HomomorphicSuite, ProtocolOutput, ProtocolParams};
use concerto_net::{NetCommand, NetEvent, NetHandle};
use concerto_session::{Session, SessionStore};
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// One fabric participant, wired to a transport handle. Owns the event
/// loop that feeds inbound messages to the request handler, the
/// pending-request table and the aggregation engine; exposes the client
/// boundary for sessions, keys and circuits.
pub struct Party {
    me: PartyId,
    suite: Arc<dyn HomomorphicSuite>,
    sessions: Arc<SessionStore>,
    engine: Arc<AggEngine>,
    delegator: Arc<Delegator>,
    circuits: Arc<CircuitRegistry>,
    event_loop: JoinHandle<()>,
}

impl Party {
    /// Build a party over an attached transport handle and start its
    /// event loop.
    pub fn attach(me: PartyId, suite: Arc<dyn HomomorphicSuite>, net: NetHandle) -> Arc<Self> {
        Self::attach_with_timeout(me, suite, net, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Build a party from loaded configuration: identity and request
    /// timeout come from the config, the transport handle from whoever
    /// attached us to the overlay.
    pub fn attach_from_config(
        config: &NodeConfig,
        suite: Arc<dyn HomomorphicSuite>,
        net: NetHandle,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::attach_with_timeout(
            config.party_id()?,
            suite,
            net,
            config.request_timeout(),
        ))
    }

    pub fn attach_with_timeout(
        me: PartyId,
        suite: Arc<dyn HomomorphicSuite>,
        net: NetHandle,
        request_timeout: Duration,
    ) -> Arc<Self> {
        let sessions = Arc::new(SessionStore::new());
        let pending = Arc::new(PendingRequests::new());
        let courier = Courier::new(me.clone(), net.cmds.clone(), pending.clone(), request_timeout);
        let engine = AggEngine::new(
            me.clone(),
            suite.clone(),
            sessions.clone(),
            net.cmds.clone(),
        );
        let handler = Handler::new(
            me.clone(),
            sessions.clone(),
            suite.clone(),
            engine.clone(),
            courier.clone(),
        );
        let delegator = Arc::new(Delegator::new(courier, handler.clone(), sessions.clone()));
        let circuits = CircuitRegistry::new(delegator.clone(), sessions.clone());

        let event_loop = tokio::spawn(event_loop(
            me.clone(),
            net.subscribe(),
            net.cmds.clone(),
            handler,
            pending,
            engine.clone(),
        ));
        info!(me = %me, "Party attached");

        Arc::new(Self {
            me,
            suite,
            sessions,
            engine,
            delegator,
            circuits,
            event_loop,
        })
    }

    pub fn me(&self) -> &PartyId {
        &self.me
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn delegator(&self) -> &Arc<Delegator> {
        &self.delegator
    }

    // ---- session lifecycle ----

    pub fn create_session(
        &self,
        id: SessionId,
        roster: Vec<PartyId>,
        params: Vec<u8>,
        key_share: Vec<u8>,
    ) -> Result<Arc<Session>> {
        self.sessions
            .create(Session::new(id, self.me.clone(), roster, params, key_share)?)
    }

    pub fn close_session(&self, id: &SessionId) -> Result<(), ConcertoError> {
        self.sessions.teardown(id)
    }

    // ---- key ceremonies ----

    /// Run collective key generation over the whole roster. Every party
    /// ends up holding the same public key.
    pub async fn generate_public_key(&self, session_id: &SessionId) -> Result<()> {
        let session = self.sessions.get(session_id)?;
        self.run_key_ceremony(&session, ProtocolParams::collective_keygen())
            .await
    }

    /// Generate the evaluation key relinearization needs.
    pub async fn generate_evaluation_key(&self, session_id: &SessionId) -> Result<()> {
        let session = self.sessions.get(session_id)?;
        self.run_key_ceremony(&session, ProtocolParams::relin_keygen())
            .await
    }

    /// Make sure the rotation key for the given rotation exists,
    /// running the key ceremony if it does not. Identity rotations need
    /// no key.
    pub async fn ensure_rotation_key(
        &self,
        session_id: &SessionId,
        rotation: Rotation,
    ) -> Result<()> {
        let session = self.sessions.get(session_id)?;
        let steps = normalize_rotation(rotation, self.suite.period());
        if steps == 0 || session.rotation_key(steps).is_some() {
            return Ok(());
        }
        self.run_key_ceremony(&session, ProtocolParams::rot_keygen(steps))
            .await
    }

    async fn run_key_ceremony(&self, session: &Arc<Session>, params: ProtocolParams) -> Result<()> {
        let kind = params.kind;
        match self.engine.initiate(session, params).await? {
            ProtocolOutput::Key(_) => Ok(()),
            other => Err(anyhow!("{kind} ceremony produced {other:?}, not a key")),
        }
    }

    // ---- data entry ----

    /// Encrypt a plaintext under the session's collective public key
    /// and store it in this party's ledger.
    pub fn encrypt(&self, session_id: &SessionId, plaintext: &[u8]) -> Result<CiphertextId> {
        let session = self.sessions.get(session_id)?;
        let public_key = session
            .public_key()
            .context("collective public key not generated yet")?;
        let ciphertext = self.suite.encrypt(plaintext, &public_key)?;
        Ok(session.store(ciphertext)?)
    }

    // ---- circuits ----

    pub fn create_circuit(
        &self,
        session_id: &SessionId,
        description: &str,
    ) -> Result<CircuitId, ConcertoError> {
        self.circuits.create_circuit(session_id, description)
    }

    pub fn name_ciphertext(
        &self,
        circuit_id: &CircuitId,
        name: &str,
        id: CiphertextId,
    ) -> Result<(), ConcertoError> {
        self.circuits.name_ciphertext(circuit_id, name, id)
    }

    /// Evaluate a registered circuit. A failed evaluation yields the
    /// nil id with nothing stored for it.
    pub async fn evaluate_circuit(
        &self,
        circuit_id: &CircuitId,
    ) -> Result<CiphertextId, ConcertoError> {
        self.circuits.evaluate_circuit(circuit_id).await
    }

    // ---- shares conversions ----

    pub async fn encryption_to_shares(
        &self,
        session_id: &SessionId,
        operand: CiphertextId,
    ) -> Result<SharesId, ConcertoError> {
        self.delegator.encryption_to_shares(session_id, operand).await
    }

    pub async fn shares_to_encryption(
        &self,
        session_id: &SessionId,
        operand: SharesId,
    ) -> Result<CiphertextId, ConcertoError> {
        self.delegator.shares_to_encryption(session_id, operand).await
    }
}

impl Drop for Party {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

/// Feed inbound transport events to their consumers: requests to the
/// handler (one task each, so a slow multi-party operation never blocks
/// the loop), replies to the pending table, aggregation messages to the
/// engine.
async fn event_loop(
    me: PartyId,
    mut events: broadcast::Receiver<NetEvent>,
    cmds: tokio::sync::mpsc::Sender<NetCommand>,
    handler: Arc<Handler>,
    pending: Arc<PendingRequests>,
    engine: Arc<AggEngine>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                error!(me = %me, skipped = n, "Event loop lagged behind the transport");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(me = %me, "Transport closed, event loop exiting");
                return;
            }
        };

        let NetEvent::Message { from, envelope } = event;
        match envelope {
            Envelope::Request(request) => {
                let handler = handler.clone();
                let cmds = cmds.clone();
                tokio::spawn(async move {
                    let to = from.clone();
                    let reply = handler.handle(from, request).await;
                    let _ = cmds
                        .send(NetCommand::Send {
                            to,
                            envelope: Envelope::Reply(reply),
                        })
                        .await;
                });
            }
            Envelope::Reply(reply) => {
                if let Err(e) = pending.resolve(reply) {
                    warn!(me = %me, "Discarding uncorrelated reply: {e}");
                }
            }
            Envelope::Aggregation(msg) => engine.deliver(msg).await,
        }
    }
}
