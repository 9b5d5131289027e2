// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use concerto_events::{
    AggKind, AggMessage, ConcertoError, Envelope, PartyId, ProtocolId, SessionId,
};
use concerto_net::{NetCommand, TreePosition};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// One "combine N parties' partial contributions into one collective
/// value, then disseminate it" sub-protocol. The skeleton below is the
/// only thing that runs; a protocol only supplies the two functions.
///
/// `combine` must be associative and commutative: child shares are
/// folded in arrival order.
pub trait Protocol: Send + Sync + 'static {
    type Params: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Share: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn local_share(&self, params: &Self::Params, key_share: &[u8]) -> Result<Self::Share>;

    fn combine(&self, acc: Self::Share, incoming: Self::Share) -> Self::Share;
}

/// Identity of one aggregation run; every message of the run carries
/// its protocol id.
#[derive(Clone, Debug)]
pub struct AggRun {
    pub protocol_id: ProtocolId,
    pub session_id: SessionId,
    pub kind: AggKind,
    pub initiator: PartyId,
}

/// Phases one party moves through during a run. Tracked for tracing and
/// asserted on in tests; the run itself is the linear flow of
/// [`run_party`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggState {
    Idle,
    AwaitingParams,
    ComputingLocalShare,
    AggregatingChildren,
    Finalized,
    AwaitingParentResult,
    Broadcasting,
    Done,
}

/// Run one party's side of an aggregation protocol attached to its
/// spanning-tree position.
///
/// The initiator seeds its own mailbox with the `Parameters` message;
/// parameters then flow top-down unchanged, partial shares flow
/// bottom-up and are folded in arrival order, and the root's
/// accumulator — the collective result — flows back down. Returns the
/// collective result as every party's skeleton completes.
///
/// There is no partial-result recovery: any failure aborts this party's
/// branch with [`ConcertoError::ProtocolAborted`] and a fresh run must
/// be started from `Idle`.
pub async fn run_party<P: Protocol>(
    protocol: &P,
    key_share: &[u8],
    position: &TreePosition,
    run: &AggRun,
    mailbox: &mut mpsc::Receiver<AggMessage>,
    cmds: &mpsc::Sender<NetCommand>,
) -> Result<P::Share, ConcertoError> {
    let mut state = AggState::AwaitingParams;
    trace!(protocol = %run.protocol_id, kind = %run.kind, ?state, "Aggregation party started");

    // Shares from eager children can arrive while we are still in
    // earlier phases; they are stashed, never dropped.
    let mut stash: Vec<AggMessage> = Vec::new();

    // Phase 1: top-down parameter distribution.
    let (params, params_msg) = loop {
        let msg = recv(mailbox, run).await?;
        match msg {
            AggMessage::Parameters { ref params, .. } => {
                let decoded: P::Params = decode(params)?;
                break (decoded, msg);
            }
            other => stash.push(other),
        }
    };
    for child in &position.children {
        send(cmds, child, params_msg.clone()).await?;
    }

    // Phase 2: one local share per party.
    state = AggState::ComputingLocalShare;
    trace!(protocol = %run.protocol_id, ?state, "Computing local share");
    let mut acc = protocol
        .local_share(&params, key_share)
        .map_err(|e| ConcertoError::ProtocolAborted(format!("local share failed: {e:#}")))?;

    // Phase 3: fold one reply per child, order-independent.
    state = AggState::AggregatingChildren;
    trace!(protocol = %run.protocol_id, ?state, children = position.children.len(), "Aggregating children");
    let mut todo: HashSet<PartyId> = position.children.iter().cloned().collect();
    let mut inbound = stash.into_iter();
    while !todo.is_empty() {
        let msg = match inbound.next() {
            Some(msg) => msg,
            None => recv(mailbox, run).await?,
        };
        match msg {
            AggMessage::PartialShare { from, share, .. } => {
                if !todo.remove(&from) {
                    warn!(protocol = %run.protocol_id, %from, "Duplicate or foreign partial share");
                    continue;
                }
                acc = protocol.combine(acc, decode(&share)?);
                trace!(protocol = %run.protocol_id, %from, remaining = todo.len(), "Child share folded");
            }
            other => warn!(protocol = %run.protocol_id, ?other, "Unexpected message while aggregating"),
        }
    }

    // Phase 4/5: the root's accumulator is the collective result;
    // everyone else sends up and waits for it.
    let result_msg = match &position.parent {
        None => {
            state = AggState::Finalized;
            trace!(protocol = %run.protocol_id, ?state, "Root finalized collective result");
            AggMessage::CollectiveResult {
                protocol_id: run.protocol_id,
                session_id: run.session_id.clone(),
                kind: run.kind,
                result: encode(&acc)?,
            }
        }
        Some(parent) => {
            send(
                cmds,
                parent,
                AggMessage::PartialShare {
                    protocol_id: run.protocol_id,
                    session_id: run.session_id.clone(),
                    kind: run.kind,
                    from: position.me.clone(),
                    share: encode(&acc)?,
                },
            )
            .await?;
            state = AggState::AwaitingParentResult;
            trace!(protocol = %run.protocol_id, ?state, "Awaiting collective result");
            loop {
                match recv(mailbox, run).await? {
                    msg @ AggMessage::CollectiveResult { .. } => break msg,
                    other => warn!(protocol = %run.protocol_id, ?other, "Unexpected message while awaiting result"),
                }
            }
        }
    };

    // Phase 6: disseminate downwards and finish.
    state = AggState::Broadcasting;
    trace!(protocol = %run.protocol_id, ?state, "Broadcasting collective result");
    for child in &position.children {
        send(cmds, child, result_msg.clone()).await?;
    }
    let AggMessage::CollectiveResult { result, .. } = result_msg else {
        unreachable!("result_msg is constructed as CollectiveResult above");
    };
    state = AggState::Done;
    trace!(protocol = %run.protocol_id, ?state, "Aggregation party done");
    decode(&result)
}

async fn recv(
    mailbox: &mut mpsc::Receiver<AggMessage>,
    run: &AggRun,
) -> Result<AggMessage, ConcertoError> {
    mailbox.recv().await.ok_or_else(|| {
        ConcertoError::ProtocolAborted(format!("mailbox closed for run {}", run.protocol_id))
    })
}

async fn send(
    cmds: &mpsc::Sender<NetCommand>,
    to: &PartyId,
    msg: AggMessage,
) -> Result<(), ConcertoError> {
    cmds.send(NetCommand::Send {
        to: to.clone(),
        envelope: Envelope::Aggregation(msg),
    })
    .await
    .map_err(|_| ConcertoError::ProtocolAborted("transport channel closed".into()))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ConcertoError> {
    bincode::serialize(value)
        .map_err(|e| ConcertoError::ProtocolAborted(format!("encode failed: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ConcertoError> {
    bincode::deserialize(bytes)
        .map_err(|e| ConcertoError::ProtocolAborted(format!("decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Toy numeric protocol standing in for the cryptographic ones.
    struct XorProtocol;

    impl Protocol for XorProtocol {
        type Params = u64;
        type Share = u64;

        fn local_share(&self, params: &u64, key_share: &[u8]) -> Result<u64> {
            Ok(params ^ key_share.first().copied().unwrap_or_default() as u64)
        }

        fn combine(&self, acc: u64, incoming: u64) -> u64 {
            acc ^ incoming
        }
    }

    fn permutations(items: &[u64]) -> Vec<Vec<u64>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for (i, head) in items.iter().enumerate() {
            let mut rest = items.to_vec();
            rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, *head);
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn combine_is_order_independent() {
        let protocol = XorProtocol;
        let shares = [3u64, 17, 255, 1024];
        let reference = shares[1..]
            .iter()
            .fold(shares[0], |acc, s| protocol.combine(acc, *s));
        for perm in permutations(&shares) {
            let folded = perm[1..]
                .iter()
                .fold(perm[0], |acc, s| protocol.combine(acc, *s));
            assert_eq!(folded, reference);
        }
    }
}
