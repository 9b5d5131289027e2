// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use async_trait::async_trait;
use concerto_delegate::Delegator;
use concerto_events::{CiphertextId, CircuitId, ConcertoError, Rotation, SessionId};
use concerto_session::{Session, SessionStore};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};
use tracing::info;

use crate::{evaluate, parse_circuit, EvalOps, OperationTree, Supplier};

/// One parsed-and-registered operation graph plus its table of named
/// intermediate results. The tree is immutable; the name table is
/// written only by the owning party and read by delegation callbacks.
pub struct Circuit {
    id: CircuitId,
    session_id: SessionId,
    tree: OperationTree,
    names: RwLock<HashMap<String, CiphertextId>>,
}

impl Circuit {
    fn new(session_id: SessionId, tree: OperationTree) -> Arc<Self> {
        Arc::new(Self {
            id: CircuitId::mint(),
            session_id,
            tree,
            names: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> CircuitId {
        self.id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn tree(&self) -> &OperationTree {
        &self.tree
    }

    pub fn bind_name(&self, name: impl Into<String>, id: CiphertextId) {
        self.names
            .write()
            .expect("name table poisoned")
            .insert(name.into(), id);
    }

    pub fn lookup(&self, name: &str) -> Result<CiphertextId, ConcertoError> {
        self.names
            .read()
            .expect("name table poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| ConcertoError::NotFound(format!("variable {name}")))
    }
}

/// The circuits registered at this party, and the machinery to run
/// them: parsing on submission, concurrent evaluation on demand.
pub struct CircuitRegistry {
    delegator: Arc<Delegator>,
    sessions: Arc<SessionStore>,
    circuits: RwLock<HashMap<CircuitId, Arc<Circuit>>>,
}

impl CircuitRegistry {
    pub fn new(delegator: Arc<Delegator>, sessions: Arc<SessionStore>) -> Arc<Self> {
        Arc::new(Self {
            delegator,
            sessions,
            circuits: RwLock::new(HashMap::new()),
        })
    }

    /// Parse and register a circuit. A parse error aborts creation
    /// entirely; no partial tree is ever registered.
    pub fn create_circuit(
        &self,
        session_id: &SessionId,
        description: &str,
    ) -> Result<CircuitId, ConcertoError> {
        self.sessions.get(session_id)?;
        let tree = parse_circuit(description)?;
        let circuit = Circuit::new(session_id.clone(), tree);
        let id = circuit.id();
        self.circuits
            .write()
            .expect("circuit map poisoned")
            .insert(id, circuit);
        info!(circuit = %id, session = %session_id, "Circuit registered");
        Ok(id)
    }

    pub fn get(&self, id: &CircuitId) -> Result<Arc<Circuit>, ConcertoError> {
        self.circuits
            .read()
            .expect("circuit map poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConcertoError::NotFound(format!("{id}")))
    }

    /// Bind a variable name in both the circuit's own table and the
    /// session's, so remote parties can resolve it by asking us.
    pub fn name_ciphertext(
        &self,
        circuit_id: &CircuitId,
        name: &str,
        id: CiphertextId,
    ) -> Result<(), ConcertoError> {
        let circuit = self.get(circuit_id)?;
        let session = self.sessions.get(circuit.session_id())?;
        circuit.bind_name(name, id.clone());
        session.bind_name(name, id)?;
        Ok(())
    }

    /// Run a registered circuit to completion. A failed evaluation
    /// yields the nil id; nothing is stored for it anywhere.
    pub async fn evaluate_circuit(
        &self,
        circuit_id: &CircuitId,
    ) -> Result<CiphertextId, ConcertoError> {
        let circuit = self.get(circuit_id)?;
        let session = self.sessions.get(circuit.session_id())?;
        let fabric = Arc::new(SessionFabric {
            delegator: Arc::clone(&self.delegator),
            session,
            circuit: Arc::clone(&circuit),
        });
        let result = evaluate(circuit.tree(), fabric.clone(), fabric).await;
        info!(circuit = %circuit_id, %result, "Circuit evaluated");
        Ok(result)
    }
}

/// [`Supplier`]/[`EvalOps`] over the delegation layer, scoped to one
/// session and one circuit.
struct SessionFabric {
    delegator: Arc<Delegator>,
    session: Arc<Session>,
    circuit: Arc<Circuit>,
}

#[async_trait]
impl Supplier for SessionFabric {
    async fn supply(&self, name: &str, owner_index: usize) -> Result<CiphertextId, ConcertoError> {
        let owner = self.session.party_at(owner_index)?;
        if &owner == self.delegator.me() {
            self.circuit
                .lookup(name)
                .or_else(|_| self.session.resolve_name(name))
        } else {
            self.delegator
                .resolve_name(self.session.id(), &owner, name)
                .await
        }
    }
}

#[async_trait]
impl EvalOps for SessionFabric {
    async fn sum(
        &self,
        lhs: CiphertextId,
        rhs: CiphertextId,
    ) -> Result<CiphertextId, ConcertoError> {
        self.delegator.sum(self.session.id(), lhs, rhs).await
    }

    async fn multiply(
        &self,
        lhs: CiphertextId,
        rhs: CiphertextId,
    ) -> Result<CiphertextId, ConcertoError> {
        self.delegator.multiply(self.session.id(), lhs, rhs).await
    }

    async fn rotate(
        &self,
        operand: CiphertextId,
        steps: u64,
    ) -> Result<CiphertextId, ConcertoError> {
        self.delegator
            .rotate(self.session.id(), operand, Rotation::Left(steps))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concerto_events::PartyId;

    #[test]
    fn circuit_names_shadow_nothing_until_bound() {
        let tree = parse_circuit("v a@0").unwrap();
        let circuit = Circuit::new(SessionId::new("s1"), tree);
        assert!(circuit.lookup("a").is_err());

        let id = CiphertextId::mint(PartyId::new("p0", vec![0]));
        circuit.bind_name("a", id.clone());
        assert_eq!(circuit.lookup("a").unwrap(), id);
    }

    #[test]
    fn circuits_get_distinct_ids() {
        let tree = parse_circuit("v a@0").unwrap();
        let a = Circuit::new(SessionId::new("s1"), tree.clone());
        let b = Circuit::new(SessionId::new("s1"), tree);
        assert_ne!(a.id(), b.id());
    }
}
