// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use async_trait::async_trait;
use concerto_events::{CiphertextId, ConcertoError};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{Action, OperationTree, Variable};

/// Resolves a leaf's variable reference to a ciphertext id, either from
/// a local name table or by asking the owner encoded in the reference.
#[async_trait]
pub trait Supplier: Send + Sync + 'static {
    async fn supply(&self, name: &str, owner_index: usize) -> Result<CiphertextId, ConcertoError>;
}

/// The operations an internal tree node delegates, already scoped to
/// one session.
#[async_trait]
pub trait EvalOps: Send + Sync + 'static {
    async fn sum(
        &self,
        lhs: CiphertextId,
        rhs: CiphertextId,
    ) -> Result<CiphertextId, ConcertoError>;

    async fn multiply(
        &self,
        lhs: CiphertextId,
        rhs: CiphertextId,
    ) -> Result<CiphertextId, ConcertoError>;

    async fn rotate(
        &self,
        operand: CiphertextId,
        steps: u64,
    ) -> Result<CiphertextId, ConcertoError>;
}

/// Evaluate an operation tree, one concurrent task per node.
///
/// All tasks start up front; each edge is a one-shot rendezvous
/// channel. A leaf resolves its variable through the supplier and
/// pushes the id; an internal node first awaits every child in
/// declaration order, then delegates its operation and pushes the
/// outcome. Any failure becomes the nil sentinel pushed upward — no
/// sibling is cancelled, and the root simply yields nil.
pub async fn evaluate(
    tree: &OperationTree,
    supplier: Arc<dyn Supplier>,
    ops: Arc<dyn EvalOps>,
) -> CiphertextId {
    let mut outputs: Vec<Option<oneshot::Sender<CiphertextId>>> = Vec::with_capacity(tree.len());
    let mut inputs: Vec<Option<oneshot::Receiver<CiphertextId>>> = Vec::with_capacity(tree.len());
    for _ in 0..tree.len() {
        let (tx, rx) = oneshot::channel();
        outputs.push(Some(tx));
        inputs.push(Some(rx));
    }

    let root_rx = inputs[tree.root()]
        .take()
        .expect("root channel taken once");

    for index in 0..tree.len() {
        let node = tree.node(index);
        let out = outputs[index].take().expect("each output taken once");
        let children: Vec<oneshot::Receiver<CiphertextId>> = node
            .children
            .iter()
            .map(|&c| inputs[c].take().expect("each input taken once"))
            .collect();
        let action = node.action;
        let variable = node.variable.clone();
        let supplier = Arc::clone(&supplier);
        let ops = Arc::clone(&ops);

        tokio::spawn(async move {
            let result = run_node(action, variable, children, supplier, ops).await;
            // The receiver is gone only if the whole evaluation was
            // dropped; nothing to do then.
            let _ = out.send(result);
        });
    }

    root_rx.await.unwrap_or_else(|_| CiphertextId::nil())
}

async fn run_node(
    action: Action,
    variable: Option<Variable>,
    children: Vec<oneshot::Receiver<CiphertextId>>,
    supplier: Arc<dyn Supplier>,
    ops: Arc<dyn EvalOps>,
) -> CiphertextId {
    let mut resolved = Vec::with_capacity(children.len());
    for rx in children {
        match rx.await {
            Ok(id) => resolved.push(id),
            Err(_) => return CiphertextId::nil(),
        }
    }
    // A nil child already failed; don't delegate an operation that can
    // only be refused.
    if resolved.iter().any(CiphertextId::is_nil) {
        return CiphertextId::nil();
    }

    let outcome = match action {
        Action::Get => {
            let Some(var) = variable else {
                return CiphertextId::nil();
            };
            supplier.supply(&var.name, var.owner_index).await
        }
        Action::Add => ops.sum(resolved[0].clone(), resolved[1].clone()).await,
        Action::Multiply => ops.multiply(resolved[0].clone(), resolved[1].clone()).await,
        Action::Rotate(steps) => ops.rotate(resolved[0].clone(), steps).await,
    };

    match outcome {
        Ok(id) => {
            debug!(%id, "Node evaluated");
            id
        }
        Err(e) => {
            warn!("Node failed, pushing nil upward: {e}");
            CiphertextId::nil()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_circuit, TreeBuilder};
    use concerto_events::PartyId;
    use std::{collections::HashMap, sync::Mutex};

    /// In-memory stand-in for the delegation layer: resolves names from
    /// a fixed table and "computes" by minting ids at a fake party,
    /// recording every operation and every stored result.
    struct FakeFabric {
        table: HashMap<(String, usize), CiphertextId>,
        log: Mutex<Vec<String>>,
        stored: Mutex<usize>,
    }

    impl FakeFabric {
        fn new() -> Self {
            Self {
                table: HashMap::new(),
                log: Mutex::new(Vec::new()),
                stored: Mutex::new(0),
            }
        }

        fn bind(&mut self, name: &str, owner_index: usize) -> CiphertextId {
            let id = CiphertextId::mint(PartyId::new(format!("p{owner_index}"), vec![1]));
            self.table
                .insert((name.to_string(), owner_index), id.clone());
            id
        }

        fn compute(&self, op: &str) -> CiphertextId {
            self.log.lock().unwrap().push(op.to_string());
            *self.stored.lock().unwrap() += 1;
            CiphertextId::mint(PartyId::new("computer", vec![9]))
        }
    }

    #[async_trait]
    impl Supplier for FakeFabric {
        async fn supply(
            &self,
            name: &str,
            owner_index: usize,
        ) -> Result<CiphertextId, ConcertoError> {
            self.table
                .get(&(name.to_string(), owner_index))
                .cloned()
                .ok_or_else(|| ConcertoError::NotFound(format!("variable {name}")))
        }
    }

    #[async_trait]
    impl EvalOps for FakeFabric {
        async fn sum(
            &self,
            _lhs: CiphertextId,
            _rhs: CiphertextId,
        ) -> Result<CiphertextId, ConcertoError> {
            Ok(self.compute("sum"))
        }

        async fn multiply(
            &self,
            _lhs: CiphertextId,
            _rhs: CiphertextId,
        ) -> Result<CiphertextId, ConcertoError> {
            Ok(self.compute("multiply"))
        }

        async fn rotate(
            &self,
            _operand: CiphertextId,
            steps: u64,
        ) -> Result<CiphertextId, ConcertoError> {
            Ok(self.compute(&format!("rotate{steps}")))
        }
    }

    #[tokio::test]
    async fn evaluates_a_nested_tree_bottom_up() {
        let mut fabric = FakeFabric::new();
        fabric.bind("a", 0);
        fabric.bind("b", 1);
        fabric.bind("c", 2);
        let fabric = Arc::new(fabric);

        let tree = parse_circuit("+(*(v a@0)(v b@1))(R3(v c@2))").unwrap();
        let result = evaluate(&tree, fabric.clone(), fabric.clone()).await;

        assert!(!result.is_nil());
        let log = fabric.log.lock().unwrap().clone();
        assert_eq!(log.len(), 3);
        // The root sum runs last, once both subtrees delivered.
        assert_eq!(log[2], "sum");
        assert!(log.contains(&"multiply".to_string()));
        assert!(log.contains(&"rotate3".to_string()));
    }

    #[tokio::test]
    async fn a_single_leaf_resolves_without_any_operation() {
        let mut fabric = FakeFabric::new();
        let bound = fabric.bind("a", 0);
        let fabric = Arc::new(fabric);

        let tree = parse_circuit("v a@0").unwrap();
        let result = evaluate(&tree, fabric.clone(), fabric.clone()).await;
        assert_eq!(result, bound);
        assert_eq!(*fabric.stored.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn unresolvable_leaf_pushes_nil_to_the_root_and_stores_nothing() {
        let mut fabric = FakeFabric::new();
        fabric.bind("a", 0);
        // "b" is never bound.
        let fabric = Arc::new(fabric);

        let tree = parse_circuit("+(v a@0)(v b@1)").unwrap();
        let result = evaluate(&tree, fabric.clone(), fabric.clone()).await;

        assert!(result.is_nil());
        assert_eq!(*fabric.stored.lock().unwrap(), 0);
        assert!(fabric.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_in_one_subtree_does_not_stop_its_sibling() {
        let mut fabric = FakeFabric::new();
        fabric.bind("a", 0);
        fabric.bind("b", 1);
        // The left product can complete; the right leaf cannot.
        let fabric = Arc::new(fabric);

        let tree = parse_circuit("+(*(v a@0)(v b@1))(v missing@2)").unwrap();
        let result = evaluate(&tree, fabric.clone(), fabric.clone()).await;

        assert!(result.is_nil());
        // The sibling subtree still ran to completion.
        assert_eq!(fabric.log.lock().unwrap().clone(), vec!["multiply"]);
    }

    #[tokio::test]
    async fn deep_trees_evaluate_without_a_blocking_traversal() {
        let mut fabric = FakeFabric::new();
        fabric.bind("x", 0);
        let fabric = Arc::new(fabric);

        let mut b = TreeBuilder::new();
        let mut parent = b.op(None, Action::Rotate(1));
        for _ in 0..16 {
            parent = b.op(Some(parent), Action::Rotate(1));
        }
        b.leaf(Some(parent), "x", 0);
        let tree = b.build();

        let result = evaluate(&tree, fabric.clone(), fabric.clone()).await;
        assert!(!result.is_nil());
        assert_eq!(fabric.log.lock().unwrap().len(), 17);
    }
}
