// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::fmt::Write;

/// What one operation-tree node does to its children's outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Leaf: look up a named ciphertext.
    Get,
    Add,
    Multiply,
    /// Left rotation of the plaintext slots by the given step count.
    Rotate(u64),
}

impl Action {
    /// Number of children the operator requires. Fixed per operator;
    /// the parser rejects anything else.
    pub fn arity(&self) -> usize {
        match self {
            Action::Get => 0,
            Action::Add | Action::Multiply => 2,
            Action::Rotate(_) => 1,
        }
    }
}

/// A leaf's variable reference: a name plus the roster index of the
/// party whose name table binds it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub owner_index: usize,
}

/// One node of an [`OperationTree`]. Nodes live in the tree's arena and
/// refer to each other by index: `parent` is navigation only, children
/// are listed in declaration order.
#[derive(Clone, Debug)]
pub struct Node {
    pub action: Action,
    pub variable: Option<Variable>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// An immutable parsed circuit. Built once by the parser (or the
/// programmatic builder) and only read thereafter; per-node output
/// channels are created per evaluation, not stored here.
#[derive(Clone, Debug)]
pub struct OperationTree {
    nodes: Vec<Node>,
}

impl OperationTree {
    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// The root is always the first node the parser allocates.
    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render back to the postfix form the parser accepts.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(self.root(), &mut out);
        out
    }

    fn render_node(&self, index: usize, out: &mut String) {
        let node = &self.nodes[index];
        match node.action {
            Action::Get => {
                let var = node.variable.as_ref().expect("leaf without a variable");
                let _ = write!(out, "v {}@{}", var.name, var.owner_index);
            }
            Action::Add => out.push('+'),
            Action::Multiply => out.push('*'),
            Action::Rotate(steps) => {
                out.push('R');
                if steps != 1 {
                    let _ = write!(out, "{steps}");
                }
            }
        }
        for &child in &node.children {
            out.push('(');
            self.render_node(child, out);
            out.push(')');
        }
    }
}

/// Programmatic construction, mirroring what the parser builds. Used by
/// clients assembling circuits in code and by round-trip tests.
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn leaf(&mut self, parent: Option<usize>, name: impl Into<String>, owner_index: usize) -> usize {
        self.push(
            parent,
            Action::Get,
            Some(Variable {
                name: name.into(),
                owner_index,
            }),
        )
    }

    pub fn op(&mut self, parent: Option<usize>, action: Action) -> usize {
        self.push(parent, action, None)
    }

    fn push(&mut self, parent: Option<usize>, action: Action, variable: Option<Variable>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node {
            action,
            variable,
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(index);
        }
        index
    }

    pub fn build(self) -> OperationTree {
        OperationTree::from_nodes(self.nodes)
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
