// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use concerto_events::ConcertoError;

use crate::{Action, Node, OperationTree, Variable};

/// Parse a postfix circuit description into an operation tree.
///
/// Grammar: `TREE = VAL | OP '(' TREE ')' '(' TREE ')' ...` with the
/// number of parenthesized sub-trees fixed by the operator (2 for `+`
/// and `*`, 1 for `R`), and `VAL = 'v' ' ' name '@' ownerIndex`. `R`
/// may be followed by a decimal step count, defaulting to one slot.
///
/// A single left-to-right scan over the bytes: `(` descends into a new
/// child of the current node, `)` ascends to its parent, an operator
/// tags the current node, a `VAL` token makes it a leaf. Every
/// malformation is reported with its byte offset; no partial tree ever
/// escapes.
pub fn parse_circuit(input: &str) -> Result<OperationTree, ConcertoError> {
    Parser::new(input).run()
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    /// At the start of a node's content: an operator or `v`.
    AtNode,
    /// Operator consumed, the node still needs children.
    NeedChild,
    /// Node complete: only `)` (or the end, at the root) may follow.
    Complete,
}

struct ParseNode {
    action: Option<Action>,
    variable: Option<Variable>,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl ParseNode {
    fn new(parent: Option<usize>) -> Self {
        Self {
            action: None,
            variable: None,
            parent,
            children: Vec::new(),
        }
    }

    fn arity(&self) -> usize {
        // The state machine tags a node before giving it structure.
        self.action.expect("node action set before its children").arity()
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    nodes: Vec<ParseNode>,
    current: usize,
    state: State,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
            nodes: vec![ParseNode::new(None)],
            current: 0,
            state: State::AtNode,
        }
    }

    fn run(mut self) -> Result<OperationTree, ConcertoError> {
        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos] as char;
            match self.state {
                State::AtNode => self.node_start(c)?,
                State::NeedChild => match c {
                    '(' => self.descend(),
                    _ => return Err(self.unexpected(c, "'('")),
                },
                State::Complete => match c {
                    ')' => self.ascend()?,
                    _ => return Err(self.unexpected(c, "')' or end of input")),
                },
            }
        }

        if self.state != State::Complete || self.current != 0 {
            return Err(ConcertoError::ParseError {
                offset: self.bytes.len(),
                found: "end of input".into(),
                expected: match self.state {
                    State::AtNode => "an operator or 'v'".into(),
                    State::NeedChild => "'('".into(),
                    State::Complete => "')'".into(),
                },
            });
        }

        let nodes = self
            .nodes
            .into_iter()
            .map(|n| Node {
                action: n.action.expect("every closed node is tagged"),
                variable: n.variable,
                parent: n.parent,
                children: n.children,
            })
            .collect();
        Ok(OperationTree::from_nodes(nodes))
    }

    fn node_start(&mut self, c: char) -> Result<(), ConcertoError> {
        match c {
            '+' => {
                self.pos += 1;
                self.tag(Action::Add)
            }
            '*' => {
                self.pos += 1;
                self.tag(Action::Multiply)
            }
            'R' => {
                self.pos += 1;
                let steps = self.digits()?.unwrap_or(1);
                self.tag(Action::Rotate(steps))
            }
            'v' => self.variable(),
            _ => Err(self.unexpected(c, "an operator or 'v'")),
        }
    }

    fn tag(&mut self, action: Action) -> Result<(), ConcertoError> {
        self.nodes[self.current].action = Some(action);
        self.state = State::NeedChild;
        Ok(())
    }

    /// `VAL = 'v' ' ' name '@' ownerIndex`, cursor on the `v`.
    fn variable(&mut self) -> Result<(), ConcertoError> {
        self.pos += 1;
        if self.peek() != Some(' ') {
            return Err(self.unexpected_here("' '"));
        }
        self.pos += 1;

        let name_start = self.pos;
        while matches!(self.peek(), Some(c) if c != '@' && c != '(' && c != ')') {
            self.pos += 1;
        }
        if self.pos == name_start {
            return Err(self.unexpected_here("a variable name"));
        }
        let name = String::from_utf8_lossy(&self.bytes[name_start..self.pos]).into_owned();

        if self.peek() != Some('@') {
            return Err(self.unexpected_here("'@'"));
        }
        self.pos += 1;

        let owner_index = self
            .digits()?
            .ok_or_else(|| self.unexpected_here("an owner index"))?
            as usize;

        let node = &mut self.nodes[self.current];
        node.action = Some(Action::Get);
        node.variable = Some(Variable { name, owner_index });
        self.state = State::Complete;
        Ok(())
    }

    /// `(`: allocate a child of the current node and move into it.
    fn descend(&mut self) {
        let child = self.nodes.len();
        self.nodes.push(ParseNode::new(Some(self.current)));
        self.nodes[self.current].children.push(child);
        self.current = child;
        self.state = State::AtNode;
        self.pos += 1;
    }

    /// `)`: the current node is done; verify its arity and move to its
    /// parent, which either still needs children or is complete too.
    fn ascend(&mut self) -> Result<(), ConcertoError> {
        let Some(parent) = self.nodes[self.current].parent else {
            return Err(self.unexpected(')', "end of input"));
        };
        self.pos += 1;
        self.current = parent;
        let node = &self.nodes[self.current];
        self.state = if node.children.len() < node.arity() {
            State::NeedChild
        } else {
            State::Complete
        };
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.bytes.get(self.pos).map(|&b| b as char)
    }

    fn digits(&mut self) -> Result<Option<u64>, ConcertoError> {
        let start = self.pos;
        let mut value: u64 = 0;
        while let Some(c) = self.peek() {
            let Some(d) = c.to_digit(10) else { break };
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(d as u64))
                .ok_or_else(|| self.unexpected(c, "a number that fits in 64 bits"))?;
            self.pos += 1;
        }
        Ok((self.pos > start).then_some(value))
    }

    fn unexpected(&self, found: char, expected: &str) -> ConcertoError {
        ConcertoError::ParseError {
            offset: self.pos,
            found: format!("'{found}'"),
            expected: expected.into(),
        }
    }

    fn unexpected_here(&self, expected: &str) -> ConcertoError {
        match self.peek() {
            Some(c) => self.unexpected(c, expected),
            None => ConcertoError::ParseError {
                offset: self.bytes.len(),
                found: "end of input".into(),
                expected: expected.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeBuilder;
    use proptest::prelude::*;

    fn same_shape(a: &OperationTree, b: &OperationTree, ai: usize, bi: usize) -> bool {
        let (na, nb) = (a.node(ai), b.node(bi));
        na.action == nb.action
            && na.variable == nb.variable
            && na.children.len() == nb.children.len()
            && na
                .children
                .iter()
                .zip(&nb.children)
                .all(|(&ca, &cb)| same_shape(a, b, ca, cb))
    }

    #[test]
    fn parses_a_sum_of_two_variables() {
        let tree = parse_circuit("+(v a@0)(v b@1)").unwrap();
        let root = tree.node(tree.root());
        assert_eq!(root.action, Action::Add);
        assert_eq!(root.children.len(), 2);

        let left = tree.node(root.children[0]);
        assert_eq!(left.action, Action::Get);
        assert_eq!(
            left.variable,
            Some(Variable {
                name: "a".into(),
                owner_index: 0
            })
        );
        let right = tree.node(root.children[1]);
        assert_eq!(
            right.variable,
            Some(Variable {
                name: "b".into(),
                owner_index: 1
            })
        );
    }

    #[test]
    fn parses_nested_operators_and_rotation_steps() {
        let tree = parse_circuit("*(+(v a@0)(v b@1))(R3(v c@2))").unwrap();
        let root = tree.node(tree.root());
        assert_eq!(root.action, Action::Multiply);

        let sum = tree.node(root.children[0]);
        assert_eq!(sum.action, Action::Add);
        let rot = tree.node(root.children[1]);
        assert_eq!(rot.action, Action::Rotate(3));
        assert_eq!(rot.children.len(), 1);
    }

    #[test]
    fn bare_rotation_defaults_to_one_step() {
        let tree = parse_circuit("R(v a@0)").unwrap();
        assert_eq!(tree.node(tree.root()).action, Action::Rotate(1));
    }

    #[test]
    fn a_single_variable_is_a_circuit() {
        let tree = parse_circuit("v total@3").unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(
            tree.node(0).variable,
            Some(Variable {
                name: "total".into(),
                owner_index: 3
            })
        );
    }

    #[test]
    fn under_arity_fails_instead_of_truncating() {
        assert!(matches!(
            parse_circuit("+(v a@0)"),
            Err(ConcertoError::ParseError { offset: 8, .. })
        ));
        assert!(matches!(
            parse_circuit("*(v a@0)"),
            Err(ConcertoError::ParseError { .. })
        ));
    }

    #[test]
    fn over_arity_fails_instead_of_truncating() {
        assert!(matches!(
            parse_circuit("+(v a@0)(v b@1)(v c@0)"),
            Err(ConcertoError::ParseError { offset: 15, .. })
        ));
        assert!(matches!(
            parse_circuit("R(v a@0)(v b@0)"),
            Err(ConcertoError::ParseError { .. })
        ));
    }

    #[test]
    fn unmatched_parentheses_are_reported() {
        assert!(parse_circuit("+(v a@0)(v b@1))").is_err());
        assert!(parse_circuit("+(v a@0)(v b@1").is_err());
        assert!(parse_circuit("+((v a@0))(v b@1)").is_err());
    }

    #[test]
    fn malformed_variables_carry_the_offending_offset() {
        // Missing space after 'v'.
        assert!(matches!(
            parse_circuit("va@0"),
            Err(ConcertoError::ParseError { offset: 1, .. })
        ));
        // Empty name.
        assert!(matches!(
            parse_circuit("v @0"),
            Err(ConcertoError::ParseError { offset: 2, .. })
        ));
        // Missing '@'.
        assert!(parse_circuit("+(v a0)(v b@1)").is_err());
        // Non-numeric owner index.
        assert!(parse_circuit("v a@x").is_err());
    }

    #[test]
    fn oversized_numbers_fail_instead_of_wrapping() {
        // u64::MAX has twenty digits; twenty nines overflow on the last
        // one, at byte offset 20 (after the leading 'R').
        assert!(matches!(
            parse_circuit("R99999999999999999999(v a@0)"),
            Err(ConcertoError::ParseError { offset: 20, .. })
        ));
        assert!(matches!(
            parse_circuit("v a@99999999999999999999"),
            Err(ConcertoError::ParseError { .. })
        ));
    }

    #[test]
    fn unknown_symbols_are_rejected_where_found() {
        assert!(matches!(
            parse_circuit("-(v a@0)(v b@1)"),
            Err(ConcertoError::ParseError { offset: 0, .. })
        ));
        assert!(matches!(
            parse_circuit("+(v a@0)x(v b@1)"),
            Err(ConcertoError::ParseError { offset: 8, .. })
        ));
    }

    #[test]
    fn built_trees_render_to_parseable_postfix() {
        let mut b = TreeBuilder::new();
        let root = b.op(None, Action::Add);
        let prod = b.op(Some(root), Action::Multiply);
        b.leaf(Some(prod), "x", 0);
        b.leaf(Some(prod), "y", 1);
        let rot = b.op(Some(root), Action::Rotate(4));
        b.leaf(Some(rot), "z", 2);
        let tree = b.build();

        assert_eq!(tree.render(), "+(*(v x@0)(v y@1))(R4(v z@2))");
        let reparsed = parse_circuit(&tree.render()).unwrap();
        assert!(same_shape(&tree, &reparsed, tree.root(), reparsed.root()));
    }

    fn arb_tree() -> impl Strategy<Value = OperationTree> {
        let leaf = ("[a-z]{1,8}", 0usize..6).prop_map(|(name, owner)| {
            let mut b = TreeBuilder::new();
            b.leaf(None, name, owner);
            b.build()
        });
        leaf.prop_recursive(4, 32, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(l, r)| graft(Action::Add, vec![l, r])),
                (inner.clone(), inner.clone())
                    .prop_map(|(l, r)| graft(Action::Multiply, vec![l, r])),
                (1u64..128, inner).prop_map(|(steps, c)| graft(Action::Rotate(steps), vec![c])),
            ]
        })
    }

    /// Re-root the given subtrees under a fresh operator node.
    fn graft(action: Action, subtrees: Vec<OperationTree>) -> OperationTree {
        let mut b = TreeBuilder::new();
        let root = b.op(None, action);
        for sub in &subtrees {
            copy_into(&mut b, sub, sub.root(), root);
        }
        b.build()
    }

    fn copy_into(b: &mut TreeBuilder, src: &OperationTree, index: usize, parent: usize) {
        let node = src.node(index);
        let new = match node.action {
            Action::Get => {
                let var = node.variable.clone().unwrap();
                b.leaf(Some(parent), var.name, var.owner_index)
            }
            action => b.op(Some(parent), action),
        };
        for &child in &node.children {
            copy_into(b, src, child, new);
        }
    }

    proptest! {
        /// Rendering any tree and re-parsing it reproduces the shape:
        /// operator, arity and leaf names at every node.
        #[test]
        fn render_parse_round_trip(tree in arb_tree()) {
            let reparsed = parse_circuit(&tree.render()).unwrap();
            prop_assert!(same_shape(&tree, &reparsed, tree.root(), reparsed.root()));
        }
    }
}
