// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{bail, Result};
use concerto_events::PartyId;

/// One party's position in the spanning tree of an aggregation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreePosition {
    pub me: PartyId,
    pub parent: Option<PartyId>,
    pub children: Vec<PartyId>,
}

impl TreePosition {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Derive this party's position in the spanning tree rooted at
/// `initiator`. The overlay collaborator that maintains connectivity is
/// external; what every party must agree on is the tree shape, so it is
/// computed deterministically from the roster alone: rotate the roster
/// until the initiator sits first, then lay the parties out as a binary
/// heap.
pub fn tree_position(roster: &[PartyId], initiator: &PartyId, me: &PartyId) -> Result<TreePosition> {
    if roster.is_empty() {
        bail!("Cannot build a spanning tree over an empty roster");
    }
    let Some(root_idx) = roster.iter().position(|p| p == initiator) else {
        bail!("Initiator {} is not in the roster", initiator);
    };
    let rotated: Vec<&PartyId> = roster[root_idx..].iter().chain(&roster[..root_idx]).collect();
    let Some(my_idx) = rotated.iter().position(|p| *p == me) else {
        bail!("Party {} is not in the roster", me);
    };

    let parent = if my_idx == 0 {
        None
    } else {
        Some(rotated[(my_idx - 1) / 2].clone())
    };
    let mut children = Vec::new();
    for child_idx in [2 * my_idx + 1, 2 * my_idx + 2] {
        if child_idx < rotated.len() {
            children.push(rotated[child_idx].clone());
        }
    }

    Ok(TreePosition {
        me: me.clone(),
        parent,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: usize) -> Vec<PartyId> {
        (0..n)
            .map(|i| PartyId::new(format!("party{i}"), vec![i as u8]))
            .collect()
    }

    #[test]
    fn single_party_tree_is_a_lone_root() {
        let r = roster(1);
        let pos = tree_position(&r, &r[0], &r[0]).unwrap();
        assert!(pos.is_root());
        assert!(pos.is_leaf());
    }

    #[test]
    fn heap_layout_rooted_at_first_party() {
        let r = roster(5);
        let root = tree_position(&r, &r[0], &r[0]).unwrap();
        assert_eq!(root.children, vec![r[1].clone(), r[2].clone()]);

        let mid = tree_position(&r, &r[0], &r[1]).unwrap();
        assert_eq!(mid.parent, Some(r[0].clone()));
        assert_eq!(mid.children, vec![r[3].clone(), r[4].clone()]);

        let leaf = tree_position(&r, &r[0], &r[4]).unwrap();
        assert_eq!(leaf.parent, Some(r[1].clone()));
        assert!(leaf.is_leaf());
    }

    #[test]
    fn rotation_keeps_every_party_in_exactly_one_position() {
        // Root the tree at party 2 and check parent/child edges agree.
        let r = roster(4);
        let root = tree_position(&r, &r[2], &r[2]).unwrap();
        assert!(root.is_root());
        for child in &root.children {
            let pos = tree_position(&r, &r[2], child).unwrap();
            assert_eq!(pos.parent, Some(r[2].clone()));
        }
    }

    #[test]
    fn unknown_initiator_is_rejected() {
        let r = roster(3);
        let stranger = PartyId::new("stranger", vec![9]);
        assert!(tree_position(&r, &stranger, &r[0]).is_err());
    }
}
