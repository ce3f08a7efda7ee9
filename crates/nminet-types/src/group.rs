//! Redundancy group partitioner.
//!
//! Ports reference each other through `team_members`. The partitioner turns
//! those references into disjoint groups, configured primary first:
//!
//! | Input | Result |
//! |-------|--------|
//! | 7 ⇄ 8, 7 primary | `[7, 8]` |
//! | 5 ⇄ 6, 6 primary | `[6, 5]` |
//! | 3, 4 standalone | `[3]`, `[4]` |
//! | 1 → 9 (9 unknown) | `[1]` |
//!
//! References are never trusted to be symmetric; a dangling or one-sided
//! reference simply fails to merge.

use crate::port::{PortId, RedundancyMode, RedundancyType};
use crate::snapshot::{NetSnapshot, PortSnapshot};
use std::collections::HashMap;

/// Ordered ports sharing one team; never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedundancyGroup<'a> {
    members: Vec<&'a PortSnapshot>,
}

impl<'a> RedundancyGroup<'a> {
    fn single(port: &'a PortSnapshot) -> Self {
        Self {
            members: vec![port],
        }
    }

    /// Builds a group from an already ordered member list.
    ///
    /// Returns `None` for an empty list.
    pub fn from_members(members: Vec<&'a PortSnapshot>) -> Option<Self> {
        if members.is_empty() {
            None
        } else {
            Some(Self { members })
        }
    }

    /// Head of the group: the configured primary when one exists.
    pub fn primary(&self) -> &'a PortSnapshot {
        self.members[0]
    }

    /// Second member, if any.
    pub fn secondary(&self) -> Option<&'a PortSnapshot> {
        self.members.get(1).copied()
    }

    pub fn members(&self) -> &[&'a PortSnapshot] {
        &self.members
    }

    pub fn ids(&self) -> impl Iterator<Item = PortId> + '_ {
        self.members.iter().map(|p| p.id)
    }

    pub fn contains(&self, id: PortId) -> bool {
        self.members.iter().any(|p| p.id == id)
    }

    pub fn get(&self, id: PortId) -> Option<&'a PortSnapshot> {
        self.members.iter().copied().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Redundancy type as configured on the head.
    pub fn redundancy_type(&self) -> RedundancyType {
        self.primary().redundancy_type
    }

    /// Redundancy mode as configured on the head.
    pub fn redundancy_mode(&self) -> RedundancyMode {
        self.primary().redundancy_mode
    }

    /// Newest `last_change` across all members.
    pub fn newest_change(&self) -> u64 {
        self.members
            .iter()
            .map(|p| p.last_change)
            .max()
            .unwrap_or_default()
    }
}

/// Partitions a snapshot into redundancy groups.
///
/// Ports are visited in ascending id order. A teamed port joins the group of
/// the first of its declared peers that was already placed; a port flagged
/// `primary_port` goes to the head of that group. Anything else opens a new
/// group, so every port lands in exactly one group.
pub fn group_by_redundancy(snapshot: &NetSnapshot) -> Vec<RedundancyGroup<'_>> {
    let mut groups: Vec<RedundancyGroup<'_>> = Vec::new();
    let mut placed: HashMap<PortId, usize> = HashMap::new();

    for port in snapshot.values() {
        let target = if port.redundancy_type.is_teamed() {
            port.team_members.iter().find_map(|peer| {
                let teamed_peer = snapshot
                    .get(peer)
                    .is_some_and(|p| p.redundancy_type.is_teamed());
                if teamed_peer {
                    placed.get(peer).copied()
                } else {
                    None
                }
            })
        } else {
            None
        };

        match target {
            Some(index) => {
                let group = &mut groups[index];
                if port.primary_port {
                    group.members.insert(0, port);
                } else {
                    group.members.push(port);
                }
                placed.insert(port.id, index);
            }
            None => {
                placed.insert(port.id, groups.len());
                groups.push(RedundancyGroup::single(port));
            }
        }
    }

    groups
}
