//! Per-port team priority table.
//!
//! Every member of a redundancy group gets a priority, a sticky flag and a
//! final flag derived from the group's mode and member order (primary
//! first). The first member always gets the highest priority:
//!
//! | Mode | sticky | final |
//! |------|--------|-------|
//! | Automatic | all | none |
//! | AutomaticRevert | primary only | none |
//! | ManualNoFailover | all | all |
//! | Manual | all | all except the primary |
//! | Dual | none | none |

use crate::error::{NetMgrError, Result};
use nminet_types::{PortId, RedundancyMode};

/// Priority distance between consecutive members.
pub const PRIO_STEP: u32 = 10;

/// Selection policy for one team member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeamPortConfig {
    /// Higher wins.
    pub prio: u32,
    /// Once active, stay active until carrier is lost.
    pub sticky: bool,
    /// Once active, stay active unconditionally.
    pub is_final: bool,
}

impl TeamPortConfig {
    pub fn new(prio: u32) -> Self {
        Self {
            prio,
            ..Self::default()
        }
    }

    pub fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.sticky = true;
        self.is_final = true;
        self
    }

    /// A final port must also be sticky.
    pub fn validate(&self) -> Result<()> {
        if self.is_final && !self.sticky {
            return Err(NetMgrError::config(
                "team_port.final",
                "final requires sticky",
            ));
        }
        Ok(())
    }
}

/// Builds the priority table for `ordered_ids`, primary first.
pub fn teamed_config(mode: RedundancyMode, ordered_ids: &[PortId]) -> Vec<(PortId, TeamPortConfig)> {
    let count = ordered_ids.len() as u32;

    ordered_ids
        .iter()
        .enumerate()
        .map(|(index, id)| {
            let is_primary = index == 0;
            let prio = (count - 1 - index as u32) * PRIO_STEP;
            let base = TeamPortConfig::new(prio);
            let config = match mode {
                RedundancyMode::Automatic => base.sticky(),
                RedundancyMode::AutomaticRevert if is_primary => base.sticky(),
                RedundancyMode::AutomaticRevert => base,
                RedundancyMode::ManualNoFailover => base.pinned(),
                RedundancyMode::Manual if is_primary => base.sticky(),
                RedundancyMode::Manual => base.pinned(),
                RedundancyMode::Dual => base,
            };
            (*id, config)
        })
        .collect()
}
