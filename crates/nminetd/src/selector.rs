//! Active port selection for ActiveActive redundancy groups.
//!
//! The team daemon decides which port carries traffic for ActiveStandby
//! teams. For ActiveActive teams every member carries traffic, but one of
//! them is still reported as the active port. This module makes that
//! choice and keeps it stable across cycles:
//!
//! | Current active | Outcome |
//! |----------------|---------|
//! | none | best port with carrier (primary if none) |
//! | final | kept |
//! | not sticky, outranked | best |
//! | lost carrier | best, if different |
//! | otherwise | kept |
//!
//! State is keyed by the group's primary port id and rebuilt from scratch
//! whenever it is missing, so nothing here needs to survive a restart.

use crate::team_config::{teamed_config, TeamPortConfig};
use nminet_types::{
    group_by_redundancy, NetSnapshot, PortId, PortSnapshot, RedundancyGroup, RedundancyMode,
    RedundancyStatus, RedundancyType,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Selection state of one ActiveActive group.
#[derive(Debug, Clone, Default)]
pub struct ActivePortState {
    slaves: BTreeMap<PortId, TeamPortConfig>,
    active_id: Option<PortId>,
    /// Newest member change already folded in; `None` forces a recompute.
    last_recalc: Option<u64>,
    mode: Option<RedundancyMode>,
}

impl ActivePortState {
    fn seeded(active_id: Option<PortId>) -> Self {
        Self {
            active_id,
            ..Self::default()
        }
    }

    pub fn active_id(&self) -> Option<PortId> {
        self.active_id
    }

    pub fn port_config(&self, id: PortId) -> Option<&TeamPortConfig> {
        self.slaves.get(&id)
    }

    fn prio(&self, id: PortId) -> u32 {
        self.slaves.get(&id).map(|c| c.prio).unwrap_or_default()
    }

    fn switch_to(&mut self, group: &RedundancyGroup<'_>, id: PortId, reason: &str) {
        info!(
            primary = group.primary().id,
            from = ?self.active_id,
            to = id,
            "Active port changed: {}",
            reason
        );
        self.active_id = Some(id);
    }

    /// Re-reads the priority table when membership changed, then applies
    /// the failover rules.
    fn recalc(&mut self, group: &RedundancyGroup<'_>) {
        let ids: Vec<PortId> = group.ids().collect();
        let id_set: BTreeSet<PortId> = ids.iter().copied().collect();

        if !self.slaves.keys().eq(id_set.iter()) {
            debug!(primary = group.primary().id, members = ?ids, "Team membership changed");

            if self.active_id.is_some_and(|id| !id_set.contains(&id)) {
                self.active_id = None;
            }
            self.slaves = teamed_config(group.redundancy_mode(), &ids)
                .into_iter()
                .collect();

            if let Some(selected) = group.members().iter().filter(|p| p.select_port).last() {
                self.switch_to(group, selected.id, "port selected");
            }
        }

        let best = group
            .members()
            .iter()
            .copied()
            .filter(|p| p.have_carrier())
            .max_by_key(|p| self.prio(p.id))
            .unwrap_or_else(|| group.primary());

        let Some(current) = self.active_id else {
            self.switch_to(group, best.id, "no active port");
            return;
        };

        let current_config = self.slaves.get(&current).copied().unwrap_or_default();
        if current_config.is_final {
            return;
        }

        if !current_config.sticky && self.prio(best.id) > current_config.prio {
            self.switch_to(group, best.id, "higher priority port available");
            return;
        }

        let current_has_carrier = group.get(current).is_some_and(|p| p.have_carrier());
        if !current_has_carrier && best.id != current {
            self.switch_to(group, best.id, "active port lost carrier");
        }
    }
}

/// Chooses the active member of each ActiveActive group.
#[derive(Debug, Default)]
pub struct ActivePortSelector {
    groups: HashMap<PortId, ActivePortState>,
    /// Active port per primary, carried over a reconfiguration.
    remembered: HashMap<PortId, PortId>,
    /// Port to group key for selectable groups, as of the last annotated
    /// snapshot.
    membership: HashMap<PortId, PortId>,
}

impl ActivePortSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection state for the group keyed by `primary`, if any.
    pub fn state(&self, primary: PortId) -> Option<&ActivePortState> {
        self.groups.get(&primary)
    }

    /// Whether `port` is the active member of `group`.
    pub fn is_active(&mut self, port: &PortSnapshot, group: &RedundancyGroup<'_>) -> bool {
        if group.redundancy_type() != RedundancyType::ActiveActive {
            return port.active;
        }

        if group.redundancy_mode() == RedundancyMode::Dual {
            return port.have_carrier();
        }

        let key = group.primary().id;
        let mode = group.redundancy_mode();
        let remembered = &mut self.remembered;
        let state = self
            .groups
            .entry(key)
            .or_insert_with(|| ActivePortState::seeded(remembered.remove(&key)));

        match state.mode {
            Some(previous) if previous != mode => {
                debug!(primary = key, %previous, %mode, "Redundancy mode changed, resetting selection");
                *state = ActivePortState::default();
                state.mode = Some(mode);
            }
            Some(_) => {}
            None => state.mode = Some(mode),
        }

        let newest = group.newest_change();
        if state.last_recalc.map_or(true, |seen| seen < newest) {
            state.recalc(group);
            state.last_recalc = Some(newest);
        }

        state.active_id == Some(port.id)
    }

    /// Derived redundancy status of `port` for this cycle.
    pub fn redundancy_status(
        &mut self,
        port: &PortSnapshot,
        group: &RedundancyGroup<'_>,
    ) -> RedundancyStatus {
        if !port.enabled || port.redundancy_type == RedundancyType::None {
            return RedundancyStatus::NotEnabled;
        }
        if !port.have_carrier() {
            return RedundancyStatus::Disconnected;
        }

        let active = self.is_active(port, group);
        match (active, port.redundancy_mode) {
            (true, RedundancyMode::Dual) => RedundancyStatus::ActiveDual,
            (true, _) => RedundancyStatus::Active,
            (false, _) => RedundancyStatus::Inactive,
        }
    }

    /// Fills `redundancy_status` for every port of the snapshot and drops
    /// state for groups that are gone or no longer ActiveActive.
    pub fn annotate(&mut self, snapshot: &mut NetSnapshot) {
        let statuses: Vec<(PortId, RedundancyStatus)> = {
            let groups = group_by_redundancy(snapshot);
            let mut statuses = Vec::with_capacity(snapshot.len());
            for group in &groups {
                for port in group.members() {
                    statuses.push((port.id, self.redundancy_status(port, group)));
                }
            }
            self.retain(&groups);
            statuses
        };

        for (id, status) in statuses {
            if let Some(port) = snapshot.get_mut(&id) {
                port.redundancy_status = status;
            }
        }
    }

    fn retain(&mut self, groups: &[RedundancyGroup<'_>]) {
        let selectable: Vec<&RedundancyGroup<'_>> = groups
            .iter()
            .filter(|g| {
                g.redundancy_type() == RedundancyType::ActiveActive
                    && g.redundancy_mode() != RedundancyMode::Dual
            })
            .collect();

        self.membership = selectable
            .iter()
            .flat_map(|g| {
                let key = g.primary().id;
                g.ids().map(move |id| (id, key))
            })
            .collect();

        let live: HashSet<PortId> = selectable.iter().map(|g| g.primary().id).collect();

        self.groups.retain(|key, _| {
            let keep = live.contains(key);
            if !keep {
                debug!(primary = key, "Dropping selection state");
            }
            keep
        });
    }

    /// Forces `port` active in its group; the next query starts from it.
    ///
    /// Returns false unless the port belongs to an ActiveActive group
    /// (other than Dual) of the last annotated snapshot.
    pub fn set_active(&mut self, port: PortId) -> bool {
        let Some(key) = self.membership.get(&port).copied() else {
            warn!(port, "Port is not in a selectable team");
            return false;
        };

        let state = self.groups.entry(key).or_default();
        info!(primary = key, from = ?state.active_id, to = port, "Active port selected");
        state.active_id = Some(port);
        state.last_recalc = None;
        true
    }

    /// Forces a recompute of `port`'s group on the next query.
    pub fn group_touched(&mut self, port: PortId) {
        let key = self.membership.get(&port).copied().unwrap_or(port);
        if let Some(state) = self.groups.get_mut(&key) {
            state.last_recalc = None;
        }
    }

    /// Moves every live selection aside so the groups rebuilt after a
    /// reconfiguration start from the same active port.
    pub fn remember_selections(&mut self) {
        for (key, state) in self.groups.drain() {
            if let Some(active) = state.active_id {
                self.remembered.insert(key, active);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nminet_types::PortStatus;
    use pretty_assertions::assert_eq;

    fn pair(mode: RedundancyMode, c1: bool, c2: bool, ts: u64) -> NetSnapshot {
        let status = |c: bool| {
            if c {
                PortStatus::Connected
            } else {
                PortStatus::MediaDisconnected
            }
        };
        [
            PortSnapshot::new(1)
                .with_team(RedundancyType::ActiveActive, mode, [2])
                .as_primary()
                .with_status(status(c1))
                .with_last_change(ts),
            PortSnapshot::new(2)
                .with_team(RedundancyType::ActiveActive, mode, [1])
                .with_status(status(c2))
                .with_last_change(ts),
        ]
        .into_iter()
        .map(|p| (p.id, p))
        .collect()
    }

    fn annotate(selector: &mut ActivePortSelector, mut snap: NetSnapshot) -> NetSnapshot {
        selector.annotate(&mut snap);
        snap
    }

    fn status(snap: &NetSnapshot, id: PortId) -> RedundancyStatus {
        snap[&id].redundancy_status
    }

    #[test]
    fn test_primary_selected_initially() {
        let mut selector = ActivePortSelector::new();
        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 1));
        assert_eq!(status(&snap, 1), RedundancyStatus::Active);
        assert_eq!(status(&snap, 2), RedundancyStatus::Inactive);
    }

    #[test]
    fn test_failover_on_carrier_loss() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 1));
        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, false, true, 2));
        assert_eq!(status(&snap, 1), RedundancyStatus::Disconnected);
        assert_eq!(status(&snap, 2), RedundancyStatus::Active);
    }

    #[test]
    fn test_automatic_does_not_fail_back() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::Automatic, false, true, 1));
        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 2));
        assert_eq!(status(&snap, 1), RedundancyStatus::Inactive);
        assert_eq!(status(&snap, 2), RedundancyStatus::Active);
    }

    #[test]
    fn test_automatic_revert_fails_back() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::AutomaticRevert, false, true, 1));
        let snap = annotate(&mut selector, pair(RedundancyMode::AutomaticRevert, true, true, 2));
        assert_eq!(status(&snap, 1), RedundancyStatus::Active);
        assert_eq!(status(&snap, 2), RedundancyStatus::Inactive);
    }

    #[test]
    fn test_no_carrier_falls_back_to_primary() {
        let mut selector = ActivePortSelector::new();
        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, false, false, 1));
        assert_eq!(status(&snap, 1), RedundancyStatus::Disconnected);
        assert_eq!(selector.state(1).and_then(|s| s.active_id()), None);

        // Nothing was queried without carrier; a query through the group
        // still lands on the primary.
        let groups = group_by_redundancy(&snap);
        assert!(selector.is_active(&snap[&1], &groups[0]));
    }

    #[test]
    fn test_no_recompute_without_change() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 5));

        // Same timestamp: carrier loss is not seen until a newer change arrives.
        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, false, true, 5));
        assert_eq!(status(&snap, 2), RedundancyStatus::Inactive);

        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, false, true, 6));
        assert_eq!(status(&snap, 2), RedundancyStatus::Active);
    }

    #[test]
    fn test_group_touched_forces_recompute() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 5));

        selector.group_touched(2);
        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, false, true, 5));
        assert_eq!(status(&snap, 2), RedundancyStatus::Active);
    }

    #[test]
    fn test_sticky_port_ignores_higher_priority_peer() {
        let snap = pair(RedundancyMode::Automatic, true, true, 1);
        let groups = group_by_redundancy(&snap);
        let group = &groups[0];

        let mut state = ActivePortState::default();
        state.slaves = BTreeMap::from([
            (1, TeamPortConfig::new(10).sticky()),
            (2, TeamPortConfig::new(0)),
        ]);
        state.active_id = Some(1);
        state.recalc(group);
        assert_eq!(state.active_id(), Some(1));

        // Peer outranks the sticky active port: no switch.
        state.slaves.insert(2, TeamPortConfig::new(50));
        state.recalc(group);
        assert_eq!(state.active_id(), Some(1));

        // Only carrier loss moves it.
        let down = pair(RedundancyMode::Automatic, false, true, 2);
        let groups = group_by_redundancy(&down);
        state.recalc(&groups[0]);
        assert_eq!(state.active_id(), Some(2));
    }

    #[test]
    fn test_final_port_never_loses_active() {
        let mut selector = ActivePortSelector::new();
        let snap = annotate(
            &mut selector,
            pair(RedundancyMode::ManualNoFailover, true, true, 1),
        );
        assert_eq!(status(&snap, 1), RedundancyStatus::Active);

        for (ts, c1) in [(2, false), (3, true), (4, false), (5, true)] {
            let snap = annotate(
                &mut selector,
                pair(RedundancyMode::ManualNoFailover, c1, true, ts),
            );
            assert_eq!(status(&snap, 2), RedundancyStatus::Inactive);
            assert_eq!(selector.state(1).and_then(|s| s.active_id()), Some(1));
        }
    }

    #[test]
    fn test_manual_backup_pinned_after_failover() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::Manual, true, true, 1));
        let snap = annotate(&mut selector, pair(RedundancyMode::Manual, false, true, 2));
        assert_eq!(status(&snap, 2), RedundancyStatus::Active);

        // Backup is final in manual mode, so it keeps the role even without carrier.
        let snap = annotate(&mut selector, pair(RedundancyMode::Manual, true, false, 3));
        assert_eq!(status(&snap, 1), RedundancyStatus::Inactive);
        assert_eq!(selector.state(1).and_then(|s| s.active_id()), Some(2));
    }

    #[test]
    fn test_dual_mode_reports_carrier() {
        let mut selector = ActivePortSelector::new();
        let snap = annotate(&mut selector, pair(RedundancyMode::Dual, true, true, 1));
        assert_eq!(status(&snap, 1), RedundancyStatus::ActiveDual);
        assert_eq!(status(&snap, 2), RedundancyStatus::ActiveDual);
        assert!(selector.state(1).is_none());
    }

    #[test]
    fn test_set_active_overrides_selection() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 1));
        assert!(selector.set_active(2));

        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 1));
        assert_eq!(status(&snap, 1), RedundancyStatus::Inactive);
        assert_eq!(status(&snap, 2), RedundancyStatus::Active);
    }

    #[test]
    fn test_set_active_unknown_port() {
        let mut selector = ActivePortSelector::new();
        assert!(!selector.set_active(42));
    }

    #[test]
    fn test_set_active_rejects_ports_outside_active_active_teams() {
        let mut selector = ActivePortSelector::new();
        let mut snap: NetSnapshot = [
            PortSnapshot::new(3),
            PortSnapshot::new(5)
                .with_team(RedundancyType::ActiveStandby, RedundancyMode::Automatic, [6])
                .as_primary(),
            PortSnapshot::new(6).with_team(
                RedundancyType::ActiveStandby,
                RedundancyMode::Automatic,
                [5],
            ),
        ]
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
        snap.extend(pair(RedundancyMode::Dual, true, true, 1));
        annotate(&mut selector, snap);

        for port in [1, 2, 3, 5, 6] {
            assert!(!selector.set_active(port), "port {}", port);
        }
        assert!(selector.state(5).is_none());
        assert!(selector.state(1).is_none());
    }

    #[test]
    fn test_set_active_on_team_without_carrier() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::Automatic, false, false, 1));
        assert!(selector.set_active(2));

        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 1));
        assert_eq!(status(&snap, 2), RedundancyStatus::Active);
    }

    #[test]
    fn test_select_port_adopted_on_resync() {
        let mut selector = ActivePortSelector::new();
        let mut snap = pair(RedundancyMode::Automatic, true, true, 1);
        snap.get_mut(&2).unwrap().select_port = true;
        let snap = annotate(&mut selector, snap);
        assert_eq!(status(&snap, 2), RedundancyStatus::Active);
    }

    #[test]
    fn test_single_survivor_is_active() {
        let mut selector = ActivePortSelector::new();
        let mut snap = pair(RedundancyMode::Automatic, true, true, 1);
        annotate(&mut selector, snap.clone());
        assert!(selector.set_active(2));
        let annotated = annotate(&mut selector, snap.clone());
        assert_eq!(status(&annotated, 2), RedundancyStatus::Active);

        // Port 2 vanishes; its reference on port 1 is left dangling.
        snap.remove(&2);
        snap.get_mut(&1).unwrap().last_change = 2;
        let snap = annotate(&mut selector, snap);
        assert_eq!(status(&snap, 1), RedundancyStatus::Active);
    }

    #[test]
    fn test_remembered_selection_survives_reconfiguration() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::Automatic, false, true, 1));
        annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 2));
        assert_eq!(selector.state(1).and_then(|s| s.active_id()), Some(2));

        selector.remember_selections();
        assert!(selector.state(1).is_none());

        let snap = annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 3));
        assert_eq!(status(&snap, 2), RedundancyStatus::Active);
    }

    #[test]
    fn test_state_dropped_when_team_removed() {
        let mut selector = ActivePortSelector::new();
        annotate(&mut selector, pair(RedundancyMode::Automatic, true, true, 1));
        assert!(selector.state(1).is_some());

        let snap: NetSnapshot = [PortSnapshot::new(1), PortSnapshot::new(2)]
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let snap = annotate(&mut selector, snap);
        assert!(selector.state(1).is_none());
        assert_eq!(status(&snap, 1), RedundancyStatus::NotEnabled);
    }

    #[test]
    fn test_active_standby_uses_team_daemon_view() {
        let mut selector = ActivePortSelector::new();
        let mut snap: NetSnapshot = [
            PortSnapshot::new(5)
                .with_team(RedundancyType::ActiveStandby, RedundancyMode::Automatic, [6])
                .as_primary(),
            PortSnapshot::new(6).with_team(
                RedundancyType::ActiveStandby,
                RedundancyMode::Automatic,
                [5],
            ),
        ]
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
        snap.get_mut(&6).unwrap().active = true;

        let snap = annotate(&mut selector, snap);
        assert_eq!(status(&snap, 5), RedundancyStatus::Inactive);
        assert_eq!(status(&snap, 6), RedundancyStatus::Active);
        assert!(selector.state(5).is_none());
    }
}
