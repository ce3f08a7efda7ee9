//! Automatic revert to the primary port.
//!
//! In `Automatic` mode nothing moves traffic back to the primary once the
//! backup took over. The one exception is a redundant pair that was
//! disabled and re-enabled: if the backup regains carrier before the
//! primary, the backup would keep the role forever, so the race is watched
//! and the primary is requested back.
//!
//! ```text
//! Init -> Disabled -> Enabled -+-> BothFirst ----------------+-> End -> Init
//!                              +-> Port1First ---------------+
//!                              +-> Port2First -> Port1Second-+
//! ```
//!
//! The whole sequence must complete within a window opened on re-enable.

use nminet_types::{PortId, PortStatus, RedundancyGroup, RedundancyMode, RedundancyStatus, RedundancyType};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default observation window.
pub const REVERT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on transitions per [`RevertFsm::handle`] call.
pub const RUN_STEPS_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevertState {
    Init,
    Disabled,
    Enabled,
    BothFirst,
    Port2First,
    Port1First,
    Port1Second,
    End,
}

impl fmt::Display for RevertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RevertState::Init => "INIT",
            RevertState::Disabled => "DISABLE",
            RevertState::Enabled => "ENABLE",
            RevertState::BothFirst => "BOTH_FIRST",
            RevertState::Port2First => "PORT2_FIRST",
            RevertState::Port1First => "PORT1_FIRST",
            RevertState::Port1Second => "PORT1_SECOND",
            RevertState::End => "END",
        };
        write!(f, "{}", s)
    }
}

/// Request to make the primary of a group active again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevertRequest {
    pub primary: PortId,
}

fn connected(status: PortStatus) -> bool {
    status == PortStatus::Connected
}

/// Revert state machine of one group.
#[derive(Debug, Clone)]
pub struct RevertFsm {
    state: RevertState,
    window_start: Option<Instant>,
    timeout: Duration,
    step_limit: usize,
}

impl Default for RevertFsm {
    fn default() -> Self {
        Self::new(REVERT_TIMEOUT, RUN_STEPS_LIMIT)
    }
}

impl RevertFsm {
    pub fn new(timeout: Duration, step_limit: usize) -> Self {
        Self {
            state: RevertState::Init,
            window_start: None,
            timeout,
            step_limit,
        }
    }

    pub fn state(&self) -> RevertState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = RevertState::Init;
        self.window_start = None;
    }

    /// Feeds one snapshot of `group`; runs transitions until the state
    /// settles.
    pub fn handle(&mut self, group: &RedundancyGroup<'_>, now: Instant) -> Option<RevertRequest> {
        if let Some(start) = self.window_start {
            if now >= start + self.timeout {
                debug!(primary = group.primary().id, state = %self.state, "Revert window expired");
                self.reset();
                return None;
            }
        }

        let mut request = None;
        let mut steps = 0;
        loop {
            let (next, revert) = self.step(group, now);
            if revert.is_some() {
                request = revert;
            }
            let Some(next) = next else {
                break;
            };

            debug!(primary = group.primary().id, from = %self.state, to = %next, "Revert transition");
            self.state = next;
            steps += 1;
            if steps >= self.step_limit {
                warn!(
                    primary = group.primary().id,
                    steps, "Revert state machine did not settle, resetting"
                );
                self.reset();
                break;
            }
        }
        request
    }

    /// One transition: the next state, if any, and a revert request made
    /// on the way out of the current state.
    fn step(
        &mut self,
        group: &RedundancyGroup<'_>,
        now: Instant,
    ) -> (Option<RevertState>, Option<RevertRequest>) {
        let primary = group.primary();
        let primary_connected = connected(primary.status);
        let secondary_connected = group.secondary().is_some_and(|p| connected(p.status));

        match self.state {
            RevertState::Init if !primary.enabled => (Some(RevertState::Disabled), None),
            RevertState::Init => (None, None),
            RevertState::Disabled if primary.enabled => {
                self.window_start = Some(now);
                (Some(RevertState::Enabled), None)
            }
            RevertState::Disabled => (None, None),
            RevertState::Enabled => {
                let next = if !primary.enabled {
                    Some(RevertState::Disabled)
                } else if primary_connected && secondary_connected {
                    Some(RevertState::BothFirst)
                } else if primary_connected {
                    Some(RevertState::Port1First)
                } else if secondary_connected {
                    Some(RevertState::Port2First)
                } else {
                    None
                };
                (next, None)
            }
            RevertState::BothFirst => (Some(RevertState::End), Self::check_revert(group)),
            RevertState::Port2First => {
                let next = if !primary.enabled {
                    Some(RevertState::Disabled)
                } else if primary_connected && secondary_connected {
                    Some(RevertState::Port1Second)
                } else if !secondary_connected {
                    Some(RevertState::Enabled)
                } else {
                    None
                };
                (next, None)
            }
            RevertState::Port1First => (Some(RevertState::End), None),
            RevertState::Port1Second => (Some(RevertState::End), Self::check_revert(group)),
            RevertState::End => {
                self.window_start = None;
                (Some(RevertState::Init), None)
            }
        }
    }

    fn check_revert(group: &RedundancyGroup<'_>) -> Option<RevertRequest> {
        let primary = group.primary();
        if primary.redundancy_status == RedundancyStatus::Active {
            return None;
        }
        info!(primary = primary.id, status = %primary.redundancy_status, "Requesting revert to primary");
        Some(RevertRequest {
            primary: primary.id,
        })
    }
}

/// Owns one [`RevertFsm`] per Automatic-mode redundancy group.
#[derive(Debug)]
pub struct RevertMonitor {
    fsms: HashMap<PortId, RevertFsm>,
    timeout: Duration,
    step_limit: usize,
}

impl Default for RevertMonitor {
    fn default() -> Self {
        Self::new(REVERT_TIMEOUT, RUN_STEPS_LIMIT)
    }
}

impl RevertMonitor {
    pub fn new(timeout: Duration, step_limit: usize) -> Self {
        Self {
            fsms: HashMap::new(),
            timeout,
            step_limit,
        }
    }

    /// FSM of the group headed by `primary`, if it is being watched.
    pub fn fsm(&self, primary: PortId) -> Option<&RevertFsm> {
        self.fsms.get(&primary)
    }

    /// Runs every group's state machine against the new snapshot.
    pub fn interfaces_updated(
        &mut self,
        groups: &[RedundancyGroup<'_>],
        now: Instant,
    ) -> Vec<RevertRequest> {
        let mut requests = Vec::new();
        let mut watched = HashSet::new();

        for group in groups {
            let key = group.primary().id;
            if group.redundancy_type() == RedundancyType::None
                || group.redundancy_mode() != RedundancyMode::Automatic
            {
                if self.fsms.remove(&key).is_some() {
                    debug!(primary = key, "Group left automatic mode, revert state discarded");
                }
                continue;
            }

            watched.insert(key);
            let (timeout, step_limit) = (self.timeout, self.step_limit);
            let fsm = self
                .fsms
                .entry(key)
                .or_insert_with(|| RevertFsm::new(timeout, step_limit));
            if let Some(request) = fsm.handle(group, now) {
                requests.push(request);
            }
        }

        self.fsms.retain(|key, _| watched.contains(key));
        requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nminet_types::{group_by_redundancy, NetSnapshot, PortSnapshot};
    use pretty_assertions::assert_eq;

    struct Pair {
        enabled: bool,
        p1: bool,
        p2: bool,
        p1_status: RedundancyStatus,
        mode: RedundancyMode,
    }

    impl Pair {
        fn disabled() -> Self {
            Self {
                enabled: false,
                p1: false,
                p2: false,
                p1_status: RedundancyStatus::NotEnabled,
                mode: RedundancyMode::Automatic,
            }
        }

        fn up(p1: bool, p2: bool) -> Self {
            Self {
                enabled: true,
                p1,
                p2,
                p1_status: if p1 {
                    RedundancyStatus::Inactive
                } else {
                    RedundancyStatus::Disconnected
                },
                mode: RedundancyMode::Automatic,
            }
        }

        fn primary_active(mut self) -> Self {
            self.p1_status = RedundancyStatus::Active;
            self
        }

        fn snapshot(&self) -> NetSnapshot {
            let status = |enabled: bool, c: bool| match (enabled, c) {
                (false, _) => PortStatus::Disabled,
                (true, true) => PortStatus::Connected,
                (true, false) => PortStatus::MediaDisconnected,
            };
            [
                PortSnapshot::new(1)
                    .with_team(RedundancyType::ActiveActive, self.mode, [2])
                    .as_primary()
                    .with_status(status(self.enabled, self.p1))
                    .with_redundancy_status(self.p1_status),
                PortSnapshot::new(2)
                    .with_team(RedundancyType::ActiveActive, self.mode, [1])
                    .with_status(status(self.enabled, self.p2)),
            ]
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
        }
    }

    fn feed(fsm: &mut RevertFsm, pair: Pair, now: Instant) -> Option<RevertRequest> {
        let snap = pair.snapshot();
        let groups = group_by_redundancy(&snap);
        fsm.handle(&groups[0], now)
    }

    fn secs(t0: Instant, s: u64) -> Instant {
        t0 + Duration::from_secs(s)
    }

    #[test]
    fn test_stays_idle_while_enabled() {
        let mut fsm = RevertFsm::default();
        let t0 = Instant::now();
        assert_eq!(feed(&mut fsm, Pair::up(true, true), t0), None);
        assert_eq!(fsm.state(), RevertState::Init);
    }

    #[test]
    fn test_secondary_first_then_primary_reverts_once() {
        let mut fsm = RevertFsm::default();
        let t0 = Instant::now();

        assert_eq!(feed(&mut fsm, Pair::disabled(), t0), None);
        assert_eq!(fsm.state(), RevertState::Disabled);

        assert_eq!(feed(&mut fsm, Pair::up(false, false), secs(t0, 1)), None);
        assert_eq!(fsm.state(), RevertState::Enabled);

        assert_eq!(feed(&mut fsm, Pair::up(false, true), secs(t0, 2)), None);
        assert_eq!(fsm.state(), RevertState::Port2First);

        assert_eq!(
            feed(&mut fsm, Pair::up(true, true), secs(t0, 3)),
            Some(RevertRequest { primary: 1 })
        );
        assert_eq!(fsm.state(), RevertState::Init);

        assert_eq!(feed(&mut fsm, Pair::up(true, true), secs(t0, 4)), None);
    }

    #[test]
    fn test_window_expiry_discards_race() {
        let mut fsm = RevertFsm::default();
        let t0 = Instant::now();

        feed(&mut fsm, Pair::disabled(), t0);
        feed(&mut fsm, Pair::up(false, false), secs(t0, 1));
        feed(&mut fsm, Pair::up(false, true), secs(t0, 2));
        assert_eq!(fsm.state(), RevertState::Port2First);

        assert_eq!(feed(&mut fsm, Pair::up(true, true), secs(t0, 7)), None);
        assert_eq!(fsm.state(), RevertState::Init);
    }

    #[test]
    fn test_both_first_reverts_only_if_primary_inactive() {
        let t0 = Instant::now();

        let mut fsm = RevertFsm::default();
        feed(&mut fsm, Pair::disabled(), t0);
        assert_eq!(
            feed(&mut fsm, Pair::up(true, true), secs(t0, 1)),
            Some(RevertRequest { primary: 1 })
        );

        let mut fsm = RevertFsm::default();
        feed(&mut fsm, Pair::disabled(), t0);
        assert_eq!(
            feed(&mut fsm, Pair::up(true, true).primary_active(), secs(t0, 1)),
            None
        );
        assert_eq!(fsm.state(), RevertState::Init);
    }

    #[test]
    fn test_primary_first_needs_no_revert() {
        let mut fsm = RevertFsm::default();
        let t0 = Instant::now();
        feed(&mut fsm, Pair::disabled(), t0);
        feed(&mut fsm, Pair::up(false, false), secs(t0, 1));
        assert_eq!(feed(&mut fsm, Pair::up(true, false), secs(t0, 2)), None);
        assert_eq!(fsm.state(), RevertState::Init);
    }

    #[test]
    fn test_secondary_drop_restarts_wait() {
        let mut fsm = RevertFsm::default();
        let t0 = Instant::now();
        feed(&mut fsm, Pair::disabled(), t0);
        feed(&mut fsm, Pair::up(false, true), secs(t0, 1));
        assert_eq!(fsm.state(), RevertState::Port2First);

        feed(&mut fsm, Pair::up(false, false), secs(t0, 2));
        assert_eq!(fsm.state(), RevertState::Enabled);
    }

    #[test]
    fn test_disable_during_race() {
        let mut fsm = RevertFsm::default();
        let t0 = Instant::now();
        feed(&mut fsm, Pair::disabled(), t0);
        feed(&mut fsm, Pair::up(false, true), secs(t0, 1));
        assert_eq!(fsm.state(), RevertState::Port2First);

        assert_eq!(feed(&mut fsm, Pair::disabled(), secs(t0, 2)), None);
        assert_eq!(fsm.state(), RevertState::Disabled);
    }

    #[test]
    fn test_step_limit_forces_reset() {
        let mut fsm = RevertFsm::new(REVERT_TIMEOUT, 2);
        let t0 = Instant::now();
        feed(&mut fsm, Pair::disabled(), t0);

        // Disabled -> Enabled -> BothFirst hits the bound before the check.
        assert_eq!(feed(&mut fsm, Pair::up(true, true), secs(t0, 1)), None);
        assert_eq!(fsm.state(), RevertState::Init);
    }

    #[test]
    fn test_monitor_requests_revert() {
        let mut monitor = RevertMonitor::default();
        let t0 = Instant::now();

        for (pair, at) in [
            (Pair::disabled(), 0),
            (Pair::up(false, true), 1),
        ] {
            let snap = pair.snapshot();
            let groups = group_by_redundancy(&snap);
            assert!(monitor.interfaces_updated(&groups, secs(t0, at)).is_empty());
        }

        let snap = Pair::up(true, true).snapshot();
        let groups = group_by_redundancy(&snap);
        assert_eq!(
            monitor.interfaces_updated(&groups, secs(t0, 2)),
            vec![RevertRequest { primary: 1 }]
        );
    }

    #[test]
    fn test_monitor_ignores_other_modes() {
        let mut monitor = RevertMonitor::default();
        let t0 = Instant::now();

        let snap = Pair::disabled().snapshot();
        let groups = group_by_redundancy(&snap);
        monitor.interfaces_updated(&groups, t0);
        assert_eq!(
            monitor.fsm(1).map(RevertFsm::state),
            Some(RevertState::Disabled)
        );

        let mut pair = Pair::up(false, true);
        pair.mode = RedundancyMode::AutomaticRevert;
        let snap = pair.snapshot();
        let groups = group_by_redundancy(&snap);
        assert!(monitor.interfaces_updated(&groups, secs(t0, 1)).is_empty());
        assert!(monitor.fsm(1).is_none());
    }

    #[test]
    fn test_monitor_drops_vanished_groups() {
        let mut monitor = RevertMonitor::default();
        let snap = Pair::disabled().snapshot();
        let groups = group_by_redundancy(&snap);
        monitor.interfaces_updated(&groups, Instant::now());
        assert!(monitor.fsm(1).is_some());

        monitor.interfaces_updated(&[], Instant::now());
        assert!(monitor.fsm(1).is_none());
    }
}
