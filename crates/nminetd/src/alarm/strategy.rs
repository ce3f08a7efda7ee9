//! Per-group alarm evaluation.
//!
//! A group is evaluated by one of two strategies, picked from its
//! redundancy type and mode:
//!
//! | Type | Mode | Shape |
//! |------|------|-------|
//! | None | any | Single |
//! | ActiveActive | any | Teamed |
//! | ActiveStandby | not Dual | Teamed |
//! | ActiveStandby | Dual | unsupported |
//!
//! Strategies are pure: they read the group and the previous cycle's port
//! facts and return the alarms and events to raise.

use super::types::{Alarm, AlarmKind, AlarmObject, TEAMED_INTERFACE_OBJECT_BASE};
use crate::config::PlatformConfig;
use nminet_types::{
    PortId, PortSnapshot, RedundancyGroup, RedundancyMode, RedundancyStatus, RedundancyType,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Something a strategy wants the processor to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Raise {
    Alarm(Alarm, bool),
    Event(Alarm),
}

/// Configuration facts about a port kept from one cycle to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFacts {
    pub redundancy_type: RedundancyType,
    pub redundancy_mode: RedundancyMode,
    pub enabled: bool,
    pub manual_primary_port: bool,
    pub team_members: BTreeSet<PortId>,
    pub redundancy_status: RedundancyStatus,
}

impl From<&PortSnapshot> for PortFacts {
    fn from(port: &PortSnapshot) -> Self {
        Self {
            redundancy_type: port.redundancy_type,
            redundancy_mode: port.redundancy_mode,
            enabled: port.enabled,
            manual_primary_port: port.manual_primary_port,
            team_members: port.team_members.clone(),
            redundancy_status: port.redundancy_status,
        }
    }
}

impl PortFacts {
    /// Whether `port` still has the redundancy configuration recorded here.
    pub fn same_mode(&self, port: &PortSnapshot) -> bool {
        self.redundancy_type == port.redundancy_type
            && self.redundancy_mode == port.redundancy_mode
            && self.enabled == port.enabled
            && self.manual_primary_port == port.manual_primary_port
            && self.team_members == port.team_members
    }
}

/// Read-only inputs shared by all strategies during one cycle.
#[derive(Debug, Clone, Copy)]
pub struct AlarmContext<'a> {
    pub platform: &'a PlatformConfig,
    pub previous: &'a HashMap<PortId, PortFacts>,
}

impl AlarmContext<'_> {
    fn object_id(&self, port: &PortSnapshot) -> String {
        if port.platform_object_id.is_empty() {
            self.platform.platform_object_id(port.id)
        } else {
            port.platform_object_id.clone()
        }
    }
}

/// Redundancy state as reported in team state events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeamPortState {
    NotEnabled,
    Active,
    Inactive,
}

impl From<RedundancyStatus> for TeamPortState {
    fn from(status: RedundancyStatus) -> Self {
        match status {
            RedundancyStatus::NotEnabled => TeamPortState::NotEnabled,
            RedundancyStatus::Active | RedundancyStatus::ActiveDual => TeamPortState::Active,
            RedundancyStatus::Inactive | RedundancyStatus::Disconnected => {
                TeamPortState::Inactive
            }
        }
    }
}

impl fmt::Display for TeamPortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TeamPortState::NotEnabled => "NOT_ENABLED",
            TeamPortState::Active => "ACTIVE",
            TeamPortState::Inactive => "INACTIVE",
        };
        write!(f, "{}", s)
    }
}

/// Alarm evaluation for one group shape.
pub trait AlarmStrategy {
    fn evaluate(&self, group: &RedundancyGroup<'_>, ctx: &AlarmContext<'_>) -> Vec<Raise>;
}

/// Shape of a redundancy group as far as alarms are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupShape {
    Single,
    Teamed,
}

impl GroupShape {
    /// Returns `None` for combinations no strategy handles.
    pub fn of(group: &RedundancyGroup<'_>) -> Option<Self> {
        match (group.redundancy_type(), group.redundancy_mode()) {
            (RedundancyType::None, _) => Some(GroupShape::Single),
            (RedundancyType::ActiveActive, _) => Some(GroupShape::Teamed),
            (RedundancyType::ActiveStandby, RedundancyMode::Dual) => None,
            (RedundancyType::ActiveStandby, _) => Some(GroupShape::Teamed),
        }
    }

    pub fn evaluate(&self, group: &RedundancyGroup<'_>, ctx: &AlarmContext<'_>) -> Vec<Raise> {
        match self {
            GroupShape::Single => SingleStrategy.evaluate(group, ctx),
            GroupShape::Teamed => TeamedStrategy.evaluate(group, ctx),
        }
    }
}

/// Collects raises for one group.
struct Raises<'c, 'a> {
    ctx: &'c AlarmContext<'a>,
    out: Vec<Raise>,
}

impl<'c, 'a> Raises<'c, 'a> {
    fn new(ctx: &'c AlarmContext<'a>) -> Self {
        Self {
            ctx,
            out: Vec::new(),
        }
    }

    fn alarm(&mut self, alarm: Alarm, on: bool) {
        self.out.push(Raise::Alarm(alarm, on));
    }

    fn port_alarm(&self, kind: AlarmKind, port: &PortSnapshot) -> Alarm {
        Alarm::new(kind, Some(AlarmObject::Id(port.id)))
            .with_param("NetworkIFNumber", port.id)
            .with_param("PlatformObjectID", self.ctx.object_id(port))
    }

    fn link_down(&mut self, port: &PortSnapshot, teaming: bool) {
        let alarm = Alarm::new(AlarmKind::NetworkIfDown, Some(AlarmObject::Id(port.id)))
            .with_param("NetworkIFNumber", port.id)
            .with_param("isTeamingPort", teaming)
            .with_param("PlatformObjectID", self.ctx.object_id(port));
        self.alarm(alarm, port.is_down());
    }

    fn address_fail(&mut self, port: &PortSnapshot, bad_address: bool, dhcp_fail: bool) {
        let (kind, on) = if bad_address {
            (AlarmKind::NetworkAddressFail, true)
        } else if dhcp_fail {
            (AlarmKind::NetworkAddressFailDhcp, true)
        } else {
            (AlarmKind::NetworkAddressFail, false)
        };
        let alarm = self.port_alarm(kind, port);
        self.alarm(alarm, on);
    }

    fn video_down(&mut self, port: &PortSnapshot, down: bool, bad_address: bool, dhcp_fail: bool) {
        if self.ctx.platform.is_management_port(port.id) {
            return;
        }

        let (kind, on) = if down {
            if port.redundancy_status == RedundancyStatus::Inactive {
                (AlarmKind::VideoOverIpPortDownInactive, true)
            } else {
                (AlarmKind::VideoOverIpPortDownInterface, true)
            }
        } else if bad_address {
            (AlarmKind::VideoOverIpPortDownAddress, true)
        } else if dhcp_fail {
            (AlarmKind::VideoOverIpPortDownDhcp, true)
        } else {
            (AlarmKind::VideoOverIpPortDown, false)
        };
        let alarm = self.port_alarm(kind, port);
        self.alarm(alarm, on);
    }

    fn storage_down(&mut self, port: &PortSnapshot, on: bool) {
        if !self.ctx.platform.is_application_port(port.id) {
            return;
        }
        let alarm = Alarm::new(AlarmKind::StoragePortDown, None)
            .with_param("PlatformObjectID", &self.ctx.platform.chassis);
        self.alarm(alarm, on);
    }

    fn state_changed(&mut self, port: &PortSnapshot, from: TeamPortState, to: TeamPortState) {
        if from == to {
            return;
        }
        let event = Alarm::new(AlarmKind::NicTeamingPortStateChanged, None)
            .with_param("ethernetPortNum", port.id)
            .with_param("NICTeamingName", &port.interface_name)
            .with_param("PreviousState", from)
            .with_param("CurrentState", to);
        self.out.push(Raise::Event(event));
    }

    /// Reports the port's redundancy state change since the previous
    /// cycle. A configuration change passes through NOT_ENABLED.
    fn redundancy_event(&mut self, port: &PortSnapshot) {
        let previous = match self.ctx.previous.get(&port.id) {
            Some(facts) if facts.same_mode(port) => facts.redundancy_status.into(),
            Some(facts) => {
                self.state_changed(
                    port,
                    facts.redundancy_status.into(),
                    TeamPortState::NotEnabled,
                );
                TeamPortState::NotEnabled
            }
            None => TeamPortState::NotEnabled,
        };
        self.state_changed(port, previous, port.redundancy_status.into());
    }
}

/// A port without redundancy.
#[derive(Debug, Clone, Copy)]
pub struct SingleStrategy;

impl AlarmStrategy for SingleStrategy {
    fn evaluate(&self, group: &RedundancyGroup<'_>, ctx: &AlarmContext<'_>) -> Vec<Raise> {
        let mut raises = Raises::new(ctx);
        let port = group.primary();

        let down = port.is_down();
        let bad_address = port.enabled && port.has_bad_address();
        let dhcp_fail = port.dhcp_failed();

        raises.link_down(port, false);
        raises.address_fail(port, bad_address, dhcp_fail);
        raises.video_down(port, down, bad_address, dhcp_fail);
        raises.storage_down(port, down || bad_address || dhcp_fail);
        // Reports the pair being torn down.
        raises.redundancy_event(port);

        raises.out
    }
}

/// A team of ports.
#[derive(Debug, Clone, Copy)]
pub struct TeamedStrategy;

impl AlarmStrategy for TeamedStrategy {
    fn evaluate(&self, group: &RedundancyGroup<'_>, ctx: &AlarmContext<'_>) -> Vec<Raise> {
        let mut raises = Raises::new(ctx);
        let head = group.primary();
        let slave = group.secondary().unwrap_or(head);
        let enabled = head.enabled;

        for port in group.members() {
            raises.redundancy_event(port);
        }

        for port in group.members() {
            let activated = !port.primary_port
                && port.redundancy_status == RedundancyStatus::Active
                && enabled;
            let alarm = Alarm::new(
                AlarmKind::NicTeamingSlaveChannelActivated,
                Some(AlarmObject::Id(port.id)),
            )
            .with_param("ethernetPortNum", port.id)
            .with_param("NICTeamingName", &port.interface_name)
            .with_param("PlatformObjectID", ctx.object_id(port));
            raises.alarm(alarm, activated);
        }

        let mut team_bad_address = false;
        let mut team_dhcp_fail = false;
        for port in group.members() {
            let bad_address = port.enabled && port.has_bad_address();
            let dhcp_fail = port.dhcp_failed();
            raises.link_down(port, true);
            raises.address_fail(port, bad_address, dhcp_fail);
            team_bad_address |= bad_address;
            team_dhcp_fail |= dhcp_fail;
        }

        let team_down = enabled
            && !group
                .members()
                .iter()
                .any(|p| p.redundancy_status.is_active());
        let kind = if group.redundancy_type() == RedundancyType::ActiveActive {
            AlarmKind::NicTeamingDownPortRedundancy
        } else {
            AlarmKind::NicTeamingDown
        };
        let enforce_priority = !matches!(
            head.redundancy_mode,
            RedundancyMode::Automatic | RedundancyMode::Dual
        );
        for port in group.members() {
            let alarm = Alarm::new(
                kind,
                Some(AlarmObject::Id(TEAMED_INTERFACE_OBJECT_BASE + port.id)),
            )
            .with_param("AssetingPortNum", port.id)
            .with_param("NICTeamingName", &head.interface_name)
            .with_param("FirstPortNum", head.id)
            .with_param("SecondPortNum", slave.id)
            .with_param("EnforcePortPriority", enforce_priority);
            raises.alarm(alarm, team_down);
        }

        // Address problems do not trigger failover but still take video down.
        for port in group.members() {
            raises.video_down(port, team_down, team_bad_address, team_dhcp_fail);
        }

        raises.storage_down(head, team_down || team_bad_address || team_dhcp_fail);

        raises.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nminet_types::{group_by_redundancy, DhcpStatus, FieldValuesExt, NetSnapshot, PortStatus};
    use pretty_assertions::assert_eq;

    fn snapshot(ports: Vec<PortSnapshot>) -> NetSnapshot {
        ports.into_iter().map(|p| (p.id, p)).collect()
    }

    fn evaluate(snap: &NetSnapshot, previous: &HashMap<PortId, PortFacts>) -> Vec<Raise> {
        let platform = PlatformConfig::default();
        let ctx = AlarmContext {
            platform: &platform,
            previous,
        };
        group_by_redundancy(snap)
            .iter()
            .flat_map(|g| GroupShape::of(g).map(|s| s.evaluate(g, &ctx)).unwrap_or_default())
            .collect()
    }

    fn raised_on(raises: &[Raise]) -> Vec<(AlarmKind, Option<AlarmObject>)> {
        raises
            .iter()
            .filter_map(|r| match r {
                Raise::Alarm(a, true) => Some((a.kind, a.object.clone())),
                _ => None,
            })
            .collect()
    }

    fn events(raises: &[Raise]) -> Vec<(String, String, String)> {
        raises
            .iter()
            .filter_map(|r| match r {
                Raise::Event(e) => Some((
                    e.params.get_field("ethernetPortNum").unwrap_or("").to_string(),
                    e.params.get_field("PreviousState").unwrap_or("").to_string(),
                    e.params.get_field("CurrentState").unwrap_or("").to_string(),
                )),
                _ => None,
            })
            .collect()
    }

    fn team(mode: RedundancyMode, redundancy_type: RedundancyType) -> Vec<PortSnapshot> {
        vec![
            PortSnapshot::new(7)
                .with_team(redundancy_type, mode, [8])
                .as_primary(),
            PortSnapshot::new(8).with_team(redundancy_type, mode, [7]),
        ]
    }

    #[test]
    fn test_shape_selection() {
        let snap = snapshot(vec![
            PortSnapshot::new(1),
            PortSnapshot::new(5).with_team(RedundancyType::ActiveStandby, RedundancyMode::Dual, [6]),
            PortSnapshot::new(6).with_team(RedundancyType::ActiveStandby, RedundancyMode::Dual, [5]),
        ]);
        let shapes: Vec<_> = group_by_redundancy(&snap).iter().map(GroupShape::of).collect();
        assert_eq!(shapes, vec![Some(GroupShape::Single), None]);
    }

    #[test]
    fn test_single_port_down() {
        let snap = snapshot(vec![
            PortSnapshot::new(3).with_status(PortStatus::MediaDisconnected),
        ]);
        let raises = evaluate(&snap, &HashMap::new());
        assert_eq!(
            raised_on(&raises),
            vec![
                (AlarmKind::NetworkIfDown, Some(AlarmObject::Id(3))),
                (AlarmKind::VideoOverIpPortDownInterface, Some(AlarmObject::Id(3))),
                (AlarmKind::StoragePortDown, None),
            ]
        );
        // Non-teamed port with no history stays NOT_ENABLED: no event.
        assert!(events(&raises).is_empty());
    }

    #[test]
    fn test_management_port_skips_video_and_storage() {
        let snap = snapshot(vec![
            PortSnapshot::new(1).with_status(PortStatus::MediaDisconnected),
        ]);
        let raises = evaluate(&snap, &HashMap::new());
        assert_eq!(
            raised_on(&raises),
            vec![(AlarmKind::NetworkIfDown, Some(AlarmObject::Id(1)))]
        );
        assert!(raises.iter().all(|r| match r {
            Raise::Alarm(a, _) => a.kind != AlarmKind::VideoOverIpPortDown,
            Raise::Event(_) => true,
        }));
    }

    #[test]
    fn test_single_address_failures() {
        let snap = snapshot(vec![
            PortSnapshot::new(5).with_address("10.0.0.5", 24, false),
            PortSnapshot::new(6).with_dhcp(DhcpStatus::Fail),
        ]);
        let raises = evaluate(&snap, &HashMap::new());
        assert_eq!(
            raised_on(&raises),
            vec![
                (AlarmKind::NetworkAddressFail, Some(AlarmObject::Id(5))),
                (AlarmKind::VideoOverIpPortDownAddress, Some(AlarmObject::Id(5))),
                (AlarmKind::NetworkAddressFailDhcp, Some(AlarmObject::Id(6))),
                (AlarmKind::VideoOverIpPortDownDhcp, Some(AlarmObject::Id(6))),
            ]
        );
    }

    #[test]
    fn test_active_active_both_disconnected() {
        let ports = team(RedundancyMode::Automatic, RedundancyType::ActiveActive)
            .into_iter()
            .map(|p| {
                p.with_status(PortStatus::MediaDisconnected)
                    .with_redundancy_status(RedundancyStatus::Disconnected)
            })
            .collect();
        let raises = evaluate(&snapshot(ports), &HashMap::new());

        assert_eq!(
            raised_on(&raises),
            vec![
                (AlarmKind::NetworkIfDown, Some(AlarmObject::Id(7))),
                (AlarmKind::NetworkIfDown, Some(AlarmObject::Id(8))),
                (AlarmKind::NicTeamingDownPortRedundancy, Some(AlarmObject::Id(2126))),
                (AlarmKind::NicTeamingDownPortRedundancy, Some(AlarmObject::Id(2127))),
                (AlarmKind::VideoOverIpPortDownInterface, Some(AlarmObject::Id(7))),
                (AlarmKind::VideoOverIpPortDownInterface, Some(AlarmObject::Id(8))),
            ]
        );
        assert_eq!(
            events(&raises),
            vec![
                ("7".into(), "NOT_ENABLED".into(), "INACTIVE".into()),
                ("8".into(), "NOT_ENABLED".into(), "INACTIVE".into()),
            ]
        );

        let team_down = raises
            .iter()
            .find_map(|r| match r {
                Raise::Alarm(a, true) if a.object == Some(AlarmObject::Id(2127)) => Some(a),
                _ => None,
            })
            .unwrap();
        assert_eq!(team_down.params.get_field("AssetingPortNum"), Some("8"));
        assert_eq!(team_down.params.get_field("FirstPortNum"), Some("7"));
        assert_eq!(team_down.params.get_field("SecondPortNum"), Some("8"));
        assert_eq!(team_down.params.get_field("EnforcePortPriority"), Some("false"));
        assert_eq!(team_down.params.get_field("NICTeamingName"), Some("eth7"));
    }

    #[test]
    fn test_manual_mode_enforces_priority() {
        let ports = team(RedundancyMode::Manual, RedundancyType::ActiveStandby)
            .into_iter()
            .map(|p| p.with_status(PortStatus::MediaDisconnected))
            .collect();
        let raises = evaluate(&snapshot(ports), &HashMap::new());
        let team_down = raises
            .iter()
            .find_map(|r| match r {
                Raise::Alarm(a, true) if a.kind == AlarmKind::NicTeamingDown => Some(a),
                _ => None,
            })
            .unwrap();
        assert_eq!(team_down.params.get_field("EnforcePortPriority"), Some("true"));
    }

    #[test]
    fn test_backup_activated() {
        let mut ports = team(RedundancyMode::Automatic, RedundancyType::ActiveStandby);
        ports[0] = ports[0]
            .clone()
            .with_status(PortStatus::MediaDisconnected)
            .with_redundancy_status(RedundancyStatus::Disconnected);
        ports[1] = ports[1].clone().with_redundancy_status(RedundancyStatus::Active);
        let raises = evaluate(&snapshot(ports), &HashMap::new());

        let on = raised_on(&raises);
        assert!(on.contains(&(
            AlarmKind::NicTeamingSlaveChannelActivated,
            Some(AlarmObject::Id(8))
        )));
        assert!(!on.iter().any(|(k, _)| *k == AlarmKind::NicTeamingDown));
        // Video stays up while the team carries traffic.
        assert!(!on.iter().any(|(k, _)| *k == AlarmKind::VideoOverIpPortDownInterface));
    }

    #[test]
    fn test_reconfiguration_passes_through_not_enabled() {
        let ports: Vec<PortSnapshot> = team(RedundancyMode::Automatic, RedundancyType::ActiveActive)
            .into_iter()
            .map(|p| p.with_redundancy_status(RedundancyStatus::Active))
            .collect();

        let previous: HashMap<PortId, PortFacts> = ports
            .iter()
            .map(|p| {
                let mut facts = PortFacts::from(p);
                facts.redundancy_mode = RedundancyMode::Manual;
                facts.redundancy_status = RedundancyStatus::Inactive;
                (p.id, facts)
            })
            .collect();

        let raises = evaluate(&snapshot(ports), &previous);
        assert_eq!(
            events(&raises),
            vec![
                ("7".into(), "INACTIVE".into(), "NOT_ENABLED".into()),
                ("7".into(), "NOT_ENABLED".into(), "ACTIVE".into()),
                ("8".into(), "INACTIVE".into(), "NOT_ENABLED".into()),
                ("8".into(), "NOT_ENABLED".into(), "ACTIVE".into()),
            ]
        );
    }

    #[test]
    fn test_same_mode_reports_plain_transition() {
        let ports: Vec<PortSnapshot> = team(RedundancyMode::Automatic, RedundancyType::ActiveActive);
        let previous: HashMap<PortId, PortFacts> = ports
            .iter()
            .map(|p| {
                let facts = PortFacts::from(&p.clone().with_redundancy_status(RedundancyStatus::Inactive));
                (p.id, facts)
            })
            .collect();

        let ports = vec![
            ports[0].clone().with_redundancy_status(RedundancyStatus::Active),
            ports[1].clone().with_redundancy_status(RedundancyStatus::Disconnected),
        ];
        let raises = evaluate(&snapshot(ports), &previous);
        assert_eq!(
            events(&raises),
            vec![("7".into(), "INACTIVE".into(), "ACTIVE".into())]
        );
    }
}
