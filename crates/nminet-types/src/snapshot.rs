//! Per-cycle interface snapshot.
//!
//! A [`NetSnapshot`] is the authoritative view of every known port for one
//! poll cycle. The collector builds it; the core only reads it, except for
//! [`PortSnapshot::redundancy_status`] which the worker fills in from the
//! active port selector before anything else looks at the snapshot.

use crate::port::{
    DhcpStatus, IpOrigin, PortId, PortStatus, RedundancyMode, RedundancyStatus, RedundancyType,
};
use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::warn;

/// All ports of one cycle, ordered by id.
pub type NetSnapshot = BTreeMap<PortId, PortSnapshot>;

/// A single configured interface address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub addr: String,
    pub prefix_len: u8,
    pub origin: IpOrigin,
    /// False when the address could not be applied (duplicate, bad prefix...).
    #[serde(default = "default_true")]
    pub valid: bool,
}

fn default_true() -> bool {
    true
}

/// Facts about one port for one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PortRecord")]
pub struct PortSnapshot {
    pub id: PortId,
    pub enabled: bool,
    pub status: PortStatus,
    /// Team daemon's view of whether this port carries traffic.
    pub active: bool,
    pub redundancy_type: RedundancyType,
    pub redundancy_mode: RedundancyMode,
    /// Other ports of the same team, excluding this one.
    pub team_members: BTreeSet<PortId>,
    /// Configured primary of its team.
    pub primary_port: bool,
    /// Operator-selected primary in manual modes.
    pub manual_primary_port: bool,
    /// One-shot request to adopt this port as active on the next resync.
    pub select_port: bool,
    /// Monotonic timestamp (ms) of the last observed state transition.
    pub last_change: u64,
    pub interface_name: String,
    pub platform_object_id: String,
    pub enable_dhcp: bool,
    pub dhcp_status: DhcpStatus,
    pub addresses: Vec<AddressInfo>,
    pub redundancy_status: RedundancyStatus,
}

/// Collector form of [`PortSnapshot`].
///
/// Redundancy settings are read as text so that a value this build does not
/// know costs only that port its redundancy, not the whole snapshot.
#[derive(Debug, Deserialize)]
struct PortRecord {
    id: PortId,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    status: PortStatus,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    redundancy_type: Option<String>,
    #[serde(default)]
    redundancy_mode: Option<String>,
    #[serde(default)]
    team_members: BTreeSet<PortId>,
    #[serde(default)]
    primary_port: bool,
    #[serde(default)]
    manual_primary_port: bool,
    #[serde(default)]
    select_port: bool,
    #[serde(default)]
    last_change: u64,
    #[serde(default)]
    interface_name: String,
    #[serde(default)]
    platform_object_id: String,
    #[serde(default)]
    enable_dhcp: bool,
    #[serde(default)]
    dhcp_status: DhcpStatus,
    #[serde(default)]
    addresses: Vec<AddressInfo>,
    #[serde(default)]
    redundancy_status: RedundancyStatus,
}

fn parse_or_default<T>(value: Option<&str>) -> Result<T, ParseError>
where
    T: FromStr<Err = ParseError> + Default,
{
    value.map_or_else(|| Ok(T::default()), str::parse)
}

impl From<PortRecord> for PortSnapshot {
    fn from(record: PortRecord) -> Self {
        let redundancy_type = parse_or_default::<RedundancyType>(record.redundancy_type.as_deref());
        let redundancy_mode = parse_or_default::<RedundancyMode>(record.redundancy_mode.as_deref());
        let (redundancy_type, redundancy_mode) = match (redundancy_type, redundancy_mode) {
            (Ok(redundancy_type), Ok(redundancy_mode)) => (redundancy_type, redundancy_mode),
            (Err(e), _) | (_, Err(e)) => {
                warn!(port = record.id, error = %e, "Ignoring redundancy settings of port");
                (RedundancyType::None, RedundancyMode::default())
            }
        };

        Self {
            id: record.id,
            enabled: record.enabled,
            status: record.status,
            active: record.active,
            redundancy_type,
            redundancy_mode,
            team_members: record.team_members,
            primary_port: record.primary_port,
            manual_primary_port: record.manual_primary_port,
            select_port: record.select_port,
            last_change: record.last_change,
            interface_name: record.interface_name,
            platform_object_id: record.platform_object_id,
            enable_dhcp: record.enable_dhcp,
            dhcp_status: record.dhcp_status,
            addresses: record.addresses,
            redundancy_status: record.redundancy_status,
        }
    }
}

impl PortSnapshot {
    /// Creates an enabled, connected, non-teamed port.
    pub fn new(id: PortId) -> Self {
        Self {
            id,
            enabled: true,
            status: PortStatus::Connected,
            active: false,
            redundancy_type: RedundancyType::None,
            redundancy_mode: RedundancyMode::Automatic,
            team_members: BTreeSet::new(),
            primary_port: false,
            manual_primary_port: false,
            select_port: false,
            last_change: 0,
            interface_name: format!("eth{}", id),
            platform_object_id: String::new(),
            enable_dhcp: false,
            dhcp_status: DhcpStatus::None,
            addresses: Vec::new(),
            redundancy_status: RedundancyStatus::NotEnabled,
        }
    }

    /// Sets link status; disabling also clears `enabled`.
    pub fn with_status(mut self, status: PortStatus) -> Self {
        self.status = status;
        self.enabled = status != PortStatus::Disabled;
        self
    }

    /// Puts the port in a team with the given peers.
    pub fn with_team(
        mut self,
        redundancy_type: RedundancyType,
        mode: RedundancyMode,
        members: impl IntoIterator<Item = PortId>,
    ) -> Self {
        self.redundancy_type = redundancy_type;
        self.redundancy_mode = mode;
        self.team_members = members.into_iter().filter(|m| *m != self.id).collect();
        self
    }

    /// Marks the port as the configured primary of its team.
    pub fn as_primary(mut self) -> Self {
        self.primary_port = true;
        self
    }

    pub fn with_last_change(mut self, ts: u64) -> Self {
        self.last_change = ts;
        self
    }

    pub fn with_redundancy_status(mut self, status: RedundancyStatus) -> Self {
        self.redundancy_status = status;
        self
    }

    pub fn with_address(mut self, addr: impl Into<String>, prefix_len: u8, valid: bool) -> Self {
        self.addresses.push(AddressInfo {
            addr: addr.into(),
            prefix_len,
            origin: IpOrigin::Manual,
            valid,
        });
        self
    }

    /// Enables DHCP with the given client outcome.
    pub fn with_dhcp(mut self, status: DhcpStatus) -> Self {
        self.enable_dhcp = true;
        self.dhcp_status = status;
        self
    }

    /// Physical link-up signal.
    pub fn have_carrier(&self) -> bool {
        self.status.has_carrier()
    }

    /// Enabled but without carrier.
    pub fn is_down(&self) -> bool {
        self.enabled && self.status == PortStatus::MediaDisconnected
    }

    /// Any configured address failed to apply.
    pub fn has_bad_address(&self) -> bool {
        self.addresses.iter().any(|a| !a.valid)
    }

    pub fn dhcp_failed(&self) -> bool {
        self.enabled
            && self.enable_dhcp
            && self.status == PortStatus::Connected
            && self.dhcp_status == DhcpStatus::Fail
    }

    /// Primary port that actually leads followers.
    pub fn has_followers(&self) -> bool {
        self.primary_port && !self.team_members.is_empty()
    }
}
