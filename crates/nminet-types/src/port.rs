//! Port and redundancy enumerations.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Small stable integer identifying a network port on the chassis.
pub type PortId = u32;

/// Folds case, `_` and `-` so `MediaDisconnected`, `MEDIA_DISCONNECTED`
/// and `media-disconnected` all parse alike.
fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '_' && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Link state of a port as reported by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortStatus {
    /// Link is up.
    Connected,
    /// Port is administratively disabled.
    #[default]
    Disabled,
    /// Port is enabled but has no carrier.
    MediaDisconnected,
}

impl PortStatus {
    /// Returns true if the port has carrier.
    pub const fn has_carrier(&self) -> bool {
        matches!(self, PortStatus::Connected)
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortStatus::Connected => "CONNECTED",
            PortStatus::Disabled => "DISABLED",
            PortStatus::MediaDisconnected => "MEDIA_DISCONNECTED",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PortStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "CONNECTED" => Ok(PortStatus::Connected),
            "DISABLED" => Ok(PortStatus::Disabled),
            "MEDIADISCONNECTED" => Ok(PortStatus::MediaDisconnected),
            _ => Err(ParseError::InvalidPortStatus(s.to_string())),
        }
    }
}

/// How the ports of a team share traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedundancyType {
    /// No redundancy; the port stands alone.
    #[default]
    None,
    /// Exactly one member carries traffic, chosen by the team daemon.
    ActiveStandby,
    /// Members may all carry traffic; one is designated active for reporting.
    ActiveActive,
}

impl RedundancyType {
    /// Returns true if the port is part of a team.
    pub const fn is_teamed(&self) -> bool {
        !matches!(self, RedundancyType::None)
    }
}

impl fmt::Display for RedundancyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RedundancyType::None => "NONE",
            RedundancyType::ActiveStandby => "ACTIVE_STANDBY",
            RedundancyType::ActiveActive => "ACTIVE_ACTIVE",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RedundancyType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "NONE" => Ok(RedundancyType::None),
            "ACTIVESTANDBY" => Ok(RedundancyType::ActiveStandby),
            "ACTIVEACTIVE" => Ok(RedundancyType::ActiveActive),
            _ => Err(ParseError::InvalidRedundancyType(s.to_string())),
        }
    }
}

/// Failover policy of a team. Meaningless when the type is
/// [`RedundancyType::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedundancyMode {
    /// Fail over on carrier loss, never fail back on priority alone.
    #[default]
    Automatic,
    /// Fail over on carrier loss and fail back to the primary when it returns.
    AutomaticRevert,
    /// Operator-chosen primary; the backup takes over only on carrier loss
    /// and stays pinned afterwards.
    Manual,
    /// Operator-chosen port stays active regardless of carrier.
    ManualNoFailover,
    /// Every member reports its own activity.
    Dual,
}

impl fmt::Display for RedundancyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RedundancyMode::Automatic => "AUTOMATIC",
            RedundancyMode::AutomaticRevert => "AUTOMATIC_REVERT",
            RedundancyMode::Manual => "MANUAL",
            RedundancyMode::ManualNoFailover => "MANUAL_NO_FAILOVER",
            RedundancyMode::Dual => "DUAL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RedundancyMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "AUTOMATIC" => Ok(RedundancyMode::Automatic),
            "AUTOMATICREVERT" => Ok(RedundancyMode::AutomaticRevert),
            "MANUAL" => Ok(RedundancyMode::Manual),
            "MANUALNOFAILOVER" => Ok(RedundancyMode::ManualNoFailover),
            "DUAL" => Ok(RedundancyMode::Dual),
            _ => Err(ParseError::InvalidRedundancyMode(s.to_string())),
        }
    }
}

/// Derived redundancy state of a single port for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedundancyStatus {
    #[default]
    NotEnabled,
    Active,
    Inactive,
    Disconnected,
    ActiveDual,
}

impl RedundancyStatus {
    /// Returns true for both single-active and dual-active states.
    pub const fn is_active(&self) -> bool {
        matches!(self, RedundancyStatus::Active | RedundancyStatus::ActiveDual)
    }
}

impl fmt::Display for RedundancyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RedundancyStatus::NotEnabled => "NOT_ENABLED",
            RedundancyStatus::Active => "ACTIVE",
            RedundancyStatus::Inactive => "INACTIVE",
            RedundancyStatus::Disconnected => "DISCONNECTED",
            RedundancyStatus::ActiveDual => "ACTIVE_DUAL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RedundancyStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "NOTENABLED" => Ok(RedundancyStatus::NotEnabled),
            "ACTIVE" => Ok(RedundancyStatus::Active),
            "INACTIVE" => Ok(RedundancyStatus::Inactive),
            "DISCONNECTED" => Ok(RedundancyStatus::Disconnected),
            "ACTIVEDUAL" => Ok(RedundancyStatus::ActiveDual),
            _ => Err(ParseError::InvalidRedundancyStatus(s.to_string())),
        }
    }
}

/// Outcome of the DHCP client on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DhcpStatus {
    /// No lease attempt made or DHCP not in use.
    #[default]
    None,
    Ok,
    Fail,
}

impl fmt::Display for DhcpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DhcpStatus::None => "NONE",
            DhcpStatus::Ok => "OK",
            DhcpStatus::Fail => "FAIL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DhcpStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "NONE" => Ok(DhcpStatus::None),
            "OK" => Ok(DhcpStatus::Ok),
            "FAIL" => Ok(DhcpStatus::Fail),
            _ => Err(ParseError::InvalidDhcpStatus(s.to_string())),
        }
    }
}

/// Where an interface address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IpOrigin {
    Manual,
    Dhcp,
    LinkLocal,
    Bootp,
}

impl fmt::Display for IpOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IpOrigin::Manual => "MANUAL",
            IpOrigin::Dhcp => "DHCP",
            IpOrigin::LinkLocal => "LINK_LOCAL",
            IpOrigin::Bootp => "BOOTP",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for IpOrigin {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "MANUAL" => Ok(IpOrigin::Manual),
            "DHCP" => Ok(IpOrigin::Dhcp),
            "LINKLOCAL" => Ok(IpOrigin::LinkLocal),
            "BOOTP" => Ok(IpOrigin::Bootp),
            _ => Err(ParseError::InvalidIpOrigin(s.to_string())),
        }
    }
}
