//! Alarm catalogue.
//!
//! Every alarm and event the engine can raise, with its fixed metadata.
//! Several kinds share one wire name and differ only in description; they
//! latch as the same alarm, and a description change re-emits it.
//!
//! | Kind | Order | Mergeable | Event |
//! |------|-------|-----------|-------|
//! | NetworkIfDown | 100 | | |
//! | VideoOverIpPortDown* | 200 | | |
//! | NetworkAddressFail* | 1000 | | |
//! | NicTeamingSlaveChannelActivated | 1000 | | |
//! | NicTeamingDown* | 1000 | | |
//! | NicTeamingPortStateChanged | 1000 | | yes |
//! | StoragePortDown | 1000 | yes | |
//! | IpConfigurationChanged | 1000 | | yes |

use nminet_types::{FieldValues, FieldValuesExt};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;

/// Sort order for kinds that do not need to go first.
pub const DEFAULT_ORDER: u32 = 1000;

/// Source for platform alarms.
pub const PLATFORM_SOURCE: &str = "Platform";

/// Object id base for teamed-interface alarms.
pub const TEAMED_INTERFACE_OBJECT_BASE: u32 = 2119;

/// `%Name` placeholders in description templates.
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmLevel {
    Crit,
    Major,
    Warn,
}

impl fmt::Display for AlarmLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlarmLevel::Crit => "CRIT",
            AlarmLevel::Major => "MAJOR",
            AlarmLevel::Warn => "WARN",
        };
        write!(f, "{}", s)
    }
}

/// Fixed metadata of an alarm kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmDescriptor {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub level: AlarmLevel,
    pub order: u32,
    pub merge: bool,
    pub is_event: bool,
    pub source: &'static str,
}

impl AlarmDescriptor {
    const fn alarm(
        name: &'static str,
        title: &'static str,
        description: &'static str,
        level: AlarmLevel,
    ) -> Self {
        Self {
            name,
            title,
            description,
            level,
            order: DEFAULT_ORDER,
            merge: false,
            is_event: false,
            source: PLATFORM_SOURCE,
        }
    }

    const fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    const fn mergeable(mut self) -> Self {
        self.merge = true;
        self
    }

    const fn event(mut self) -> Self {
        self.is_event = true;
        self
    }

    const fn source(mut self, source: &'static str) -> Self {
        self.source = source;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    NetworkIfDown,
    /// Remit form of the video-over-IP alarm.
    VideoOverIpPortDown,
    VideoOverIpPortDownInactive,
    VideoOverIpPortDownInterface,
    VideoOverIpPortDownAddress,
    VideoOverIpPortDownDhcp,
    NetworkAddressFail,
    NetworkAddressFailDhcp,
    NicTeamingSlaveChannelActivated,
    NicTeamingDown,
    NicTeamingDownPortRedundancy,
    NicTeamingPortStateChanged,
    StoragePortDown,
    IpConfigurationChanged,
}

impl AlarmKind {
    pub const fn descriptor(&self) -> AlarmDescriptor {
        use AlarmLevel::*;

        const VOIP: &str = "Harmonic_VideoOverIPPortDown";
        const VOIP_TITLE: &str = "Video Over IP Port Down";
        const ADDR_FAIL: &str = "Harmonic_NetworkAddressFailIndication";
        const TEAM_DOWN: &str = "Harmonic_NICTeamingDown";

        match self {
            AlarmKind::NetworkIfDown => AlarmDescriptor::alarm(
                "Harmonic_NetworkIFDownIndication",
                "Network Interface Link Down",
                "Network interface %NetworkIFNumber is down",
                Crit,
            )
            .order(100),
            AlarmKind::VideoOverIpPortDown => {
                AlarmDescriptor::alarm(VOIP, VOIP_TITLE, "Video Over IP Port Down", Crit).order(200)
            }
            AlarmKind::VideoOverIpPortDownInactive => AlarmDescriptor::alarm(
                VOIP,
                VOIP_TITLE,
                "Video Over IP Port Down. Network interface %NetworkIFNumber is inactive",
                Crit,
            )
            .order(200),
            AlarmKind::VideoOverIpPortDownInterface => AlarmDescriptor::alarm(
                VOIP,
                VOIP_TITLE,
                "Video Over IP Port Down. Network interface %NetworkIFNumber is down",
                Crit,
            )
            .order(200),
            AlarmKind::VideoOverIpPortDownAddress => AlarmDescriptor::alarm(
                VOIP,
                VOIP_TITLE,
                "Video Over IP Port Down. Invalid address configured on interface %NetworkIFNumber",
                Crit,
            )
            .order(200),
            AlarmKind::VideoOverIpPortDownDhcp => AlarmDescriptor::alarm(
                VOIP,
                VOIP_TITLE,
                "Video Over IP Port Down. DHCP failed on interface %NetworkIFNumber",
                Crit,
            )
            .order(200),
            AlarmKind::NetworkAddressFail => AlarmDescriptor::alarm(
                ADDR_FAIL,
                "Failed to set IP address",
                "Failed to set IP address on interface %NetworkIFNumber",
                Crit,
            ),
            AlarmKind::NetworkAddressFailDhcp => AlarmDescriptor::alarm(
                ADDR_FAIL,
                "Failed to acquire IP address",
                "Failed to acquire IP address on port %NetworkIFNumber",
                Crit,
            ),
            AlarmKind::NicTeamingSlaveChannelActivated => AlarmDescriptor::alarm(
                "Harmonic_NICTeamingSlaveChannelActivated",
                "NIC Teaming Slave Port Activated",
                "Backup network interface %NICTeamingName port %ethernetPortNum is activated",
                Warn,
            ),
            AlarmKind::NicTeamingDown => AlarmDescriptor::alarm(
                TEAM_DOWN,
                "NIC Teaming Down",
                "Teamed interface %NICTeamingName is down",
                Crit,
            ),
            AlarmKind::NicTeamingDownPortRedundancy => AlarmDescriptor::alarm(
                TEAM_DOWN,
                "NIC Redundant Down",
                "Redundant port interface %NICTeamingName is down",
                Crit,
            ),
            AlarmKind::NicTeamingPortStateChanged => AlarmDescriptor::alarm(
                "Harmonic_NICTeamingPortStateChanged",
                "NIC Teaming Port State Changed",
                "Teamed interface %NICTeamingName port %ethernetPortNum state changed from %PreviousState to %CurrentState",
                Warn,
            )
            .event(),
            AlarmKind::StoragePortDown => AlarmDescriptor::alarm(
                "Harmonic_StoragePortDown",
                "Storage Port Down",
                "All active storage ports are down",
                Crit,
            )
            .mergeable(),
            AlarmKind::IpConfigurationChanged => AlarmDescriptor::alarm(
                "Harmonic_Internal_IPConfigurationChanged",
                "IP configuration changed",
                "IP configuration changed",
                Major,
            )
            .event()
            .source("NMI"),
        }
    }
}

/// Target of an alarm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum AlarmObject {
    Id(u32),
    Named(&'static str),
}

impl fmt::Display for AlarmObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmObject::Id(id) => write!(f, "{}", id),
            AlarmObject::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Identity under which an alarm latches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmKey {
    pub name: &'static str,
    pub source: &'static str,
    pub object: Option<AlarmObject>,
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object {
            Some(object) => write!(f, "{}/{}/{}", self.source, self.name, object),
            None => write!(f, "{}/{}", self.source, self.name),
        }
    }
}

/// One raised alarm or event with its detail map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub kind: AlarmKind,
    pub object: Option<AlarmObject>,
    pub params: FieldValues,
}

impl Alarm {
    pub fn new(kind: AlarmKind, object: Option<AlarmObject>) -> Self {
        Self {
            kind,
            object,
            params: FieldValues::new(),
        }
    }

    pub fn with_param(mut self, field: &str, value: impl ToString) -> Self {
        self.params.push((field.to_string(), value.to_string()));
        self
    }

    pub fn descriptor(&self) -> AlarmDescriptor {
        self.kind.descriptor()
    }

    pub fn name(&self) -> &'static str {
        self.kind.descriptor().name
    }

    pub fn key(&self) -> AlarmKey {
        let descriptor = self.kind.descriptor();
        AlarmKey {
            name: descriptor.name,
            source: descriptor.source,
            object: self.object.clone(),
        }
    }

    /// Description template, placeholders untouched.
    pub fn description(&self) -> &'static str {
        self.kind.descriptor().description
    }

    /// Description with `%Param` placeholders filled from the detail map.
    /// Unknown placeholders are left as they are.
    pub fn render(&self) -> String {
        PLACEHOLDER_RE
            .replace_all(self.description(), |caps: &Captures<'_>| {
                self.params
                    .get_field(&caps[1])
                    .map(str::to_string)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Action carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmAction {
    AlarmOn,
    AlarmOff,
    Event,
}

impl fmt::Display for AlarmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlarmAction::AlarmOn => "ALARM_ON",
            AlarmAction::AlarmOff => "ALARM_OFF",
            AlarmAction::Event => "EVENT",
        };
        write!(f, "{}", s)
    }
}

/// An entry of the batch handed to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub action: AlarmAction,
    pub alarm: Alarm,
}

impl Notification {
    pub fn new(action: AlarmAction, alarm: Alarm) -> Self {
        Self { action, alarm }
    }

    pub fn name(&self) -> &'static str {
        self.alarm.name()
    }

    pub fn object(&self) -> Option<&AlarmObject> {
        self.alarm.object.as_ref()
    }

    pub fn param(&self, field: &str) -> Option<&str> {
        self.alarm.params.get_field(field)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.alarm.key(), self.alarm.render())
    }
}
