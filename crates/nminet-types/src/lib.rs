//! Shared types for the network port redundancy manager.
//!
//! This crate provides the per-cycle interface snapshot handed over by the
//! external collector, plus the pieces every consumer of that snapshot needs:
//!
//! - [`PortStatus`], [`RedundancyType`], [`RedundancyMode`], [`RedundancyStatus`]:
//!   port and teaming enumerations
//! - [`PortSnapshot`] / [`NetSnapshot`]: immutable per-port facts for one poll cycle
//! - [`RedundancyGroup`] / [`group_by_redundancy`]: the group partitioner
//! - [`FieldValues`]: ordered key/value detail maps used for alarm payloads

mod fields;
mod group;
mod port;
mod snapshot;

pub use fields::{FieldValues, FieldValuesExt};
pub use group::{group_by_redundancy, RedundancyGroup};
pub use port::{
    DhcpStatus, IpOrigin, PortId, PortStatus, RedundancyMode, RedundancyStatus, RedundancyType,
};
pub use snapshot::{AddressInfo, NetSnapshot, PortSnapshot};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid port status: {0}")]
    InvalidPortStatus(String),

    #[error("invalid redundancy type: {0}")]
    InvalidRedundancyType(String),

    #[error("invalid redundancy mode: {0}")]
    InvalidRedundancyMode(String),

    #[error("invalid redundancy status: {0}")]
    InvalidRedundancyStatus(String),

    #[error("invalid DHCP status: {0}")]
    InvalidDhcpStatus(String),

    #[error("invalid address origin: {0}")]
    InvalidIpOrigin(String),
}
