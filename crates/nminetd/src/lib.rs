//! Network port redundancy manager.
//!
//! This crate implements the `nminetd` daemon core: it keeps the active
//! port of each redundant pair stable, brings the primary back after a
//! re-enable race and turns interface snapshots into alarm changes.
//!
//! # Components
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `selector` | Active port choice for ActiveActive teams |
//! | `team_config` | Per-mode priority, sticky and final flags |
//! | `revert` | Automatic revert to the primary after re-enable |
//! | `alarm` | Alarm catalogue, strategies and latching |
//! | `sink` | Delivery of alarm batches |
//! | `driver` | Port selection hand-off to the team daemon |
//! | `worker` | Request queue and per-snapshot cycle |
//!
//! # Example
//!
//! ```ignore
//! use nminetd::{LogSink, LoggingDriver, NetMgrConfig, NetMgrWorker};
//!
//! let config = NetMgrConfig::load_or_default(nminetd::DEFAULT_CONFIG_PATH)?;
//! let (worker, handle) = NetMgrWorker::new(&config, Box::new(LogSink), Box::new(LoggingDriver));
//! tokio::spawn(worker.run());
//! let report = handle.update_interfaces(snapshot).await?;
//! ```

pub mod alarm;
pub mod config;
pub mod driver;
pub mod error;
pub mod revert;
pub mod selector;
pub mod sink;
pub mod team_config;
pub mod worker;

pub use alarm::{AlarmAction, AlarmEngine, AlarmKind, AlarmObject, Notification};
pub use config::{NetMgrConfig, PlatformConfig, DEFAULT_CONFIG_PATH};
pub use driver::{LoggingDriver, PortSelectionDriver, RecordingDriver};
pub use error::{NetMgrError, Result};
pub use revert::{RevertFsm, RevertMonitor, RevertRequest, RevertState};
pub use selector::ActivePortSelector;
pub use sink::{JsonLinesSink, LogSink, NotificationSink, RecordingSink};
pub use team_config::{teamed_config, TeamPortConfig};
pub use worker::{decode_snapshot, CycleReport, NetMgrWorker, Request, Response, WorkerHandle};
