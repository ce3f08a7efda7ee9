//! Hand-off to the team daemon.
//!
//! ActiveStandby teams are switched by the team daemon itself; the worker
//! only asks it to select a port.

use crate::error::Result;
use nminet_types::PortId;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Port selection on ActiveStandby teams.
pub trait PortSelectionDriver: Send {
    /// Asks the team daemon to make `port` the active member of its team.
    fn select_team_port(&mut self, port: PortId) -> Result<()>;
}

/// Logs the request and does nothing else.
#[derive(Debug, Default)]
pub struct LoggingDriver;

impl PortSelectionDriver for LoggingDriver {
    fn select_team_port(&mut self, port: PortId) -> Result<()> {
        info!(port, "Selecting team port");
        Ok(())
    }
}

/// Records the ports it is asked to select.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    selected: Arc<Mutex<Vec<PortId>>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Vec<PortId> {
        self.selected
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl PortSelectionDriver for RecordingDriver {
    fn select_team_port(&mut self, port: PortId) -> Result<()> {
        if let Ok(mut selected) = self.selected.lock() {
            selected.push(port);
        }
        Ok(())
    }
}
