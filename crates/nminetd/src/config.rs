//! Configuration file support for nminetd
//!
//! Loads and validates daemon configuration from TOML files.
//! Default location: /etc/nminet/nminetd.toml

use crate::error::{NetMgrError, Result};
use nminet_types::PortId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nminet/nminetd.toml";

/// Chassis layout and port roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Chassis name used as the root of platform object ids
    #[serde(default = "default_chassis")]
    pub chassis: String,

    /// Out-of-band management ports (no video-over-IP alarms)
    #[serde(default = "default_management_ports")]
    pub management_ports: Vec<PortId>,

    /// Ports carrying storage traffic
    #[serde(default = "default_application_ports")]
    pub application_ports: Vec<PortId>,
}

/// Redundancy engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedundancyConfig {
    /// Automatic revert observation window in seconds
    #[serde(default = "default_revert_timeout")]
    pub revert_timeout_secs: u64,

    /// Internal transitions allowed per revert FSM step
    #[serde(default = "default_revert_step_limit")]
    pub revert_step_limit: usize,
}

/// Worker queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum queued requests before producers wait
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

/// Complete nminetd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetMgrConfig {
    #[serde(default)]
    pub platform: PlatformConfig,

    #[serde(default)]
    pub redundancy: RedundancyConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

fn default_chassis() -> String {
    "Ch.1".to_string()
}

fn default_management_ports() -> Vec<PortId> {
    vec![1, 2]
}

fn default_application_ports() -> Vec<PortId> {
    vec![3, 4]
}

fn default_revert_timeout() -> u64 {
    5
}

fn default_revert_step_limit() -> usize {
    10
}

fn default_queue_depth() -> usize {
    64
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            chassis: default_chassis(),
            management_ports: default_management_ports(),
            application_ports: default_application_ports(),
        }
    }
}

impl Default for RedundancyConfig {
    fn default() -> Self {
        Self {
            revert_timeout_secs: default_revert_timeout(),
            revert_step_limit: default_revert_step_limit(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

impl PlatformConfig {
    pub fn is_management_port(&self, id: PortId) -> bool {
        self.management_ports.contains(&id)
    }

    pub fn is_application_port(&self, id: PortId) -> bool {
        self.application_ports.contains(&id)
    }

    /// Chassis-relative object path: four ports per card.
    pub fn platform_object_id(&self, id: PortId) -> String {
        let index = id.saturating_sub(1);
        format!(
            "{}.C.{}.P.{}",
            self.chassis,
            index / 4 + 1,
            index % 4 + 1
        )
    }
}

impl NetMgrConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => {
                let config: Self = toml::from_str(&content).map_err(|e| {
                    NetMgrError::config(path.display().to_string(), e.to_string())
                })?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(NetMgrError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Get revert window as Duration
    pub fn revert_timeout(&self) -> Duration {
        Duration::from_secs(self.redundancy.revert_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.platform.chassis.is_empty() {
            return Err(NetMgrError::config(
                "platform.chassis",
                "must not be empty",
            ));
        }

        if let Some(port) = self
            .platform
            .management_ports
            .iter()
            .find(|p| self.platform.application_ports.contains(p))
        {
            return Err(NetMgrError::config(
                "platform.application_ports",
                format!("port {} is also a management port", port),
            ));
        }

        if self.redundancy.revert_timeout_secs == 0 {
            return Err(NetMgrError::config(
                "redundancy.revert_timeout_secs",
                "must be > 0",
            ));
        }

        if self.redundancy.revert_step_limit == 0 {
            return Err(NetMgrError::config(
                "redundancy.revert_step_limit",
                "must be > 0",
            ));
        }

        if self.worker.queue_depth == 0 {
            return Err(NetMgrError::config("worker.queue_depth", "must be > 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = NetMgrConfig::default();
        assert_eq!(config.platform.chassis, "Ch.1");
        assert_eq!(config.platform.management_ports, vec![1, 2]);
        assert_eq!(config.platform.application_ports, vec![3, 4]);
        assert_eq!(config.redundancy.revert_step_limit, 10);
        assert_eq!(config.worker.queue_depth, 64);
    }

    #[test]
    fn test_revert_timeout_duration() {
        let config = NetMgrConfig::default();
        assert_eq!(config.revert_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_platform_object_id() {
        let platform = PlatformConfig::default();
        assert_eq!(platform.platform_object_id(1), "Ch.1.C.1.P.1");
        assert_eq!(platform.platform_object_id(4), "Ch.1.C.1.P.4");
        assert_eq!(platform.platform_object_id(5), "Ch.1.C.2.P.1");
        assert_eq!(platform.platform_object_id(8), "Ch.1.C.2.P.4");
    }

    #[test]
    fn test_port_roles() {
        let platform = PlatformConfig::default();
        assert!(platform.is_management_port(2));
        assert!(!platform.is_management_port(3));
        assert!(platform.is_application_port(4));
        assert!(!platform.is_application_port(7));
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(NetMgrConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlapping_ports() {
        let mut config = NetMgrConfig::default();
        config.platform.application_ports = vec![2, 3];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("port 2"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = NetMgrConfig::default();
        config.redundancy.revert_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_queue_depth() {
        let mut config = NetMgrConfig::default();
        config.worker.queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[platform]
chassis = "Ch.2"
application_ports = [5, 6]

[redundancy]
revert_timeout_secs = 8
"#;
        let config: NetMgrConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.platform.chassis, "Ch.2");
        assert_eq!(config.platform.application_ports, vec![5, 6]);
        assert_eq!(config.revert_timeout(), Duration::from_secs(8));
        // Unspecified values should use defaults
        assert_eq!(config.platform.management_ports, vec![1, 2]);
        assert_eq!(config.redundancy.revert_step_limit, 10);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nqueue_depth = 8").unwrap();
        let config = NetMgrConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.worker.queue_depth, 8);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[redundancy]\nrevert_step_limit = 0").unwrap();
        assert!(NetMgrConfig::load_or_default(file.path()).is_err());
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = NetMgrConfig::load_or_default("/nonexistent/path.toml").unwrap();
        assert_eq!(config.platform.chassis, "Ch.1");
    }
}
