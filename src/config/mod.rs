use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Configuration for the Hive EC2 daemon.
///
/// This structure defines the daemon's placement and account identity:
/// the region and availability zone it serves, the account it acts for,
/// the blob bucket holding resource documents, and the message-bus URL.
/// It supports serialization to and deserialization from JSON for
/// persistent configuration.
///
/// The configuration can be loaded from a file or generated with default
/// values if no configuration file exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Region this daemon serves
    pub region: String,

    /// Availability zone this daemon serves; volume placement is
    /// validated against it
    pub availability_zone: String,

    /// Account id stamped onto owned resources
    pub account_id: String,

    /// Blob-store bucket holding the per-resource config documents
    pub bucket: String,

    /// URL of the platform message bus
    pub bus_url: String,
}

/// Default implementation for DaemonConfig.
///
/// Provides reasonable default values for a single-zone development
/// deployment, used when no custom configuration is provided or when
/// initializing a new configuration file.
impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            region: "ap-southeast-2".to_string(),
            availability_zone: "ap-southeast-2a".to_string(),
            account_id: "123456789012".to_string(),
            bucket: "hive-ec2".to_string(),
            bus_url: "nats://127.0.0.1:4222".to_string(),
        }
    }
}

/// Possible errors that can occur during configuration operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConfigError {
    /// Indicates that the configuration file could not be found
    FileNotFound,

    /// Indicates that writing to the configuration file failed
    FailedToWrite,

    /// Indicates that parsing the configuration file content failed
    ParseError,
}

/// Global static reference to the daemon configuration.
///
/// This lazy_static provides thread-safe access to the daemon
/// configuration throughout the application. It is initialized when first
/// accessed, reading from the configuration file or creating default
/// settings if no configuration exists.
///
/// # Panics
///
/// Panics if the configuration cannot be read or written, which would
/// prevent the daemon from starting properly.
lazy_static! {
    pub static ref DAEMON_CONFIG: Arc<DaemonConfig> =
        Arc::new(DaemonConfig::read().expect("Failed to initalize daemon config"));
}

impl DaemonConfig {
    /// Reads the daemon configuration from the config file.
    ///
    /// Attempts to load the configuration from "config.json" in the
    /// current directory. If the file doesn't exist or can't be read, it
    /// creates a new configuration file with default values and returns
    /// those defaults.
    ///
    /// # Returns
    ///
    /// * `Ok(DaemonConfig)` - Successfully loaded or created configuration
    /// * `Err(ConfigError)` - Failed to parse existing configuration
    pub fn read() -> Result<Self, ConfigError> {
        let config_path = "config.json";
        let config_content = match std::fs::read_to_string(config_path) {
            Ok(content) => content,
            Err(_) => {
                // If file doesn't exist, create a default configuration
                Self::write_default().map_err(|_| ConfigError::FailedToWrite)?;
                return Ok(DaemonConfig::default());
            }
        };

        // Parse the configuration from JSON
        serde_json::from_str(&config_content).map_err(|_| ConfigError::ParseError)
    }

    /// Writes a default configuration file to "config.json".
    pub fn write_default() -> Result<(), ConfigError> {
        let config = DaemonConfig::default();
        let content =
            serde_json::to_string_pretty(&config).map_err(|_| ConfigError::ParseError)?;
        std::fs::write("config.json", content).map_err(|_| ConfigError::FailedToWrite)?;
        Ok(())
    }

    /// Returns the process-wide configuration.
    pub fn get() -> Result<Arc<DaemonConfig>, ConfigError> {
        Ok(DAEMON_CONFIG.clone())
    }
}
