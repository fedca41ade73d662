// src/config.rs - Agent configuration
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration struct for the cloud link, agent behavior, and the
/// auxiliary tunnel helper.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

/// Cloud endpoint selection and device credentials.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CloudConfig {
    /// Region code as provisioned by the cloud side. An unrecognized code
    /// disables cloud sync rather than failing startup.
    #[serde(default)]
    pub region: Option<u8>,
    #[serde(default)]
    pub product_key: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub device_secret: String,
}

impl CloudConfig {
    /// Endpoint identifier for the configured region, `None` when the region
    /// is absent or unrecognized.
    pub fn endpoint(&self) -> Option<&'static str> {
        self.region.and_then(region_endpoint)
    }

    /// Coarse display name used in startup logs.
    pub fn region_display(&self) -> Option<&'static str> {
        match self.region {
            Some(0) => Some("China"),
            Some(code) if region_endpoint(code).is_some() => Some("US"),
            _ => None,
        }
    }
}

/// Map a provisioned region code to its endpoint identifier.
pub fn region_endpoint(code: u8) -> Option<&'static str> {
    match code {
        0 => Some("cn-shanghai"),
        1 => Some("ap-southeast-1"),
        2 => Some("ap-northeast-1"),
        3 => Some("us-west-1"),
        4 => Some("eu-central-1"),
        5 => Some("us-east-1"),
        _ => None,
    }
}

/// Agent-level settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Firmware/box version reported upstream once per session.
    #[serde(default = "default_box_version")]
    pub box_version: String,
    /// Device node probed once at session start to decide video capability.
    #[serde(default = "default_video_device")]
    pub video_device: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            box_version: default_box_version(),
            video_device: default_video_device(),
        }
    }
}

/// Peer-to-peer tunnel helper settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TunnelConfig {
    #[serde(default)]
    pub api_license: Option<String>,
    #[serde(default)]
    pub did_string: Option<String>,
    #[serde(default)]
    pub init_string: Option<String>,
    #[serde(default = "default_helper_path")]
    pub helper_path: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            api_license: None,
            did_string: None,
            init_string: None,
            helper_path: default_helper_path(),
            log_dir: default_log_dir(),
            rtsp_port: default_rtsp_port(),
        }
    }
}

// Default value functions
fn default_box_version() -> String {
    "0.1.0".to_string()
}
fn default_video_device() -> String {
    "/dev/video0".to_string()
}
fn default_helper_path() -> String {
    "bin/p2p_server.sh".to_string()
}
fn default_log_dir() -> String {
    ".".to_string()
}
fn default_rtsp_port() -> u16 {
    8554
}

/// Load configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.cloud.region, None);
        assert_eq!(config.cloud.endpoint(), None);
        assert_eq!(config.agent.video_device, "/dev/video0");
        assert_eq!(config.tunnel.rtsp_port, 8554);
        assert!(config.tunnel.api_license.is_none());
    }

    #[test]
    fn test_region_endpoints() {
        assert_eq!(region_endpoint(0), Some("cn-shanghai"));
        assert_eq!(region_endpoint(1), Some("ap-southeast-1"));
        assert_eq!(region_endpoint(2), Some("ap-northeast-1"));
        assert_eq!(region_endpoint(3), Some("us-west-1"));
        assert_eq!(region_endpoint(4), Some("eu-central-1"));
        assert_eq!(region_endpoint(5), Some("us-east-1"));
        assert_eq!(region_endpoint(6), None);
        assert_eq!(region_endpoint(255), None);
    }

    #[test]
    fn test_region_display() {
        let mut cloud = CloudConfig::default();
        assert_eq!(cloud.region_display(), None);
        cloud.region = Some(0);
        assert_eq!(cloud.region_display(), Some("China"));
        cloud.region = Some(3);
        assert_eq!(cloud.region_display(), Some("US"));
        cloud.region = Some(9);
        assert_eq!(cloud.region_display(), None);
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "[cloud]\nregion = 3\ndevice_name = 'box-1'\n\n[agent]\nbox_version = '1.2.0'"
        )
        .unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.cloud.region, Some(3));
        assert_eq!(config.cloud.endpoint(), Some("us-west-1"));
        assert_eq!(config.cloud.device_name, "box-1");
        assert_eq!(config.agent.box_version, "1.2.0");
        // Defaults for missing fields
        assert_eq!(config.tunnel.helper_path, "bin/p2p_server.sh");
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }
}
