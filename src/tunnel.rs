// src/tunnel.rs - Supervisor for the external peer-to-peer tunnel helper
use std::path::Path;
use std::process::Stdio;

use serde_json::json;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::cloud::gateway::ShadowGateway;
use crate::cloud::transport::PropertyMap;
use crate::config::TunnelConfig;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("tunnel helper already running")]
    AlreadyRunning,
    #[error("failed to spawn tunnel helper: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelStatus {
    Started,
    /// Provisioning incomplete; starting the helper would be pointless.
    SkippedNoLicense,
    /// Helper binary not shipped on this install.
    SkippedNoHelper,
}

/// Owns the external tunnel helper process. At most one instance runs at a
/// time, and a stopped supervisor holds no reference to the old child.
pub struct TunnelSupervisor {
    config: TunnelConfig,
    child: Mutex<Option<Child>>,
}

impl TunnelSupervisor {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
        }
    }

    /// Publish the peer-to-peer provisioning triple ahead of helper startup.
    /// Absent values go out as empty strings, matching the cloud contract.
    pub async fn announce(&self, gateway: &ShadowGateway) {
        let mut props = PropertyMap::new();
        props.insert(
            "InitString".into(),
            json!(self.config.init_string.clone().unwrap_or_default()),
        );
        props.insert(
            "DIDString".into(),
            json!(self.config.did_string.clone().unwrap_or_default()),
        );
        props.insert(
            "APILicense".into(),
            json!(self.config.api_license.clone().unwrap_or_default()),
        );
        gateway.push(props).await;
    }

    pub async fn start(&self) -> Result<TunnelStatus, TunnelError> {
        let Some(license) = self.config.api_license.as_deref() else {
            tracing::info!("no API license configured, tunnel service stays off");
            return Ok(TunnelStatus::SkippedNoLicense);
        };
        if !Path::new(&self.config.helper_path).exists() {
            tracing::warn!(helper = %self.config.helper_path, "tunnel helper binary missing");
            return Ok(TunnelStatus::SkippedNoHelper);
        }

        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            // A child that has exited may be replaced; a live one may not.
            if child.try_wait()?.is_none() {
                return Err(TunnelError::AlreadyRunning);
            }
        }

        let child = Command::new(&self.config.helper_path)
            .env("HOME_LOG", &self.config.log_dir)
            .env("APILicense", license)
            .env("DIDString", self.config.did_string.as_deref().unwrap_or(""))
            .env("InitString", self.config.init_string.as_deref().unwrap_or(""))
            .env("RtspPort", self.config.rtsp_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        tracing::info!(helper = %self.config.helper_path, "tunnel helper started");
        *slot = Some(child);
        Ok(TunnelStatus::Started)
    }

    /// Kill the helper (if any) and drop the handle.
    pub async fn stop(&self) {
        let mut slot = self.child.lock().await;
        if let Some(mut child) = slot.take() {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to kill tunnel helper");
            } else {
                tracing::info!("tunnel helper stopped");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        let mut slot = self.child.lock().await;
        match slot.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_without_license_is_a_noop() {
        let supervisor = TunnelSupervisor::new(TunnelConfig::default());
        assert_eq!(
            supervisor.start().await.unwrap(),
            TunnelStatus::SkippedNoLicense
        );
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn start_without_helper_binary_is_a_noop() {
        let config = TunnelConfig {
            api_license: Some("license".to_string()),
            helper_path: "/nonexistent/p2p_server.sh".to_string(),
            ..TunnelConfig::default()
        };
        let supervisor = TunnelSupervisor::new(config);
        assert_eq!(
            supervisor.start().await.unwrap(),
            TunnelStatus::SkippedNoHelper
        );
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn stop_without_start_is_harmless() {
        let supervisor = TunnelSupervisor::new(TunnelConfig::default());
        supervisor.stop().await;
        assert!(!supervisor.is_running().await);
    }
}
