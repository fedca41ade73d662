// src/lifecycle.rs - Print lifecycle state machine
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use crate::cloud::gateway::ShadowGateway;
use crate::cloud::transport::PropertyMap;
use crate::state::{ConnectionState, PrintState, StateModel};

/// Discrete printer lifecycle events, delivered one at a time in order.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterEvent {
    /// Printer link established; (re)initializes the session.
    Connected,
    /// Host application started, no printer attached yet.
    Startup,
    Disconnected,
    FirmwareData { machine_type: Option<String> },
    LayerChanged { layer: u32 },
    PrintStarted,
    PrintPaused,
    PrintResumed,
    PrintCancelled,
    PrintDone,
    PrintFailed,
    PositionUpdate { x: f64, y: f64, z: f64 },
    Progress { percent: u8 },
}

/// Maps the printer event stream onto the shadow state vocabulary.
///
/// Most transitions only mutate state and ride along on the next telemetry
/// tick; cancellation and position updates are latency-sensitive and push
/// upstream synchronously with the event.
pub struct LifecycleMachine {
    state: StateModel,
    gateway: Arc<ShadowGateway>,
    cloud_enabled: bool,
    video_device: PathBuf,
}

impl LifecycleMachine {
    pub fn new(
        state: StateModel,
        gateway: Arc<ShadowGateway>,
        cloud_enabled: bool,
        video_device: PathBuf,
    ) -> Self {
        Self {
            state,
            gateway,
            cloud_enabled,
            video_device,
        }
    }

    /// Video capability is probed at session boundaries only, never per tick.
    fn detect_video_capability(&self) -> bool {
        self.video_device.exists()
    }

    pub async fn handle(&self, event: PrinterEvent) {
        match event {
            // Session setup runs even before the cloud side is configured.
            PrinterEvent::Connected => {
                self.begin_session().await;
            }
            _ if !self.cloud_enabled => {
                tracing::debug!(?event, "dropping event, cloud sync not configured");
            }
            PrinterEvent::Startup => {
                let video = self.detect_video_capability();
                self.state.mark_startup(video).await;
            }
            PrinterEvent::Disconnected => {
                self.state.set_connection(ConnectionState::Disconnected).await;
            }
            PrinterEvent::FirmwareData { machine_type } => {
                if let Some(machine_type) = machine_type {
                    tracing::info!(model = %machine_type, "firmware reported machine type");
                    self.state.set_model(machine_type).await;
                }
            }
            PrinterEvent::LayerChanged { layer } => {
                self.state.set_layer(layer).await;
            }
            PrinterEvent::PrintStarted => {
                self.state.print_started().await;
            }
            PrinterEvent::PrintPaused => {
                self.state.set_pause(true).await;
            }
            PrinterEvent::PrintResumed => {
                self.state.set_pause(false).await;
            }
            PrinterEvent::PrintCancelled => {
                self.state.print_cancelled().await;
                let mut props = PropertyMap::new();
                props.insert("err".into(), json!(1));
                props.insert("stop".into(), json!(1));
                props.insert("state".into(), json!(PrintState::Cancelled.code()));
                self.gateway.push(props).await;
            }
            PrinterEvent::PrintDone => {
                self.state.print_done().await;
            }
            PrinterEvent::PrintFailed => {
                if self.state.print_failed().await {
                    tracing::info!("print failed");
                }
            }
            PrinterEvent::PositionUpdate { x, y, z } => {
                let position = format!("X:{x} Y:{y} Z:{z}");
                self.state.set_position(position.clone()).await;
                let mut props = PropertyMap::new();
                props.insert("curPosition".into(), json!(position));
                self.gateway.push(props).await;
            }
            PrinterEvent::Progress { percent } => {
                self.state.set_progress(percent).await;
            }
        }
    }

    async fn begin_session(&self) {
        let video = self.detect_video_capability();
        self.state.begin_session(video).await;
        tracing::info!(video, "printer connected, session state reset");
    }
}
