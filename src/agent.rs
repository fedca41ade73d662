// src/agent.rs - Wires the state model, poller, lifecycle machine, and
// gateway into one connectivity session.
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Duration;
use uuid::Uuid;

use crate::cloud::gateway::ShadowGateway;
use crate::cloud::transport::{ShadowTransport, TransportError, TransportEvent};
use crate::config::Config;
use crate::driver::PrinterDriver;
use crate::lifecycle::{LifecycleMachine, PrinterEvent};
use crate::poller::TelemetryPoller;
use crate::state::StateModel;
use crate::tunnel::{TunnelError, TunnelStatus, TunnelSupervisor};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("tunnel error: {0}")]
    Tunnel(#[from] TunnelError),
}

/// Settle delay between transport setup and the first poller tick, giving the
/// cloud session time to finish topic registration.
const CONNECT_SETTLE: Duration = Duration::from_secs(3);

/// The device-side shadow agent for one printer.
///
/// Owns the only mutable state aggregate and every task that touches it: the
/// 1 s telemetry poller, the 30 s one-shot address report, and the event loop
/// fanning in transport callbacks and printer lifecycle events.
pub struct Agent {
    config: Config,
    state: StateModel,
    gateway: Arc<ShadowGateway>,
    lifecycle: Arc<LifecycleMachine>,
    poller: Arc<TelemetryPoller>,
    tunnel: Arc<TunnelSupervisor>,
    transport: Arc<dyn ShadowTransport>,
    printer_tx: mpsc::Sender<PrinterEvent>,
    printer_rx: Option<mpsc::Receiver<PrinterEvent>>,
    transport_rx: Option<mpsc::Receiver<TransportEvent>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Agent {
    pub fn new(
        config: Config,
        driver: Arc<dyn PrinterDriver>,
        transport: Arc<dyn ShadowTransport>,
        transport_rx: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        let cloud_enabled = config.cloud.endpoint().is_some();
        let state = StateModel::new(config.agent.box_version.clone());
        let gateway = Arc::new(ShadowGateway::new(state.clone(), transport.clone()));
        let lifecycle = Arc::new(LifecycleMachine::new(
            state.clone(),
            gateway.clone(),
            cloud_enabled,
            config.agent.video_device.clone().into(),
        ));
        let poller = Arc::new(TelemetryPoller::new(
            state.clone(),
            driver,
            gateway.clone(),
        ));
        let tunnel = Arc::new(TunnelSupervisor::new(config.tunnel.clone()));
        let (printer_tx, printer_rx) = mpsc::channel(32);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state,
            gateway,
            lifecycle,
            poller,
            tunnel,
            transport,
            printer_tx,
            printer_rx: Some(printer_rx),
            transport_rx: Some(transport_rx),
            shutdown_tx,
        }
    }

    /// Sender the host application uses to deliver printer lifecycle events.
    pub fn event_sender(&self) -> mpsc::Sender<PrinterEvent> {
        self.printer_tx.clone()
    }

    /// Shared handle to the printer state, for host-side inspection.
    pub fn state(&self) -> StateModel {
        self.state.clone()
    }

    /// Signal every agent task to stop.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Publish the tunnel provisioning triple and start the helper process.
    pub async fn start_tunnel(&self) -> Result<TunnelStatus, AgentError> {
        self.tunnel.announce(&self.gateway).await;
        Ok(self.tunnel.start().await?)
    }

    pub async fn stop_tunnel(&self) {
        self.tunnel.stop().await;
    }

    /// Run the connectivity session until shutdown. Connects the transport
    /// (when a region is configured), then drives the poller, the one-shot
    /// address report, and the event loop.
    pub async fn run(&mut self) -> Result<(), AgentError> {
        let session = Uuid::new_v4();
        match self.config.cloud.endpoint() {
            Some(endpoint) => {
                tracing::info!(
                    %session,
                    endpoint,
                    region = self.config.cloud.region_display().unwrap_or("unknown"),
                    device = %self.config.cloud.device_name,
                    "connecting shadow transport"
                );
                self.transport.connect_async().await?;
                tokio::time::sleep(CONNECT_SETTLE).await;
            }
            None => {
                tracing::warn!(%session, "no usable cloud region configured, cloud sync disabled");
            }
        }

        tokio::spawn(self.poller.clone().run(self.shutdown_tx.subscribe()));
        tokio::spawn(TelemetryPoller::run_net_report(
            self.state.clone(),
            self.gateway.clone(),
            self.shutdown_tx.subscribe(),
        ));

        self.event_loop().await;
        tracing::info!(%session, "agent stopped");
        Ok(())
    }

    async fn event_loop(&mut self) {
        let Some(mut printer_rx) = self.printer_rx.take() else {
            tracing::error!("agent already ran once, refusing to run again");
            return;
        };
        let Some(mut transport_rx) = self.transport_rx.take() else {
            tracing::error!("agent already ran once, refusing to run again");
            return;
        };
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("agent event loop shutting down");
                    break;
                }
                Some(event) = transport_rx.recv() => {
                    self.handle_transport_event(event).await;
                }
                Some(event) = printer_rx.recv() => {
                    self.lifecycle.handle(event).await;
                }
            }
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                tracing::info!("shadow transport connected");
                self.state.reset_for_reconnect().await;
            }
            TransportEvent::Disconnected => {
                // Publishes fail quietly while down; state keeps accumulating.
                tracing::warn!("shadow transport disconnected");
            }
            TransportEvent::PropertyChanged(props) => {
                self.gateway.apply_properties(&props).await;
            }
            TransportEvent::RawData(bytes) => {
                self.gateway.handle_raw_data(&bytes).await;
            }
        }
    }
}
