// src/poller.rs - Periodic telemetry sampling and the one-shot address report
use std::sync::Arc;

use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::{Duration, MissedTickBehavior};

use crate::cloud::gateway::ShadowGateway;
use crate::cloud::transport::PropertyMap;
use crate::driver::PrinterDriver;
use crate::state::StateModel;

/// Fixed telemetry cadence.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);
/// Budget for one tick's driver traffic; an overrunning tick is abandoned
/// and the next scheduled tick proceeds regardless.
pub const TICK_BUDGET: Duration = Duration::from_millis(800);
/// Quiet window after which a non-idle state with no print activity is
/// forced back to idle.
pub const STUCK_STATE_WINDOW: Duration = Duration::from_secs(5);
/// Delay before the one-shot network address report.
pub const NET_REPORT_DELAY: Duration = Duration::from_secs(30);

/// Samples the printer driver once per second and hands the resulting
/// telemetry patch to the gateway. Failures inside a tick degrade to a log
/// line; they never abort the rest of the tick or the loop.
pub struct TelemetryPoller {
    state: StateModel,
    driver: Arc<dyn PrinterDriver>,
    gateway: Arc<ShadowGateway>,
}

impl TelemetryPoller {
    pub fn new(
        state: StateModel,
        driver: Arc<dyn PrinterDriver>,
        gateway: Arc<ShadowGateway>,
    ) -> Self {
        Self {
            state,
            driver,
            gateway,
        }
    }

    /// Run the loop until shutdown. The first tick fires immediately.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("telemetry poller shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if tokio::time::timeout(TICK_BUDGET, self.tick()).await.is_err() {
                        tracing::warn!("telemetry tick overran its budget, abandoned");
                    }
                }
            }
        }
    }

    /// One telemetry tick. Public so tests can drive ticks directly.
    pub async fn tick(&self) {
        if self.driver.is_closed_or_error().await {
            tracing::info!("printer disconnected or errored, skipping telemetry tick");
            return;
        }

        let report_box_version = self.state.latch_box_version().await;

        if let Some(raw) = self.driver.feedrate_status().await {
            self.state.apply_feedrate_str(&raw).await;
        }

        match self.driver.get_temperatures().await {
            Some(sample) => self.state.apply_temperatures(&sample).await,
            None => tracing::info!("can't get temperatures"),
        }

        // Async status probes; their results come back later through the
        // printer event stream, not read here.
        for probe in ["M27", "M27C"] {
            if let Err(e) = self.driver.send_command(probe).await {
                tracing::warn!(command = probe, error = %e, "status probe failed");
            }
        }

        if !self.driver.is_printing().await
            && self.state.force_idle_if_stuck(STUCK_STATE_WINDOW).await
        {
            tracing::info!(
                "no print activity for {:?}, forcing idle state",
                STUCK_STATE_WINDOW
            );
        }

        self.gateway.sync_tick(report_box_version).await;
    }

    /// One-shot companion task: report the box's network address once,
    /// 30 seconds after startup, then stop.
    pub async fn run_net_report(
        state: StateModel,
        gateway: Arc<ShadowGateway>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = tokio::time::sleep(NET_REPORT_DELAY) => {}
        }
        match local_ip() {
            Some(ip) => {
                tracing::info!(ip = %ip, "reporting network address");
                state.set_net_ip(ip.clone()).await;
                let mut props = PropertyMap::new();
                props.insert("netIP".into(), json!(ip));
                gateway.push(props).await;
            }
            None => tracing::warn!("could not determine local network address"),
        }
    }
}

/// Outbound-interface address learned from a connected UDP socket; no
/// packets are actually sent.
fn local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}
