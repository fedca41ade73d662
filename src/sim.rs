//! Simulated collaborators: a scriptable printer driver and a recording
//! transport. Used by the demo binary and by the integration tests, so the
//! agent can be exercised end to end without firmware or a cloud session.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cloud::transport::{PropertyMap, ShadowTransport, TransportError};
use crate::driver::{DriverError, PrinterDriver, TemperatureSample};

#[derive(Debug, Default)]
struct SimDriverState {
    printing: bool,
    closed: bool,
    temperatures: Option<TemperatureSample>,
    feedrate_status: Option<String>,
    sent_commands: Vec<String>,
}

/// Printer driver whose observable behavior is scripted by the test (or demo)
/// and which records every command sent to it.
#[derive(Clone, Default)]
pub struct SimPrinterDriver {
    inner: Arc<Mutex<SimDriverState>>,
}

impl SimPrinterDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_printing(&self, printing: bool) {
        self.inner.lock().await.printing = printing;
    }

    pub async fn set_closed(&self, closed: bool) {
        self.inner.lock().await.closed = closed;
    }

    pub async fn set_temperatures(&self, sample: Option<TemperatureSample>) {
        self.inner.lock().await.temperatures = sample;
    }

    pub async fn set_feedrate_status(&self, status: Option<String>) {
        self.inner.lock().await.feedrate_status = status;
    }

    pub async fn sent_commands(&self) -> Vec<String> {
        self.inner.lock().await.sent_commands.clone()
    }
}

#[async_trait]
impl PrinterDriver for SimPrinterDriver {
    async fn send_command(&self, command: &str) -> Result<(), DriverError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(DriverError::Unavailable);
        }
        inner.sent_commands.push(command.to_string());
        Ok(())
    }

    async fn get_temperatures(&self) -> Option<TemperatureSample> {
        self.inner.lock().await.temperatures
    }

    async fn is_printing(&self) -> bool {
        self.inner.lock().await.printing
    }

    async fn is_closed_or_error(&self) -> bool {
        self.inner.lock().await.closed
    }

    async fn feedrate_status(&self) -> Option<String> {
        self.inner.lock().await.feedrate_status.clone()
    }
}

/// Transport that records every published patch. Connecting always succeeds;
/// an `offline` toggle simulates a dropped cloud session.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    published: Arc<Mutex<Vec<PropertyMap>>>,
    offline: Arc<Mutex<bool>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_offline(&self, offline: bool) {
        *self.offline.lock().await = offline;
    }

    pub async fn published(&self) -> Vec<PropertyMap> {
        self.published.lock().await.clone()
    }

    /// Drain the record, returning everything published so far.
    pub async fn take_published(&self) -> Vec<PropertyMap> {
        std::mem::take(&mut *self.published.lock().await)
    }
}

#[async_trait]
impl ShadowTransport for RecordingTransport {
    async fn connect_async(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn publish_property(&self, props: PropertyMap) -> Result<(), TransportError> {
        if *self.offline.lock().await {
            return Err(TransportError::Disconnected);
        }
        self.published.lock().await.push(props);
        Ok(())
    }
}
