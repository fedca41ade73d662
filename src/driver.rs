//! The seam between the agent and the printer firmware link.
//!
//! The real host application owns serial communication with the machine; the
//! agent only ever talks to it through this trait, so the telemetry poller and
//! lifecycle machine can be exercised against a simulated driver.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("printer link closed or errored")]
    Unavailable,
    #[error("command rejected: {0}")]
    Rejected(String),
}

/// One heater's actual/target reading, in whole degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperaturePair {
    pub actual: i32,
    pub target: i32,
}

/// A temperature sample as reported by the firmware. Sensors missing from the
/// report are `None`; the state model keeps the previous value for those.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TemperatureSample {
    pub tool0: Option<TemperaturePair>,
    pub bed: Option<TemperaturePair>,
}

#[async_trait]
pub trait PrinterDriver: Send + Sync {
    /// Queue a firmware command. Fire-and-forget from the agent's view;
    /// any response surfaces later through the printer event stream.
    async fn send_command(&self, command: &str) -> Result<(), DriverError>;

    /// Latest temperature readings, or `None` when no sample is available.
    async fn get_temperatures(&self) -> Option<TemperatureSample>;

    async fn is_printing(&self) -> bool;

    async fn is_closed_or_error(&self) -> bool;

    /// Most recent raw feed-rate status line from the firmware (`"... S<pct> ..."`),
    /// if one has been reported since the last query.
    async fn feedrate_status(&self) -> Option<String>;
}
