// src/state.rs - Printer state aggregate and its concurrency-safe handle
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use crate::driver::TemperatureSample;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown property '{0}'")]
    UnknownProperty(String),
    #[error("property '{name}' rejected value {value}: {reason}")]
    BadValue {
        name: String,
        value: Value,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl ConnectionState {
    /// Wire encoding of the `connect` property.
    pub fn code(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connected => 1,
        }
    }
}

/// Print lifecycle state, encoded upstream as its discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrintState {
    Idle = 0,
    Printing = 1,
    Done = 2,
    Failed = 3,
    Cancelled = 4,
}

impl PrintState {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PrintState::Idle),
            1 => Some(PrintState::Printing),
            2 => Some(PrintState::Done),
            3 => Some(PrintState::Failed),
            4 => Some(PrintState::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    PrintDisconnect = 1,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// The single source of truth for everything the cloud shadow mirrors.
///
/// Mutated only through [`StateModel`]; the poller, lifecycle machine, and
/// gateway never hold references into it across await points.
#[derive(Debug, Clone)]
pub struct PrinterState {
    pub connection: ConnectionState,
    pub print_state: PrintState,
    /// Cloud-assigned job id. `None` for locally-initiated jobs; cleared
    /// exactly once per terminal event and never resurrected by late events.
    pub job_id: Option<String>,
    /// Whether the firmware itself believes a print is running, tracked
    /// independently of cloud job bookkeeping.
    pub mcu_print_flag: bool,
    pub pause_flag: bool,
    pub stop_flag: bool,
    pub layer: u32,
    pub print_progress: u8,
    pub nozzle_temp: i32,
    pub nozzle_target: i32,
    pub bed_temp: i32,
    pub bed_target: i32,
    pub feedrate_pct: i32,
    pub box_version: String,
    pub box_version_reported: bool,
    pub position: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub video_capability: bool,
    pub tf_card: bool,
    pub model: Option<String>,
    pub net_ip: Option<String>,
    /// Stamp of the last print-state transition, consumed by the poller's
    /// stuck-state guard.
    pub state_changed_at: Instant,
}

impl PrinterState {
    fn new(box_version: String) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            print_state: PrintState::Idle,
            job_id: None,
            mcu_print_flag: false,
            pause_flag: false,
            stop_flag: false,
            layer: 0,
            print_progress: 0,
            nozzle_temp: 0,
            nozzle_target: 0,
            bed_temp: 0,
            bed_target: 0,
            feedrate_pct: 100,
            box_version,
            box_version_reported: false,
            position: None,
            error_code: None,
            video_capability: false,
            tf_card: false,
            model: None,
            net_ip: None,
            state_changed_at: Instant::now(),
        }
    }
}

/// Shared handle to the printer state.
///
/// Every setter takes the write lock once for its whole field group, so a
/// reader can never observe a half-applied update (e.g. a nozzle actual
/// without its target). Readers snapshot with [`StateModel::snapshot`].
#[derive(Clone)]
pub struct StateModel {
    inner: Arc<RwLock<PrinterState>>,
}

impl StateModel {
    pub fn new(box_version: String) -> Self {
        Self {
            inner: Arc::new(RwLock::new(PrinterState::new(box_version))),
        }
    }

    /// Consistent copy of the whole aggregate for serialization.
    pub async fn snapshot(&self) -> PrinterState {
        self.inner.read().await.clone()
    }

    pub async fn set_connection(&self, connection: ConnectionState) {
        self.inner.write().await.connection = connection;
    }

    pub async fn set_print_state(&self, print_state: PrintState) {
        let mut state = self.inner.write().await;
        state.print_state = print_state;
        state.state_changed_at = Instant::now();
    }

    /// Session reset on printer connect: probe results in, job bookkeeping out.
    pub async fn begin_session(&self, video_capability: bool) {
        let mut state = self.inner.write().await;
        state.connection = ConnectionState::Connected;
        state.print_state = PrintState::Idle;
        state.state_changed_at = Instant::now();
        state.job_id = None;
        state.video_capability = video_capability;
        state.tf_card = true;
    }

    /// Host startup before any printer is attached.
    pub async fn mark_startup(&self, video_capability: bool) {
        let mut state = self.inner.write().await;
        state.connection = ConnectionState::Disconnected;
        state.video_capability = video_capability;
    }

    /// Transport reconnect: re-arm per-session one-shot latches, keep telemetry.
    pub async fn reset_for_reconnect(&self) {
        let mut state = self.inner.write().await;
        state.box_version_reported = false;
    }

    pub async fn set_model(&self, model: String) {
        self.inner.write().await.model = Some(model);
    }

    pub async fn set_layer(&self, layer: u32) {
        self.inner.write().await.layer = layer;
    }

    pub async fn set_progress(&self, percent: u8) {
        self.inner.write().await.print_progress = percent.min(100);
    }

    pub async fn set_pause(&self, paused: bool) {
        self.inner.write().await.pause_flag = paused;
    }

    pub async fn set_position(&self, position: String) {
        self.inner.write().await.position = Some(position);
    }

    pub async fn set_net_ip(&self, ip: String) {
        self.inner.write().await.net_ip = Some(ip);
    }

    /// Print started. A job with no cloud-assigned id is a local one, so the
    /// firmware print flag is raised for it; cloud jobs carry their own
    /// bookkeeping upstream.
    pub async fn print_started(&self) {
        let mut state = self.inner.write().await;
        if state.job_id.is_none() {
            state.mcu_print_flag = true;
        }
        state.print_state = PrintState::Printing;
        state.state_changed_at = Instant::now();
    }

    pub async fn print_done(&self) {
        let mut state = self.inner.write().await;
        state.print_state = PrintState::Done;
        state.state_changed_at = Instant::now();
        Self::finish_job(&mut state);
    }

    pub async fn print_cancelled(&self) {
        let mut state = self.inner.write().await;
        state.stop_flag = true;
        state.print_state = PrintState::Cancelled;
        state.state_changed_at = Instant::now();
        Self::finish_job(&mut state);
    }

    /// Print failure as seen by the firmware link. Suppressed when a stop was
    /// already requested (the cancel path reported the terminal state).
    /// Returns whether the transition was applied.
    pub async fn print_failed(&self) -> bool {
        let mut state = self.inner.write().await;
        if state.stop_flag {
            return false;
        }
        state.print_state = PrintState::Failed;
        state.state_changed_at = Instant::now();
        state.error_code = Some(ErrorCode::PrintDisconnect);
        Self::finish_job(&mut state);
        true
    }

    /// Terminal-event bookkeeping: the firmware flag is cleared only for jobs
    /// that never had a cloud id, and the id itself is cleared exactly once.
    fn finish_job(state: &mut PrinterState) {
        if state.job_id.is_none() {
            state.mcu_print_flag = false;
        }
        state.job_id = None;
    }

    /// Apply one temperature sample. Each heater pair is written atomically;
    /// sensors missing from the sample keep their last known good values.
    pub async fn apply_temperatures(&self, sample: &TemperatureSample) {
        let mut state = self.inner.write().await;
        match sample.tool0 {
            Some(pair) => {
                state.nozzle_temp = pair.actual;
                state.nozzle_target = pair.target;
            }
            None => tracing::info!("tool temperature is none"),
        }
        match sample.bed {
            Some(pair) => {
                state.bed_temp = pair.actual;
                state.bed_target = pair.target;
            }
            None => tracing::info!("bed temperature is none"),
        }
    }

    /// Parse a vendor feed-rate status line of the form `"... S<digits> ..."`.
    /// A malformed line keeps the previous value and logs; returns whether a
    /// new value was applied.
    pub async fn apply_feedrate_str(&self, raw: &str) -> bool {
        match parse_feedrate_pct(raw) {
            Some(pct) => {
                self.inner.write().await.feedrate_pct = pct;
                true
            }
            None => {
                tracing::error!(raw, "could not parse feed-rate percentage");
                false
            }
        }
    }

    /// One-shot box-version latch. True exactly once per session; the caller
    /// includes `boxVersion` in that tick's upstream patch.
    pub async fn latch_box_version(&self) -> bool {
        let mut state = self.inner.write().await;
        if state.box_version_reported {
            false
        } else {
            state.box_version_reported = true;
            true
        }
    }

    /// Stuck-state guard: with no firmware print flag and no transition for
    /// longer than `quiet`, a non-idle state is forced back to idle. Returns
    /// whether the state was changed.
    pub async fn force_idle_if_stuck(&self, quiet: Duration) -> bool {
        let mut state = self.inner.write().await;
        if !state.mcu_print_flag
            && state.print_state != PrintState::Idle
            && state.state_changed_at.elapsed() > quiet
        {
            state.print_state = PrintState::Idle;
            state.state_changed_at = Instant::now();
            true
        } else {
            false
        }
    }

    /// Apply one remotely-set property through the typed dispatch table.
    ///
    /// Only allow-listed names mutate state; anything else is rejected for
    /// the gateway to log. Values arrive as JSON and are accepted as numbers
    /// or numeric strings, since the cloud side is loose about both.
    pub async fn apply_remote_property(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<(), ValidationError> {
        let mut state = self.inner.write().await;
        match name {
            "printId" => {
                let id = value_as_string(name, value)?;
                state.job_id = if id.is_empty() { None } else { Some(id) };
            }
            "pause" => state.pause_flag = value_as_flag(name, value)?,
            "stop" => state.stop_flag = value_as_flag(name, value)?,
            "video" => state.video_capability = value_as_flag(name, value)?,
            "state" => {
                let code = value_as_int(name, value)?;
                let print_state = u8::try_from(code)
                    .ok()
                    .and_then(PrintState::from_code)
                    .ok_or_else(|| bad_value(name, value, "not a print state code"))?;
                state.print_state = print_state;
                state.state_changed_at = Instant::now();
            }
            "printProgress" => {
                let pct = value_as_int(name, value)?;
                if !(0..=100).contains(&pct) {
                    return Err(bad_value(name, value, "progress out of range"));
                }
                state.print_progress = pct as u8;
            }
            "layer" => {
                let layer = value_as_int(name, value)?;
                state.layer = u32::try_from(layer)
                    .map_err(|_| bad_value(name, value, "negative layer"))?;
            }
            "curFeedratePct" => {
                let pct = value_as_int(name, value)?;
                state.feedrate_pct = i32::try_from(pct)
                    .map_err(|_| bad_value(name, value, "feed rate out of range"))?;
            }
            _ => return Err(ValidationError::UnknownProperty(name.to_string())),
        }
        Ok(())
    }
}

/// Digits immediately following the first `S` marker.
fn parse_feedrate_pct(raw: &str) -> Option<i32> {
    let after = &raw[raw.find('S')? + 1..];
    let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn bad_value(name: &str, value: &Value, reason: &str) -> ValidationError {
    ValidationError::BadValue {
        name: name.to_string(),
        value: value.clone(),
        reason: reason.to_string(),
    }
}

fn value_as_string(name: &str, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        _ => Err(bad_value(name, value, "expected a string")),
    }
}

fn value_as_int(name: &str, value: &Value) -> Result<i64, ValidationError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| bad_value(name, value, "expected an integer")),
        Value::String(s) => s
            .parse()
            .map_err(|_| bad_value(name, value, "expected an integer")),
        _ => Err(bad_value(name, value, "expected an integer")),
    }
}

fn value_as_flag(name: &str, value: &Value) -> Result<bool, ValidationError> {
    match value_as_int(name, value)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(bad_value(name, value, "expected 0 or 1")),
    }
}
