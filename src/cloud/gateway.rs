//! Shadow sync gateway: the only component that talks to the transport.
//!
//! Outbound it serializes state snapshots into property patches; inbound it
//! applies remote property writes and raw command frames through the state
//! model's allow-listed dispatch, so untrusted names never reach anything
//! but a typed setter.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::cloud::codec;
use crate::cloud::transport::{PropertyMap, ShadowTransport};
use crate::state::{PrinterState, StateModel, ValidationError};

pub struct ShadowGateway {
    state: StateModel,
    transport: Arc<dyn ShadowTransport>,
}

impl ShadowGateway {
    pub fn new(state: StateModel, transport: Arc<dyn ShadowTransport>) -> Self {
        Self { state, transport }
    }

    /// Hand a property patch to the transport. A disconnected transport is
    /// not an error here: state keeps accumulating locally and the next
    /// successful sync carries the current values.
    pub async fn push(&self, props: PropertyMap) {
        if let Err(e) = self.transport.publish_property(props).await {
            tracing::debug!(error = %e, "upstream push suppressed");
        }
    }

    /// Per-tick outbound sync: snapshot once, serialize, enqueue.
    pub async fn sync_tick(&self, include_box_version: bool) {
        let snapshot = self.state.snapshot().await;
        self.push(telemetry_patch(&snapshot, include_box_version))
            .await;
    }

    /// Inbound property-change notification. Each entry is applied on its
    /// own; a bad entry is logged and dropped without affecting the rest.
    pub async fn apply_properties(&self, props: &PropertyMap) {
        for (name, value) in props {
            match self.state.apply_remote_property(name, value).await {
                Ok(()) => {
                    tracing::info!(property = %name, value = %value, "remote property applied");
                }
                Err(ValidationError::UnknownProperty(_)) => {
                    tracing::warn!(property = %name, value = %value, "ignoring unknown remote property");
                }
                Err(e) => {
                    tracing::warn!(property = %name, value = %value, error = %e, "rejecting remote property");
                }
            }
        }
    }

    /// Inbound raw binary frame: decode, then route the parameters through
    /// the same dispatch path as plain property writes.
    pub async fn handle_raw_data(&self, bytes: &[u8]) {
        match codec::decode(bytes) {
            Ok(command) => {
                tracing::info!(
                    request_id = command.request_id,
                    method = %command.method,
                    "raw command decoded"
                );
                let props: PropertyMap = command
                    .params
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from(*value)))
                    .collect();
                self.apply_properties(&props).await;
            }
            Err(e) => {
                tracing::warn!(len = bytes.len(), error = %e, "dropping undecodable raw frame");
            }
        }
    }
}

/// The telemetry subset pushed on every poller tick. Wire names are part of
/// the cloud contract and must not change.
pub fn telemetry_patch(state: &PrinterState, include_box_version: bool) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("state".into(), json!(state.print_state.code()));
    props.insert("connect".into(), json!(state.connection.code()));
    props.insert("pause".into(), json!(u8::from(state.pause_flag)));
    props.insert("stop".into(), json!(u8::from(state.stop_flag)));
    props.insert("layer".into(), json!(state.layer));
    props.insert("printProgress".into(), json!(state.print_progress));
    props.insert(
        "printId".into(),
        json!(state.job_id.clone().unwrap_or_default()),
    );
    props.insert("nozzleTemp".into(), json!(state.nozzle_temp));
    props.insert("nozzleTemp2".into(), json!(state.nozzle_target));
    props.insert("bedTemp".into(), json!(state.bed_temp));
    props.insert("bedTemp2".into(), json!(state.bed_target));
    props.insert("curFeedratePct".into(), json!(state.feedrate_pct));
    props.insert("video".into(), json!(u8::from(state.video_capability)));
    props.insert("tfCard".into(), json!(u8::from(state.tf_card)));
    if let Some(model) = &state.model {
        props.insert("model".into(), json!(model));
    }
    if let Some(err) = state.error_code {
        props.insert("err".into(), json!(err.code()));
    }
    if include_box_version {
        props.insert("boxVersion".into(), json!(state.box_version));
    }
    props
}
