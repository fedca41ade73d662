//! End-to-end lifecycle scenarios driven through the public components.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use crealink::cloud::gateway::ShadowGateway;
use crealink::lifecycle::{LifecycleMachine, PrinterEvent};
use crealink::sim::RecordingTransport;
use crealink::state::{PrintState, StateModel};

fn harness() -> (LifecycleMachine, StateModel, RecordingTransport) {
    let state = StateModel::new("1.0.0".to_string());
    let transport = RecordingTransport::new();
    let gateway = Arc::new(ShadowGateway::new(
        state.clone(),
        Arc::new(transport.clone()),
    ));
    let lifecycle = LifecycleMachine::new(
        state.clone(),
        gateway,
        true,
        PathBuf::from("/nonexistent/video0"),
    );
    (lifecycle, state, transport)
}

#[tokio::test]
async fn local_print_cancelled_mid_job() {
    let (lifecycle, state, transport) = harness();

    for event in [
        PrinterEvent::Connected,
        PrinterEvent::PrintStarted,
        PrinterEvent::LayerChanged { layer: 3 },
        PrinterEvent::PrintCancelled,
    ] {
        lifecycle.handle(event).await;
    }

    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.print_state, PrintState::Cancelled);
    assert_eq!(snapshot.layer, 3);
    assert!(snapshot.job_id.is_none());
    assert!(!snapshot.mcu_print_flag);

    // the cancel pushed upstream synchronously with the event, exactly once
    let pushes = transport.published().await;
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["err"], json!(1));
    assert_eq!(pushes[0]["stop"], json!(1));
    assert_eq!(pushes[0]["state"], json!(4));
}

#[tokio::test]
async fn local_print_runs_to_completion() {
    let (lifecycle, state, transport) = harness();

    lifecycle.handle(PrinterEvent::Connected).await;
    lifecycle.handle(PrinterEvent::PrintStarted).await;
    assert!(state.snapshot().await.mcu_print_flag);
    assert!(state.snapshot().await.job_id.is_none());

    lifecycle.handle(PrinterEvent::Progress { percent: 50 }).await;
    lifecycle.handle(PrinterEvent::PrintPaused).await;
    lifecycle.handle(PrinterEvent::PrintResumed).await;
    lifecycle.handle(PrinterEvent::PrintDone).await;

    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.print_state, PrintState::Done);
    assert!(!snapshot.mcu_print_flag);
    assert!(snapshot.job_id.is_none());
    assert!(!snapshot.pause_flag);
    assert_eq!(snapshot.print_progress, 50);

    // completion rides along on the next tick, nothing pushed out of band
    assert!(transport.published().await.is_empty());
}

#[tokio::test]
async fn cloud_job_keeps_its_bookkeeping_upstream() {
    let (lifecycle, state, _transport) = harness();

    lifecycle.handle(PrinterEvent::Connected).await;
    // the cloud assigned a job id before the print started
    state
        .apply_remote_property("printId", &json!("cloud-job-17"))
        .await
        .unwrap();
    lifecycle.handle(PrinterEvent::PrintStarted).await;

    let snapshot = state.snapshot().await;
    assert!(!snapshot.mcu_print_flag);
    assert_eq!(snapshot.job_id.as_deref(), Some("cloud-job-17"));

    lifecycle.handle(PrinterEvent::PrintDone).await;
    let snapshot = state.snapshot().await;
    assert!(snapshot.job_id.is_none());
    assert!(!snapshot.mcu_print_flag);
}

#[tokio::test]
async fn late_layer_event_does_not_resurrect_job() {
    let (lifecycle, state, _transport) = harness();

    lifecycle.handle(PrinterEvent::Connected).await;
    state
        .apply_remote_property("printId", &json!("cloud-job-18"))
        .await
        .unwrap();
    lifecycle.handle(PrinterEvent::PrintStarted).await;
    lifecycle.handle(PrinterEvent::PrintDone).await;

    // stragglers from the finished job arrive after the terminal event
    lifecycle.handle(PrinterEvent::LayerChanged { layer: 99 }).await;
    lifecycle.handle(PrinterEvent::Progress { percent: 100 }).await;

    let snapshot = state.snapshot().await;
    assert!(snapshot.job_id.is_none());
    assert_eq!(snapshot.print_state, PrintState::Done);
}

#[tokio::test]
async fn reconnect_resets_session_bookkeeping() {
    let (lifecycle, state, _transport) = harness();

    lifecycle.handle(PrinterEvent::Connected).await;
    lifecycle.handle(PrinterEvent::PrintStarted).await;
    lifecycle.handle(PrinterEvent::Disconnected).await;

    // the printer came back; the session starts clean
    lifecycle.handle(PrinterEvent::Connected).await;
    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.print_state, PrintState::Idle);
    assert!(snapshot.job_id.is_none());
    assert!(snapshot.tf_card);
}

#[tokio::test]
async fn failure_after_cancel_does_not_double_report() {
    let (lifecycle, state, transport) = harness();

    lifecycle.handle(PrinterEvent::Connected).await;
    lifecycle.handle(PrinterEvent::PrintStarted).await;
    lifecycle.handle(PrinterEvent::PrintCancelled).await;
    lifecycle.handle(PrinterEvent::PrintFailed).await;

    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.print_state, PrintState::Cancelled);
    assert_eq!(snapshot.error_code, None);
    assert_eq!(transport.published().await.len(), 1);
}
