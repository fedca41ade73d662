//! Telemetry poller behavior, driven tick by tick under a paused clock.

use std::sync::Arc;

use serde_json::json;

use crealink::cloud::gateway::ShadowGateway;
use crealink::driver::{TemperaturePair, TemperatureSample};
use crealink::poller::{STUCK_STATE_WINDOW, TelemetryPoller};
use crealink::sim::{RecordingTransport, SimPrinterDriver};
use crealink::state::{PrintState, StateModel};

fn harness() -> (
    TelemetryPoller,
    StateModel,
    SimPrinterDriver,
    RecordingTransport,
) {
    let state = StateModel::new("2.0.1".to_string());
    let driver = SimPrinterDriver::new();
    let transport = RecordingTransport::new();
    let gateway = Arc::new(ShadowGateway::new(
        state.clone(),
        Arc::new(transport.clone()),
    ));
    let poller = TelemetryPoller::new(state.clone(), Arc::new(driver.clone()), gateway);
    (poller, state, driver, transport)
}

#[tokio::test]
async fn closed_printer_skips_the_whole_tick() {
    let (poller, state, driver, transport) = harness();
    driver.set_closed(true).await;

    poller.tick().await;

    assert!(transport.published().await.is_empty());
    assert!(driver.sent_commands().await.is_empty());
    // the latch was not consumed either
    assert!(!state.snapshot().await.box_version_reported);
}

#[tokio::test]
async fn box_version_is_reported_exactly_once() {
    let (poller, _state, _driver, transport) = harness();

    poller.tick().await;
    poller.tick().await;
    poller.tick().await;

    let pushes = transport.published().await;
    assert_eq!(pushes.len(), 3);
    assert_eq!(pushes[0]["boxVersion"], json!("2.0.1"));
    assert!(!pushes[1].contains_key("boxVersion"));
    assert!(!pushes[2].contains_key("boxVersion"));
}

#[tokio::test]
async fn tick_sends_status_probes() {
    let (poller, _state, driver, _transport) = harness();

    poller.tick().await;

    assert_eq!(driver.sent_commands().await, vec!["M27", "M27C"]);
}

#[tokio::test]
async fn temperatures_and_feedrate_land_in_the_patch() {
    let (poller, _state, driver, transport) = harness();
    driver
        .set_temperatures(Some(TemperatureSample {
            tool0: Some(TemperaturePair {
                actual: 205,
                target: 210,
            }),
            bed: Some(TemperaturePair {
                actual: 60,
                target: 65,
            }),
        }))
        .await;
    driver
        .set_feedrate_status(Some("FR:100% S80".to_string()))
        .await;

    poller.tick().await;

    let pushes = transport.published().await;
    let patch = &pushes[0];
    assert_eq!(patch["nozzleTemp"], json!(205));
    assert_eq!(patch["nozzleTemp2"], json!(210));
    assert_eq!(patch["bedTemp"], json!(60));
    assert_eq!(patch["bedTemp2"], json!(65));
    assert_eq!(patch["curFeedratePct"], json!(80));
}

#[tokio::test]
async fn malformed_feedrate_keeps_last_known_good() {
    let (poller, state, driver, _transport) = harness();
    driver.set_feedrate_status(Some("S90".to_string())).await;
    poller.tick().await;
    assert_eq!(state.snapshot().await.feedrate_pct, 90);

    driver
        .set_feedrate_status(Some("garbled response".to_string()))
        .await;
    poller.tick().await;
    assert_eq!(state.snapshot().await.feedrate_pct, 90);
}

#[tokio::test]
async fn missing_sample_keeps_previous_temperatures() {
    let (poller, state, driver, _transport) = harness();
    driver
        .set_temperatures(Some(TemperatureSample {
            tool0: Some(TemperaturePair {
                actual: 180,
                target: 200,
            }),
            bed: None,
        }))
        .await;
    poller.tick().await;

    driver.set_temperatures(None).await;
    poller.tick().await;

    let snapshot = state.snapshot().await;
    assert_eq!(snapshot.nozzle_temp, 180);
    assert_eq!(snapshot.nozzle_target, 200);
}

#[tokio::test(start_paused = true)]
async fn stuck_non_idle_state_is_forced_back_to_idle() {
    let (poller, state, driver, _transport) = harness();
    driver.set_printing(false).await;
    // the event stream missed the terminal event for this state
    state.set_print_state(PrintState::Printing).await;

    poller.tick().await;
    assert_eq!(state.snapshot().await.print_state, PrintState::Printing);

    tokio::time::advance(STUCK_STATE_WINDOW + std::time::Duration::from_secs(1)).await;
    poller.tick().await;
    assert_eq!(state.snapshot().await.print_state, PrintState::Idle);
}

#[tokio::test(start_paused = true)]
async fn actively_printing_state_is_not_forced_idle() {
    let (poller, state, driver, _transport) = harness();
    driver.set_printing(true).await;
    state.set_print_state(PrintState::Printing).await;

    tokio::time::advance(STUCK_STATE_WINDOW * 3).await;
    poller.tick().await;
    assert_eq!(state.snapshot().await.print_state, PrintState::Printing);
}

#[tokio::test]
async fn offline_transport_does_not_abort_the_tick() {
    let (poller, state, driver, transport) = harness();
    transport.set_offline(true).await;
    driver.set_feedrate_status(Some("S55".to_string())).await;

    poller.tick().await;

    // local state still advanced even though the push was suppressed
    assert_eq!(state.snapshot().await.feedrate_pct, 55);
    assert!(transport.published().await.is_empty());

    transport.set_offline(false).await;
    poller.tick().await;
    let pushes = transport.published().await;
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["curFeedratePct"], json!(55));
}
