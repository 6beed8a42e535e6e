mod common;

use async_trait::async_trait;
use common::brain_client;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use titan::{
    Broker, BrokerEvent, ConnectOptions, EnvelopeBuilder, FabricClient, FabricMessage,
    MessageHandler, Signer,
};
use titan_core::FabricError;
use titan_mock::MemoryBroker;

struct Recorder {
    seen: Arc<std::sync::Mutex<Vec<FabricMessage>>>,
    fail_first: AtomicUsize,
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, msg: FabricMessage) -> Result<(), FabricError> {
        self.seen.lock().unwrap().push(msg);
        if self.fail_first.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(FabricError::Schema("forced callback failure".to_string()));
        }
        Ok(())
    }
}

fn recorder(fail_first: usize) -> (Arc<Recorder>, Arc<std::sync::Mutex<Vec<FabricMessage>>>) {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    (
        Arc::new(Recorder {
            seen: Arc::clone(&seen),
            fail_first: AtomicUsize::new(fail_first),
        }),
        seen,
    )
}

#[tokio::test]
async fn publish_routes_persistent_for_declared_streams_only() {
    let (fabric, broker) = brain_client().await;

    fabric
        .publish_value("titan.evt.venue.status.v1.bybit", &json!({"up": true}))
        .await
        .unwrap();
    fabric
        .publish_value("titan.sys.health.v1", &json!({"ok": true}))
        .await
        .unwrap();

    let evt = broker.published_to("titan.evt.>");
    assert_eq!(evt.len(), 1);
    assert!(evt[0].persistent, "event subjects are stream-captured");

    let sys = broker.published_to("titan.sys.>");
    assert_eq!(sys.len(), 1);
    assert!(!sys[0].persistent, "sys subjects ride core delivery");
}

#[tokio::test]
async fn publish_fails_fast_without_a_session() {
    let (fabric, broker) = brain_client().await;
    broker.drop_connection();

    let err = fabric
        .publish_value("titan.evt.venue.status.v1.bybit", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, FabricError::NotConnected));
}

#[tokio::test]
async fn connection_loss_is_observable() {
    let (fabric, broker) = brain_client().await;
    let mut events = fabric.events();
    broker.drop_connection();
    let event = events.recv().await.expect("event");
    assert!(matches!(event, BrokerEvent::Error(_)));
}

#[tokio::test]
async fn signed_envelopes_verify_end_to_end() {
    let broker = MemoryBroker::new();
    let options = ConnectOptions::default()
        .service("titan-brain")
        .signing_secret("handshake-secret");
    let fabric = FabricClient::connect(Arc::new(broker.clone()), options)
        .await
        .unwrap();

    fabric
        .publish_envelope(
            "titan.cmd.sys.halt.v1",
            EnvelopeBuilder::new("sys.halt", 1, "titan-brain"),
            json!({"reason": "drill"}),
        )
        .await
        .unwrap();

    let records = broker.published_to("titan.cmd.sys.halt.v1");
    assert_eq!(records.len(), 1);
    let envelope: titan::Envelope =
        serde_json::from_slice(&records[0].payload).expect("envelope decodes");
    assert!(envelope.is_signed());
    assert!(envelope.idempotency_key.is_some(), "cmd envelopes carry a key");

    let verifier = Signer::new(b"handshake-secret".to_vec(), "k1");
    verifier.verify(&envelope).expect("signature verifies");
}

#[tokio::test]
async fn duplicate_idempotency_keys_are_suppressed_by_the_window() {
    let (fabric, broker) = brain_client().await;

    for _ in 0..2 {
        fabric
            .publish_envelope(
                "titan.cmd.sys.halt.v1",
                EnvelopeBuilder::new("sys.halt", 1, "titan-brain").idempotency_key("halt-1"),
                json!({}),
            )
            .await
            .unwrap();
    }
    assert_eq!(
        broker.published_to("titan.cmd.sys.halt.v1").len(),
        1,
        "the second publish lands inside the duplicate window"
    );
}

#[tokio::test]
async fn subscription_callback_errors_do_not_kill_the_pump() {
    let (fabric, _broker) = brain_client().await;
    let (handler, seen) = recorder(1);
    let _pump = fabric
        .subscribe_with("titan.data.brain.heartbeat.v1", handler)
        .await
        .unwrap();

    for beat in 0..3 {
        fabric
            .publish_value("titan.data.brain.heartbeat.v1", &json!({"beat": beat}))
            .await
            .unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3, "failure on the first message must not stop delivery");
    assert_eq!(seen[0].body.as_json().unwrap()["beat"], 0);
    assert_eq!(seen[2].body.as_json().unwrap()["beat"], 2);
}

#[tokio::test]
async fn non_json_payloads_fall_back_to_text() {
    let (fabric, _broker) = brain_client().await;
    let (handler, seen) = recorder(0);
    let _pump = fabric
        .subscribe_with("titan.sys.health.v1", handler)
        .await
        .unwrap();

    fabric
        .publish_text("titan.sys.health.v1", "plain status line")
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].body,
        titan::Decoded::Text("plain status line".to_string())
    );
}

#[tokio::test]
async fn kv_handles_are_cached_and_write_through() {
    let (fabric, _broker) = brain_client().await;

    let first = fabric.kv("TITAN_STATE").await.unwrap();
    let second = fabric.kv("TITAN_STATE").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second), "bucket handle opened once");

    fabric
        .kv_put("TITAN_STATE", "armed", &json!(true))
        .await
        .unwrap();
    assert_eq!(
        fabric.kv_get("TITAN_STATE", "armed").await.unwrap(),
        Some(json!(true))
    );
    assert_eq!(
        fabric.kv_keys("TITAN_STATE").await.unwrap(),
        vec!["armed".to_string()]
    );

    let mut watch = fabric.kv_watch("TITAN_STATE", "armed").await.unwrap();
    fabric
        .kv_put("TITAN_STATE", "armed", &json!(false))
        .await
        .unwrap();
    let entry = watch.recv().await.expect("watch event");
    assert_eq!(entry.key, "armed");

    fabric.kv_delete("TITAN_STATE", "armed").await.unwrap();
    assert!(fabric.kv_get("TITAN_STATE", "armed").await.unwrap().is_none());
}

#[tokio::test]
async fn topology_failures_are_counted_not_fatal() {
    let broker = MemoryBroker::new();
    broker.fail_topology_for("TITAN_EVT");
    broker.fail_topology_for("DLQ_MONITOR");

    let fabric = FabricClient::connect(Arc::new(broker), ConnectOptions::default())
        .await
        .expect("start-up continues despite topology failures");
    assert_eq!(fabric.reconciliation_errors(), 2);
}

#[tokio::test]
async fn close_is_idempotent() {
    let (fabric, broker) = brain_client().await;
    fabric.close().await;
    assert!(!fabric.is_connected());
    fabric.close().await; // second close is a no-op
    assert!(!broker.is_connected());

    let err = fabric
        .publish_value("titan.sys.health.v1", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, FabricError::NotConnected));
}

#[tokio::test]
async fn process_wide_instance_can_be_installed_and_reset() {
    let (fabric, _broker) = brain_client().await;
    titan::reset();
    assert!(titan::instance().is_none());
    titan::install(Arc::clone(&fabric));
    let got = titan::instance().expect("installed");
    assert!(Arc::ptr_eq(&got, &fabric));
    titan::reset();
    assert!(titan::instance().is_none());
}
