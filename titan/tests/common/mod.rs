//! Shared fixtures for the fabric integration tests.
#![allow(dead_code)] // not every test binary uses every fixture

use std::sync::Arc;
use titan::{ConnectOptions, EntryZone, FabricClient, IntentSignal};
use titan_mock::MemoryBroker;

/// A connected fabric client named like the decision component, plus the
/// mock broker behind it for introspection.
pub async fn brain_client() -> (Arc<FabricClient>, MemoryBroker) {
    let broker = MemoryBroker::new();
    let options = ConnectOptions::default().service("titan-brain");
    let client = FabricClient::connect(Arc::new(broker.clone()), options)
        .await
        .expect("connect");
    (client, broker)
}

/// The S1 reference signal.
pub fn intent_signal(id: &str) -> IntentSignal {
    IntentSignal {
        signal_id: id.to_string(),
        symbol: "BTC/USDT".to_string(),
        direction: "LONG".to_string(),
        entry_zone: EntryZone {
            min: 60_000.0,
            max: 60_100.0,
        },
        stop_loss: 59_500.0,
        take_profits: vec![61_000.0, 62_000.0],
        confidence: 0.9,
        leverage: 5.0,
        t_signal: None,
        t_exchange: None,
        source: None,
    }
}
