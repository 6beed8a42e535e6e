use std::time::Duration;
use titan_core::broker::Broker;
use titan_core::topology::{self, KvSpec};
use titan_core::{FabricError, subject};
use titan_mock::MemoryBroker;

async fn connected() -> MemoryBroker {
    let broker = MemoryBroker::new();
    broker.connect().await.unwrap();
    for stream in topology::streams() {
        broker.ensure_stream(&stream).await.unwrap();
    }
    broker
}

#[tokio::test]
async fn wildcard_subscriptions_receive_matching_subjects() {
    let broker = connected().await;
    let mut sub = broker.subscribe("titan.evt.venue.>").await.unwrap();

    broker
        .publish("titan.evt.venue.status.v1.bybit", b"up".to_vec())
        .await
        .unwrap();
    broker
        .publish("titan.evt.trade.closed.v1.bybit.main.BTC_USDT", b"x".to_vec())
        .await
        .unwrap();

    let msg = sub.recv().await.unwrap();
    assert_eq!(msg.subject, "titan.evt.venue.status.v1.bybit");
    assert_eq!(msg.payload, b"up".to_vec());
    // The trade event never arrives on the venue filter.
    assert!(
        tokio::time::timeout(Duration::from_millis(50), sub.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn publish_requires_a_session() {
    let broker = MemoryBroker::new();
    let err = broker.publish("titan.sys.health.v1", vec![]).await.unwrap_err();
    assert!(matches!(err, FabricError::NotConnected));

    broker.connect().await.unwrap();
    broker.publish("titan.sys.health.v1", vec![]).await.unwrap();

    broker.close().await;
    let err = broker.publish("titan.sys.health.v1", vec![]).await.unwrap_err();
    assert!(matches!(err, FabricError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn duplicate_window_expires() {
    let broker = connected().await;
    let subj = subject::cmd::execution_place("bybit", "main", "BTC/USDT");

    broker
        .publish_persistent(&subj, b"a".to_vec(), Some("cmd-1"))
        .await
        .unwrap();
    broker
        .publish_persistent(&subj, b"a".to_vec(), Some("cmd-1"))
        .await
        .unwrap();
    assert_eq!(broker.published_to(&subj).len(), 1, "duplicate suppressed");

    // Past the 60 s window the same id is accepted again.
    tokio::time::sleep(Duration::from_secs(61)).await;
    broker
        .publish_persistent(&subj, b"a".to_vec(), Some("cmd-1"))
        .await
        .unwrap();
    assert_eq!(broker.published_to(&subj).len(), 2);
}

#[tokio::test]
async fn request_without_a_responder_times_out() {
    let broker = connected().await;
    let err = broker
        .request("titan.req.exec.policy_hash.v1", vec![], Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, FabricError::RequestTimeout { .. }));
}

#[tokio::test]
async fn request_reply_roundtrip() {
    let broker = connected().await;
    broker
        .serve_requests("titan.req.exec.policy_hash.v1", |msg| {
            assert!(msg.reply.is_some());
            Some(b"pong".to_vec())
        })
        .await;

    let reply = broker
        .request("titan.req.exec.policy_hash.v1", b"ping".to_vec(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, b"pong".to_vec());
}

#[tokio::test]
async fn durable_backlog_is_delivered_on_attach() {
    let broker = connected().await;
    let spec = topology::consumer(topology::EXECUTION_CORE_DURABLE).unwrap();
    broker.ensure_consumer(&spec).await.unwrap();

    // Published while no subscription is attached: retained.
    broker
        .publish_persistent(
            "titan.cmd.execution.place.v1.bybit.main.ETH_USDT",
            b"queued".to_vec(),
            None,
        )
        .await
        .unwrap();

    let mut sub = broker.subscribe_durable(&spec).await.unwrap();
    let delivery = sub.recv().await.expect("backlog delivery");
    assert_eq!(delivery.payload, b"queued".to_vec());
    delivery.ack();
}

#[tokio::test]
async fn ensure_stream_reports_create_update_unchanged() {
    let broker = MemoryBroker::connected();
    let mut spec = topology::streams().remove(0);

    use titan_core::topology::TopologyOutcome;
    assert_eq!(
        broker.ensure_stream(&spec).await.unwrap(),
        TopologyOutcome::Created
    );
    assert_eq!(
        broker.ensure_stream(&spec).await.unwrap(),
        TopologyOutcome::Unchanged
    );
    spec.max_age = Duration::from_secs(60);
    assert_eq!(
        broker.ensure_stream(&spec).await.unwrap(),
        TopologyOutcome::Updated
    );
}

#[tokio::test]
async fn kv_history_depth_is_bounded() {
    let broker = MemoryBroker::connected();
    let bucket = broker
        .kv_bucket(&KvSpec {
            history: 3,
            ..KvSpec::named("TEST")
        })
        .await
        .unwrap();

    for i in 0..5u8 {
        bucket.put("key", vec![i]).await.unwrap();
    }
    assert_eq!(bucket.get("key").await.unwrap(), Some(vec![4]));
    assert_eq!(bucket.keys().await.unwrap(), vec!["key".to_string()]);

    // Only the newest `history` revisions survive.
    let direct = titan_mock::MemoryKvBucket::new(3, None);
    use titan_core::broker::KvBucket;
    for i in 0..5u8 {
        direct.put("key", vec![i]).await.unwrap();
    }
    let kept = direct.history_of("key");
    assert_eq!(kept.len(), 3);
    assert_eq!(kept.last().unwrap().1.as_deref(), Some([4u8].as_slice()));

    bucket.delete("key").await.unwrap();
    assert_eq!(bucket.get("key").await.unwrap(), None);
    assert!(bucket.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn kv_watch_streams_puts_and_deletes() {
    let broker = MemoryBroker::connected();
    let bucket = broker.kv_bucket(&KvSpec::named("WATCHED")).await.unwrap();

    let mut watch = bucket.watch("armed").await.unwrap();
    bucket.put("armed", b"true".to_vec()).await.unwrap();
    bucket.put("other", b"x".to_vec()).await.unwrap();
    bucket.delete("armed").await.unwrap();

    let first = watch.recv().await.unwrap();
    assert_eq!(first.key, "armed");
    assert_eq!(first.value.as_deref(), Some(b"true".as_slice()));

    let second = watch.recv().await.unwrap();
    assert_eq!(second.key, "armed");
    assert_eq!(second.value, None, "deletes surface as tombstones");
}

#[tokio::test]
async fn same_bucket_name_returns_the_same_store() {
    let broker = MemoryBroker::connected();
    let a = broker.kv_bucket(&KvSpec::named("SHARED")).await.unwrap();
    let b = broker.kv_bucket(&KvSpec::named("SHARED")).await.unwrap();
    a.put("k", b"v".to_vec()).await.unwrap();
    assert_eq!(b.get("k").await.unwrap(), Some(b"v".to_vec()));
}
