use std::time::Duration;
use titan_core::subject::{self, SubjectClass, classify};
use titan_core::topology::{self, Retention, StorageClass};

#[test]
fn streams_cover_every_persisted_subject() {
    let streams = topology::streams();
    for subj in subject::standard_subjects() {
        let class = classify(&subj).expect("standard subject");
        if class == SubjectClass::Sys {
            continue; // sys traffic is core-only, never stream-captured
        }
        let covered = streams.iter().any(|s| s.covers(&subj));
        assert!(
            covered,
            "{subj} (class {class:?}) is not captured by any declared stream"
        );
    }
}

#[test]
fn command_stream_is_a_dedup_workqueue() {
    let cmd = topology::streams()
        .into_iter()
        .find(|s| s.name == "TITAN_CMD")
        .expect("TITAN_CMD declared");
    assert_eq!(cmd.retention, Retention::WorkQueue);
    assert_eq!(cmd.storage, StorageClass::File);
    assert_eq!(cmd.duplicate_window, Some(Duration::from_secs(60)));
    assert_eq!(cmd.max_age, Duration::from_secs(7 * 24 * 60 * 60));
}

#[test]
fn data_stream_is_memory_backed_and_short_lived() {
    let data = topology::streams()
        .into_iter()
        .find(|s| s.name == "TITAN_DATA")
        .expect("TITAN_DATA declared");
    assert_eq!(data.storage, StorageClass::Memory);
    assert_eq!(data.max_age, Duration::from_secs(15 * 60));
}

#[test]
fn dlq_stream_caps_size() {
    let dlq = topology::streams()
        .into_iter()
        .find(|s| s.name == "TITAN_DLQ")
        .expect("TITAN_DLQ declared");
    assert_eq!(dlq.max_bytes, Some(1024 * 1024 * 1024));
    assert!(dlq.covers(&subject::dlq::for_subject(subject::cmd::SYS_HALT)));
}

#[test]
fn subject_routing_picks_the_declared_stream() {
    let place = subject::cmd::execution_place("bybit", "main", "ETH/USDT");
    assert_eq!(
        topology::stream_for_subject(&place).map(|s| s.name),
        Some("TITAN_CMD")
    );
    assert_eq!(
        topology::stream_for_subject("titan.evt.venue.status.v1.bybit").map(|s| s.name),
        Some("TITAN_EVT")
    );
    // Legacy non-standard subjects fall outside every stream.
    assert!(topology::stream_for_subject(subject::legacy::EXECUTION_DLQ).is_none());
    assert!(topology::stream_for_subject(subject::req::POLICY_HASH).is_none());
}

#[test]
fn execution_core_backoff_schedule() {
    let spec = topology::consumer(topology::EXECUTION_CORE_DURABLE).expect("declared");
    assert_eq!(spec.max_deliver, 5);
    assert_eq!(spec.redelivery_delay(1), Duration::from_secs(1));
    assert_eq!(spec.redelivery_delay(2), Duration::from_secs(5));
    assert_eq!(spec.redelivery_delay(3), Duration::from_secs(15));
    assert_eq!(spec.redelivery_delay(4), Duration::from_secs(30));
    // Past the schedule's end the final entry repeats.
    assert_eq!(spec.redelivery_delay(9), Duration::from_secs(30));
}

#[test]
fn consumer_filters_stay_within_their_stream() {
    let streams = topology::streams();
    for consumer in topology::consumers() {
        let stream = streams
            .iter()
            .find(|s| s.name == consumer.stream)
            .unwrap_or_else(|| panic!("{} binds to undeclared stream", consumer.durable));
        // A filter must select a subset of the stream's subject space: every
        // concrete subject matching the filter is covered by the stream.
        let probe = consumer.filter_subject.replace('>', "probe.tail");
        assert!(
            stream.covers(&probe),
            "filter {} of {} escapes stream {}",
            consumer.filter_subject,
            consumer.durable,
            stream.name
        );
    }
}

#[test]
fn classify_covers_all_six_classes() {
    assert_eq!(classify(subject::cmd::SYS_HALT), Some(SubjectClass::Cmd));
    assert_eq!(classify(subject::evt::BRAIN_SIGNAL), Some(SubjectClass::Evt));
    assert_eq!(classify(subject::data::BRAIN_HEARTBEAT), Some(SubjectClass::Data));
    assert_eq!(classify(subject::signal::SUBMIT), Some(SubjectClass::Signal));
    assert_eq!(classify(subject::sys::READY), Some(SubjectClass::Sys));
    assert_eq!(classify(subject::dlq::EXECUTION_CORE), Some(SubjectClass::Dlq));
}
