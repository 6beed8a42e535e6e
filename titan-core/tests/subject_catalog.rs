use std::collections::HashSet;
use titan_core::subject::{
    self, DualPublishTag, SubjectClass, classify, dual_publish_subjects, is_standard_subject,
    normalize_symbol, subject_matches,
};

#[test]
fn catalog_totality() {
    for subj in subject::standard_subjects() {
        assert!(
            is_standard_subject(&subj),
            "{subj} is not a standard subject"
        );
        let class = classify(&subj).unwrap_or_else(|| panic!("{subj} has no class"));
        assert!(
            SubjectClass::ALL.contains(&class),
            "{subj} classified outside the recognized set"
        );
    }
}

#[test]
fn versioned_subjects_carry_a_version_token() {
    for subj in subject::standard_subjects() {
        if classify(&subj) == Some(SubjectClass::Dlq) {
            continue; // dlq subjects are derived from the failing subject
        }
        assert!(
            subj.split('.').any(|tok| {
                tok.len() > 1 && tok.starts_with('v') && tok[1..].chars().all(|c| c.is_ascii_digit())
            }),
            "{subj} carries no vN token"
        );
    }
}

#[test]
fn request_subjects_are_non_standard() {
    assert!(!is_standard_subject(subject::req::POLICY_HASH));
    assert!(classify(subject::req::POLICY_HASH).is_none());
}

#[test]
fn migration_map_is_injective() {
    let map = subject::legacy::migration_map();
    let legacy: HashSet<&str> = map.iter().map(|(l, _)| *l).collect();
    let replacements: HashSet<&str> = map.iter().map(|(_, r)| *r).collect();
    assert_eq!(legacy.len(), map.len(), "duplicate legacy entries");
    assert_eq!(replacements.len(), map.len(), "two legacy subjects share a replacement");
    for (_, replacement) in map {
        assert!(
            is_standard_subject(replacement),
            "replacement {replacement} is not standard"
        );
    }
}

#[test]
fn dual_publish_metrics_pair() {
    let [canonical, legacy] = dual_publish_subjects(DualPublishTag::Metrics, "bybit", "BTC/USDT");
    assert_eq!(canonical, "titan.evt.brain.metrics.v1.bybit.BTC_USDT");
    assert_eq!(legacy, "titan.brain.metrics.bybit.BTC_USDT");
    assert!(is_standard_subject(&canonical));
    assert!(!is_standard_subject(&legacy));
}

#[test]
fn dual_publish_constraints_pair() {
    let [canonical, legacy] =
        dual_publish_subjects(DualPublishTag::Constraints, "binance", "ETH/USDT");
    assert_eq!(canonical, "titan.evt.brain.constraints.v1.binance.ETH_USDT");
    assert_eq!(legacy, "titan.brain.constraints.binance.ETH_USDT");
}

#[test]
fn symbol_normalization() {
    assert_eq!(normalize_symbol("BTC/USDT"), "BTC_USDT");
    assert_eq!(normalize_symbol("BTCUSDT"), "BTCUSDT");
    assert_eq!(
        subject::cmd::execution_place("auto", "main", "BTC/USDT"),
        "titan.cmd.execution.place.v1.auto.main.BTC_USDT"
    );
}

#[test]
fn dlq_subject_derivation() {
    assert_eq!(
        subject::dlq::for_subject("titan.cmd.execution.place.v1.auto.main.BTC_USDT"),
        "titan.dlq.cmd.execution.place.v1.auto.main.BTC_USDT"
    );
    assert_eq!(
        subject::dlq::for_subject("foreign.subject"),
        "titan.dlq.unknown.foreign.subject"
    );
}

#[test]
fn wildcard_matching() {
    assert!(subject_matches("titan.cmd.>", "titan.cmd.sys.halt.v1"));
    assert!(!subject_matches("titan.cmd.>", "titan.cmd"));
    assert!(!subject_matches("titan.cmd.>", "titan.evt.venue.status.v1"));
    assert!(subject_matches(
        "titan.cmd.execution.place.v1.*.*.BTC_USDT",
        "titan.cmd.execution.place.v1.bybit.main.BTC_USDT"
    ));
    assert!(!subject_matches(
        "titan.cmd.execution.place.v1.*.*.BTC_USDT",
        "titan.cmd.execution.place.v1.bybit.main.ETH_USDT"
    ));
    assert!(subject_matches("titan.sys.health.v1", "titan.sys.health.v1"));
    assert!(!subject_matches("titan.sys.health.v1", "titan.sys.health.v1.extra"));
}
