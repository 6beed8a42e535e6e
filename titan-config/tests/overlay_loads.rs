mod common;

use common::{Tree, brain_json, phase_json};
use serde_json::json;
use titan_config::{ConfigManager, SourceLayer, deep_merge};

#[test]
fn deep_merge_recurses_objects_and_replaces_everything_else() {
    let base = json!({
        "a": {"x": 1, "y": 2},
        "list": [1, 2, 3],
        "scalar": "base"
    });
    let overlay = json!({
        "a": {"y": 20, "z": 30},
        "list": [9],
        "scalar": "overlay"
    });
    let merged = deep_merge(base, overlay);
    assert_eq!(
        merged,
        json!({
            "a": {"x": 1, "y": 20, "z": 30},
            "list": [9],
            "scalar": "overlay"
        })
    );
}

#[test]
fn environment_overlay_wins_over_defaults() {
    let tree = Tree::new();
    tree.write("defaults/brain.json", &brain_json(20.0, 0.3));
    tree.write("production/brain.json", &json!({"maxTotalLeverage": 12.0}));

    let manager = ConfigManager::new(tree.root(), "production");
    let report = manager.load_brain(None).expect("load");

    assert_eq!(report.config.max_total_leverage, 12.0);
    assert_eq!(report.config.max_global_drawdown, 0.3);
    assert_eq!(
        report.sources.get("maxTotalLeverage"),
        Some(&SourceLayer::Environment)
    );
    assert_eq!(
        report.sources.get("maxGlobalDrawdown"),
        Some(&SourceLayer::Defaults)
    );
}

#[test]
fn operator_overrides_win_over_every_file_layer() {
    let tree = Tree::new();
    tree.write("defaults/brain.json", &brain_json(20.0, 0.3));
    tree.write("staging/brain.json", &json!({"maxTotalLeverage": 12.0}));

    let manager = ConfigManager::new(tree.root(), "staging");
    let report = manager
        .load_brain(Some(json!({"maxTotalLeverage": 7.0})))
        .expect("load");

    assert_eq!(report.config.max_total_leverage, 7.0);
    assert_eq!(
        report.sources.get("maxTotalLeverage"),
        Some(&SourceLayer::Operator)
    );
}

#[test]
fn missing_every_layer_is_an_error() {
    let tree = Tree::new();
    let manager = ConfigManager::new(tree.root(), "production");
    let err = manager.load_brain(None).unwrap_err();
    assert!(err.to_string().contains("no configuration found"));
}

#[test]
fn brain_phase_overrides_flow_into_phase_loads() {
    let tree = Tree::new();
    let mut brain = brain_json(20.0, 0.5);
    brain["phases"] = json!({"momentum": {"maxLeverage": 8.0}});
    tree.write("defaults/brain.json", &brain);
    tree.write("defaults/phases/momentum.json", &phase_json(10.0, 0.2));

    let manager = ConfigManager::new(tree.root(), "production");
    manager.load_brain(None).expect("brain");
    let report = manager.load_phase("momentum", None).expect("phase");

    assert_eq!(report.config.max_leverage, 8.0, "brain override wins");
    assert_eq!(report.config.max_drawdown, 0.2);
    assert_eq!(
        report.sources.get("maxLeverage"),
        Some(&SourceLayer::BrainOverride)
    );
}

#[test]
fn warnings_surface_without_failing_the_load() {
    let tree = Tree::new();
    tree.write("defaults/brain.json", &brain_json(150.0, 0.3));

    let manager = ConfigManager::new(tree.root(), "production");
    let report = manager.load_brain(None).expect("high leverage is a warning");
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.contains("unusually high")),
        "warnings: {:?}",
        report.warnings
    );
}

#[test]
fn service_configs_are_opaque_maps() {
    let tree = Tree::new();
    tree.write(
        "defaults/services/scavenger.json",
        &json!({"endpoint": "wss://feed", "depth": 50}),
    );
    tree.write(
        "production/services/scavenger.json",
        &json!({"depth": 200}),
    );

    let manager = ConfigManager::new(tree.root(), "production");
    let report = manager.load_service("scavenger", None).expect("service");
    assert_eq!(report.config.0["endpoint"], json!("wss://feed"));
    assert_eq!(report.config.0["depth"], json!(200));
    assert!(manager.service("scavenger").is_some());
}
