mod common;

use common::{Tree, brain_json, phase_json};
use serde_json::json;
use titan_config::{ConfigError, ConfigManager};

#[test]
fn phase_leverage_above_brain_cap_is_fatal() {
    let tree = Tree::new();
    tree.write("defaults/brain.json", &brain_json(10.0, 0.5));
    tree.write("defaults/phases/momentum.json", &phase_json(25.0, 0.2));

    let manager = ConfigManager::new(tree.root(), "production");
    manager.load_brain(None).expect("brain");

    let err = manager.load_phase("momentum", None).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidAfterOverrides { .. }));
    assert_eq!(
        err.to_string(),
        "Invalid momentum configuration after brain overrides"
    );
    assert!(manager.phase("momentum").is_none(), "nothing went live");
}

#[test]
fn phase_drawdown_above_brain_cap_is_fatal() {
    let tree = Tree::new();
    tree.write("defaults/brain.json", &brain_json(20.0, 0.1));
    tree.write("defaults/phases/sweep.json", &phase_json(5.0, 0.4));

    let manager = ConfigManager::new(tree.root(), "production");
    manager.load_brain(None).expect("brain");
    let err = manager.load_phase("sweep", None).unwrap_err();
    assert_eq!(err.to_string(), "Invalid sweep configuration after brain overrides");
}

#[test]
fn brain_override_that_breaches_caps_is_fatal() {
    let tree = Tree::new();
    let mut brain = brain_json(10.0, 0.5);
    // The brain's own override pushes the phase past the global cap.
    brain["phases"] = json!({"momentum": {"maxLeverage": 12.0}});
    tree.write("defaults/brain.json", &brain);
    tree.write("defaults/phases/momentum.json", &phase_json(8.0, 0.2));

    let manager = ConfigManager::new(tree.root(), "production");
    manager.load_brain(None).expect("brain");
    let err = manager.load_phase("momentum", None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid momentum configuration after brain overrides"
    );
}

#[test]
fn phase_without_brain_loads_unchecked() {
    let tree = Tree::new();
    tree.write("defaults/phases/momentum.json", &phase_json(25.0, 0.9));

    let manager = ConfigManager::new(tree.root(), "production");
    let report = manager.load_phase("momentum", None).expect("no brain, no caps");
    assert_eq!(report.config.max_leverage, 25.0);
}

#[test]
fn loading_a_brain_below_live_phases_is_fatal() {
    let tree = Tree::new();
    tree.write("defaults/brain.json", &brain_json(20.0, 0.5));
    tree.write("defaults/phases/momentum.json", &phase_json(10.0, 0.2));

    let manager = ConfigManager::new(tree.root(), "production");
    manager.load_brain(None).expect("brain");
    manager.load_phase("momentum", None).expect("phase");

    // Re-loading the brain with a cap below the live phase must fail and
    // leave the live brain untouched.
    let err = manager
        .load_brain(Some(json!({"maxTotalLeverage": 5.0})))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid momentum configuration after brain overrides"
    );
}

#[test]
fn schema_violations_are_fatal() {
    let tree = Tree::new();
    tree.write("defaults/brain.json", &json!({"maxTotalLeverage": -3.0, "maxGlobalDrawdown": 0.2}));

    let manager = ConfigManager::new(tree.root(), "production");
    let err = manager.load_brain(None).unwrap_err();
    assert!(matches!(err, ConfigError::Schema { .. }));
    assert!(err.to_string().contains("maxTotalLeverage"));
}

#[test]
fn malformed_json_reports_the_offending_path() {
    let tree = Tree::new();
    let path = tree.path("defaults/brain.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{not json").unwrap();

    let manager = ConfigManager::new(tree.root(), "production");
    let err = manager.load_brain(None).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("brain.json"));
}
