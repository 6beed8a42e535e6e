mod common;

use common::{Tree, brain_json, phase_json};
use serde_json::json;
use titan_config::{ConfigError, ConfigKind, ConfigManager, VersionQuery, content_hash};
use titan_types::BrainConfig;

fn manager_with_brain(tree: &Tree) -> ConfigManager {
    tree.write("defaults/brain.json", &brain_json(20.0, 0.5));
    let manager = ConfigManager::new(tree.root(), "production");
    manager.load_brain(None).expect("brain");
    manager
}

#[test]
fn versions_are_strictly_increasing_across_loads_and_saves() {
    let tree = Tree::new();
    let manager = manager_with_brain(&tree);

    let brain = BrainConfig {
        max_total_leverage: 15.0,
        max_global_drawdown: 0.4,
        phases: Default::default(),
    };
    let v2 = manager
        .save_brain(&brain, "ops", "tighten caps", vec!["risk".to_string()])
        .unwrap();
    assert_eq!(v2.version, 2);

    let versions = manager.versions(ConfigKind::Brain, "brain").unwrap();
    assert_eq!(
        versions.iter().map(|v| v.version).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(versions[1].author, "ops");
    assert_eq!(versions[1].hash, content_hash(&versions[1].data));
}

#[test]
fn rollback_restores_the_snapshot_and_appends() {
    let tree = Tree::new();
    let manager = manager_with_brain(&tree); // v1: 20.0 / 0.5

    let tighter = BrainConfig {
        max_total_leverage: 10.0,
        max_global_drawdown: 0.3,
        phases: Default::default(),
    };
    manager
        .save_brain(&tighter, "ops", "tighten", vec![])
        .unwrap(); // v2
    assert_eq!(manager.brain().unwrap().max_total_leverage, 10.0);

    let recorded = manager
        .rollback(ConfigKind::Brain, "brain", 1, "ops")
        .unwrap();
    // Append-only: the rollback lands as v3, not as a rewind to v1.
    assert_eq!(recorded.version, 3);
    assert_eq!(recorded.comment, "rollback to version 1");
    assert!(recorded.tags.contains(&"rollback".to_string()));
    assert_eq!(manager.brain().unwrap().max_total_leverage, 20.0);

    // The next write continues from the new latest.
    let v4 = manager
        .save_brain(&tighter, "ops", "tighten again", vec![])
        .unwrap();
    assert_eq!(v4.version, 4);
}

#[test]
fn rollback_to_an_unknown_version_fails() {
    let tree = Tree::new();
    let manager = manager_with_brain(&tree);
    let err = manager
        .rollback(ConfigKind::Brain, "brain", 99, "ops")
        .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownVersion { version: 99, .. }));
}

#[test]
fn search_filters_by_author_tags_date_and_comment() {
    let tree = Tree::new();
    let manager = manager_with_brain(&tree);
    let brain = |lev: f64| BrainConfig {
        max_total_leverage: lev,
        max_global_drawdown: 0.5,
        phases: Default::default(),
    };
    manager
        .save_brain(&brain(18.0), "alice", "loosen for expiry week", vec!["risk".into()])
        .unwrap();
    manager
        .save_brain(&brain(12.0), "bob", "tighten after drawdown", vec!["risk".into(), "incident".into()])
        .unwrap();

    let by_author = manager
        .search_versions(ConfigKind::Brain, "brain", &VersionQuery {
            author: Some("bob".to_string()),
            ..VersionQuery::default()
        })
        .unwrap();
    assert_eq!(by_author.len(), 1);
    assert_eq!(by_author[0].version, 3);

    let by_tags = manager
        .search_versions(ConfigKind::Brain, "brain", &VersionQuery {
            tags: vec!["risk".to_string(), "incident".to_string()],
            ..VersionQuery::default()
        })
        .unwrap();
    assert_eq!(by_tags.len(), 1);

    let by_comment = manager
        .search_versions(ConfigKind::Brain, "brain", &VersionQuery {
            comment_contains: Some("EXPIRY".to_string()),
            ..VersionQuery::default()
        })
        .unwrap();
    assert_eq!(by_comment.len(), 1);
    assert_eq!(by_comment[0].author, "alice");

    let all = manager.versions(ConfigKind::Brain, "brain").unwrap();
    let by_date = manager
        .search_versions(ConfigKind::Brain, "brain", &VersionQuery {
            from_ms: Some(all[0].timestamp),
            to_ms: Some(all[2].timestamp),
            ..VersionQuery::default()
        })
        .unwrap();
    assert_eq!(by_date.len(), 3);
}

#[test]
fn compare_produces_a_structural_diff() {
    let tree = Tree::new();
    let manager = manager_with_brain(&tree);
    let brain = BrainConfig {
        max_total_leverage: 12.0,
        max_global_drawdown: 0.5,
        phases: [("momentum".to_string(), json!({"maxLeverage": 6.0}))]
            .into_iter()
            .collect(),
    };
    manager.save_brain(&brain, "ops", "phase override", vec![]).unwrap();

    let diff = manager
        .compare_versions(ConfigKind::Brain, "brain", 1, 2)
        .unwrap();
    assert_eq!(
        diff.changed.get("maxTotalLeverage"),
        Some(&(json!(20.0), json!(12.0)))
    );
    assert_eq!(
        diff.added.get("phases.momentum.maxLeverage"),
        Some(&json!(6.0))
    );
    assert!(diff.removed.is_empty());
}

#[test]
fn export_import_and_merge() {
    let tree = Tree::new();
    let manager = manager_with_brain(&tree);
    let brain = BrainConfig {
        max_total_leverage: 14.0,
        max_global_drawdown: 0.5,
        phases: Default::default(),
    };
    manager.save_brain(&brain, "ops", "v2", vec![]).unwrap();

    let export_path = tree.path("brain-history-export.json");
    manager
        .export_history(ConfigKind::Brain, "brain", &export_path)
        .unwrap();

    // A second manager over a fresh tree imports the history wholesale.
    let other_tree = Tree::new();
    let other = ConfigManager::new(other_tree.root(), "production");
    let imported = other
        .import_history(ConfigKind::Brain, "brain", &export_path, false)
        .unwrap();
    assert_eq!(imported, 2);
    assert_eq!(
        other
            .versions(ConfigKind::Brain, "brain")
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect::<Vec<_>>(),
        vec![1, 2]
    );

    // Merging the same file back is idempotent on version numbers.
    let merged = other
        .import_history(ConfigKind::Brain, "brain", &export_path, true)
        .unwrap();
    assert_eq!(merged, 2);
    assert_eq!(other.versions(ConfigKind::Brain, "brain").unwrap().len(), 2);
}

#[test]
fn prune_keeps_the_newest_and_clear_empties() {
    let tree = Tree::new();
    let manager = manager_with_brain(&tree);
    for lev in [18.0, 16.0, 14.0, 12.0] {
        let brain = BrainConfig {
            max_total_leverage: lev,
            max_global_drawdown: 0.5,
            phases: Default::default(),
        };
        manager.save_brain(&brain, "ops", "step", vec![]).unwrap();
    }

    let dropped = manager.prune_history(ConfigKind::Brain, "brain", 2).unwrap();
    assert_eq!(dropped, 3);
    let kept = manager.versions(ConfigKind::Brain, "brain").unwrap();
    assert_eq!(kept.iter().map(|v| v.version).collect::<Vec<_>>(), vec![4, 5]);

    // Numbering continues after the prune; pruned numbers are never reused.
    let brain = BrainConfig {
        max_total_leverage: 11.0,
        max_global_drawdown: 0.5,
        phases: Default::default(),
    };
    let next = manager.save_brain(&brain, "ops", "post-prune", vec![]).unwrap();
    assert_eq!(next.version, 6);

    manager.clear_history(ConfigKind::Brain, "brain").unwrap();
    assert!(manager.versions(ConfigKind::Brain, "brain").unwrap().is_empty());
}

#[test]
fn history_survives_a_manager_restart() {
    let tree = Tree::new();
    {
        let manager = manager_with_brain(&tree);
        let brain = BrainConfig {
            max_total_leverage: 13.0,
            max_global_drawdown: 0.5,
            phases: Default::default(),
        };
        manager.save_brain(&brain, "ops", "v2", vec![]).unwrap();
    }
    // A fresh manager over the same tree picks the history up from .history/.
    let reborn = ConfigManager::new(tree.root(), "production");
    let versions = reborn.versions(ConfigKind::Brain, "brain").unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions.last().unwrap().version, 2);

    let v3 = reborn.load_brain(None).expect("reload");
    assert_eq!(v3.version, 3, "numbering continues across restarts");
}

#[test]
fn phase_histories_are_tracked_per_key() {
    let tree = Tree::new();
    tree.write("defaults/brain.json", &brain_json(20.0, 0.5));
    tree.write("defaults/phases/momentum.json", &phase_json(10.0, 0.2));
    tree.write("defaults/phases/sweep.json", &phase_json(5.0, 0.1));

    let manager = ConfigManager::new(tree.root(), "production");
    manager.load_brain(None).unwrap();
    manager.load_phase("momentum", None).unwrap();
    manager.load_phase("sweep", None).unwrap();
    manager.load_phase("momentum", None).unwrap();

    assert_eq!(manager.versions(ConfigKind::Phase, "momentum").unwrap().len(), 2);
    assert_eq!(manager.versions(ConfigKind::Phase, "sweep").unwrap().len(), 1);
}
