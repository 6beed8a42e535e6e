//! Temp-tree fixtures for configuration tests.
#![allow(dead_code)] // not every test binary uses every fixture

use serde_json::{Value, json};
use std::path::{Path, PathBuf};

/// A throwaway configuration tree rooted in a temp directory.
pub struct Tree {
    dir: tempfile::TempDir,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write a JSON file under the tree, creating parents.
    pub fn write(&self, rel: &str, value: &Value) {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, serde_json::to_string_pretty(value).expect("json"))
            .expect("write config");
    }
}

pub fn brain_json(max_total_leverage: f64, max_global_drawdown: f64) -> Value {
    json!({
        "maxTotalLeverage": max_total_leverage,
        "maxGlobalDrawdown": max_global_drawdown,
    })
}

pub fn phase_json(max_leverage: f64, max_drawdown: f64) -> Value {
    json!({
        "maxLeverage": max_leverage,
        "maxDrawdown": max_drawdown,
        "thresholds": {"sweep": 0.7}
    })
}
