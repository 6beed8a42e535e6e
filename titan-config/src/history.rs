//! Append-only configuration version history.
//!
//! One JSON file per `(kind, key)` under the hidden `.history/` directory
//! holds the ordered [`ConfigVersion`] list. Version numbers are strictly
//! increasing and never reused; rollback appends, it never rewinds.

use crate::error::ConfigError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use titan_core::canonical::content_digest;
use titan_core::envelope::now_ms;
use titan_types::ConfigVersion;

/// Configuration entity families tracked by the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    /// The global brain configuration.
    Brain,
    /// One trading phase.
    Phase,
    /// One leaf service.
    Service,
}

impl ConfigKind {
    /// Stable token used in history file names and event payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brain => "brain",
            Self::Phase => "phase",
            Self::Service => "service",
        }
    }
}

impl std::fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex SHA-256 over the canonical form of a snapshot.
#[must_use]
pub fn content_hash(data: &Value) -> String {
    content_digest(data)
}

/// Filter for [`VersionLog::search`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct VersionQuery {
    /// Exact author match.
    pub author: Option<String>,
    /// Versions carrying every listed tag.
    pub tags: Vec<String>,
    /// Inclusive lower bound, epoch milliseconds.
    pub from_ms: Option<i64>,
    /// Inclusive upper bound, epoch milliseconds.
    pub to_ms: Option<i64>,
    /// Case-insensitive comment substring.
    pub comment_contains: Option<String>,
}

impl VersionQuery {
    fn matches(&self, v: &ConfigVersion) -> bool {
        if let Some(author) = &self.author
            && &v.author != author
        {
            return false;
        }
        if !self.tags.iter().all(|t| v.tags.contains(t)) {
            return false;
        }
        if let Some(from) = self.from_ms
            && v.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_ms
            && v.timestamp > to
        {
            return false;
        }
        if let Some(needle) = &self.comment_contains
            && !v
                .comment
                .to_lowercase()
                .contains(&needle.to_lowercase())
        {
            return false;
        }
        true
    }
}

/// The append-only version log of one `(kind, key)`.
#[derive(Debug)]
pub struct VersionLog {
    target: String,
    path: PathBuf,
    entries: Vec<ConfigVersion>,
}

impl VersionLog {
    /// Open (or initialize) the log for one target under `history_dir`.
    ///
    /// # Errors
    /// `History` when the backing file exists but cannot be read or parsed.
    pub fn open(history_dir: &Path, kind: ConfigKind, key: &str) -> Result<Self, ConfigError> {
        let target = format!("{kind}.{key}");
        let path = history_dir.join(format!("{target}.json"));
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::History {
                target: target.clone(),
                msg: e.to_string(),
            })?;
            serde_json::from_str(&raw).map_err(|e| ConfigError::History {
                target: target.clone(),
                msg: e.to_string(),
            })?
        } else {
            Vec::new()
        };
        Ok(Self {
            target,
            path,
            entries,
        })
    }

    /// The `kind.key` identifier this log tracks.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Latest stored version number; 0 when the log is empty.
    #[must_use]
    pub fn latest_version(&self) -> u64 {
        self.entries.last().map_or(0, |v| v.version)
    }

    /// Append a snapshot, assigning the next version number.
    ///
    /// # Errors
    /// `History` when the backing file cannot be written.
    pub fn append(
        &mut self,
        data: Value,
        author: &str,
        comment: &str,
        tags: Vec<String>,
    ) -> Result<ConfigVersion, ConfigError> {
        let version = ConfigVersion {
            version: self.latest_version() + 1,
            hash: content_hash(&data),
            data,
            author: author.to_string(),
            comment: comment.to_string(),
            tags,
            timestamp: now_ms(),
        };
        self.entries.push(version.clone());
        self.persist()?;
        Ok(version)
    }

    /// Fetch one version by number.
    ///
    /// # Errors
    /// `UnknownVersion` when the number was never stored (or was pruned).
    pub fn get(&self, version: u64) -> Result<&ConfigVersion, ConfigError> {
        self.entries
            .iter()
            .find(|v| v.version == version)
            .ok_or(ConfigError::UnknownVersion {
                target: self.target.clone(),
                version,
            })
    }

    /// All retained versions, oldest first.
    #[must_use]
    pub fn all(&self) -> &[ConfigVersion] {
        &self.entries
    }

    /// Versions matching a query, oldest first.
    #[must_use]
    pub fn search(&self, query: &VersionQuery) -> Vec<&ConfigVersion> {
        self.entries.iter().filter(|v| query.matches(v)).collect()
    }

    /// Structural diff between two stored versions.
    ///
    /// # Errors
    /// `UnknownVersion` when either number is absent.
    pub fn compare(&self, from: u64, to: u64) -> Result<crate::merge::ConfigDiff, ConfigError> {
        let old = self.get(from)?;
        let new = self.get(to)?;
        Ok(crate::merge::diff_values(&old.data, &new.data))
    }

    /// Write the full log to `path` as JSON.
    ///
    /// # Errors
    /// `History` on filesystem failure.
    pub fn export(&self, path: &Path) -> Result<(), ConfigError> {
        let body = serde_json::to_string_pretty(&self.entries).map_err(|e| {
            ConfigError::History {
                target: self.target.clone(),
                msg: e.to_string(),
            }
        })?;
        std::fs::write(path, body).map_err(|e| ConfigError::History {
            target: self.target.clone(),
            msg: e.to_string(),
        })
    }

    /// Replace or merge the log from an exported file.
    ///
    /// With `merge`, the union of both logs is kept ordered by version and an
    /// imported entry wins on a version-number collision. Without it, the
    /// imported list replaces the log wholesale.
    ///
    /// # Errors
    /// `History` when the file is unreadable or not an exported log.
    pub fn import(&mut self, path: &Path, merge: bool) -> Result<usize, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::History {
            target: self.target.clone(),
            msg: e.to_string(),
        })?;
        let imported: Vec<ConfigVersion> =
            serde_json::from_str(&raw).map_err(|e| ConfigError::History {
                target: self.target.clone(),
                msg: e.to_string(),
            })?;
        let count = imported.len();
        if merge {
            for entry in imported {
                match self.entries.iter_mut().find(|e| e.version == entry.version) {
                    Some(existing) => *existing = entry,
                    None => self.entries.push(entry),
                }
            }
            self.entries.sort_by_key(|v| v.version);
        } else {
            self.entries = imported;
        }
        self.persist()?;
        Ok(count)
    }

    /// Drop all but the newest `keep` versions.
    ///
    /// # Errors
    /// `History` on filesystem failure.
    pub fn prune(&mut self, keep: usize) -> Result<usize, ConfigError> {
        let excess = self.entries.len().saturating_sub(keep);
        if excess > 0 {
            self.entries.drain(..excess);
            self.persist()?;
        }
        Ok(excess)
    }

    /// Drop every version.
    ///
    /// # Errors
    /// `History` on filesystem failure.
    pub fn clear(&mut self) -> Result<(), ConfigError> {
        self.entries.clear();
        self.persist()
    }

    fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::History {
                target: self.target.clone(),
                msg: e.to_string(),
            })?;
        }
        let body = serde_json::to_string(&self.entries).map_err(|e| ConfigError::History {
            target: self.target.clone(),
            msg: e.to_string(),
        })?;
        std::fs::write(&self.path, body).map_err(|e| ConfigError::History {
            target: self.target.clone(),
            msg: e.to_string(),
        })
    }
}
