//! The hierarchical configuration manager.
//!
//! Loads flow through the overlay `defaults <- environment-file <-
//! brain-override <- operator-supplied`, leaves win. Every successful load or
//! save appends to the per-target version history, and each watched source
//! file is polled for hot reload.

use crate::error::ConfigError;
use crate::history::{ConfigKind, VersionLog, VersionQuery};
use crate::merge::{ConfigDiff, deep_merge, leaf_paths};
use crate::schema;
use sha2::{Digest, Sha256};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use titan_core::PumpHandle;
use titan_types::{BrainConfig, ConfigVersion, PhaseConfig, ServiceConfig};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Which overlay layer supplied a configuration leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLayer {
    /// `defaults/` tree.
    Defaults,
    /// Environment overlay tree.
    Environment,
    /// `BrainConfig::phases` partial override.
    BrainOverride,
    /// Value supplied by the caller at load time.
    Operator,
}

/// Result of one load: the typed config plus provenance and warnings.
#[derive(Debug, Clone)]
pub struct LoadReport<T> {
    /// The merged, validated configuration.
    pub config: T,
    /// Which layer supplied each dotted leaf path.
    pub sources: BTreeMap<String, SourceLayer>,
    /// Non-fatal schema observations.
    pub warnings: Vec<String>,
    /// History version recorded for this load.
    pub version: u64,
}

/// Notifications emitted by the manager.
///
/// Broadcast to any number of listeners; a slow listener lags and drops, it
/// never blocks the emitter.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// A load or save produced a new live value.
    Changed {
        /// Entity family.
        kind: ConfigKind,
        /// Entity key.
        key: String,
        /// History version recorded.
        version: u64,
    },
    /// A watched source changed and the reload succeeded.
    Reloaded {
        /// Entity family.
        kind: ConfigKind,
        /// Entity key.
        key: String,
        /// Live value before the reload.
        old: Value,
        /// Live value after the reload.
        new: Value,
    },
    /// A reload failed; the previous live value was retained.
    Error {
        /// Entity family.
        kind: ConfigKind,
        /// Entity key.
        key: String,
        /// Failure description.
        message: String,
    },
}

/// Polling interval of the hot-reload watcher. The interval doubles as the
/// debounce window: at most one reload fires per file per tick.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(1);

struct WatchedFile {
    path: PathBuf,
    fingerprint: Option<String>,
    kind: ConfigKind,
    key: String,
}

#[derive(Default)]
struct LiveState {
    brain: Option<(BrainConfig, Value)>,
    phases: BTreeMap<String, (PhaseConfig, Value)>,
    services: BTreeMap<String, (ServiceConfig, Value)>,
    operator: HashMap<(ConfigKind, String), Value>,
    logs: HashMap<String, VersionLog>,
    watched: Vec<WatchedFile>,
}

struct Inner {
    root: PathBuf,
    environment: String,
    events: broadcast::Sender<ConfigEvent>,
    state: Mutex<LiveState>,
}

struct LoadFailure {
    error: ConfigError,
    /// Merged candidate that was rejected, for audit records.
    candidate: Option<Value>,
}

impl From<ConfigError> for LoadFailure {
    fn from(error: ConfigError) -> Self {
        Self {
            error,
            candidate: None,
        }
    }
}

/// Hierarchical configuration manager with hot reload and version history.
#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<Inner>,
}

impl ConfigManager {
    /// Manager rooted at a configuration tree, selecting one environment
    /// overlay (normally the deployment's environment tag).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                environment: environment.into(),
                events,
                state: Mutex::new(LiveState::default()),
            }),
        }
    }

    /// The environment overlay in use.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.inner.environment
    }

    /// Subscribe to configuration events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.inner.events.subscribe()
    }

    /// Current live brain configuration, if loaded.
    #[must_use]
    pub fn brain(&self) -> Option<BrainConfig> {
        self.lock().brain.as_ref().map(|(c, _)| c.clone())
    }

    /// Current live configuration of one phase, if loaded.
    #[must_use]
    pub fn phase(&self, name: &str) -> Option<PhaseConfig> {
        self.lock().phases.get(name).map(|(c, _)| c.clone())
    }

    /// Current live configuration of one service, if loaded.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<ServiceConfig> {
        self.lock().services.get(name).map(|(c, _)| c.clone())
    }

    // ---- loads ----------------------------------------------------------

    /// Load the brain configuration through the overlay chain.
    ///
    /// # Errors
    /// `Missing` when no layer exists, `Parse`/`Schema` on invalid content,
    /// and `InvalidAfterOverrides` when the new caps would invalidate an
    /// already-loaded phase.
    pub fn load_brain(
        &self,
        operator: Option<Value>,
    ) -> Result<LoadReport<BrainConfig>, ConfigError> {
        let mut state = self.lock();
        let report = Self::load_brain_locked(&self.inner, &mut state, operator.clone())
            .map_err(|f| f.error)?;
        // Remember the override for hot reloads, but only once it loaded.
        if let Some(op) = operator {
            state
                .operator
                .insert((ConfigKind::Brain, "brain".to_string()), op);
        }
        drop(state);
        self.emit(ConfigEvent::Changed {
            kind: ConfigKind::Brain,
            key: "brain".to_string(),
            version: report.version,
        });
        Ok(report)
    }

    /// Load one phase through the overlay chain, including the brain's
    /// partial override for that phase.
    ///
    /// # Errors
    /// As [`load_brain`](Self::load_brain); `InvalidAfterOverrides` when the
    /// merged phase breaches the brain's global caps.
    pub fn load_phase(
        &self,
        name: &str,
        operator: Option<Value>,
    ) -> Result<LoadReport<PhaseConfig>, ConfigError> {
        let mut state = self.lock();
        let report = Self::load_phase_locked(&self.inner, &mut state, name, operator.clone())
            .map_err(|f| f.error)?;
        if let Some(op) = operator {
            state
                .operator
                .insert((ConfigKind::Phase, name.to_string()), op);
        }
        drop(state);
        self.emit(ConfigEvent::Changed {
            kind: ConfigKind::Phase,
            key: name.to_string(),
            version: report.version,
        });
        Ok(report)
    }

    /// Load one leaf-service configuration through the overlay chain.
    ///
    /// # Errors
    /// As [`load_brain`](Self::load_brain).
    pub fn load_service(
        &self,
        name: &str,
        operator: Option<Value>,
    ) -> Result<LoadReport<ServiceConfig>, ConfigError> {
        let mut state = self.lock();
        let report = Self::load_service_locked(&self.inner, &mut state, name, operator.clone())
            .map_err(|f| f.error)?;
        if let Some(op) = operator {
            state
                .operator
                .insert((ConfigKind::Service, name.to_string()), op);
        }
        drop(state);
        self.emit(ConfigEvent::Changed {
            kind: ConfigKind::Service,
            key: name.to_string(),
            version: report.version,
        });
        Ok(report)
    }

    // ---- saves ----------------------------------------------------------

    /// Persist a brain configuration to the environment overlay and record a
    /// history version.
    ///
    /// # Errors
    /// `Schema` when the value is invalid, `Io` on write failure.
    pub fn save_brain(
        &self,
        cfg: &BrainConfig,
        author: &str,
        comment: &str,
        tags: Vec<String>,
    ) -> Result<ConfigVersion, ConfigError> {
        let validation = schema::validate_brain(cfg);
        if !validation.is_valid() {
            return Err(ConfigError::Schema {
                target: "brain".to_string(),
                issues: validation.issues,
            });
        }
        let value = serde_json::to_value(cfg).map_err(|e| ConfigError::Parse {
            path: "brain".to_string(),
            msg: e.to_string(),
        })?;
        let path = self.inner.environment_path("brain.json");
        let mut state = self.lock();
        Self::write_json(&path, &value)?;
        Self::refresh_fingerprint(&mut state, &path);
        state.brain = Some((cfg.clone(), value.clone()));
        let version = Self::log_mut(&self.inner, &mut state, ConfigKind::Brain, "brain")?
            .append(value, author, comment, tags)?;
        drop(state);
        self.emit(ConfigEvent::Changed {
            kind: ConfigKind::Brain,
            key: "brain".to_string(),
            version: version.version,
        });
        Ok(version)
    }

    /// Persist one phase configuration to the environment overlay and record
    /// a history version.
    ///
    /// # Errors
    /// `Schema` on invalid values, `InvalidAfterOverrides` on cap breach,
    /// `Io` on write failure.
    pub fn save_phase(
        &self,
        name: &str,
        cfg: &PhaseConfig,
        author: &str,
        comment: &str,
        tags: Vec<String>,
    ) -> Result<ConfigVersion, ConfigError> {
        let validation = schema::validate_phase(name, cfg);
        if !validation.is_valid() {
            return Err(ConfigError::Schema {
                target: name.to_string(),
                issues: validation.issues,
            });
        }
        let mut state = self.lock();
        if let Some((brain, _)) = &state.brain
            && !schema::phase_within_brain(cfg, brain)
        {
            return Err(ConfigError::InvalidAfterOverrides {
                target: name.to_string(),
            });
        }
        let value = serde_json::to_value(cfg).map_err(|e| ConfigError::Parse {
            path: name.to_string(),
            msg: e.to_string(),
        })?;
        let path = self
            .inner
            .environment_path(&format!("phases/{name}.json"));
        Self::write_json(&path, &value)?;
        Self::refresh_fingerprint(&mut state, &path);
        state
            .phases
            .insert(name.to_string(), (cfg.clone(), value.clone()));
        let version = Self::log_mut(&self.inner, &mut state, ConfigKind::Phase, name)?
            .append(value, author, comment, tags)?;
        drop(state);
        self.emit(ConfigEvent::Changed {
            kind: ConfigKind::Phase,
            key: name.to_string(),
            version: version.version,
        });
        Ok(version)
    }

    // ---- history --------------------------------------------------------

    /// Fetch one stored version.
    ///
    /// # Errors
    /// `UnknownVersion` when absent, `History` on storage failure.
    pub fn get_version(
        &self,
        kind: ConfigKind,
        key: &str,
        version: u64,
    ) -> Result<ConfigVersion, ConfigError> {
        let mut state = self.lock();
        Self::log_mut(&self.inner, &mut state, kind, key)?
            .get(version)
            .cloned()
    }

    /// All stored versions for one target, oldest first.
    ///
    /// # Errors
    /// `History` on storage failure.
    pub fn versions(&self, kind: ConfigKind, key: &str) -> Result<Vec<ConfigVersion>, ConfigError> {
        let mut state = self.lock();
        Ok(Self::log_mut(&self.inner, &mut state, kind, key)?
            .all()
            .to_vec())
    }

    /// Versions matching a query, oldest first.
    ///
    /// # Errors
    /// `History` on storage failure.
    pub fn search_versions(
        &self,
        kind: ConfigKind,
        key: &str,
        query: &VersionQuery,
    ) -> Result<Vec<ConfigVersion>, ConfigError> {
        let mut state = self.lock();
        Ok(Self::log_mut(&self.inner, &mut state, kind, key)?
            .search(query)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Structural diff between two stored versions.
    ///
    /// # Errors
    /// `UnknownVersion` when either is absent.
    pub fn compare_versions(
        &self,
        kind: ConfigKind,
        key: &str,
        from: u64,
        to: u64,
    ) -> Result<ConfigDiff, ConfigError> {
        let mut state = self.lock();
        Self::log_mut(&self.inner, &mut state, kind, key)?.compare(from, to)
    }

    /// Make a stored snapshot the live configuration. History stays
    /// append-only: the rollback is recorded as a fresh version numbered
    /// after the previous latest, never as a rewind.
    ///
    /// # Errors
    /// `UnknownVersion` when absent; `Schema`/`InvalidAfterOverrides` when
    /// the snapshot no longer passes validation against current state.
    pub fn rollback(
        &self,
        kind: ConfigKind,
        key: &str,
        version: u64,
        author: &str,
    ) -> Result<ConfigVersion, ConfigError> {
        let mut state = self.lock();
        let snapshot = Self::log_mut(&self.inner, &mut state, kind, key)?
            .get(version)?
            .data
            .clone();
        let old = Self::apply_snapshot(&mut state, kind, key, &snapshot)?;
        let recorded = Self::log_mut(&self.inner, &mut state, kind, key)?.append(
            snapshot.clone(),
            author,
            &format!("rollback to version {version}"),
            vec!["rollback".to_string()],
        )?;
        drop(state);
        info!(kind = %kind, key, version, "configuration rolled back");
        self.emit(ConfigEvent::Reloaded {
            kind,
            key: key.to_string(),
            old,
            new: snapshot,
        });
        Ok(recorded)
    }

    /// Export one target's full history to a file.
    ///
    /// # Errors
    /// `History` on storage failure.
    pub fn export_history(
        &self,
        kind: ConfigKind,
        key: &str,
        path: &Path,
    ) -> Result<(), ConfigError> {
        let mut state = self.lock();
        Self::log_mut(&self.inner, &mut state, kind, key)?.export(path)
    }

    /// Import (replace or merge) one target's history from an exported file.
    /// Returns the number of imported entries.
    ///
    /// # Errors
    /// `History` when the file is unreadable or invalid.
    pub fn import_history(
        &self,
        kind: ConfigKind,
        key: &str,
        path: &Path,
        merge: bool,
    ) -> Result<usize, ConfigError> {
        let mut state = self.lock();
        Self::log_mut(&self.inner, &mut state, kind, key)?.import(path, merge)
    }

    /// Keep only the newest `keep` versions. Returns how many were dropped.
    ///
    /// # Errors
    /// `History` on storage failure.
    pub fn prune_history(
        &self,
        kind: ConfigKind,
        key: &str,
        keep: usize,
    ) -> Result<usize, ConfigError> {
        let mut state = self.lock();
        Self::log_mut(&self.inner, &mut state, kind, key)?.prune(keep)
    }

    /// Drop the full history of one target.
    ///
    /// # Errors
    /// `History` on storage failure.
    pub fn clear_history(&self, kind: ConfigKind, key: &str) -> Result<(), ConfigError> {
        let mut state = self.lock();
        Self::log_mut(&self.inner, &mut state, kind, key)?.clear()
    }

    // ---- hot reload -----------------------------------------------------

    /// Start the polling watcher over every source file a load has touched.
    ///
    /// Runs until the returned handle is stopped or dropped. A modification
    /// re-executes the corresponding load path with the remembered operator
    /// overrides; success emits [`ConfigEvent::Reloaded`], failure emits
    /// [`ConfigEvent::Error`] and retains the previous live value.
    #[must_use]
    pub fn spawn_watcher(&self) -> PumpHandle {
        let manager = self.clone();
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WATCH_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => manager.poll_watched(),
                }
            }
        });
        PumpHandle::new(task, stop_tx)
    }

    fn poll_watched(&self) {
        let dirty: Vec<(ConfigKind, String)> = {
            let mut state = self.lock();
            let mut dirty = Vec::new();
            for watched in &mut state.watched {
                let current = fingerprint(&watched.path);
                if current != watched.fingerprint {
                    watched.fingerprint = current;
                    dirty.push((watched.kind, watched.key.clone()));
                }
            }
            dirty.dedup();
            dirty
        };
        for (kind, key) in dirty {
            debug!(kind = %kind, key, "watched configuration source changed");
            self.reload(kind, &key);
        }
    }

    /// Re-execute the load path for one target, retaining the previous value
    /// on failure.
    fn reload(&self, kind: ConfigKind, key: &str) {
        let mut state = self.lock();
        let operator = state.operator.get(&(kind, key.to_string())).cloned();
        let old = match kind {
            ConfigKind::Brain => state.brain.as_ref().map(|(_, v)| v.clone()),
            ConfigKind::Phase => state.phases.get(key).map(|(_, v)| v.clone()),
            ConfigKind::Service => state.services.get(key).map(|(_, v)| v.clone()),
        };
        let outcome = match kind {
            ConfigKind::Brain => {
                Self::load_brain_locked(&self.inner, &mut state, operator).map(|r| {
                    serde_json::to_value(&r.config).unwrap_or(Value::Null)
                })
            }
            ConfigKind::Phase => {
                Self::load_phase_locked(&self.inner, &mut state, key, operator).map(|r| {
                    serde_json::to_value(&r.config).unwrap_or(Value::Null)
                })
            }
            ConfigKind::Service => {
                Self::load_service_locked(&self.inner, &mut state, key, operator).map(|r| {
                    serde_json::to_value(&r.config).unwrap_or(Value::Null)
                })
            }
        };
        match outcome {
            Ok(new) => {
                drop(state);
                info!(kind = %kind, key, "configuration reloaded");
                self.emit(ConfigEvent::Reloaded {
                    kind,
                    key: key.to_string(),
                    old: old.unwrap_or(Value::Null),
                    new,
                });
            }
            Err(failure) => {
                let message = failure.error.to_string();
                // Audit trail: the rejected candidate is recorded, the live
                // value is not touched.
                if let Some(candidate) = failure.candidate
                    && let Ok(log) = Self::log_mut(&self.inner, &mut state, kind, key)
                {
                    let _ = log.append(
                        candidate,
                        "watcher",
                        &format!("rejected reload: {message}"),
                        vec!["audit".to_string(), "rejected".to_string()],
                    );
                }
                drop(state);
                warn!(kind = %kind, key, %message, "configuration reload failed; previous value retained");
                self.emit(ConfigEvent::Error {
                    kind,
                    key: key.to_string(),
                    message,
                });
            }
        }
    }

    // ---- internals ------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, LiveState> {
        self.inner.state.lock().expect("config state lock")
    }

    fn emit(&self, event: ConfigEvent) {
        let _ = self.inner.events.send(event);
    }

    fn load_brain_locked(
        inner: &Arc<Inner>,
        state: &mut LiveState,
        operator: Option<Value>,
    ) -> Result<LoadReport<BrainConfig>, LoadFailure> {
        let files = [
            (SourceLayer::Defaults, inner.defaults_path("brain.json")),
            (SourceLayer::Environment, inner.environment_path("brain.json")),
        ];
        let (merged, sources) = overlay(&files, None, operator, "brain")?;
        let cfg: BrainConfig = serde_json::from_value(merged.clone()).map_err(|e| {
            LoadFailure {
                error: ConfigError::Schema {
                    target: "brain".to_string(),
                    issues: vec![e.to_string()],
                },
                candidate: Some(merged.clone()),
            }
        })?;
        let validation = schema::validate_brain(&cfg);
        if !validation.is_valid() {
            return Err(LoadFailure {
                error: ConfigError::Schema {
                    target: "brain".to_string(),
                    issues: validation.issues,
                },
                candidate: Some(merged),
            });
        }
        // New caps must still admit every phase that is already live.
        for (phase_name, (phase, _)) in &state.phases {
            if !schema::phase_within_brain(phase, &cfg) {
                return Err(LoadFailure {
                    error: ConfigError::InvalidAfterOverrides {
                        target: phase_name.clone(),
                    },
                    candidate: Some(merged),
                });
            }
        }
        Self::watch_files(state, &files, ConfigKind::Brain, "brain");
        state.brain = Some((cfg.clone(), merged.clone()));
        let version = Self::log_mut(inner, state, ConfigKind::Brain, "brain")
            .map_err(LoadFailure::from)?
            .append(merged, "loader", "load brain", vec!["load".to_string()])
            .map_err(LoadFailure::from)?;
        Ok(LoadReport {
            config: cfg,
            sources,
            warnings: validation.warnings,
            version: version.version,
        })
    }

    fn load_phase_locked(
        inner: &Arc<Inner>,
        state: &mut LiveState,
        name: &str,
        operator: Option<Value>,
    ) -> Result<LoadReport<PhaseConfig>, LoadFailure> {
        let rel = format!("phases/{name}.json");
        let files = [
            (SourceLayer::Defaults, inner.defaults_path(&rel)),
            (SourceLayer::Environment, inner.environment_path(&rel)),
        ];
        let brain_override = state
            .brain
            .as_ref()
            .and_then(|(brain, _)| brain.phases.get(name).cloned());
        let (merged, sources) = overlay(&files, brain_override, operator, name)?;
        let cfg: PhaseConfig = serde_json::from_value(merged.clone()).map_err(|e| {
            LoadFailure {
                error: ConfigError::Schema {
                    target: name.to_string(),
                    issues: vec![e.to_string()],
                },
                candidate: Some(merged.clone()),
            }
        })?;
        let validation = schema::validate_phase(name, &cfg);
        if !validation.is_valid() {
            return Err(LoadFailure {
                error: ConfigError::Schema {
                    target: name.to_string(),
                    issues: validation.issues,
                },
                candidate: Some(merged),
            });
        }
        if let Some((brain, _)) = &state.brain
            && !schema::phase_within_brain(&cfg, brain)
        {
            return Err(LoadFailure {
                error: ConfigError::InvalidAfterOverrides {
                    target: name.to_string(),
                },
                candidate: Some(merged),
            });
        }
        Self::watch_files(state, &files, ConfigKind::Phase, name);
        state
            .phases
            .insert(name.to_string(), (cfg.clone(), merged.clone()));
        let version = Self::log_mut(inner, state, ConfigKind::Phase, name)
            .map_err(LoadFailure::from)?
            .append(
                merged,
                "loader",
                &format!("load phase {name}"),
                vec!["load".to_string()],
            )
            .map_err(LoadFailure::from)?;
        Ok(LoadReport {
            config: cfg,
            sources,
            warnings: validation.warnings,
            version: version.version,
        })
    }

    fn load_service_locked(
        inner: &Arc<Inner>,
        state: &mut LiveState,
        name: &str,
        operator: Option<Value>,
    ) -> Result<LoadReport<ServiceConfig>, LoadFailure> {
        let rel = format!("services/{name}.json");
        let files = [
            (SourceLayer::Defaults, inner.defaults_path(&rel)),
            (SourceLayer::Environment, inner.environment_path(&rel)),
        ];
        let (merged, sources) = overlay(&files, None, operator, name)?;
        let validation = schema::validate_service(name, &merged);
        if !validation.is_valid() {
            return Err(LoadFailure {
                error: ConfigError::Schema {
                    target: name.to_string(),
                    issues: validation.issues,
                },
                candidate: Some(merged),
            });
        }
        let cfg: ServiceConfig = serde_json::from_value(merged.clone()).map_err(|e| {
            LoadFailure {
                error: ConfigError::Schema {
                    target: name.to_string(),
                    issues: vec![e.to_string()],
                },
                candidate: Some(merged.clone()),
            }
        })?;
        Self::watch_files(state, &files, ConfigKind::Service, name);
        state
            .services
            .insert(name.to_string(), (cfg.clone(), merged.clone()));
        let version = Self::log_mut(inner, state, ConfigKind::Service, name)
            .map_err(LoadFailure::from)?
            .append(
                merged,
                "loader",
                &format!("load service {name}"),
                vec!["load".to_string()],
            )
            .map_err(LoadFailure::from)?;
        Ok(LoadReport {
            config: cfg,
            sources,
            warnings: validation.warnings,
            version: version.version,
        })
    }

    fn apply_snapshot(
        state: &mut LiveState,
        kind: ConfigKind,
        key: &str,
        snapshot: &Value,
    ) -> Result<Value, ConfigError> {
        match kind {
            ConfigKind::Brain => {
                let cfg: BrainConfig =
                    serde_json::from_value(snapshot.clone()).map_err(|e| ConfigError::Schema {
                        target: "brain".to_string(),
                        issues: vec![e.to_string()],
                    })?;
                let old = state
                    .brain
                    .replace((cfg, snapshot.clone()))
                    .map_or(Value::Null, |(_, v)| v);
                Ok(old)
            }
            ConfigKind::Phase => {
                let cfg: PhaseConfig =
                    serde_json::from_value(snapshot.clone()).map_err(|e| ConfigError::Schema {
                        target: key.to_string(),
                        issues: vec![e.to_string()],
                    })?;
                if let Some((brain, _)) = &state.brain
                    && !schema::phase_within_brain(&cfg, brain)
                {
                    return Err(ConfigError::InvalidAfterOverrides {
                        target: key.to_string(),
                    });
                }
                let old = state
                    .phases
                    .insert(key.to_string(), (cfg, snapshot.clone()))
                    .map_or(Value::Null, |(_, v)| v);
                Ok(old)
            }
            ConfigKind::Service => {
                let cfg: ServiceConfig =
                    serde_json::from_value(snapshot.clone()).map_err(|e| ConfigError::Schema {
                        target: key.to_string(),
                        issues: vec![e.to_string()],
                    })?;
                let old = state
                    .services
                    .insert(key.to_string(), (cfg, snapshot.clone()))
                    .map_or(Value::Null, |(_, v)| v);
                Ok(old)
            }
        }
    }

    fn log_mut<'a>(
        inner: &Arc<Inner>,
        state: &'a mut LiveState,
        kind: ConfigKind,
        key: &str,
    ) -> Result<&'a mut VersionLog, ConfigError> {
        let id = format!("{kind}.{key}");
        if !state.logs.contains_key(&id) {
            let log = VersionLog::open(&inner.root.join(".history"), kind, key)?;
            state.logs.insert(id.clone(), log);
        }
        Ok(state.logs.get_mut(&id).expect("log just inserted"))
    }

    fn watch_files(
        state: &mut LiveState,
        files: &[(SourceLayer, PathBuf)],
        kind: ConfigKind,
        key: &str,
    ) {
        for (_, path) in files {
            if state.watched.iter().any(|w| &w.path == path) {
                continue;
            }
            state.watched.push(WatchedFile {
                fingerprint: fingerprint(path),
                path: path.clone(),
                kind,
                key: key.to_string(),
            });
        }
    }

    fn refresh_fingerprint(state: &mut LiveState, path: &Path) {
        for watched in &mut state.watched {
            if watched.path == path {
                watched.fingerprint = fingerprint(path);
            }
        }
    }

    fn write_json(path: &Path, value: &Value) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent.display().to_string(), &e))?;
        }
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| ConfigError::parse(path.display().to_string(), &e))?;
        std::fs::write(path, body).map_err(|e| ConfigError::io(path.display().to_string(), &e))
    }
}

impl Inner {
    fn defaults_path(&self, rel: &str) -> PathBuf {
        self.root.join("defaults").join(rel)
    }

    fn environment_path(&self, rel: &str) -> PathBuf {
        self.root.join(&self.environment).join(rel)
    }
}

/// Merge file layers plus the brain-override and operator layers, recording
/// which layer supplied each leaf.
fn overlay(
    files: &[(SourceLayer, PathBuf)],
    brain_override: Option<Value>,
    operator: Option<Value>,
    target: &str,
) -> Result<(Value, BTreeMap<String, SourceLayer>), LoadFailure> {
    let mut layers: Vec<(SourceLayer, Value)> = Vec::new();
    for (layer, path) in files {
        if !path.exists() {
            continue;
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LoadFailure::from(ConfigError::io(path.display().to_string(), &e)))?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| LoadFailure::from(ConfigError::parse(path.display().to_string(), &e)))?;
        layers.push((*layer, value));
    }
    if let Some(v) = brain_override {
        layers.push((SourceLayer::BrainOverride, v));
    }
    if let Some(v) = operator {
        layers.push((SourceLayer::Operator, v));
    }
    if layers.is_empty() {
        return Err(LoadFailure::from(ConfigError::Missing {
            target: target.to_string(),
        }));
    }

    let mut sources = BTreeMap::new();
    let mut merged = Value::Object(serde_json::Map::new());
    for (layer, value) in layers {
        for path in leaf_paths(&value) {
            sources.insert(path, layer);
        }
        merged = deep_merge(merged, value);
    }
    Ok((merged, sources))
}

/// Content fingerprint of a source file; `None` when the file is absent.
fn fingerprint(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Some(hex::encode(hasher.finalize()))
}
