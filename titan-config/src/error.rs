use thiserror::Error;

/// Error type for configuration loads, persistence, and history access.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem access failed.
    #[error("io error on {path}: {msg}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying failure.
        msg: String,
    },

    /// A source file is not valid JSON.
    #[error("parse error in {path}: {msg}")]
    Parse {
        /// Offending path.
        path: String,
        /// Parser failure.
        msg: String,
    },

    /// No layer supplied any configuration for the target.
    #[error("no configuration found for {target}")]
    Missing {
        /// Config key that has no source.
        target: String,
    },

    /// The merged value violates the target's schema.
    #[error("invalid {target} configuration: {}", issues.join("; "))]
    Schema {
        /// Config key that failed.
        target: String,
        /// Individual schema violations.
        issues: Vec<String>,
    },

    /// A phase breached the brain's global caps after overrides. Fatal for
    /// the load.
    #[error("Invalid {target} configuration after brain overrides")]
    InvalidAfterOverrides {
        /// Phase name.
        target: String,
    },

    /// History lookup for a version that was never stored.
    #[error("version {version} not found for {target}")]
    UnknownVersion {
        /// `kind.key` identifier.
        target: String,
        /// Requested version number.
        version: u64,
    },

    /// History file is unreadable or structurally invalid.
    #[error("history error for {target}: {msg}")]
    History {
        /// `kind.key` identifier.
        target: String,
        /// Failure description.
        msg: String,
    },
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<String>, e: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            msg: e.to_string(),
        }
    }

    pub(crate) fn parse(path: impl Into<String>, e: &serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            msg: e.to_string(),
        }
    }
}
