//! Policy-hash handshake messages exchanged between the decision and
//! execution components before trading is armed.

use serde::{Deserialize, Serialize};

/// Request body sent on the policy-hash request subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyHashRequest {
    /// Always `policy_hash`.
    pub request_type: String,
}

impl Default for PolicyHashRequest {
    fn default() -> Self {
        Self {
            request_type: "policy_hash".to_string(),
        }
    }
}

/// Reply carrying the execution side's current policy digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyHashReply {
    /// Opaque content digest of the active risk and execution policy.
    pub policy_hash: String,
    /// Optional human-oriented policy version tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    /// Reply wall-clock time, epoch milliseconds.
    pub timestamp: i64,
}

/// Outcome of the decision-side policy verification.
///
/// `success: false` is a hard gate: the operator-facing layer keeps trading
/// disarmed until hashes agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCheck {
    /// Whether the remote hash matched the local one.
    pub success: bool,
    /// The decision side's own policy hash.
    pub local_hash: String,
    /// The execution side's reported hash, when a valid reply arrived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_hash: Option<String>,
    /// Failure description on mismatch or exhausted retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Request attempts consumed, including the successful one.
    pub attempts: u32,
}

impl PolicyCheck {
    /// Successful verification after `attempts` tries.
    #[must_use]
    pub fn matched(local: impl Into<String>, attempts: u32) -> Self {
        let local = local.into();
        Self {
            success: true,
            remote_hash: Some(local.clone()),
            local_hash: local,
            error: None,
            attempts,
        }
    }

    /// Hash divergence between the two sides.
    #[must_use]
    pub fn mismatch(local: impl Into<String>, remote: impl Into<String>, attempts: u32) -> Self {
        let local = local.into();
        let remote = remote.into();
        Self {
            success: false,
            error: Some(format!(
                "Policy hash mismatch: Brain has {local}, Execution has {remote}"
            )),
            local_hash: local,
            remote_hash: Some(remote),
            attempts,
        }
    }

    /// The execution side never produced a valid reply.
    #[must_use]
    pub fn unreachable(local: impl Into<String>, attempts: u32, last_error: &str) -> Self {
        Self {
            success: false,
            local_hash: local.into(),
            remote_hash: None,
            error: Some(format!(
                "Execution policy hash unreachable after {attempts} attempts: {last_error}"
            )),
            attempts,
        }
    }
}
