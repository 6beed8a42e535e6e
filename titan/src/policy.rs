//! The policy-hash handshake.
//!
//! Before trading is armed, the decision side cross-checks its policy digest
//! against the execution side's. A mismatch is a hard gate: a silently
//! divergent execution side (the "healthy but rejects everything" failure
//! mode) must never receive commands.

use crate::client::{Decoded, FabricClient, MessageHandler};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use titan_core::{FabricError, PumpHandle, content_digest, now_ms, subject};
use titan_types::{PolicyCheck, PolicyHashReply, PolicyHashRequest};
use tracing::{info, warn};

/// Retry parameters of the handshake.
#[derive(Debug, Clone)]
pub struct HandshakeOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total request attempts.
    pub attempts: u32,
    /// First retry delay; doubles per further attempt.
    pub base_backoff: Duration,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

/// Digest of an active policy document. Both sides hash the canonical form,
/// so key order in the source files cannot cause false mismatches.
#[must_use]
pub fn policy_hash_of(policy: &Value) -> String {
    content_digest(policy)
}

/// Request the execution side's policy hash and compare it to `local_hash`.
///
/// Invalid replies (no `policy_hash` field, non-JSON bodies) and transport
/// failures are retried with exponential backoff. A well-formed reply ends
/// the loop immediately: match arms the gate, mismatch fails it. Exhausted
/// attempts report the execution side unreachable.
pub async fn verify_execution_policy_hash(
    fabric: &FabricClient,
    local_hash: &str,
    opts: &HandshakeOptions,
) -> PolicyCheck {
    let request = match serde_json::to_value(PolicyHashRequest::default()) {
        Ok(v) => v,
        Err(e) => return PolicyCheck::unreachable(local_hash, 0, &e.to_string()),
    };
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=opts.attempts.max(1) {
        if attempt > 1 {
            let delay = opts.base_backoff * 2u32.saturating_pow(attempt - 2);
            tokio::time::sleep(delay).await;
        }
        match fabric
            .request(subject::req::POLICY_HASH, &request, Some(opts.timeout))
            .await
        {
            Ok(Decoded::Json(body)) => {
                match serde_json::from_value::<PolicyHashReply>(body) {
                    Ok(reply) if !reply.policy_hash.is_empty() => {
                        if reply.policy_hash == local_hash {
                            info!(attempt, "policy hash verified");
                            return PolicyCheck::matched(local_hash, attempt);
                        }
                        warn!(
                            local = local_hash,
                            remote = %reply.policy_hash,
                            "policy hash mismatch; trading stays disarmed"
                        );
                        return PolicyCheck::mismatch(local_hash, reply.policy_hash, attempt);
                    }
                    // A reply without a policy_hash is invalid, not a verdict.
                    Ok(_) | Err(_) => {
                        last_error = "reply carried no policy_hash".to_string();
                        warn!(attempt, "invalid policy-hash reply; retrying");
                    }
                }
            }
            Ok(Decoded::Text(_)) => {
                last_error = "reply was not JSON".to_string();
                warn!(attempt, "non-JSON policy-hash reply; retrying");
            }
            Err(e) => {
                last_error = e.to_string();
                warn!(attempt, error = %last_error, "policy-hash request failed");
            }
        }
    }
    PolicyCheck::unreachable(local_hash, opts.attempts.max(1), &last_error)
}

struct PolicyResponder {
    fabric: Arc<FabricClient>,
    hash: String,
    version: Option<String>,
}

#[async_trait]
impl MessageHandler for PolicyResponder {
    async fn handle(&self, msg: crate::client::FabricMessage) -> Result<(), FabricError> {
        let Some(reply) = msg.reply else {
            return Ok(());
        };
        let body = PolicyHashReply {
            policy_hash: self.hash.clone(),
            policy_version: self.version.clone(),
            timestamp: now_ms(),
        };
        self.fabric
            .publish_value(&reply, &serde_json::to_value(&body)?)
            .await
    }
}

/// Serve the execution side of the handshake: answer every request on the
/// policy-hash subject with the given digest until the handle is dropped.
///
/// # Errors
/// `NotConnected` or broker subscription failures.
pub async fn serve_policy_hash(
    fabric: Arc<FabricClient>,
    policy_hash: impl Into<String>,
    policy_version: Option<String>,
) -> Result<PumpHandle, FabricError> {
    let responder = PolicyResponder {
        fabric: Arc::clone(&fabric),
        hash: policy_hash.into(),
        version: policy_version,
    };
    fabric
        .subscribe_with(subject::req::POLICY_HASH, Arc::new(responder))
        .await
}
