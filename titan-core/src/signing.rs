//! HMAC envelope signing, verification, and replay protection.

use crate::canonical::canonical_string;
use crate::error::FabricError;
use hmac::{Hmac, Mac};
use moka::sync::Cache;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use titan_types::Envelope;

type HmacSha256 = Hmac<Sha256>;

/// Signs envelopes with HMAC-SHA-256 over the canonical string
/// `ts.nonce.J(payload)`.
#[derive(Clone)]
pub struct Signer {
    secret: Vec<u8>,
    key_id: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret never reaches logs.
        f.debug_struct("Signer").field("key_id", &self.key_id).finish()
    }
}

impl Signer {
    /// Build a signer for one key-rotation slot.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, key_id: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            key_id: key_id.into(),
        }
    }

    /// The rotation slot this signer stamps onto envelopes.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Fresh 128-bit hex nonce.
    #[must_use]
    pub fn generate_nonce() -> String {
        format!("{:032x}", rand::random::<u128>())
    }

    /// Hex HMAC over the canonical string for the given envelope fields.
    ///
    /// # Errors
    /// `Signature` if the secret is unusable as an HMAC key.
    pub fn signature(&self, ts: i64, nonce: &str, payload: &Value) -> Result<String, FabricError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| FabricError::Signature(e.to_string()))?;
        mac.update(canonical_string(ts, nonce, payload).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Stamp `sig`, `nonce`, and `key_id` onto an envelope.
    ///
    /// # Errors
    /// `Signature` if the secret is unusable as an HMAC key.
    pub fn sign(&self, envelope: &mut Envelope) -> Result<(), FabricError> {
        let nonce = Self::generate_nonce();
        envelope.sig = Some(self.signature(envelope.ts, &nonce, &envelope.data)?);
        envelope.nonce = Some(nonce);
        envelope.key_id = Some(self.key_id.clone());
        Ok(())
    }

    /// Verify an envelope signed by this key slot.
    ///
    /// Reconstructs the canonical string from `ts`, `nonce`, and the
    /// re-canonicalized payload, recomputes the HMAC, and compares in
    /// constant time.
    ///
    /// # Errors
    /// `Signature` when the triple is absent, the `key_id` names a different
    /// slot, or the MAC comparison fails.
    pub fn verify(&self, envelope: &Envelope) -> Result<(), FabricError> {
        let (sig, nonce, key_id) = match (&envelope.sig, &envelope.nonce, &envelope.key_id) {
            (Some(s), Some(n), Some(k)) => (s, n, k),
            _ => {
                return Err(FabricError::Signature(
                    "envelope is unsigned or missing sig/nonce/key_id".to_string(),
                ));
            }
        };
        if key_id != &self.key_id {
            return Err(FabricError::Signature(format!(
                "key_id {key_id:?} does not match slot {:?}",
                self.key_id
            )));
        }
        let raw = hex::decode(sig)
            .map_err(|_| FabricError::Signature("sig is not valid hex".to_string()))?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| FabricError::Signature(e.to_string()))?;
        mac.update(canonical_string(envelope.ts, nonce, &envelope.data).as_bytes());
        mac.verify_slice(&raw)
            .map_err(|_| FabricError::Signature("HMAC mismatch".to_string()))
    }
}

/// Nonce replay window keyed by `(correlation_id, nonce)`.
///
/// A verifier must reject an envelope whose nonce has already been observed
/// for the same correlation within the broker's duplicate window.
pub struct ReplayGuard {
    seen: Cache<(String, String), ()>,
}

impl std::fmt::Debug for ReplayGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGuard")
            .field("entries", &self.seen.entry_count())
            .finish()
    }
}

impl ReplayGuard {
    /// Guard with the given replay window (normally the stream's duplicate
    /// window, 60 s for commands).
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            seen: Cache::builder()
                .time_to_live(window)
                .max_capacity(100_000)
                .build(),
        }
    }

    /// Record an observation. Returns `true` the first time a
    /// `(correlation, nonce)` pair is seen within the window, `false` on
    /// replay.
    #[must_use]
    pub fn observe(&self, correlation_id: &str, nonce: &str) -> bool {
        let key = (correlation_id.to_string(), nonce.to_string());
        if self.seen.contains_key(&key) {
            return false;
        }
        self.seen.insert(key, ());
        true
    }

    /// Verify an envelope against a signer and this replay window in one step.
    ///
    /// # Errors
    /// Propagates signature failures and rejects replayed nonces.
    pub fn verify_fresh(&self, signer: &Signer, envelope: &Envelope) -> Result<(), FabricError> {
        signer.verify(envelope)?;
        let correlation = envelope.correlation_id.as_deref().unwrap_or(&envelope.id);
        let nonce = envelope.nonce.as_deref().unwrap_or_default();
        if self.observe(correlation, nonce) {
            Ok(())
        } else {
            Err(FabricError::Signature(format!(
                "nonce replayed within duplicate window for correlation {correlation}"
            )))
        }
    }
}
