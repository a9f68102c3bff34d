//! Claim manager: signs claim bundles and classifies inbound tokens

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::b64url;
use crate::claim::{IdentityClaim, IDENTITY_SUBJECT};
use crate::clock::{Clock, SystemClock};
use crate::config::ClaimsConfig;
use crate::crypto::{ClaimSigner, MAX_SIGNATURE_LEN};
use crate::data::{ClaimRepositoryData, PayloadWire, VerifyOutcome};
use crate::error::ClaimsError;
use crate::store::SessionKeyStore;
use crate::token::{self, TokenHeader, MAX_HEADER_SEGMENT_LEN};
use crate::SECURITY_AUDIT_TARGET;

/// Decoded size of the largest accepted header segment
const HEADER_BUF_LEN: usize = MAX_HEADER_SEGMENT_LEN / 4 * 3;

/// Signs and verifies claim tokens.
///
/// Shared by every request; holds the process-wide [`SessionKeyStore`].
#[derive(Debug)]
pub struct ClaimManager {
    signer: ClaimSigner,
    store: Arc<SessionKeyStore>,
    clock: Arc<dyn Clock>,
    config: ClaimsConfig,
}

impl ClaimManager {
    /// Create a manager with its own session key store
    pub fn new(config: ClaimsConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(SessionKeyStore::new(config.expiration, Arc::clone(&clock)));
        Self::with_store(config, store, clock)
    }

    /// Create a manager on the wall clock
    pub fn from_config(config: ClaimsConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    /// Create a manager sharing an existing store
    pub fn with_store(
        config: ClaimsConfig,
        store: Arc<SessionKeyStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            signer: ClaimSigner::new(config.algorithm, config.secret.clone()),
            store,
            clock,
            config,
        }
    }

    /// Configuration the manager was built from
    pub fn config(&self) -> &ClaimsConfig {
        &self.config
    }

    /// Keyed-hash signer for the configured algorithm
    pub fn signer(&self) -> &ClaimSigner {
        &self.signer
    }

    /// Session key store, possibly shared with other managers
    pub fn store(&self) -> &Arc<SessionKeyStore> {
        &self.store
    }

    /// Time source for expiration checks
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current time on the manager's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Sign a claim bundle into a token.
    ///
    /// Pending claim values are normalized in place first. Creates the
    /// session key for the identity if none is live, attaching the bundle's
    /// decryption keys to it.
    ///
    /// # Panics
    /// Panics if the identity claim has no raw value after normalization.
    pub fn serialize(&self, data: &mut ClaimRepositoryData) -> Result<String, ClaimsError> {
        data.normalize();
        let identity = data
            .identity
            .raw_value()
            .expect("identity claim must have a raw value when signing");

        let header_json = serde_json::to_vec(&TokenHeader::new(self.signer.name()))?;
        let payload_json = serde_json::to_vec(&data.to_wire())?;
        let mut token = token::frame(&header_json, &payload_json, self.signer.signature_len());

        let session_key = self
            .store
            .get_or_create(identity, || Arc::clone(&data.decryption_keys));

        let mut signature = [0u8; MAX_SIGNATURE_LEN];
        let written = self.signer.sign(&session_key, token.as_bytes(), &mut signature);
        token::append_signature(&mut token, &signature[..written]);
        Ok(token)
    }

    /// Verify an untrusted token.
    ///
    /// Never panics on malformed input. Structural problems and signature
    /// mismatches yield `Invalid` without data. A missing session key or a
    /// past expiration yields `Expired` with the parsed data so callers can
    /// offer re-authentication to the claimed identity.
    pub fn deserialize(&self, token: &str) -> VerifyOutcome {
        if !token.is_ascii() {
            tracing::warn!(reason = "non_ascii", "Rejecting claims token");
            return VerifyOutcome::invalid();
        }

        let Some(parts) = token::split(token) else {
            tracing::warn!(reason = "missing_segment", "Rejecting claims token");
            return VerifyOutcome::invalid();
        };

        if parts.header.len() > MAX_HEADER_SEGMENT_LEN {
            tracing::warn!(
                reason = "header_too_long",
                len = parts.header.len(),
                "Rejecting claims token"
            );
            return VerifyOutcome::invalid();
        }

        if !self.check_header(parts.header) {
            return VerifyOutcome::invalid();
        }

        let mut signature = [0u8; MAX_SIGNATURE_LEN + 4];
        let Some(signature_len) = self.decode_signature(parts.signature, &mut signature) else {
            return VerifyOutcome::invalid();
        };
        let signature = &signature[..signature_len];

        let Some(payload_json) = b64url::decode(parts.payload.as_bytes()) else {
            tracing::warn!(reason = "payload_encoding", "Rejecting claims token");
            return VerifyOutcome::invalid();
        };
        let payload: PayloadWire = match serde_json::from_slice(&payload_json) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(reason = "payload_json", error = %e, "Rejecting claims token");
                return VerifyOutcome::invalid();
            }
        };

        let identity = match &payload.identity {
            Some(wire) if wire.subject == IDENTITY_SUBJECT => match &wire.raw_value {
                Some(raw) => raw.clone(),
                None => {
                    tracing::warn!(reason = "null_identity", "Rejecting claims token");
                    return VerifyOutcome::invalid();
                }
            },
            Some(_) => {
                tracing::warn!(reason = "identity_subject", "Rejecting claims token");
                return VerifyOutcome::invalid();
            }
            None => {
                tracing::warn!(reason = "missing_identity", "Rejecting claims token");
                return VerifyOutcome::invalid();
            }
        };
        let (mut data, has_null_claim) = payload.into_data(IdentityClaim::new(identity.as_str()));

        let Some(session_key) = self.store.try_get(&identity) else {
            tracing::info!(identity = %identity, "No live session key for claims token");
            return VerifyOutcome::expired(data);
        };

        if !self
            .signer
            .verify(&session_key, parts.signed.as_bytes(), signature)
        {
            tracing::error!(
                target: SECURITY_AUDIT_TARGET,
                identity = %identity,
                algorithm = self.signer.name(),
                "Claims token signature mismatch"
            );
            return VerifyOutcome::invalid();
        }

        if data.expiration < self.clock.now() {
            self.store.try_revoke(&identity);
            tracing::info!(identity = %identity, expired_at = %data.expiration, "Claims token expired");
            return VerifyOutcome::expired(data);
        }

        if has_null_claim {
            tracing::warn!(identity = %identity, reason = "null_claim", "Rejecting claims token");
            return VerifyOutcome::invalid();
        }

        data.decryption_keys = Arc::clone(session_key.decryption_keys());
        VerifyOutcome::valid(data)
    }

    /// Revoke every token issued for `identity`
    pub fn revoke(&self, identity: &str) -> bool {
        self.store.try_revoke(identity)
    }

    /// Extend the session key life of `identity` by a full TTL
    pub fn renew(&self, identity: &str) -> bool {
        self.store.renew(identity)
    }

    /// Decode the header on the stack and require the configured algorithm
    fn check_header(&self, encoded: &str) -> bool {
        let mut buf = [0u8; HEADER_BUF_LEN];
        let Some(len) = b64url::decode_into(encoded.as_bytes(), &mut buf) else {
            tracing::warn!(reason = "header_encoding", "Rejecting claims token");
            return false;
        };
        let header: TokenHeader = match serde_json::from_slice(&buf[..len]) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!(reason = "header_json", error = %e, "Rejecting claims token");
                return false;
            }
        };
        if header.alg != self.signer.name() {
            tracing::warn!(
                reason = "algorithm",
                alg = %header.alg,
                expected = self.signer.name(),
                "Rejecting claims token"
            );
            return false;
        }
        true
    }

    /// Decode the signature segment, requiring the algorithm's exact length
    fn decode_signature(&self, encoded: &str, out: &mut [u8]) -> Option<usize> {
        let expected = self.signer.signature_len();
        if encoded.len() != b64url::max_encoded_len(expected) {
            tracing::warn!(reason = "signature_length", "Rejecting claims token");
            return None;
        }
        match b64url::decode_into(encoded.as_bytes(), out) {
            Some(len) if len == expected => Some(len),
            _ => {
                tracing::warn!(reason = "signature_encoding", "Rejecting claims token");
                None
            }
        }
    }
}
