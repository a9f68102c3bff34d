//! Signed payload and verification outcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::claim::{Claim, ClaimWire, ClaimWireRef, IdentityClaim};
use crate::store::DecryptionKeys;

/// Classification of an inbound token.
///
/// Computed once per verification attempt; there are no transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimRepositoryStatus {
    /// No cookie was presented
    Uninitialized,
    /// Signature verified and not expired
    Valid,
    /// Malformed, unsupported algorithm, or signature mismatch
    Invalid,
    /// Signature verified but past expiration, or the session key is gone.
    /// The parsed data is still available.
    Expired,
}

impl std::fmt::Display for ClaimRepositoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// A claim bundle: what a token carries, plus server-side key material
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRepositoryData {
    pub identity: IdentityClaim,
    pub expiration: DateTime<Utc>,
    /// Every claim except the identity
    pub claims: Vec<Claim>,
    /// Never serialized; attached from the session key on successful verify
    pub decryption_keys: Arc<DecryptionKeys>,
}

impl ClaimRepositoryData {
    /// Bundle with no claims besides the identity
    pub fn new(identity: IdentityClaim, expiration: DateTime<Utc>) -> Self {
        Self {
            identity,
            expiration,
            claims: Vec::new(),
            decryption_keys: Arc::new(DecryptionKeys::default()),
        }
    }

    /// Builder form for adding claims
    #[must_use]
    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    /// Builder form for session-side key material
    #[must_use]
    pub fn with_decryption_keys(mut self, keys: DecryptionKeys) -> Self {
        self.decryption_keys = Arc::new(keys);
        self
    }

    /// Find a claim by subject
    pub fn claim(&self, subject: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.subject() == subject)
    }

    /// Materialize every pending value
    pub fn normalize(&mut self) {
        self.identity.normalize();
        for claim in &mut self.claims {
            claim.normalize();
        }
    }

    /// Borrowed wire view. Must be normalized first.
    pub(crate) fn to_wire(&self) -> PayloadRef<'_> {
        PayloadRef {
            identity: ClaimWireRef::from_claim(self.identity.as_claim()),
            expiration: self.expiration,
            claims: self.claims.iter().map(ClaimWireRef::from_claim).collect(),
        }
    }
}

/// Result of verifying an untrusted token
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub status: ClaimRepositoryStatus,
    /// Present for `Valid` and `Expired`
    pub data: Option<ClaimRepositoryData>,
}

impl VerifyOutcome {
    pub(crate) fn invalid() -> Self {
        Self {
            status: ClaimRepositoryStatus::Invalid,
            data: None,
        }
    }

    pub(crate) fn expired(data: ClaimRepositoryData) -> Self {
        Self {
            status: ClaimRepositoryStatus::Expired,
            data: Some(data),
        }
    }

    pub(crate) fn valid(data: ClaimRepositoryData) -> Self {
        Self {
            status: ClaimRepositoryStatus::Valid,
            data: Some(data),
        }
    }

    /// Whether verification succeeded
    pub fn is_valid(&self) -> bool {
        self.status == ClaimRepositoryStatus::Valid
    }
}

/// `{IdentityClaim, ExpirationDate, Claims[]}` as serialized
#[derive(Debug, Serialize)]
pub(crate) struct PayloadRef<'a> {
    #[serde(rename = "IdentityClaim")]
    pub identity: ClaimWireRef<'a>,
    #[serde(rename = "ExpirationDate")]
    pub expiration: DateTime<Utc>,
    #[serde(rename = "Claims")]
    pub claims: Vec<ClaimWireRef<'a>>,
}

/// Payload as parsed from an untrusted token. Every field a forger could
/// null out is optional so that the shape check happens in the verifier.
#[derive(Debug, Deserialize)]
pub(crate) struct PayloadWire {
    #[serde(rename = "IdentityClaim", default)]
    pub identity: Option<ClaimWire>,
    #[serde(rename = "ExpirationDate")]
    pub expiration: DateTime<Utc>,
    #[serde(rename = "Claims", default)]
    pub claims: Vec<ClaimWire>,
}

impl PayloadWire {
    /// Build the domain bundle around an already-checked identity.
    ///
    /// Claims with a null raw value are dropped; the second element reports
    /// whether any were.
    pub fn into_data(self, identity: IdentityClaim) -> (ClaimRepositoryData, bool) {
        let mut has_null = false;
        let claims = self
            .claims
            .into_iter()
            .filter_map(|wire| match wire.raw_value {
                Some(raw) => Some(Claim::raw(wire.subject, raw)),
                None => {
                    has_null = true;
                    None
                }
            })
            .collect();
        let data = ClaimRepositoryData {
            identity,
            expiration: self.expiration,
            claims,
            decryption_keys: Arc::new(DecryptionKeys::default()),
        };
        (data, has_null)
    }
}
