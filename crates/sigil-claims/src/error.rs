//! Claim errors

use thiserror::Error;

use crate::cookie::CookieError;

/// Errors returned to callers working with claims.
///
/// Verification of untrusted tokens never produces these; its outcome is
/// reported through [`crate::VerifyOutcome`] instead.
#[derive(Error, Debug)]
pub enum ClaimsError {
    /// No claim with the requested subject
    #[error("claim not found: {0}")]
    ClaimNotFound(String),

    /// A claim's raw value could not be read as the requested type
    #[error("claim {subject} could not be decoded")]
    ClaimDecode {
        subject: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be converted into a claim
    #[error("claim {subject} could not be encoded")]
    ClaimEncode {
        subject: String,
        #[source]
        source: serde_json::Error,
    },

    /// The subject is reserved for the identity claim
    #[error("subject is reserved for the identity claim: {0}")]
    ReservedSubject(String),

    /// Save requested on a repository that has no identity
    #[error("repository has no identity claim")]
    MissingIdentity,

    /// Save requested for an identity loaded from an unverified token
    #[error("session for {0} must be re-established with sign_in")]
    Unauthenticated(String),

    /// The outbound cookie could not be queued
    #[error("claims cookie rejected: {0}")]
    Cookie(#[from] CookieError),

    /// Header or payload could not be encoded as JSON
    #[error("token encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ClaimsError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ClaimNotFound(_) => 404,
            Self::ClaimDecode { .. } | Self::ClaimEncode { .. } | Self::ReservedSubject(_) => 400,
            Self::MissingIdentity | Self::Unauthenticated(_) => 401,
            Self::Cookie(_) | Self::Encoding(_) => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ClaimNotFound(_) => "CLAIM_NOT_FOUND",
            Self::ClaimDecode { .. } => "CLAIM_DECODE_FAILED",
            Self::ClaimEncode { .. } => "CLAIM_ENCODE_FAILED",
            Self::ReservedSubject(_) => "RESERVED_SUBJECT",
            Self::MissingIdentity => "MISSING_IDENTITY",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Cookie(_) => "COOKIE_REJECTED",
            Self::Encoding(_) => "ENCODING_ERROR",
        }
    }
}
