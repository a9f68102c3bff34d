//! Sigil Claims - signed, revocable claim bundles carried in a cookie
//!
//! A hybrid between stateless signed tokens and server-side sessions:
//! claims travel in a `header.payload.signature` token, while a per-identity
//! session key held by the server makes every token revocable.
//!
//! - [`b64url`] / [`token`]: wire encoding and framing
//! - [`store`]: the session key store and its housekeeping gate
//! - [`crypto`]: keyed-hash signing and constant-time comparison
//! - [`claim`] / [`data`]: the claim model and the signed payload
//! - [`manager`]: sign and verify, classifying every inbound token
//! - [`repository`]: the per-request view persisted through a [`CookieJar`]

pub mod b64url;
pub mod claim;
pub mod clock;
pub mod config;
pub mod cookie;
pub mod crypto;
pub mod data;
pub mod error;
pub mod manager;
pub mod repository;
pub mod store;
pub mod token;

pub use claim::{Claim, ClaimValue, IdentityClaim, IDENTITY_SUBJECT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClaimsConfig, ConfigError, DEFAULT_COOKIE_NAME};
pub use cookie::{CookieError, CookieJar, HeaderCookieJar, MemoryCookieJar, OutboundCookie};
pub use crypto::{constant_time_eq, ClaimSigner, SigningAlgorithm, SigningKey, SigningKeyError};
pub use data::{ClaimRepositoryData, ClaimRepositoryStatus, VerifyOutcome};
pub use error::ClaimsError;
pub use manager::ClaimManager;
pub use repository::ClaimRepository;
pub use store::{DecryptionKeys, SessionKey, SessionKeyStore};

/// Tracing target for events that may indicate token tampering.
///
/// Route this target to an audit sink to separate forged-signature events
/// from ordinary malformed-cookie noise.
pub const SECURITY_AUDIT_TARGET: &str = "sigil_claims::security_audit";
