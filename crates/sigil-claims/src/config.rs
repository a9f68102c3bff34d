//! Configuration for claim signing and the session cookie

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::cookie::is_valid_cookie_name;
use crate::crypto::{SigningAlgorithm, SigningKey, SigningKeyError};

/// Default cookie name
pub const DEFAULT_COOKIE_NAME: &str = "sigil_claims";

/// Claims configuration
#[derive(Debug, Clone)]
pub struct ClaimsConfig {
    /// Token lifetime; also the session key TTL
    pub expiration: Duration,
    /// Emit the cookie with the `Secure` attribute
    pub secure_only: bool,
    /// Keyed-hash algorithm
    pub algorithm: SigningAlgorithm,
    /// Static server secret
    pub secret: SigningKey,
    /// Cookie name
    pub cookie_name: String,
    /// Cookie path
    pub cookie_path: String,
}

impl ClaimsConfig {
    /// Create a config with defaults: 12 hour expiration, secure cookies,
    /// HS256.
    ///
    /// # Errors
    /// Returns error if the secret is shorter than 32 bytes.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SigningKeyError> {
        Ok(Self {
            expiration: Duration::from_secs(12 * 60 * 60), // 12 hours
            secure_only: true,
            algorithm: SigningAlgorithm::default(),
            secret: SigningKey::new(secret)?,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_path: "/".to_string(),
        })
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secret = lookup("CLAIMS_SECRET").ok_or(ConfigError::Missing("CLAIMS_SECRET"))?;
        let mut config = Self::new(secret.as_bytes())?;

        if let Some(minutes) = lookup("CLAIMS_EXPIRATION_MINUTES") {
            let minutes: u64 = minutes
                .parse()
                .map_err(|_| ConfigError::Invalid("CLAIMS_EXPIRATION_MINUTES"))?;
            if minutes == 0 {
                return Err(ConfigError::Invalid("CLAIMS_EXPIRATION_MINUTES"));
            }
            let seconds = minutes
                .checked_mul(60)
                .ok_or(ConfigError::Invalid("CLAIMS_EXPIRATION_MINUTES"))?;
            config.expiration = Duration::from_secs(seconds);
        }

        if let Some(secure) = lookup("CLAIMS_SECURE_ONLY") {
            config.secure_only = secure
                .parse()
                .map_err(|_| ConfigError::Invalid("CLAIMS_SECURE_ONLY"))?;
        }

        if let Some(algorithm) = lookup("CLAIMS_ALGORITHM") {
            config.algorithm = algorithm
                .parse()
                .map_err(|_| ConfigError::Invalid("CLAIMS_ALGORITHM"))?;
        }

        if let Some(name) = lookup("CLAIMS_COOKIE_NAME") {
            if !is_valid_cookie_name(&name) {
                return Err(ConfigError::Invalid("CLAIMS_COOKIE_NAME"));
            }
            config.cookie_name = name;
        }

        Ok(config)
    }

    /// Set token lifetime
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Set whether cookies carry `Secure`
    pub fn with_secure_only(mut self, secure_only: bool) -> Self {
        self.secure_only = secure_only;
        self
    }

    /// Set the signing algorithm
    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the cookie name.
    ///
    /// Not checked here; saving under a name that is not an RFC 6265 token
    /// fails with [`crate::ClaimsError::Cookie`].
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the cookie path
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Expiration for a token issued at `now`, saturating at the latest
    /// representable time
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.expiration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Signing key error: {0}")]
    SigningKey(#[from] SigningKeyError),
}
