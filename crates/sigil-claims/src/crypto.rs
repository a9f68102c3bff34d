//! Cryptographic primitives for claim tokens
//!
//! Tokens are authenticated with HMAC keyed by the concatenation of a static
//! server secret and the per-identity session secret. Dropping the session
//! secret from the store is what revokes every token issued for an identity.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use std::str::FromStr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::store::SessionKey;

/// Longest signature produced by any supported algorithm
pub const MAX_SIGNATURE_LEN: usize = 64;

/// Keyed-hash algorithm used to sign tokens.
///
/// The accepted algorithm is fixed by configuration; the `alg` header of an
/// inbound token is only compared against it, never used to select one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SigningAlgorithm {
    /// HMAC-SHA256
    #[default]
    Hs256,
    /// HMAC-SHA384
    Hs384,
    /// HMAC-SHA512
    Hs512,
}

impl SigningAlgorithm {
    /// Name carried in the token header
    pub fn name(self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
        }
    }

    /// Fixed signature length in bytes
    pub fn signature_len(self) -> usize {
        match self {
            Self::Hs256 => 32,
            Self::Hs384 => 48,
            Self::Hs512 => 64,
        }
    }

    /// Look up an algorithm by its header name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "HS256" => Some(Self::Hs256),
            "HS384" => Some(Self::Hs384),
            "HS512" => Some(Self::Hs512),
            _ => None,
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(&s.to_ascii_uppercase()).ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Algorithm name not recognized
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown signing algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

/// Static server secret shared by every session.
#[derive(Clone)]
pub struct SigningKey {
    key_bytes: Arc<Zeroizing<Vec<u8>>>,
}

impl SigningKey {
    /// Minimum allowed key length in bytes (256 bits)
    pub const MIN_KEY_LENGTH: usize = 32;

    /// Create a new server secret from bytes.
    ///
    /// # Errors
    /// Returns error if key is too short (less than 32 bytes).
    pub fn new(key: impl AsRef<[u8]>) -> Result<Self, SigningKeyError> {
        let key_bytes = key.as_ref();
        if key_bytes.len() < Self::MIN_KEY_LENGTH {
            return Err(SigningKeyError::KeyTooShort {
                actual: key_bytes.len(),
                minimum: Self::MIN_KEY_LENGTH,
            });
        }
        Ok(Self {
            key_bytes: Arc::new(Zeroizing::new(key_bytes.to_vec())),
        })
    }

    fn as_bytes(&self) -> &[u8] {
        &self.key_bytes
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_length", &self.key_bytes.len())
            .finish_non_exhaustive()
    }
}

/// Errors that can occur when creating a server secret
#[derive(Debug, Clone, thiserror::Error)]
pub enum SigningKeyError {
    #[error("signing key too short: got {actual} bytes, need at least {minimum}")]
    KeyTooShort { actual: usize, minimum: usize },
}

/// Signs and verifies framed tokens.
///
/// Output is fully deterministic: the same message, session key and server
/// secret always produce the same signature bytes.
#[derive(Debug, Clone)]
pub struct ClaimSigner {
    algorithm: SigningAlgorithm,
    server_secret: SigningKey,
}

impl ClaimSigner {
    /// Create a signer for one algorithm and server secret
    pub fn new(algorithm: SigningAlgorithm, server_secret: SigningKey) -> Self {
        Self {
            algorithm,
            server_secret,
        }
    }

    /// Configured algorithm
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Name carried in the token header
    pub fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    /// Signature length in bytes, for sizing buffers up front
    pub fn signature_len(&self) -> usize {
        self.algorithm.signature_len()
    }

    /// Sign a complete message into `out`, returning the bytes written.
    ///
    /// # Panics
    /// Panics if `out` is shorter than [`Self::signature_len`].
    pub fn sign(&self, session_key: &SessionKey, message: &[u8], out: &mut [u8]) -> usize {
        self.sign_parts(session_key, [message], out)
    }

    /// Sign a message supplied as consecutive chunks.
    ///
    /// The result equals [`Self::sign`] over the concatenated chunks, so a
    /// header and payload can be signed without assembling them first.
    ///
    /// # Panics
    /// Panics if `out` is shorter than [`Self::signature_len`].
    pub fn sign_parts<'a>(
        &self,
        session_key: &SessionKey,
        parts: impl IntoIterator<Item = &'a [u8]>,
        out: &mut [u8],
    ) -> usize {
        let secret = self.key_material(session_key);
        match self.algorithm {
            SigningAlgorithm::Hs256 => mac_into::<Hmac<Sha256>>(&secret, parts, out),
            SigningAlgorithm::Hs384 => mac_into::<Hmac<Sha384>>(&secret, parts, out),
            SigningAlgorithm::Hs512 => mac_into::<Hmac<Sha512>>(&secret, parts, out),
        }
    }

    /// Recompute the signature of `message` and compare in constant time
    pub fn verify(&self, session_key: &SessionKey, message: &[u8], signature: &[u8]) -> bool {
        let mut expected = [0u8; MAX_SIGNATURE_LEN];
        let written = self.sign(session_key, message, &mut expected);
        constant_time_eq(&expected[..written], signature)
    }

    /// Server secret followed by the session secret, wiped on drop
    fn key_material(&self, session_key: &SessionKey) -> Zeroizing<Vec<u8>> {
        let server = self.server_secret.as_bytes();
        let session = session_key.secret();
        let mut material = Zeroizing::new(Vec::with_capacity(server.len() + session.len()));
        material.extend_from_slice(server);
        material.extend_from_slice(session);
        material
    }
}

fn mac_into<'a, M>(key: &[u8], parts: impl IntoIterator<Item = &'a [u8]>, out: &mut [u8]) -> usize
where
    M: Mac + KeyInit,
{
    let mut mac = <M as KeyInit>::new_from_slice(key).expect("HMAC accepts keys of any length");
    for part in parts {
        mac.update(part);
    }
    let tag = mac.finalize().into_bytes();
    out[..tag.len()].copy_from_slice(&tag);
    tag.len()
}

/// Constant-time byte slice comparison.
///
/// Every byte is compared even after a difference is found. Length is not
/// secret, so slices of different lengths return `false` immediately.
#[inline]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
