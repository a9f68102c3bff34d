//! Token framing
//!
//! `base64url(header) "." base64url(payload) "." base64url(signature)`.
//! The signature covers the ASCII bytes of the first two segments
//! including the separating dot.

use serde::{Deserialize, Serialize};

use crate::b64url;

/// Value of the `typ` header field
pub const TOKEN_TYPE: &str = "JWT";

/// Longest accepted encoded header segment
pub const MAX_HEADER_SEGMENT_LEN: usize = 256;

/// Token header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

impl TokenHeader {
    /// Header for tokens signed with `alg`
    pub fn new(alg: impl Into<String>) -> Self {
        Self {
            alg: alg.into(),
            typ: Some(TOKEN_TYPE.to_string()),
        }
    }
}

/// Borrowed segments of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenParts<'a> {
    pub header: &'a str,
    pub payload: &'a str,
    pub signature: &'a str,
    /// `header "." payload`, the signed bytes
    pub signed: &'a str,
}

/// Split a token at its two separators.
///
/// Returns `None` when either separator is missing. Any further dots end up
/// in the signature segment and fail its decoding.
pub fn split(token: &str) -> Option<TokenParts<'_>> {
    let first = token.find('.')?;
    let second = first + 1 + token[first + 1..].find('.')?;
    Some(TokenParts {
        header: &token[..first],
        payload: &token[first + 1..second],
        signature: &token[second + 1..],
        signed: &token[..second],
    })
}

/// Frame encoded header and payload JSON as `b64(header) "." b64(payload)`.
///
/// The returned string is sized to also hold a signature of up to
/// `signature_len` bytes, appended with [`append_signature`].
pub fn frame(header_json: &[u8], payload_json: &[u8], signature_len: usize) -> String {
    let capacity = b64url::max_encoded_len(header_json.len())
        + b64url::max_encoded_len(payload_json.len())
        + b64url::max_encoded_len(signature_len)
        + 2;
    let mut token = String::with_capacity(capacity);
    b64url::encode_to_string(header_json, &mut token);
    token.push('.');
    b64url::encode_to_string(payload_json, &mut token);
    token
}

/// Append `"." b64(signature)` to a framed token
pub fn append_signature(signed: &mut String, signature: &[u8]) {
    signed.push('.');
    b64url::encode_to_string(signature, signed);
}
