//! Request-pipeline collaborator
//!
//! The claim repository only needs to read the inbound cookie and to append
//! or delete an outbound one. [`CookieJar`] is that seam; [`HeaderCookieJar`]
//! implements it over `http` header maps and [`MemoryCookieJar`] in memory.

use chrono::{DateTime, Utc};
use http::header::{InvalidHeaderValue, COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use std::collections::HashMap;
use thiserror::Error;

/// Errors queuing an outbound cookie
#[derive(Error, Debug)]
pub enum CookieError {
    /// Name is empty or not an RFC 6265 token
    #[error("invalid cookie name: {0:?}")]
    InvalidName(String),

    /// Value or path would break out of its attribute
    #[error("cookie {name} has an invalid {attribute}")]
    InvalidAttribute {
        name: String,
        attribute: &'static str,
    },

    /// Rendered `Set-Cookie` is not a valid header value
    #[error("cookie {name} cannot be encoded as a header value")]
    InvalidHeader {
        name: String,
        #[source]
        source: InvalidHeaderValue,
    },
}

/// RFC 6265 token characters
fn is_cookie_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Visible ASCII except `;`
fn is_cookie_attribute_byte(b: u8) -> bool {
    b.is_ascii_graphic() && b != b';'
}

/// Whether `name` can be used as a cookie name
pub(crate) fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_cookie_name_byte)
}

/// Check a cookie name and path before anything is queued under them
pub fn validate_target(name: &str, path: &str) -> Result<(), CookieError> {
    if !is_valid_cookie_name(name) {
        return Err(CookieError::InvalidName(name.to_string()));
    }
    if !path.bytes().all(is_cookie_attribute_byte) {
        return Err(CookieError::InvalidAttribute {
            name: name.to_string(),
            attribute: "path",
        });
    }
    Ok(())
}

/// Cookie access scoped to one request
pub trait CookieJar {
    /// Value of the inbound cookie `name`
    fn get(&self, name: &str) -> Option<String>;

    /// Queue an outbound cookie.
    ///
    /// # Errors
    /// Returns error if the cookie cannot be rendered as `Set-Cookie`; nothing
    /// is queued in that case.
    fn append(&mut self, cookie: OutboundCookie) -> Result<(), CookieError>;

    /// Queue deletion of cookie `name`
    fn delete(&mut self, name: &str, path: &str);
}

impl<T: CookieJar + ?Sized> CookieJar for &mut T {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }

    fn append(&mut self, cookie: OutboundCookie) -> Result<(), CookieError> {
        (**self).append(cookie)
    }

    fn delete(&mut self, name: &str, path: &str) {
        (**self).delete(name, path);
    }
}

/// A `Set-Cookie` entry.
///
/// Always `HttpOnly` and `SameSite=Strict`; `Secure` is configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub expires: DateTime<Utc>,
    pub secure: bool,
}

impl OutboundCookie {
    /// Cookie that makes the browser discard `name`
    pub fn removal(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            path: path.into(),
            expires: DateTime::<Utc>::UNIX_EPOCH,
            secure: false,
        }
    }

    /// Whether this entry deletes the cookie
    pub fn is_removal(&self) -> bool {
        self.value.is_empty() && self.expires == DateTime::<Utc>::UNIX_EPOCH
    }

    /// Check that the cookie renders as a single well-formed `Set-Cookie`
    pub fn validate(&self) -> Result<(), CookieError> {
        validate_target(&self.name, &self.path)?;
        if !self.value.bytes().all(is_cookie_attribute_byte) {
            return Err(CookieError::InvalidAttribute {
                name: self.name.clone(),
                attribute: "value",
            });
        }
        Ok(())
    }

    /// Render as a `Set-Cookie` header value
    pub fn to_header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Path={}; Expires={}; HttpOnly; SameSite=Strict",
            self.name,
            self.value,
            self.path,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT"),
        );
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

impl std::fmt::Display for OutboundCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

/// Parse a `Cookie` header value into name/value pairs
fn parse_cookie_header(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        Some((name.trim(), value.trim()))
    })
}

/// [`CookieJar`] over `http` request and response headers
#[derive(Debug, Default)]
pub struct HeaderCookieJar {
    inbound: HashMap<String, String>,
    response_headers: HeaderMap,
}

impl HeaderCookieJar {
    /// Collect cookies from every `Cookie` header of a request.
    ///
    /// Headers that are not valid visible ASCII are skipped. The first
    /// occurrence of a name wins.
    pub fn from_request_headers(headers: &HeaderMap) -> Self {
        let mut inbound = HashMap::new();
        for value in headers.get_all(COOKIE) {
            let Ok(value) = value.to_str() else {
                tracing::debug!("Skipping non-ASCII Cookie header");
                continue;
            };
            for (name, value) in parse_cookie_header(value) {
                inbound
                    .entry(name.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        Self {
            inbound,
            response_headers: HeaderMap::new(),
        }
    }

    /// `Set-Cookie` headers queued so far
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Hand the queued `Set-Cookie` headers to the response
    pub fn into_response_headers(self) -> HeaderMap {
        self.response_headers
    }
}

impl CookieJar for HeaderCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.inbound.get(name).cloned()
    }

    fn append(&mut self, cookie: OutboundCookie) -> Result<(), CookieError> {
        cookie.validate()?;
        let value = HeaderValue::from_str(&cookie.to_header_value()).map_err(|source| {
            CookieError::InvalidHeader {
                name: cookie.name.clone(),
                source,
            }
        })?;
        self.response_headers.append(SET_COOKIE, value);
        Ok(())
    }

    fn delete(&mut self, name: &str, path: &str) {
        self.inbound.remove(name);
        if let Err(e) = self.append(OutboundCookie::removal(name, path)) {
            tracing::warn!(cookie = %name, error = %e, "Cannot queue cookie removal");
        }
    }
}

/// In-memory [`CookieJar`]
#[derive(Debug, Default, Clone)]
pub struct MemoryCookieJar {
    inbound: HashMap<String, String>,
    outbound: Vec<OutboundCookie>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jar presenting one inbound cookie
    pub fn with_cookie(name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut jar = Self::default();
        jar.inbound.insert(name.into(), value.into());
        jar
    }

    /// Outbound cookies in the order they were queued
    pub fn outbound(&self) -> &[OutboundCookie] {
        &self.outbound
    }

    /// Most recent outbound cookie named `name`
    pub fn last_outbound(&self, name: &str) -> Option<&OutboundCookie> {
        self.outbound.iter().rev().find(|c| c.name == name)
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.inbound.get(name).cloned()
    }

    fn append(&mut self, cookie: OutboundCookie) -> Result<(), CookieError> {
        cookie.validate()?;
        self.outbound.push(cookie);
        Ok(())
    }

    fn delete(&mut self, name: &str, path: &str) {
        self.inbound.remove(name);
        self.outbound.push(OutboundCookie::removal(name, path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(secure: bool) -> OutboundCookie {
        OutboundCookie {
            name: "sigil_claims".into(),
            value: "aaa.bbb.ccc".into(),
            path: "/".into(),
            expires: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            secure,
        }
    }

    #[test]
    fn test_set_cookie_attributes() {
        assert_eq!(
            cookie(true).to_header_value(),
            "sigil_claims=aaa.bbb.ccc; Path=/; Expires=Tue, 14 Nov 2023 22:13:20 GMT; HttpOnly; SameSite=Strict; Secure"
        );
        assert!(!cookie(false).to_header_value().contains("Secure"));
    }

    #[test]
    fn test_removal_cookie() {
        let removal = OutboundCookie::removal("sigil_claims", "/");
        assert!(removal.is_removal());
        assert!(removal
            .to_header_value()
            .starts_with("sigil_claims=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[test]
    fn test_header_jar_reads_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; sigil_claims=a.b.c"));
        headers.append(COOKIE, HeaderValue::from_static("sigil_claims=later; other=1"));
        let jar = HeaderCookieJar::from_request_headers(&headers);
        assert_eq!(jar.get("sigil_claims").as_deref(), Some("a.b.c"));
        assert_eq!(jar.get("other").as_deref(), Some("1"));
        assert_eq!(jar.get("missing"), None);
    }

    #[test]
    fn test_header_jar_writes_set_cookie() {
        let mut jar = HeaderCookieJar::default();
        jar.append(cookie(true)).unwrap();
        jar.delete("sigil_claims", "/");
        let headers = jar.into_response_headers();
        let values: Vec<_> = headers.get_all(SET_COOKIE).iter().collect();
        assert_eq!(values.len(), 2);
        assert!(values[1].to_str().unwrap().starts_with("sigil_claims=;"));
    }

    #[test]
    fn test_memory_jar() {
        let mut jar = MemoryCookieJar::with_cookie("sigil_claims", "token");
        assert_eq!(jar.get("sigil_claims").as_deref(), Some("token"));
        jar.append(cookie(false)).unwrap();
        jar.delete("sigil_claims", "/");
        assert_eq!(jar.get("sigil_claims"), None);
        assert_eq!(jar.outbound().len(), 2);
        assert!(jar.last_outbound("sigil_claims").unwrap().is_removal());
    }

    #[test]
    fn test_cookie_names_must_be_tokens() {
        for name in ["", "bad;name", "bad name", "bad\nname", "caf\u{e9}"] {
            let mut bad = cookie(true);
            bad.name = name.into();
            assert!(
                matches!(bad.validate(), Err(CookieError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(cookie(true).validate().is_ok());
    }

    #[test]
    fn test_attributes_cannot_smuggle_directives() {
        let mut bad_path = cookie(true);
        bad_path.path = "/; Domain=evil.example".into();
        assert!(matches!(
            bad_path.validate(),
            Err(CookieError::InvalidAttribute { attribute: "path", .. })
        ));

        let mut bad_value = cookie(true);
        bad_value.value = "a.b.c; Max-Age=99999999".into();
        assert!(matches!(
            bad_value.validate(),
            Err(CookieError::InvalidAttribute { attribute: "value", .. })
        ));
    }

    #[test]
    fn test_jars_queue_nothing_on_invalid_cookie() {
        let mut bad = cookie(true);
        bad.name = "bad;name".into();

        let mut headers = HeaderCookieJar::default();
        assert!(headers.append(bad.clone()).is_err());
        assert!(headers.response_headers().is_empty());

        let mut memory = MemoryCookieJar::new();
        assert!(memory.append(bad).is_err());
        assert!(memory.outbound().is_empty());
    }
}
