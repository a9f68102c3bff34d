//! Claim model
//!
//! A claim is a subject plus a value that is either the raw string carried
//! on the wire or a typed value still waiting to be serialized. Pending
//! values are normalized to raw form right before a token is framed.
//!
//! Raw form: strings are carried verbatim, every other JSON value as its
//! compact JSON text. `("role", "admin")` therefore travels as `admin`, and
//! `("age", 42)` as `42`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Subject of the identity claim
pub const IDENTITY_SUBJECT: &str = "identity";

/// Claim value: wire string, or typed value awaiting serialization
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    /// Serialized form as carried in the token
    Raw(String),
    /// Typed value; its raw form is produced on normalization
    Pending(Value),
}

impl ClaimValue {
    /// Convert a typed value into a pending claim value
    pub fn from_typed<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Pending)
    }

    /// Whether the raw form has to be regenerated before transmission
    pub fn requires_serialization(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Raw form, computed on the fly for pending values
    pub fn to_raw(&self) -> Cow<'_, str> {
        match self {
            Self::Raw(raw) => Cow::Borrowed(raw),
            Self::Pending(Value::String(s)) => Cow::Borrowed(s),
            Self::Pending(value) => Cow::Owned(value.to_string()),
        }
    }

    /// Replace a pending value by its raw form
    pub fn normalize(&mut self) {
        if let Self::Pending(value) = self {
            let raw = match value.take() {
                Value::String(s) => s,
                other => other.to_string(),
            };
            *self = Self::Raw(raw);
        }
    }

    /// Read the value as `T`.
    ///
    /// Raw values are read as a plain string first, mirroring how strings
    /// are normalized; if `T` is not string-like they are parsed as JSON.
    /// A raw `null` therefore reads as `Some("null")` for `Option<String>`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Self::Pending(value) => T::deserialize(value),
            Self::Raw(raw) => match T::deserialize(Value::String(raw.clone())) {
                Ok(value) => Ok(value),
                Err(_) => serde_json::from_str::<T>(raw),
            },
        }
    }
}

/// A named fact about a principal
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    subject: String,
    value: ClaimValue,
}

impl Claim {
    /// Claim with a raw wire value
    pub fn raw(subject: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            value: ClaimValue::Raw(raw.into()),
        }
    }

    /// Claim with a typed value
    pub fn typed<T: Serialize + ?Sized>(
        subject: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            subject: subject.into(),
            value: ClaimValue::from_typed(value)?,
        })
    }

    /// Claim name, unique within a bundle
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Current value, raw or pending
    pub fn value(&self) -> &ClaimValue {
        &self.value
    }

    /// Replace the value
    pub fn set_value(&mut self, value: ClaimValue) {
        self.value = value;
    }

    /// Raw wire value, if already materialized
    pub fn raw_value(&self) -> Option<&str> {
        match &self.value {
            ClaimValue::Raw(raw) => Some(raw),
            ClaimValue::Pending(_) => None,
        }
    }

    pub fn requires_serialization(&self) -> bool {
        self.value.requires_serialization()
    }

    pub fn normalize(&mut self) {
        self.value.normalize();
    }

    /// Read the value as `T`
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        self.value.decode()
    }
}

/// The claim naming the principal a session belongs to.
///
/// Its raw value is the key under which the session secret is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityClaim(Claim);

impl IdentityClaim {
    /// Identity from its raw wire value (e.g. a serialized primary key)
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Claim::raw(IDENTITY_SUBJECT, raw))
    }

    /// Identity from a typed value
    pub fn typed<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Claim::typed(IDENTITY_SUBJECT, value).map(Self)
    }

    /// Raw value, if already materialized
    pub fn raw_value(&self) -> Option<&str> {
        self.0.raw_value()
    }

    /// Raw value, computed for pending identities
    pub fn to_raw(&self) -> Cow<'_, str> {
        self.0.value().to_raw()
    }

    pub fn normalize(&mut self) {
        self.0.normalize();
    }

    /// Read the identity as `T`
    pub fn get<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        self.0.get()
    }

    /// The identity as an ordinary claim
    pub fn as_claim(&self) -> &Claim {
        &self.0
    }
}

/// `{Subject, RawValue}` as serialized into the payload
#[derive(Debug, Serialize)]
pub(crate) struct ClaimWireRef<'a> {
    #[serde(rename = "Subject")]
    pub subject: &'a str,
    #[serde(rename = "RawValue")]
    pub raw_value: &'a str,
}

impl<'a> ClaimWireRef<'a> {
    /// Borrow a normalized claim for serialization.
    ///
    /// # Panics
    /// Panics if the claim has not been normalized.
    pub fn from_claim(claim: &'a Claim) -> Self {
        let raw_value = claim
            .raw_value()
            .expect("claims must be normalized before serialization");
        Self {
            subject: claim.subject(),
            raw_value,
        }
    }
}

/// `{Subject, RawValue}` as parsed from an untrusted payload
#[derive(Debug, Deserialize)]
pub(crate) struct ClaimWire {
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "RawValue", default)]
    pub raw_value: Option<String>,
}
