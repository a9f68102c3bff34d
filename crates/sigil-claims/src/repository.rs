//! Claim repository
//!
//! Per-request view over a claim bundle. The inbound cookie is verified once
//! on construction; mutations only touch memory until [`ClaimRepository::save`]
//! re-signs the bundle and queues the outbound cookie.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::claim::{Claim, IdentityClaim, IDENTITY_SUBJECT};
use crate::cookie::{self, CookieJar, OutboundCookie};
use crate::data::{ClaimRepositoryData, ClaimRepositoryStatus};
use crate::error::ClaimsError;
use crate::manager::ClaimManager;
use crate::store::DecryptionKeys;

/// Claims of the current request, persisted through a [`CookieJar`].
///
/// The identity claim is reachable under [`IDENTITY_SUBJECT`] like any
/// other claim but can only be replaced through [`Self::sign_in`].
#[derive(Debug)]
pub struct ClaimRepository<J: CookieJar> {
    manager: Arc<ClaimManager>,
    jar: J,
    status: ClaimRepositoryStatus,
    identity: Option<IdentityClaim>,
    expiration: Option<DateTime<Utc>>,
    claims: BTreeMap<String, Claim>,
    decryption_keys: Arc<DecryptionKeys>,
    dirty: bool,
    /// Set by `sign_in`; allows saving an identity whose token did not verify
    signed_in: bool,
    /// Replace the session key on the next save
    rotate_session: bool,
}

impl<J: CookieJar> ClaimRepository<J> {
    /// Load the repository from the inbound cookie.
    ///
    /// `Valid` and `Expired` tokens are adopted; an `Invalid` cookie is
    /// deleted and the repository starts empty.
    pub fn new(manager: Arc<ClaimManager>, jar: J) -> Self {
        let config = manager.config();
        let mut repo = Self {
            manager: Arc::clone(&manager),
            jar,
            status: ClaimRepositoryStatus::Uninitialized,
            identity: None,
            expiration: None,
            claims: BTreeMap::new(),
            decryption_keys: Arc::new(DecryptionKeys::default()),
            dirty: false,
            signed_in: false,
            rotate_session: false,
        };

        let Some(token) = repo.jar.get(&config.cookie_name) else {
            return repo;
        };

        let outcome = manager.deserialize(&token);
        repo.status = outcome.status;
        match outcome.data {
            Some(data) => repo.adopt(data),
            None => {
                tracing::debug!(cookie = %config.cookie_name, "Dropping invalid claims cookie");
                repo.jar.delete(&config.cookie_name, &config.cookie_path);
            }
        }
        repo
    }

    fn adopt(&mut self, data: ClaimRepositoryData) {
        self.identity = Some(data.identity);
        self.expiration = Some(data.expiration);
        self.decryption_keys = data.decryption_keys;
        for claim in data.claims {
            if claim.subject() == IDENTITY_SUBJECT {
                continue;
            }
            self.claims.insert(claim.subject().to_string(), claim);
        }
    }

    /// Outcome of verifying the inbound cookie, or `Valid` after a save
    pub fn status(&self) -> ClaimRepositoryStatus {
        self.status
    }

    /// Whether the claims come from a verified, unexpired token
    pub fn is_authenticated(&self) -> bool {
        self.status == ClaimRepositoryStatus::Valid
    }

    /// Identity claim, also populated for `Expired` tokens
    pub fn identity(&self) -> Option<&IdentityClaim> {
        self.identity.as_ref()
    }

    /// Expiration of the loaded or last saved token
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    /// Whether there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn lookup(&self, subject: &str) -> Option<&Claim> {
        if subject == IDENTITY_SUBJECT {
            self.identity.as_ref().map(IdentityClaim::as_claim)
        } else {
            self.claims.get(subject)
        }
    }

    /// Whether a claim with `subject` is present, identity included
    pub fn contains(&self, subject: &str) -> bool {
        self.lookup(subject).is_some()
    }

    /// Read a claim as `T`
    pub fn get<T: DeserializeOwned>(&self, subject: &str) -> Result<T, ClaimsError> {
        let claim = self
            .lookup(subject)
            .ok_or_else(|| ClaimsError::ClaimNotFound(subject.to_string()))?;
        claim.get().map_err(|source| ClaimsError::ClaimDecode {
            subject: subject.to_string(),
            source,
        })
    }

    /// Read a claim as `T`, or `None` if it is absent or of another type
    pub fn try_get<T: DeserializeOwned>(&self, subject: &str) -> Option<T> {
        self.lookup(subject)?.get().ok()
    }

    /// Raw wire form of a claim
    pub fn get_raw(&self, subject: &str) -> Option<Cow<'_, str>> {
        self.lookup(subject).map(|claim| claim.value().to_raw())
    }

    /// Subjects present, identity first
    pub fn subjects(&self) -> impl Iterator<Item = &str> + '_ {
        self.identity
            .iter()
            .map(|_| IDENTITY_SUBJECT)
            .chain(self.claims.keys().map(String::as_str))
    }

    /// Insert or replace a claim
    pub fn add_or_update<T: Serialize + ?Sized>(
        &mut self,
        subject: impl Into<String>,
        value: &T,
    ) -> Result<(), ClaimsError> {
        let subject = subject.into();
        if subject == IDENTITY_SUBJECT {
            return Err(ClaimsError::ReservedSubject(subject));
        }
        let claim =
            Claim::typed(subject.as_str(), value).map_err(|source| ClaimsError::ClaimEncode {
                subject: subject.clone(),
                source,
            })?;
        self.claims.insert(subject, claim);
        self.dirty = true;
        Ok(())
    }

    /// Remove a claim, returning whether it was present
    pub fn remove(&mut self, subject: &str) -> Result<bool, ClaimsError> {
        if subject == IDENTITY_SUBJECT {
            return Err(ClaimsError::ReservedSubject(subject.to_string()));
        }
        let removed = self.claims.remove(subject).is_some();
        self.dirty |= removed;
        Ok(removed)
    }

    /// Start a session for `identity`, discarding every other claim
    pub fn sign_in(&mut self, identity: IdentityClaim) {
        self.identity = Some(identity);
        self.claims.clear();
        self.decryption_keys = Arc::new(DecryptionKeys::default());
        self.signed_in = true;
        self.dirty = true;
    }

    /// Start a session whose key carries `keys`.
    ///
    /// Any live session key of the identity is replaced on save, so tokens
    /// issued before this sign-in stop verifying.
    pub fn sign_in_with_keys(&mut self, identity: IdentityClaim, keys: DecryptionKeys) {
        self.sign_in(identity);
        self.set_decryption_keys(keys);
    }

    /// Server-side key material of the session
    pub fn decryption_keys(&self) -> &DecryptionKeys {
        &self.decryption_keys
    }

    /// Replace the session's key material.
    ///
    /// Keys are bound to the session key when it is created, so the next
    /// save rotates the session key.
    pub fn set_decryption_keys(&mut self, keys: DecryptionKeys) {
        self.decryption_keys = Arc::new(keys);
        self.rotate_session = true;
        self.dirty = true;
    }

    /// Re-sign and queue the cookie if anything changed.
    ///
    /// Renews the session key and slides the expiration to a full lifetime
    /// from now. Returns whether a cookie was written.
    ///
    /// # Errors
    /// `MissingIdentity` if no identity is set, `Unauthenticated` if the
    /// identity comes from a token that did not verify and no `sign_in`
    /// happened since, `Cookie` if the configured cookie name or path cannot
    /// be sent. On error the repository stays dirty.
    pub fn save(&mut self) -> Result<bool, ClaimsError> {
        if !self.dirty {
            return Ok(false);
        }
        let identity = self.identity.as_mut().ok_or(ClaimsError::MissingIdentity)?;
        identity.normalize();
        let identity_raw = identity.to_raw().into_owned();
        if self.status != ClaimRepositoryStatus::Valid && !self.signed_in {
            return Err(ClaimsError::Unauthenticated(identity_raw));
        }
        let config = self.manager.config();
        cookie::validate_target(&config.cookie_name, &config.cookie_path)?;

        if self.rotate_session {
            self.manager.revoke(&identity_raw);
        } else {
            self.manager.renew(&identity_raw);
        }

        for claim in self.claims.values_mut() {
            claim.normalize();
        }
        let expiration = config.expires_at(self.manager.now());
        let mut data = ClaimRepositoryData {
            identity: identity.clone(),
            expiration,
            claims: self.claims.values().cloned().collect(),
            decryption_keys: Arc::clone(&self.decryption_keys),
        };
        let token = self.manager.serialize(&mut data)?;

        self.jar.append(OutboundCookie {
            name: config.cookie_name.clone(),
            value: token,
            path: config.cookie_path.clone(),
            expires: expiration,
            secure: config.secure_only,
        })?;

        self.expiration = Some(expiration);
        self.status = ClaimRepositoryStatus::Valid;
        self.dirty = false;
        self.signed_in = false;
        self.rotate_session = false;
        tracing::debug!(identity = %identity_raw, claims = self.claims.len(), "Saved claims cookie");
        Ok(true)
    }

    /// End the session: revoke the key, delete the cookie, clear all claims.
    ///
    /// Returns whether a live session key was removed.
    pub fn revoke(&mut self) -> bool {
        let revoked = match &self.identity {
            Some(identity) => self.manager.revoke(&identity.to_raw()),
            None => false,
        };
        let config = self.manager.config();
        self.jar.delete(&config.cookie_name, &config.cookie_path);

        self.status = ClaimRepositoryStatus::Uninitialized;
        self.identity = None;
        self.expiration = None;
        self.claims.clear();
        self.decryption_keys = Arc::new(DecryptionKeys::default());
        self.dirty = false;
        self.signed_in = false;
        self.rotate_session = false;
        revoked
    }

    /// Manager signing this repository's tokens
    pub fn manager(&self) -> &Arc<ClaimManager> {
        &self.manager
    }

    /// Cookie jar of the current request
    pub fn jar(&self) -> &J {
        &self.jar
    }

    /// Hand the jar back, e.g. to move queued cookies into a response
    pub fn into_jar(self) -> J {
        self.jar
    }
}
