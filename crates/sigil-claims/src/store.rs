//! Session key store
//!
//! Maps an identity to the server-held secret that, together with the
//! static server secret, authenticates that identity's tokens. Removing an
//! entry revokes every token issued for the identity.
//!
//! Entries live for the configured TTL measured from their last renewal.
//! Stale entries are removed when they are looked up, and by an
//! opportunistic sweep that at most one caller per TTL window runs.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

use crate::clock::Clock;

/// Length of a per-session secret in bytes
pub const SESSION_SECRET_LEN: usize = 32;

/// Server-side key material attached to a session.
///
/// Never transmitted in a token. Callers recover it from a `Valid`
/// verification through [`crate::ClaimRepositoryData::decryption_keys`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DecryptionKeys {
    keys: HashMap<String, Zeroizing<Vec<u8>>>,
}

impl DecryptionKeys {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named key
    pub fn insert(&mut self, name: impl Into<String>, key: impl Into<Vec<u8>>) {
        self.keys.insert(name.into(), Zeroizing::new(key.into()));
    }

    /// Builder form of [`Self::insert`]
    #[must_use]
    pub fn with_key(mut self, name: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        self.insert(name, key);
        self
    }

    /// Look up a named key
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.keys.get(name).map(|k| k.as_slice())
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are held
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for DecryptionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKeys")
            .field("names", &self.keys.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Per-identity session secret
pub struct SessionKey {
    secret: Zeroizing<[u8; SESSION_SECRET_LEN]>,
    /// Epoch milliseconds of creation or last renewal
    created_at: AtomicI64,
    decryption_keys: Arc<DecryptionKeys>,
}

impl SessionKey {
    /// Create a session key with a fresh random secret
    pub fn generate(now: DateTime<Utc>, decryption_keys: Arc<DecryptionKeys>) -> Self {
        let mut secret = Zeroizing::new([0u8; SESSION_SECRET_LEN]);
        OsRng.fill_bytes(&mut secret[..]);
        Self {
            secret,
            created_at: AtomicI64::new(now.timestamp_millis()),
            decryption_keys,
        }
    }

    /// Create a session key from known secret bytes
    pub fn from_secret(
        secret: [u8; SESSION_SECRET_LEN],
        created_at: DateTime<Utc>,
        decryption_keys: Arc<DecryptionKeys>,
    ) -> Self {
        Self {
            secret: Zeroizing::new(secret),
            created_at: AtomicI64::new(created_at.timestamp_millis()),
            decryption_keys,
        }
    }

    /// Secret bytes
    pub fn secret(&self) -> &[u8] {
        &self.secret[..]
    }

    /// Creation or last renewal time
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.created_at.load(Ordering::Acquire))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Reset the creation time, extending the key's life by a full TTL
    pub fn touch(&self, now: DateTime<Utc>) {
        self.created_at.store(now.timestamp_millis(), Ordering::Release);
    }

    /// Key material attached when the session was created
    pub fn decryption_keys(&self) -> &Arc<DecryptionKeys> {
        &self.decryption_keys
    }

    fn is_stale(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms.saturating_sub(self.created_at.load(Ordering::Acquire)) > ttl_ms
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("created_at", &self.created_at())
            .field("decryption_keys", &self.decryption_keys)
            .finish_non_exhaustive()
    }
}

/// Concurrent identity -> session key registry.
///
/// One instance is shared by every request in the process. At most one
/// entry exists per identity; concurrent renewals of the same identity are
/// last-writer-wins.
pub struct SessionKeyStore {
    keys: DashMap<String, Arc<SessionKey>>,
    ttl_ms: i64,
    /// Epoch milliseconds of the last sweep
    last_housekeeping: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl SessionKeyStore {
    /// Create an empty store whose entries live for `ttl`
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let now_ms = clock.now().timestamp_millis();
        Self {
            keys: DashMap::new(),
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            last_housekeeping: AtomicI64::new(now_ms),
            clock,
        }
    }

    /// Entry time-to-live
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.max(0) as u64)
    }

    /// Look up a live session key.
    ///
    /// A stale entry is removed and reported as absent.
    pub fn try_get(&self, identity: &str) -> Option<Arc<SessionKey>> {
        self.maybe_run_housekeeping();
        let now_ms = self.now_ms();

        let key = self.keys.get(identity).map(|entry| Arc::clone(entry.value()))?;
        if key.is_stale(now_ms, self.ttl_ms) {
            // Leave a key another request created in the meantime alone
            self.keys
                .remove_if(identity, |_, current| Arc::ptr_eq(current, &key));
            tracing::debug!(identity, "Session key expired on lookup");
            return None;
        }
        Some(key)
    }

    /// Return the live key for `identity`, creating one if needed.
    ///
    /// `decryption_keys` is only called when a new key is created. A stale
    /// entry is replaced in place.
    pub fn get_or_create(
        &self,
        identity: &str,
        decryption_keys: impl FnOnce() -> Arc<DecryptionKeys>,
    ) -> Arc<SessionKey> {
        self.maybe_run_housekeeping();
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        if let Some(key) = self.keys.get(identity).map(|entry| Arc::clone(entry.value())) {
            if !key.is_stale(now_ms, self.ttl_ms) {
                return key;
            }
        }

        // Generated outside the shard lock so the callback can't deadlock it
        let fresh = Arc::new(SessionKey::generate(now, decryption_keys()));
        match self.keys.entry(identity.to_owned()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_stale(now_ms, self.ttl_ms) {
                    entry.insert(Arc::clone(&fresh));
                    tracing::debug!(identity, "Replaced stale session key");
                    fresh
                } else {
                    Arc::clone(entry.get())
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&fresh));
                tracing::debug!(identity, "Created session key");
                fresh
            }
        }
    }

    /// Refresh the creation time of a live key.
    ///
    /// Returns `false` when no live key exists.
    pub fn renew(&self, identity: &str) -> bool {
        match self.try_get(identity) {
            Some(key) => {
                key.touch(self.clock.now());
                true
            }
            None => false,
        }
    }

    /// Remove the key for `identity`, returning whether one existed
    pub fn try_revoke(&self, identity: &str) -> bool {
        let removed = self.keys.remove(identity).is_some();
        if removed {
            tracing::debug!(identity, "Session key revoked");
        }
        removed
    }

    /// Remove every stale entry, returning how many were removed
    pub fn run_housekeeping(&self) -> usize {
        let now_ms = self.now_ms();
        let mut removed = 0;
        self.keys.retain(|_, key| {
            let keep = !key.is_stale(now_ms, self.ttl_ms);
            if !keep {
                removed += 1;
            }
            keep
        });
        tracing::debug!(removed, remaining = self.keys.len(), "Session key housekeeping");
        removed
    }

    /// Run housekeeping if the last sweep is older than the TTL.
    ///
    /// Only the caller that wins the compare-and-swap on the sweep timestamp
    /// runs the sweep; everyone else returns immediately. Returns whether a
    /// sweep ran.
    pub fn maybe_run_housekeeping(&self) -> bool {
        let now_ms = self.now_ms();
        let last = self.last_housekeeping.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) <= self.ttl_ms {
            return false;
        }
        if self
            .last_housekeeping
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        self.run_housekeeping();
        true
    }

    /// Number of entries, stale ones included
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the store holds no entries
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

impl std::fmt::Debug for SessionKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyStore")
            .field("entries", &self.keys.len())
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}
