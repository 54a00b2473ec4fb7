//! Process-wide services (§9 "Globals → process services"). These are plain
//! structs with explicit `init`/operations — never exported mutable statics.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Holds the JWT signing secret for the (out-of-scope) auth surface. Token
/// generation must refuse until this is initialized (§7 "Configuration"
/// errors are refused at startup, never mid-cycle).
#[derive(Clone, Default)]
pub struct JwtSecretHolder {
    inner: Arc<Mutex<Option<String>>>,
}

impl JwtSecretHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, secret: String) {
        *self.inner.lock() = Some(secret);
    }

    pub fn get(&self) -> Result<String> {
        self.inner
            .lock()
            .clone()
            .ok_or(Error::JwtSecretNotConfigured)
    }
}

/// Process-wide, mutually-exclusive blacklist of revoked JWT ids, with a
/// sweep-on-grow policy: once the set exceeds 100,000 entries, expired ids
/// are swept before the insert that triggered the check is acknowledged
/// (§5 "Shared-resource policy").
pub struct TokenBlacklist {
    entries: Mutex<HashSet<(String, i64)>>,
}

impl TokenBlacklist {
    const SWEEP_THRESHOLD: usize = 100_000;

    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashSet::new()),
        }
    }

    /// Adds a token id with its expiry (unix seconds). Sweeps already-expired
    /// entries first if the set is oversized.
    pub fn revoke(&self, jti: String, expires_at: i64, now: i64) {
        let mut guard = self.entries.lock();
        if guard.len() > Self::SWEEP_THRESHOLD {
            guard.retain(|(_, exp)| *exp > now);
        }
        guard.insert((jti, expires_at));
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.entries.lock().iter().any(|(id, _)| id == jti)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TokenBlacklist {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_secret_refuses_until_set() {
        let holder = JwtSecretHolder::new();
        assert!(holder.get().is_err());
        holder.set("shh".into());
        assert_eq!(holder.get().unwrap(), "shh");
    }

    #[test]
    fn blacklist_sweeps_expired_when_oversized() {
        let bl = TokenBlacklist::new();
        // Fill past the threshold with tokens that have already expired by `now`.
        for i in 0..TokenBlacklist::SWEEP_THRESHOLD + 1 {
            bl.revoke(format!("old-{i}"), 50, 100);
        }
        assert!(bl.len() > TokenBlacklist::SWEEP_THRESHOLD);
        // The next insert observes the oversized set and sweeps the expired entries first.
        bl.revoke("new".into(), 1_000, 100);
        assert!(bl.len() < TokenBlacklist::SWEEP_THRESHOLD);
        assert!(bl.is_revoked("new"));
    }
}
