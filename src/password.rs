//! Password hashing and verification.
//!
//! Stored hashes come in two bcrypt dialects: `$2b$`, written by this server,
//! and `$2y$`, written by the site's previous incarnation. Both encode the same
//! algorithm and differ only in the version tag, so a legacy hash is re-tagged
//! before comparison and never needs rehashing.

use std::borrow::Cow;

use log::{debug, error};
use tokio::sync::Semaphore;

pub const MODERN_PREFIX: &str = "$2b$";
pub const LEGACY_PREFIX: &str = "$2y$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Modern,
    Legacy,
}

impl Dialect {
    pub fn of(stored: &str) -> Option<Self> {
        if stored.starts_with(MODERN_PREFIX) {
            Some(Dialect::Modern)
        } else if stored.starts_with(LEGACY_PREFIX) {
            Some(Dialect::Legacy)
        } else {
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("bcrypt: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("hashing worker unavailable")]
    Pool,
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash in the modern dialect.
    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

fn to_modern(stored: &str) -> Cow<'_, str> {
    match stored.strip_prefix(LEGACY_PREFIX) {
        Some(rest) => Cow::Owned(format!("{MODERN_PREFIX}{rest}")),
        None => Cow::Borrowed(stored),
    }
}

/// Never fails: anything that can't be checked is a mismatch.
pub fn verify(plaintext: &str, stored: &str) -> bool {
    let Some(dialect) = Dialect::of(stored) else {
        debug!("stored hash has no recognised dialect");
        return false;
    };

    let stored = match dialect {
        Dialect::Modern => Cow::Borrowed(stored),
        Dialect::Legacy => to_modern(stored),
    };

    bcrypt::verify(plaintext, &stored).unwrap_or_else(|e| {
        debug!("hash verification failed: {e}");
        false
    })
}

/// Runs the (deliberately slow) hashing work on tokio's blocking threads, at
/// most `workers` at a time.
pub struct HashPool {
    hasher: PasswordHasher,
    permits: Semaphore,
}

impl HashPool {
    pub fn new(hasher: PasswordHasher, workers: usize) -> Self {
        Self {
            hasher,
            permits: Semaphore::new(workers.max(1)),
        }
    }

    pub async fn hash(&self, plaintext: String) -> Result<String, HashError> {
        let _permit = self.permits.acquire().await.map_err(|_| HashError::Pool)?;
        let hasher = self.hasher;

        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| {
                error!("hashing task: {e}");
                HashError::Pool
            })?
    }

    pub async fn verify(&self, plaintext: String, stored: String) -> bool {
        let Ok(_permit) = self.permits.acquire().await else {
            error!("hash pool closed");
            return false;
        };

        tokio::task::spawn_blocking(move || verify(&plaintext, &stored))
            .await
            .unwrap_or_else(|e| {
                error!("verification task: {e}");
                false
            })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub fn fast_hasher() -> PasswordHasher {
        PasswordHasher::new(4)
    }

    /// The same digest, as the previous system would have stored it.
    pub fn legacy(modern: &str) -> String {
        format!("{LEGACY_PREFIX}{}", modern.strip_prefix(MODERN_PREFIX).unwrap())
    }

    #[test]
    fn hash_then_verify() {
        let hash = fast_hasher().hash("secret1").unwrap();

        assert_eq!(Dialect::of(&hash), Some(Dialect::Modern));
        assert!(verify("secret1", &hash));
        assert!(!verify("secret2", &hash));
        assert!(!verify("", &hash));
    }

    #[test]
    fn legacy_dialect_bridges() {
        let hash = fast_hasher().hash("secret1").unwrap();
        let old = legacy(&hash);

        assert_eq!(Dialect::of(&old), Some(Dialect::Legacy));
        assert!(verify("secret1", &old));
        assert!(!verify("Secret1", &old));
    }

    #[test]
    fn legacy_from_bcrypt_parts() {
        let parts = bcrypt::hash_with_result("pässwörd", 4).unwrap();
        let old = parts.format_for_version(bcrypt::Version::TwoY);

        assert!(old.starts_with(LEGACY_PREFIX));
        assert!(verify("pässwörd", &old));
    }

    #[test]
    fn malformed_hashes_never_match() {
        for stored in [
            "",
            "plaintext",
            "$2b$",
            "$2y$04$tooshort",
            "$2a$04$abcdefghijklmnopqrstuu5D5LH9Qz0sKFnLkyvO3ZOzH9LbvS/mK",
            "$argon2id$v=19$m=65536,t=3,p=4$c2FsdA$aGFzaA",
        ] {
            assert!(!verify("anything", stored), "{stored:?} matched");
        }
    }

    #[tokio::test]
    async fn pool_hashes_off_thread() {
        let pool = HashPool::new(fast_hasher(), 2);

        let hash = pool.hash("secret1".into()).await.unwrap();
        assert!(pool.verify("secret1".into(), hash.clone()).await);
        assert!(!pool.verify("nope".into(), hash.clone()).await);
        assert!(pool.verify("secret1".into(), legacy(&hash)).await);
    }

    #[test]
    fn bad_cost_is_an_error() {
        assert!(PasswordHasher::new(1).hash("x").is_err());
    }
}
