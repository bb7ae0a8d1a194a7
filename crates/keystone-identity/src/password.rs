//! Password rules and credential hashing.

/// What a password must contain to be accepted at registration.
///
/// Every rule is mandatory. Length is counted in characters, and any
/// character that is not an ASCII letter or digit counts as a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_len: usize,
    pub max_len: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_len: 8,
            max_len: 20,
        }
    }
}

impl PasswordPolicy {
    /// Returns `true` if `password` satisfies every rule.
    pub fn accepts(&self, password: &str) -> bool {
        let len = password.chars().count();
        if len < self.min_len || len > self.max_len {
            return false;
        }

        let (mut upper, mut lower, mut digit, mut symbol) =
            (false, false, false, false);
        for ch in password.chars() {
            match ch {
                'A'..='Z' => upper = true,
                'a'..='z' => lower = true,
                '0'..='9' => digit = true,
                _ => symbol = true,
            }
        }
        upper && lower && digit && symbol
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Hashing failed. Carries the underlying library's message.
#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct HashError(String);

/// One-way credential storage.
///
/// The store never sees a plaintext password after registration: it keeps
/// whatever [`hash`](Self::hash) returns and later asks
/// [`verify`](Self::verify) whether a login attempt matches it.
///
/// Both methods block for as long as the hash takes. Async callers run
/// them on a clone through `tokio::task::spawn_blocking`.
pub trait CredentialHasher: Clone + Send + Sync + 'static {
    fn hash(&self, password: &str) -> Result<String, HashError>;

    /// Returns `false` for a mismatch *and* for a malformed stored hash.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// [`CredentialHasher`] backed by bcrypt.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// Creates a hasher with the given work factor, clamped to the range
    /// bcrypt accepts.
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(4, 31),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl CredentialHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String, HashError> {
        bcrypt::hash(password, self.cost).map_err(|e| HashError(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        bcrypt::verify(password, hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_rejects_each_missing_class() {
        let policy = PasswordPolicy::default();
        for weak in [
            "abc",
            "alllowercase1!",
            "ALLUPPER123!",
            "NoDigits!!",
            "NoSpecial123",
        ] {
            assert!(!policy.accepts(weak), "{weak} should be rejected");
        }
    }

    #[test]
    fn test_policy_accepts_valid_password() {
        assert!(PasswordPolicy::default().accepts("Valid123!"));
    }

    #[test]
    fn test_policy_enforces_length_bounds() {
        let policy = PasswordPolicy::default();
        assert!(!policy.accepts("Va1!"));
        assert!(policy.accepts("Abcdefg1!xyzABCDEFG2"));
        assert!(!policy.accepts("Abcdefg1!xyzABCDEFG23"));
    }

    #[test]
    fn test_policy_counts_non_ascii_as_symbol() {
        assert!(PasswordPolicy::default().accepts("Passw0rdé"));
    }

    #[test]
    fn test_bcrypt_hasher_verifies_only_matching_password() {
        let hasher = BcryptHasher::new(4);
        let hash = hasher.hash("Valid123!").unwrap();

        assert_ne!(hash, "Valid123!");
        assert!(hasher.verify("Valid123!", &hash));
        assert!(!hasher.verify("Valid124!", &hash));
    }

    #[test]
    fn test_bcrypt_hasher_malformed_hash_is_mismatch() {
        assert!(!BcryptHasher::new(4).verify("Valid123!", "not-a-hash"));
    }

    #[test]
    fn test_bcrypt_hasher_clamps_cost() {
        assert_eq!(BcryptHasher::new(1).cost(), 4);
        assert_eq!(BcryptHasher::new(99).cost(), 31);
    }
}
