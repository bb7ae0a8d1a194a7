//! Credential tokens minted at login and checked on every request.
//!
//! Two schemes exist:
//!
//! - [`TokenScheme::Signed`] (default): `v1.<hex username>.<issued>.<hex mac>`
//!   where the MAC is HMAC-SHA256 over everything before the last dot,
//!   keyed by a secret shared between the two services. Tokens expire
//!   after a configurable TTL.
//! - [`TokenScheme::LegacyPrefix`]: `AUTH_<username>_<unix seconds>`,
//!   accepted by structural prefix match alone. It exists so unmodified
//!   legacy peers keep working; anyone who knows a username can forge one.
//!
//! Both services must run the same scheme with the same secret, since the
//! Session Service validates tokens locally before asking the Identity
//! Service anything.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Secret used when none is configured. Fine for local runs, logged loudly.
pub const DEFAULT_TOKEN_SECRET: &str = "keystone-development-secret";

const SIGNED_VERSION: &str = "v1";
const LEGACY_PREFIX: &str = "AUTH_";

/// How far in the future an issue time may be before we call it forged.
const CLOCK_SKEW_SECS: u64 = 60;

/// Which token format to mint and accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenScheme {
    #[default]
    Signed,
    LegacyPrefix,
}

impl FromStr for TokenScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "signed" => Ok(Self::Signed),
            "legacy" | "legacy-prefix" => Ok(Self::LegacyPrefix),
            other => Err(format!(
                "unknown token scheme '{other}' (expected 'signed' or 'legacy')"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// TokenConfig
// ---------------------------------------------------------------------------

/// Token settings shared by both services.
#[derive(Clone)]
pub struct TokenConfig {
    pub scheme: TokenScheme,
    pub secret: String,
    /// Lifetime of a signed token. Ignored by the legacy scheme.
    pub ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            scheme: TokenScheme::default(),
            secret: DEFAULT_TOKEN_SECRET.to_string(),
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("scheme", &self.scheme)
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl TokenConfig {
    pub fn with_scheme(mut self, scheme: TokenScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Builds the authority that mints and checks tokens.
    pub fn build(&self) -> TokenAuthority {
        if self.scheme == TokenScheme::Signed
            && self.secret == DEFAULT_TOKEN_SECRET
        {
            tracing::warn!(
                "signing tokens with the built-in development secret; \
                 set a shared secret for anything but local runs"
            );
        }
        TokenAuthority {
            scheme: self.scheme,
            secret: self.secret.as_bytes().to_vec(),
            ttl_secs: self.ttl_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenAuthority
// ---------------------------------------------------------------------------

/// Mints and validates credential tokens. Validation never mutates state.
#[derive(Clone)]
pub struct TokenAuthority {
    scheme: TokenScheme,
    secret: Vec<u8>,
    ttl_secs: u64,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("scheme", &self.scheme)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    pub fn scheme(&self) -> TokenScheme {
        self.scheme
    }

    /// Mints a token for `username`, stamped with the current time.
    pub fn issue(&self, username: &str) -> String {
        self.issue_at(username, unix_now())
    }

    /// Mints a token with an explicit issue time.
    pub fn issue_at(&self, username: &str, issued_at: u64) -> String {
        match self.scheme {
            TokenScheme::LegacyPrefix => {
                format!("{LEGACY_PREFIX}{username}_{issued_at}")
            }
            TokenScheme::Signed => {
                let body = format!(
                    "{SIGNED_VERSION}.{}.{issued_at}",
                    hex::encode(username)
                );
                let mac = hex::encode(self.mac(&body).finalize().into_bytes());
                format!("{body}.{mac}")
            }
        }
    }

    /// Returns `true` if `token` was issued to `username` and is still valid.
    pub fn verify(&self, token: &str, username: &str) -> bool {
        self.verify_at(token, username, unix_now())
    }

    /// [`verify`](Self::verify) against an explicit clock.
    pub fn verify_at(&self, token: &str, username: &str, now: u64) -> bool {
        match self.scheme {
            TokenScheme::LegacyPrefix => token
                .strip_prefix(LEGACY_PREFIX)
                .and_then(|rest| rest.strip_prefix(username))
                .is_some_and(|rest| rest.starts_with('_')),
            TokenScheme::Signed => self.verify_signed(token, username, now),
        }
    }

    fn verify_signed(&self, token: &str, username: &str, now: u64) -> bool {
        let Some((body, mac_hex)) = token.rsplit_once('.') else {
            return false;
        };
        let mut parts = body.split('.');
        let (Some(version), Some(user_hex), Some(issued), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        if version != SIGNED_VERSION || user_hex != hex::encode(username) {
            return false;
        }
        let Ok(issued_at) = issued.parse::<u64>() else {
            return false;
        };
        let Ok(mac) = hex::decode(mac_hex) else {
            return false;
        };
        if self.mac(body).verify_slice(&mac).is_err() {
            return false;
        }

        issued_at <= now.saturating_add(CLOCK_SKEW_SECS)
            && now.saturating_sub(issued_at) <= self.ttl_secs
    }

    fn mac(&self, body: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(body.as_bytes());
        mac
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn signed() -> TokenAuthority {
        TokenConfig::default()
            .with_secret("test-secret")
            .with_ttl_secs(3600)
            .build()
    }

    fn legacy() -> TokenAuthority {
        TokenConfig::default()
            .with_scheme(TokenScheme::LegacyPrefix)
            .build()
    }

    // =====================================================================
    // Signed scheme
    // =====================================================================

    #[test]
    fn test_signed_token_verifies_for_its_user() {
        let auth = signed();
        let token = auth.issue_at("alice", NOW);
        assert!(auth.verify_at(&token, "alice", NOW + 10));
    }

    #[test]
    fn test_signed_token_rejected_for_other_user() {
        let auth = signed();
        let token = auth.issue_at("alice", NOW);
        assert!(!auth.verify_at(&token, "bob", NOW));
    }

    #[test]
    fn test_signed_token_tampered_mac_rejected() {
        let auth = signed();
        let mut token = auth.issue_at("alice", NOW);
        let last = token.pop().unwrap();
        token.push(if last == '0' { '1' } else { '0' });
        assert!(!auth.verify_at(&token, "alice", NOW));
    }

    #[test]
    fn test_signed_token_tampered_issue_time_rejected() {
        let auth = signed();
        let token = auth.issue_at("alice", NOW);
        let forged = token.replace(&NOW.to_string(), &(NOW + 5).to_string());
        assert!(!auth.verify_at(&forged, "alice", NOW + 5));
    }

    #[test]
    fn test_signed_token_expires_after_ttl() {
        let auth = signed();
        let token = auth.issue_at("alice", NOW);
        assert!(auth.verify_at(&token, "alice", NOW + 3600));
        assert!(!auth.verify_at(&token, "alice", NOW + 3601));
    }

    #[test]
    fn test_signed_token_from_far_future_rejected() {
        let auth = signed();
        let token = auth.issue_at("alice", NOW + 3600);
        assert!(!auth.verify_at(&token, "alice", NOW));
    }

    #[test]
    fn test_signed_token_from_other_secret_rejected() {
        let token = signed().issue_at("alice", NOW);
        let other = TokenConfig::default().with_secret("different").build();
        assert!(!other.verify_at(&token, "alice", NOW));
    }

    #[test]
    fn test_signed_scheme_rejects_legacy_token() {
        assert!(!signed().verify_at("AUTH_alice_123", "alice", NOW));
    }

    // =====================================================================
    // Legacy scheme
    // =====================================================================

    #[test]
    fn test_legacy_token_format() {
        assert_eq!(legacy().issue_at("alice", 42), "AUTH_alice_42");
    }

    #[test]
    fn test_legacy_token_checks_prefix_only() {
        let auth = legacy();
        assert!(auth.verify_at("AUTH_alice_anything", "alice", NOW));
        assert!(!auth.verify_at("AUTH_alicex_1", "alice", NOW));
        assert!(!auth.verify_at("AUTH_bob_1", "alice", NOW));
        assert!(!auth.verify_at("", "alice", NOW));
    }

    #[test]
    fn test_token_scheme_from_str() {
        assert_eq!("signed".parse(), Ok(TokenScheme::Signed));
        assert_eq!("legacy".parse(), Ok(TokenScheme::LegacyPrefix));
        assert!("jwt".parse::<TokenScheme>().is_err());
    }

    #[test]
    fn test_debug_output_redacts_secret() {
        let config = TokenConfig::default().with_secret("hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
        assert!(!format!("{:?}", config.build()).contains("hunter2"));
    }
}
