//! The account store: source of truth for every identity.
//!
//! Responsible for:
//! - Registering accounts and enforcing the password policy
//! - Checking credentials and minting tokens at login
//! - Debiting the energy budget for costed actions
//! - Admin-only tier changes and account removal
//!
//! # Concurrency note
//!
//! `AccountStore` is not thread-safe by itself: it is a plain map with
//! `&mut self` methods. [`IdentityService`](crate::IdentityService) owns it
//! behind a single `tokio::sync::Mutex`, which is what makes every
//! mutating operation mutually exclusive.

use std::collections::BTreeMap;

use keystone_protocol::{
    AccountInfo, AccountRemoval, CredentialError, EnergyReceipt, LoginGrant,
    PermissionError, QuotaError, ServiceError, Tier, TierChange, TierTable,
    TokenAuthority,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    BcryptHasher, CredentialHasher, EnergyCost, HashError, MAX_ENERGY,
    PasswordPolicy,
};

/// One account, exactly as persisted to `users.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    #[serde(rename = "passwordHash")]
    pub password_hash: String,
    #[serde(rename = "type", default)]
    pub tier: Tier,
    pub energy: u32,
    #[serde(default)]
    pub is_admin: bool,
}

/// All known accounts, keyed by username.
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ login() ──→ debit_energy() / query_info()
///                                  │
///        admin: change_tier() / remove_account()
/// ```
pub struct AccountStore<H = BcryptHasher> {
    /// `BTreeMap` keeps saves in a stable, sorted order.
    accounts: BTreeMap<String, Account>,
    policy: PasswordPolicy,
    hasher: H,
    tokens: TokenAuthority,
    connection_limits: TierTable,
    energy_cost: EnergyCost,
}

impl<H: CredentialHasher> AccountStore<H> {
    /// Creates an empty store.
    pub fn new(
        hasher: H,
        tokens: TokenAuthority,
        connection_limits: TierTable,
        energy_cost: EnergyCost,
    ) -> Self {
        Self {
            accounts: BTreeMap::new(),
            policy: PasswordPolicy::default(),
            hasher,
            tokens,
            connection_limits,
            energy_cost,
        }
    }

    /// Replaces the password policy.
    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Adds previously persisted accounts. Later duplicates win; energy is
    /// clamped to [`MAX_ENERGY`].
    pub fn restore(&mut self, accounts: impl IntoIterator<Item = Account>) {
        for mut account in accounts {
            account.energy = account.energy.min(MAX_ENERGY);
            self.accounts.insert(account.username.clone(), account);
        }
    }

    /// Seeds an admin account unless one with that username already exists.
    ///
    /// The seeded admin starts at Freemium with no energy. Returns `true`
    /// if an account was created.
    pub fn ensure_admin(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<bool, HashError> {
        if self.accounts.contains_key(username) {
            return Ok(false);
        }
        let account = Account {
            username: username.to_string(),
            password_hash: self.hasher.hash(password)?,
            tier: Tier::Freemium,
            energy: 0,
            is_admin: true,
        };
        self.accounts.insert(username.to_string(), account);
        tracing::info!(%username, "seeded admin account");
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, username: &str) -> Option<&Account> {
        self.accounts.get(username)
    }

    /// Snapshot of every account, for persistence.
    pub fn records(&self) -> Vec<Account> {
        self.accounts.values().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Credentials
    // -----------------------------------------------------------------------

    /// Creates a Freemium account with full energy, hashing inline.
    ///
    /// [`IdentityService`](crate::IdentityService) does not call this: it
    /// runs the same three steps with the hash taken outside the lock.
    ///
    /// # Errors
    /// - [`CredentialError::AlreadyExists`]: username taken
    /// - [`CredentialError::WeakPassword`]: policy not met
    pub fn register(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(), ServiceError> {
        self.check_registration(username, password)?;
        let password_hash = hash_for_registration(&self.hasher, username, password)?;
        self.insert_registered(username, password_hash)
    }

    /// Checks that `username` is free and `password` meets the policy.
    pub fn check_registration(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), ServiceError> {
        if self.accounts.contains_key(username) {
            return Err(CredentialError::AlreadyExists.into());
        }
        if !self.policy.accepts(password) {
            return Err(CredentialError::WeakPassword.into());
        }
        Ok(())
    }

    /// Inserts a new Freemium account under an already computed hash.
    ///
    /// The username is checked again: another registration may have taken
    /// it while the hash was being computed.
    pub fn insert_registered(
        &mut self,
        username: &str,
        password_hash: String,
    ) -> Result<(), ServiceError> {
        if self.accounts.contains_key(username) {
            return Err(CredentialError::AlreadyExists.into());
        }
        self.accounts.insert(
            username.to_string(),
            Account {
                username: username.to_string(),
                password_hash,
                tier: Tier::Freemium,
                energy: MAX_ENERGY,
                is_admin: false,
            },
        );

        tracing::info!(%username, "new user registered");
        Ok(())
    }

    /// Checks credentials and mints a token. Earlier tokens stay valid.
    ///
    /// # Errors
    /// - [`CredentialError::NotFound`]: unknown username
    /// - [`CredentialError::InvalidCredential`]: wrong password
    pub fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(String, LoginGrant), ServiceError> {
        let stored = self.stored_hash(username)?;
        if !self.hasher.verify(password, &stored) {
            return Err(CredentialError::InvalidCredential.into());
        }
        self.grant_login(username)
    }

    /// Copy of the stored password hash, for verifying outside the lock.
    pub fn stored_hash(&self, username: &str) -> Result<String, ServiceError> {
        self.accounts
            .get(username)
            .map(|account| account.password_hash.clone())
            .ok_or_else(|| CredentialError::NotFound("User").into())
    }

    /// Mints a token for an account whose password has been verified.
    ///
    /// Fails with `NotFound` if the account was removed in the meantime.
    pub fn grant_login(
        &self,
        username: &str,
    ) -> Result<(String, LoginGrant), ServiceError> {
        let account = self
            .accounts
            .get(username)
            .ok_or(CredentialError::NotFound("User"))?;

        let grant = LoginGrant {
            tier: account.tier,
            connection_limit: self.connection_limits.get(account.tier),
        };
        tracing::info!(
            %username,
            tier = %account.tier,
            connection_limit = grant.connection_limit,
            "user logged in"
        );
        Ok((self.tokens.issue(username), grant))
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Returns `true` if `token` belongs to `username`. Never mutates.
    pub fn validate_token(&self, token: &str, username: &str) -> bool {
        self.tokens.verify(token, username)
    }

    // -----------------------------------------------------------------------
    // Energy and info
    // -----------------------------------------------------------------------

    /// Debits a random cost from the account's energy budget.
    ///
    /// # Errors
    /// - [`CredentialError::InvalidToken`] / [`CredentialError::NotFound`]
    /// - [`QuotaError::InsufficientEnergy`]: balance below the rolled
    ///   cost; nothing is debited
    pub fn debit_energy<R: Rng + ?Sized>(
        &mut self,
        username: &str,
        token: &str,
        rng: &mut R,
    ) -> Result<EnergyReceipt, ServiceError> {
        self.authenticate(token, username)?;
        let cost = self.energy_cost.roll(rng);
        let account = self
            .accounts
            .get_mut(username)
            .ok_or(CredentialError::NotFound("User"))?;

        if account.energy < cost {
            tracing::debug!(%username, energy = account.energy, cost, "energy check failed");
            return Err(QuotaError::InsufficientEnergy {
                current: account.energy,
                required: cost,
            }
            .into());
        }
        account.energy -= cost;

        tracing::debug!(%username, cost, remaining = account.energy, "energy deducted");
        Ok(EnergyReceipt {
            username: username.to_string(),
            energy_cost: cost,
            remaining_energy: account.energy,
        })
    }

    /// Reports an account's tier, energy, admin flag, and connection limit.
    pub fn query_info(
        &self,
        username: &str,
        token: &str,
    ) -> Result<AccountInfo, ServiceError> {
        self.authenticate(token, username)?;
        let account = self
            .accounts
            .get(username)
            .ok_or(CredentialError::NotFound("User"))?;

        Ok(AccountInfo {
            username: account.username.clone(),
            tier: account.tier,
            energy: account.energy,
            is_admin: account.is_admin,
            connection_limit: self.connection_limits.get(account.tier),
        })
    }

    // -----------------------------------------------------------------------
    // Admin operations
    // -----------------------------------------------------------------------

    /// Moves `target` to a new tier.
    ///
    /// Guards run in order: token, acting account exists, acting account
    /// is admin, target is not the actor, target exists, tier parses.
    pub fn change_tier(
        &mut self,
        acting: &str,
        token: &str,
        target: &str,
        new_tier: &str,
    ) -> Result<TierChange, ServiceError> {
        self.authorize_admin(acting, token, target, "modify your type")?;
        let new_tier: Tier =
            new_tier.parse().map_err(|_| ServiceError::InvalidTier)?;
        let account = self
            .accounts
            .get_mut(target)
            .ok_or(CredentialError::NotFound("Target user"))?;
        account.tier = new_tier;

        tracing::info!(%acting, %target, tier = %new_tier, "tier changed");
        Ok(TierChange {
            target_user: target.to_string(),
            new_type: new_tier,
        })
    }

    /// Deletes `target`. Same guards as [`change_tier`](Self::change_tier).
    pub fn remove_account(
        &mut self,
        acting: &str,
        token: &str,
        target: &str,
    ) -> Result<AccountRemoval, ServiceError> {
        self.authorize_admin(acting, token, target, "remove yourself")?;
        self.accounts.remove(target);

        tracing::info!(%acting, %target, "account removed");
        Ok(AccountRemoval {
            removed_user: target.to_string(),
            remaining_users: self.accounts.len(),
        })
    }

    fn authenticate(&self, token: &str, username: &str) -> Result<(), ServiceError> {
        if self.tokens.verify(token, username) {
            Ok(())
        } else {
            Err(CredentialError::InvalidToken.into())
        }
    }

    fn authorize_admin(
        &self,
        acting: &str,
        token: &str,
        target: &str,
        self_action: &'static str,
    ) -> Result<(), ServiceError> {
        self.authenticate(token, acting)?;
        let actor = self
            .accounts
            .get(acting)
            .ok_or(CredentialError::NotFound("User"))?;
        if !actor.is_admin {
            return Err(PermissionError::AdminRequired.into());
        }
        if target == acting {
            return Err(PermissionError::SelfModification(self_action).into());
        }
        if !self.accounts.contains_key(target) {
            return Err(CredentialError::NotFound("Target user").into());
        }
        Ok(())
    }
}

/// Hashes a new password. A hashing failure is reported as a weak
/// password, the only registration error the client can act on.
pub(crate) fn hash_for_registration<H: CredentialHasher>(
    hasher: &H,
    username: &str,
    password: &str,
) -> Result<String, ServiceError> {
    hasher.hash(password).map_err(|e| {
        tracing::warn!(%username, error = %e, "could not hash password");
        CredentialError::WeakPassword.into()
    })
}
