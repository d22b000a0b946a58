//! Password hashing, rotation and reuse prevention.
//!
//! Digests are Argon2id with the server pepper as the Argon2 secret key and
//! a salt derived from the user id, so the same `(user, password)` pair
//! always yields the same digest. That determinism is what lets a proposed
//! password be compared against every digest the user has ever had.

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use likeness_core::{
    Credential, CredentialId, PasswordDigest, PasswordRecord, ProviderKind, UserId, Violations,
};

use super::IdentityError;
use crate::config::{DIGEST_LENGTH, IdentityConfig};
use crate::db::IdentityStore;

/// Deterministic peppered password hasher.
///
/// Implements `Debug` manually to redact the pepper.
#[derive(Clone)]
pub struct PepperedHasher {
    pepper: SecretString,
    params: Params,
}

impl std::fmt::Debug for PepperedHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PepperedHasher")
            .field("pepper", &"[REDACTED]")
            .field("params", &self.params)
            .finish()
    }
}

impl PepperedHasher {
    #[must_use]
    pub const fn new(pepper: SecretString, params: Params) -> Self {
        Self { pepper, params }
    }

    /// Build a hasher from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the cost parameters are invalid.
    pub fn from_config(config: &IdentityConfig) -> Result<Self, crate::ConfigError> {
        Ok(Self::new(
            config.password_pepper.clone(),
            config.argon2.params()?,
        ))
    }

    /// Digest of `password` for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::PasswordHash` if argon2 rejects the inputs.
    pub fn hash(&self, user_id: UserId, password: &str) -> Result<PasswordDigest, IdentityError> {
        let argon2 = Argon2::new_with_secret(
            self.pepper.expose_secret().as_bytes(),
            Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
        .map_err(|_| IdentityError::PasswordHash)?;

        let mut out = [0u8; DIGEST_LENGTH];
        argon2
            .hash_password_into(password.as_bytes(), &salt_for(user_id), &mut out)
            .map_err(|_| IdentityError::PasswordHash)?;

        Ok(PasswordDigest::from_bytes(&out))
    }

    /// Whether `digest` was produced from `password` for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::PasswordHash` if hashing fails.
    pub fn verify(
        &self,
        digest: &PasswordDigest,
        user_id: UserId,
        password: &str,
    ) -> Result<bool, IdentityError> {
        let candidate = self.hash(user_id, password)?;
        Ok(constant_time_eq(
            candidate.as_str().as_bytes(),
            digest.as_str().as_bytes(),
        ))
    }
}

/// Per-user salt: SHA-256 of a domain-separated user id.
fn salt_for(user_id: UserId) -> [u8; 32] {
    Sha256::digest(format!("likeness/password-salt/{user_id}")).into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Password operations on email credentials.
pub struct PasswordVault<'a> {
    store: &'a dyn IdentityStore,
    hasher: &'a PepperedHasher,
}

impl<'a> PasswordVault<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn IdentityStore, hasher: &'a PepperedHasher) -> Self {
        Self { store, hasher }
    }

    /// Load an email credential and its owner.
    async fn email_credential(
        &self,
        credential_id: CredentialId,
    ) -> Result<(Credential, UserId), IdentityError> {
        let credential = self
            .store
            .get_credential(credential_id)
            .await?
            .ok_or_else(|| IdentityError::not_found("credential", credential_id))?;

        if credential.provider() != ProviderKind::EmailPass {
            return Err(Violations::single(
                "credential",
                "passwords can only be set on email credentials",
            )
            .into());
        }
        let Some(owner) = credential.user_id() else {
            return Err(Violations::single("credential", "credential is not bound to a user").into());
        };

        Ok((credential, owner))
    }

    /// Set a password without the reuse check (initial set or admin reset).
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the credential doesn't exist.
    /// Returns `IdentityError::Validation` if it isn't a bound email credential.
    #[instrument(skip(self, password), fields(credential_id = %credential_id))]
    pub async fn set_password(
        &self,
        credential_id: CredentialId,
        password: &str,
    ) -> Result<PasswordRecord, IdentityError> {
        let (_, owner) = self.email_credential(credential_id).await?;
        let digest = self.hasher.hash(owner, password)?;

        let record = self.store.rotate_password(credential_id, &digest).await?;
        info!(record_id = %record.id, "Password set");
        Ok(record)
    }

    /// Whether `proposed` differs from every password `user_id` ever had.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::PasswordHash` or a repository error.
    #[instrument(skip(self, proposed), fields(user_id = %user_id))]
    pub async fn can_change_password(
        &self,
        user_id: UserId,
        proposed: &str,
    ) -> Result<bool, IdentityError> {
        let digest = self.hasher.hash(user_id, proposed)?;
        let history = self.store.password_history(user_id).await?;

        let reused = history.iter().any(|old| old == &digest);
        debug!(history = history.len(), reused, "Checked password history");
        Ok(!reused)
    }

    /// Rotate to `proposed` unless the owner has used it before.
    ///
    /// The history check and the rotation happen in one store call, so two
    /// concurrent changes to the same new password cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` on field `password` for a reused
    /// password, and the errors of [`PasswordVault::set_password`].
    #[instrument(skip(self, proposed), fields(credential_id = %credential_id))]
    pub async fn change_password(
        &self,
        credential_id: CredentialId,
        proposed: &str,
    ) -> Result<PasswordRecord, IdentityError> {
        let (_, owner) = self.email_credential(credential_id).await?;
        let digest = self.hasher.hash(owner, proposed)?;

        let Some(record) = self
            .store
            .rotate_password_unless_reused(credential_id, owner, &digest)
            .await?
        else {
            debug!("Rejected previously used password");
            return Err(Violations::single(
                "password",
                "must differ from every previously used password",
            )
            .into());
        };

        info!(record_id = %record.id, "Password changed");
        Ok(record)
    }

    /// Check a login attempt against the current password.
    ///
    /// Disabled credentials, credentials of other providers and credentials
    /// with no password yet never verify.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the credential doesn't exist.
    #[instrument(skip(self, password), fields(credential_id = %credential_id))]
    pub async fn verify_login(
        &self,
        credential_id: CredentialId,
        password: &str,
    ) -> Result<bool, IdentityError> {
        let credential = self
            .store
            .get_credential(credential_id)
            .await?
            .ok_or_else(|| IdentityError::not_found("credential", credential_id))?;

        if credential.is_disabled || credential.provider() != ProviderKind::EmailPass {
            debug!("Credential cannot log in with a password");
            return Ok(false);
        }
        let Some(owner) = credential.user_id() else {
            return Ok(false);
        };
        let Some(current) = self.store.current_password(credential_id).await? else {
            debug!("No current password");
            return Ok(false);
        };

        self.hasher.verify(&current.digest, owner, password)
    }
}
