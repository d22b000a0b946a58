//! Credential repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use likeness_core::{
    Binding, CanonicalEmail, Credential, CredentialId, Fingerprint, NewCredential, ProviderKind,
    ProviderProfile, UserId,
};

use super::{RepositoryError, classify_error, is_foreign_key_violation};

macro_rules! credential_columns {
    () => {
        "id, user_id, provider, profile, email, canonical_email, fingerprint, \
         is_verified, is_third_party_verified, is_signup_credential, is_disabled, \
         created_at, updated_at"
    };
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i32,
    user_id: Option<i32>,
    provider: ProviderKind,
    profile: Json<ProviderProfile>,
    email: String,
    canonical_email: String,
    fingerprint: String,
    is_verified: bool,
    is_third_party_verified: bool,
    is_signup_credential: bool,
    is_disabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = RepositoryError;

    fn try_from(r: CredentialRow) -> Result<Self, Self::Error> {
        let Json(profile) = r.profile;
        if profile.kind() != r.provider {
            return Err(RepositoryError::DataCorruption(format!(
                "credential {} stores a {} profile for provider {}",
                r.id,
                profile.kind(),
                r.provider
            )));
        }

        Ok(Self {
            id: CredentialId::new(r.id),
            binding: Binding::from(r.user_id.map(UserId::new)),
            profile,
            email: r.email,
            canonical_email: CanonicalEmail::from_stored(r.canonical_email),
            fingerprint: Fingerprint::from_stored(r.fingerprint),
            is_verified: r.is_verified,
            is_third_party_verified: r.is_third_party_verified,
            is_signup_credential: r.is_signup_credential,
            is_disabled: r.is_disabled,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn into_credentials(rows: Vec<CredentialRow>) -> Result<Vec<Credential>, RepositoryError> {
    rows.into_iter().map(Credential::try_from).collect()
}

fn raw_ids(ids: &[CredentialId]) -> Vec<i32> {
    ids.iter().map(CredentialId::as_i32).collect()
}

/// Repository for credential database operations.
pub struct CredentialRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CredentialRepository<'a> {
    /// Create a new credential repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new credential.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the address (email credentials)
    /// or provider account (OAuth credentials) is already registered.
    /// Returns `RepositoryError::NotFound` if the credential is pre-bound to
    /// a user that doesn't exist.
    pub async fn create(&self, credential: &NewCredential) -> Result<Credential, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialRow>(concat!(
            r"
            INSERT INTO identity.credentials
                (user_id, provider, provider_id, profile, email, canonical_email, fingerprint,
                 is_verified, is_third_party_verified, is_signup_credential)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING ",
            credential_columns!()
        ))
        .bind(credential.binding.user_id())
        .bind(credential.profile.kind())
        .bind(credential.profile.provider_id())
        .bind(Json(&credential.profile))
        .bind(&credential.email)
        .bind(credential.canonical_email.as_str())
        .bind(credential.fingerprint.as_str())
        .bind(credential.is_verified)
        .bind(credential.is_third_party_verified)
        .bind(credential.is_signup_credential)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e)
                && let Some(user_id) = credential.binding.user_id()
            {
                return RepositoryError::not_found("user", user_id);
            }
            classify_error(e)
        })?;

        Credential::try_from(row)
    }

    /// Get a credential by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored profile is invalid.
    pub async fn get_by_id(&self, id: CredentialId) -> Result<Option<Credential>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialRow>(concat!(
            "SELECT ",
            credential_columns!(),
            " FROM identity.credentials WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Credential::try_from).transpose()
    }

    /// Get all credentials bound to a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_for_user(&self, user_id: UserId) -> Result<Vec<Credential>, RepositoryError> {
        let rows = sqlx::query_as::<_, CredentialRow>(concat!(
            "SELECT ",
            credential_columns!(),
            " FROM identity.credentials WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        into_credentials(rows)
    }

    /// Get every credential sharing a fingerprint, across providers, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<Credential>, RepositoryError> {
        let rows = sqlx::query_as::<_, CredentialRow>(concat!(
            "SELECT ",
            credential_columns!(),
            " FROM identity.credentials WHERE fingerprint = $1 ORDER BY id"
        ))
        .bind(fingerprint.as_str())
        .fetch_all(self.pool)
        .await?;

        into_credentials(rows)
    }

    /// Bind credentials to a user in one batched update, then re-read them.
    ///
    /// The rows are locked first so the ownership check and the update see
    /// the same state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if any id doesn't exist.
    /// Returns `RepositoryError::Conflict` if any credential is bound to
    /// another user.
    pub async fn bind_to_user(
        &self,
        ids: &[CredentialId],
        user_id: UserId,
    ) -> Result<Vec<Credential>, RepositoryError> {
        let ids = raw_ids(ids);
        let mut tx = self.pool.begin().await?;

        let owners: Vec<(i32, Option<i32>)> = sqlx::query_as(
            r"
            SELECT id, user_id
            FROM identity.credentials
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            ",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        for id in &ids {
            match owners.iter().find(|(found, _)| found == id) {
                None => return Err(RepositoryError::not_found("credential", id)),
                Some((_, Some(owner))) if *owner != user_id.as_i32() => {
                    return Err(RepositoryError::Conflict(format!(
                        "credential {id} is already bound to another user"
                    )));
                }
                Some(_) => {}
            }
        }

        sqlx::query(
            r"
            UPDATE identity.credentials
            SET user_id = $1, updated_at = NOW()
            WHERE id = ANY($2) AND user_id IS NULL
            ",
        )
        .bind(user_id)
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                return RepositoryError::not_found("user", user_id);
            }
            classify_error(e)
        })?;

        let rows = sqlx::query_as::<_, CredentialRow>(concat!(
            "SELECT ",
            credential_columns!(),
            " FROM identity.credentials WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        into_credentials(rows)
    }

    /// Mark a credential as verified by the platform.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the credential doesn't exist.
    pub async fn mark_verified(&self, id: CredentialId) -> Result<Credential, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialRow>(concat!(
            r"
            UPDATE identity.credentials
            SET is_verified = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING ",
            credential_columns!()
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Credential::try_from)
            .transpose()?
            .ok_or_else(|| RepositoryError::not_found("credential", id))
    }

    /// Flip the administrative kill-switch.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the credential doesn't exist.
    pub async fn set_disabled(
        &self,
        id: CredentialId,
        disabled: bool,
    ) -> Result<Credential, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialRow>(concat!(
            r"
            UPDATE identity.credentials
            SET is_disabled = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING ",
            credential_columns!()
        ))
        .bind(id)
        .bind(disabled)
        .fetch_optional(self.pool)
        .await?;

        row.map(Credential::try_from)
            .transpose()?
            .ok_or_else(|| RepositoryError::not_found("credential", id))
    }

    /// Move an email credential to a new address.
    ///
    /// Verification flags are cleared; the new address has not been proven.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no email credential has this id.
    /// Returns `RepositoryError::Conflict` if the address is already registered.
    pub async fn update_email(
        &self,
        id: CredentialId,
        email: &str,
        canonical_email: &CanonicalEmail,
        fingerprint: &Fingerprint,
    ) -> Result<Credential, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialRow>(concat!(
            r"
            UPDATE identity.credentials
            SET email = $2,
                canonical_email = $3,
                fingerprint = $4,
                is_verified = FALSE,
                is_third_party_verified = FALSE,
                updated_at = NOW()
            WHERE id = $1 AND provider = 'email_pass'
            RETURNING ",
            credential_columns!()
        ))
        .bind(id)
        .bind(email)
        .bind(canonical_email.as_str())
        .bind(fingerprint.as_str())
        .fetch_optional(self.pool)
        .await
        .map_err(classify_error)?;

        row.map(Credential::try_from)
            .transpose()?
            .ok_or_else(|| RepositoryError::not_found("email credential", id))
    }
}
