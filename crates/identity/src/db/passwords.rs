//! Password history repository.
//!
//! Rows in `identity.email_passwords` are append-only apart from the
//! `is_current` flag, which moves to the newest row on every rotation.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use likeness_core::{CredentialId, PasswordDigest, PasswordRecord, PasswordRecordId, UserId};

use super::RepositoryError;

#[derive(sqlx::FromRow)]
struct PasswordRow {
    id: i32,
    credential_id: i32,
    password_hash: String,
    previous_hash: Option<String>,
    is_current: bool,
    created_at: DateTime<Utc>,
}

impl From<PasswordRow> for PasswordRecord {
    fn from(r: PasswordRow) -> Self {
        Self {
            id: PasswordRecordId::new(r.id),
            credential_id: CredentialId::new(r.credential_id),
            digest: PasswordDigest::from_stored(r.password_hash),
            previous_digest: r.previous_hash.map(PasswordDigest::from_stored),
            is_current: r.is_current,
            created_at: r.created_at,
        }
    }
}

/// Repository for password history operations.
pub struct PasswordRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PasswordRepository<'a> {
    /// Create a new password repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the current password record of a credential.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_current(
        &self,
        credential_id: CredentialId,
    ) -> Result<Option<PasswordRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, PasswordRow>(
            r"
            SELECT id, credential_id, password_hash, previous_hash, is_current, created_at
            FROM identity.email_passwords
            WHERE credential_id = $1 AND is_current
            ",
        )
        .bind(credential_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(PasswordRecord::from))
    }

    /// Get every password record of a credential, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_all(
        &self,
        credential_id: CredentialId,
    ) -> Result<Vec<PasswordRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, PasswordRow>(
            r"
            SELECT id, credential_id, password_hash, previous_hash, is_current, created_at
            FROM identity.email_passwords
            WHERE credential_id = $1
            ORDER BY id
            ",
        )
        .bind(credential_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(PasswordRecord::from).collect())
    }

    /// Get every digest stored for any credential of a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_history_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PasswordDigest>, RepositoryError> {
        let hashes: Vec<String> = sqlx::query_scalar(
            r"
            SELECT p.password_hash
            FROM identity.email_passwords p
            JOIN identity.credentials c ON c.id = p.credential_id
            WHERE c.user_id = $1
            ORDER BY p.id
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(hashes.into_iter().map(PasswordDigest::from_stored).collect())
    }

    /// Replace the current password of a credential.
    ///
    /// Locks the credential row, retires the current record and inserts the
    /// new one in a single transaction, so concurrent rotations serialize and
    /// a crash can never leave zero or two current records.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the credential doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn rotate(
        &self,
        credential_id: CredentialId,
        digest: &PasswordDigest,
    ) -> Result<PasswordRecord, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if lock_credential(&mut tx, credential_id).await?.is_none() {
            return Err(RepositoryError::not_found("credential", credential_id));
        }

        let record = insert_current(&mut tx, credential_id, digest).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Replace the current password unless `owner` has ever used `digest`.
    ///
    /// The owner's user row is locked before the history is read, so two
    /// concurrent changes for the same account run one after the other and
    /// the second one sees the first one's digest.
    ///
    /// Returns `Ok(None)` without writing anything when the digest is reused.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user or credential doesn't exist.
    /// Returns `RepositoryError::Conflict` if the credential belongs to someone else.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn rotate_unless_reused(
        &self,
        credential_id: CredentialId,
        owner: UserId,
        digest: &PasswordDigest,
    ) -> Result<Option<PasswordRecord>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let user: Option<i32> = sqlx::query_scalar(
            r"
            SELECT id FROM identity.users
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;

        if user.is_none() {
            return Err(RepositoryError::not_found("user", owner));
        }

        match lock_credential(&mut tx, credential_id).await? {
            None => return Err(RepositoryError::not_found("credential", credential_id)),
            Some(locked) if locked.user_id != Some(owner.as_i32()) => {
                return Err(RepositoryError::Conflict(
                    "credential is bound to a different user".to_owned(),
                ));
            }
            Some(_) => {}
        }

        let reused: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1
                FROM identity.email_passwords p
                JOIN identity.credentials c ON c.id = p.credential_id
                WHERE c.user_id = $1 AND p.password_hash = $2
            )
            ",
        )
        .bind(owner)
        .bind(digest.as_str())
        .fetch_one(&mut *tx)
        .await?;

        if reused {
            return Ok(None);
        }

        let record = insert_current(&mut tx, credential_id, digest).await?;
        tx.commit().await?;

        Ok(Some(record))
    }
}

#[derive(sqlx::FromRow)]
struct LockedCredential {
    user_id: Option<i32>,
}

/// Lock a credential row; `None` when it doesn't exist.
async fn lock_credential(
    tx: &mut Transaction<'_, Postgres>,
    credential_id: CredentialId,
) -> Result<Option<LockedCredential>, RepositoryError> {
    let row = sqlx::query_as::<_, LockedCredential>(
        r"
        SELECT user_id FROM identity.credentials
        WHERE id = $1
        FOR UPDATE
        ",
    )
    .bind(credential_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

/// Retire the current record of a locked credential and insert its successor.
async fn insert_current(
    tx: &mut Transaction<'_, Postgres>,
    credential_id: CredentialId,
    digest: &PasswordDigest,
) -> Result<PasswordRecord, RepositoryError> {
    let previous: Option<String> = sqlx::query_scalar(
        r"
        UPDATE identity.email_passwords
        SET is_current = FALSE
        WHERE credential_id = $1 AND is_current
        RETURNING password_hash
        ",
    )
    .bind(credential_id)
    .fetch_optional(&mut **tx)
    .await?;

    let row = sqlx::query_as::<_, PasswordRow>(
        r"
        INSERT INTO identity.email_passwords
            (credential_id, password_hash, previous_hash, is_current)
        VALUES ($1, $2, $3, TRUE)
        RETURNING id, credential_id, password_hash, previous_hash, is_current, created_at
        ",
    )
    .bind(credential_id)
    .bind(digest.as_str())
    .bind(previous)
    .fetch_one(&mut **tx)
    .await?;

    Ok(PasswordRecord::from(row))
}
