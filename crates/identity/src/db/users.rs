//! User repository for database operations.
//!
//! This module provides database access for users and their service
//! agreements.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use likeness_core::{
    NewUser, ServiceAgreement, ServiceAgreementRecord, User, UserId, UserProfileUpdate, Username,
};

use super::{RepositoryError, classify_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    first_name: String,
    last_name: String,
    username: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: UserId::new(r.id),
            first_name: r.first_name,
            last_name: r.last_name,
            username: Username::from_stored(r.username),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AgreementRow {
    user_id: i32,
    agreed_to_tos: bool,
    agreed_to_privacy_policy: bool,
    created_at: DateTime<Utc>,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, first_name, last_name, username, created_at, updated_at
            FROM identity.users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    /// Create a new user and record their service agreement.
    ///
    /// Both rows are written in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the username already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_with_agreement(
        &self,
        user: &NewUser,
        agreement: ServiceAgreement,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO identity.users (first_name, last_name, username)
            VALUES ($1, $2, $3)
            RETURNING id, first_name, last_name, username, created_at, updated_at
            ",
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.username.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(classify_error)?;

        sqlx::query(
            r"
            INSERT INTO identity.service_agreements
                (user_id, agreed_to_tos, agreed_to_privacy_policy)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(row.id)
        .bind(agreement.agreed_to_tos())
        .bind(agreement.agreed_to_privacy_policy())
        .execute(&mut *tx)
        .await
        .map_err(classify_error)?;

        tx.commit().await?;

        Ok(User::from(row))
    }

    /// Update the owner-editable profile fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new username is taken.
    pub async fn update_profile(
        &self,
        id: UserId,
        update: &UserProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE identity.users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                username = COALESCE($4, username),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, first_name, last_name, username, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .bind(update.username.as_ref().map(Username::as_str))
        .fetch_optional(self.pool)
        .await
        .map_err(classify_error)?;

        row.map(User::from)
            .ok_or_else(|| RepositoryError::not_found("user", id))
    }

    /// Get the service agreement of a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a stored row records
    /// partial consent.
    pub async fn get_service_agreement(
        &self,
        user_id: UserId,
    ) -> Result<Option<ServiceAgreementRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, AgreementRow>(
            r"
            SELECT user_id, agreed_to_tos, agreed_to_privacy_policy, created_at
            FROM identity.service_agreements
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        let Some(r) = row else {
            return Ok(None);
        };

        let agreement = ServiceAgreement::accept(r.agreed_to_tos, r.agreed_to_privacy_policy)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid agreement: {e}")))?;

        Ok(Some(ServiceAgreementRecord {
            user_id: UserId::new(r.user_id),
            agreement,
            created_at: r.created_at,
        }))
    }
}
