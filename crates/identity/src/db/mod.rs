//! Persistence for identity data.
//!
//! # Database
//!
//! Everything lives in the `identity` schema:
//!
//! ## Tables
//!
//! - `users` - Identity roots (unique `username`)
//! - `service_agreements` - One row per user, full consent only
//! - `credentials` - Authentication methods, optionally bound to a user
//! - `email_passwords` - Password history of email credentials
//!
//! # Migrations
//!
//! Migrations are stored in `crates/identity/migrations/` and run via:
//! ```bash
//! cargo run -p likeness-cli -- migrate
//! ```
//!
//! # Stores
//!
//! Services talk to an [`IdentityStore`]. [`PgIdentityStore`] is the
//! production implementation; [`MemoryIdentityStore`] keeps everything in
//! process and enforces the same uniqueness and binding rules.

pub mod credentials;
pub mod memory;
pub mod passwords;
pub mod postgres;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use likeness_core::{
    CanonicalEmail, Credential, CredentialId, Fingerprint, NewCredential, NewUser,
    PasswordDigest, PasswordRecord, ServiceAgreement, ServiceAgreementRecord, User, UserId,
    UserProfileUpdate,
};

pub use credentials::CredentialRepository;
pub use memory::MemoryIdentityStore;
pub use passwords::PasswordRepository;
pub use postgres::PgIdentityStore;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Update or lookup by id against a missing row.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity name, e.g. `credential`.
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// Constraint violation (e.g., duplicate username).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Storage operations the identity services rely on.
///
/// Every method is one atomic unit of work. Implementations enforce:
/// - unique usernames
/// - one email credential per fingerprint
/// - one credential per OAuth provider account
/// - a bound credential never changes owner
/// - exactly one current password record per credential after a rotation
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert a user together with its service agreement.
    async fn create_user(
        &self,
        user: &NewUser,
        agreement: ServiceAgreement,
    ) -> Result<User, RepositoryError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Apply a profile update; `NotFound` when the user does not exist.
    async fn update_user(
        &self,
        id: UserId,
        update: &UserProfileUpdate,
    ) -> Result<User, RepositoryError>;

    async fn get_service_agreement(
        &self,
        user_id: UserId,
    ) -> Result<Option<ServiceAgreementRecord>, RepositoryError>;

    /// Insert a credential; `NotFound` when it is pre-bound to a missing user.
    async fn insert_credential(
        &self,
        credential: &NewCredential,
    ) -> Result<Credential, RepositoryError>;

    async fn get_credential(&self, id: CredentialId)
    -> Result<Option<Credential>, RepositoryError>;

    /// Credentials bound to `user_id`, ordered by id.
    async fn credentials_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Credential>, RepositoryError>;

    /// Credentials of every provider sharing `fingerprint`, ordered by id.
    async fn credentials_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<Credential>, RepositoryError>;

    /// Bind all `ids` to `user_id` in one batch and re-read them.
    ///
    /// Fails without changing anything if an id is missing (`NotFound`) or
    /// a credential is bound to someone else (`Conflict`).
    async fn bind_credentials(
        &self,
        ids: &[CredentialId],
        user_id: UserId,
    ) -> Result<Vec<Credential>, RepositoryError>;

    async fn set_credential_verified(
        &self,
        id: CredentialId,
    ) -> Result<Credential, RepositoryError>;

    async fn set_credential_disabled(
        &self,
        id: CredentialId,
        disabled: bool,
    ) -> Result<Credential, RepositoryError>;

    /// Point an email credential at a new address and clear its
    /// verification flags.
    async fn update_credential_email(
        &self,
        id: CredentialId,
        email: &str,
        canonical_email: &CanonicalEmail,
        fingerprint: &Fingerprint,
    ) -> Result<Credential, RepositoryError>;

    async fn current_password(
        &self,
        credential_id: CredentialId,
    ) -> Result<Option<PasswordRecord>, RepositoryError>;

    /// All password records of a credential, oldest first.
    async fn password_records(
        &self,
        credential_id: CredentialId,
    ) -> Result<Vec<PasswordRecord>, RepositoryError>;

    /// Every digest ever stored for any credential of `user_id`.
    async fn password_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PasswordDigest>, RepositoryError>;

    /// Retire the current record (if any) and insert `digest` as the new
    /// current record, atomically.
    async fn rotate_password(
        &self,
        credential_id: CredentialId,
        digest: &PasswordDigest,
    ) -> Result<PasswordRecord, RepositoryError>;

    /// Rotate like [`IdentityStore::rotate_password`] unless `digest` appears
    /// anywhere in `owner`'s password history.
    ///
    /// The history check and the rotation are one atomic unit. Returns
    /// `Ok(None)` without writing when the digest was used before.
    async fn rotate_password_unless_reused(
        &self,
        credential_id: CredentialId,
        owner: UserId,
        digest: &PasswordDigest,
    ) -> Result<Option<PasswordRecord>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Apply the bundled migrations.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Translate unique-constraint violations into [`RepositoryError::Conflict`].
pub(crate) fn classify_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        let message = match db_err.constraint() {
            Some("users_username_key") => "username already exists",
            Some("credentials_email_fingerprint_key") => {
                "an email credential already exists for this address"
            }
            Some("credentials_provider_account_key") => "this provider account is already linked",
            Some("credentials_single_owner") => "credential is already bound to another user",
            Some("service_agreements_user_id_key") => "service agreement already recorded",
            _ => "duplicate value",
        };
        return RepositoryError::Conflict(message.to_owned());
    }
    RepositoryError::Database(e)
}

/// Whether `e` is a foreign key violation.
pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}
