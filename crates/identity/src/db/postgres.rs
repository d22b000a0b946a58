//! [`IdentityStore`] backed by `PostgreSQL`.

use async_trait::async_trait;
use sqlx::PgPool;

use likeness_core::{
    CanonicalEmail, Credential, CredentialId, Fingerprint, NewCredential, NewUser,
    PasswordDigest, PasswordRecord, ServiceAgreement, ServiceAgreementRecord, User, UserId,
    UserProfileUpdate,
};

use super::{
    CredentialRepository, IdentityStore, PasswordRepository, RepositoryError, UserRepository,
};

/// Production store; each call is a single statement or transaction.
#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    const fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.pool)
    }

    const fn credentials(&self) -> CredentialRepository<'_> {
        CredentialRepository::new(&self.pool)
    }

    const fn passwords(&self) -> PasswordRepository<'_> {
        PasswordRepository::new(&self.pool)
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn create_user(
        &self,
        user: &NewUser,
        agreement: ServiceAgreement,
    ) -> Result<User, RepositoryError> {
        self.users().create_with_agreement(user, agreement).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.users().get_by_id(id).await
    }

    async fn update_user(
        &self,
        id: UserId,
        update: &UserProfileUpdate,
    ) -> Result<User, RepositoryError> {
        self.users().update_profile(id, update).await
    }

    async fn get_service_agreement(
        &self,
        user_id: UserId,
    ) -> Result<Option<ServiceAgreementRecord>, RepositoryError> {
        self.users().get_service_agreement(user_id).await
    }

    async fn insert_credential(
        &self,
        credential: &NewCredential,
    ) -> Result<Credential, RepositoryError> {
        self.credentials().create(credential).await
    }

    async fn get_credential(
        &self,
        id: CredentialId,
    ) -> Result<Option<Credential>, RepositoryError> {
        self.credentials().get_by_id(id).await
    }

    async fn credentials_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Credential>, RepositoryError> {
        self.credentials().get_for_user(user_id).await
    }

    async fn credentials_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<Credential>, RepositoryError> {
        self.credentials().get_by_fingerprint(fingerprint).await
    }

    async fn bind_credentials(
        &self,
        ids: &[CredentialId],
        user_id: UserId,
    ) -> Result<Vec<Credential>, RepositoryError> {
        self.credentials().bind_to_user(ids, user_id).await
    }

    async fn set_credential_verified(
        &self,
        id: CredentialId,
    ) -> Result<Credential, RepositoryError> {
        self.credentials().mark_verified(id).await
    }

    async fn set_credential_disabled(
        &self,
        id: CredentialId,
        disabled: bool,
    ) -> Result<Credential, RepositoryError> {
        self.credentials().set_disabled(id, disabled).await
    }

    async fn update_credential_email(
        &self,
        id: CredentialId,
        email: &str,
        canonical_email: &CanonicalEmail,
        fingerprint: &Fingerprint,
    ) -> Result<Credential, RepositoryError> {
        self.credentials()
            .update_email(id, email, canonical_email, fingerprint)
            .await
    }

    async fn current_password(
        &self,
        credential_id: CredentialId,
    ) -> Result<Option<PasswordRecord>, RepositoryError> {
        self.passwords().get_current(credential_id).await
    }

    async fn password_records(
        &self,
        credential_id: CredentialId,
    ) -> Result<Vec<PasswordRecord>, RepositoryError> {
        self.passwords().get_all(credential_id).await
    }

    async fn password_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PasswordDigest>, RepositoryError> {
        self.passwords().get_history_for_user(user_id).await
    }

    async fn rotate_password(
        &self,
        credential_id: CredentialId,
        digest: &PasswordDigest,
    ) -> Result<PasswordRecord, RepositoryError> {
        self.passwords().rotate(credential_id, digest).await
    }

    async fn rotate_password_unless_reused(
        &self,
        credential_id: CredentialId,
        owner: UserId,
        digest: &PasswordDigest,
    ) -> Result<Option<PasswordRecord>, RepositoryError> {
        self.passwords()
            .rotate_unless_reused(credential_id, owner, digest)
            .await
    }
}
