//! Shared fixtures for service tests.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use argon2::Params;
use async_trait::async_trait;
use secrecy::SecretString;

use likeness_core::{
    CanonicalEmail, Credential, CredentialId, Fingerprint, GitHubProfile, GoogleProfile,
    NewCredential, NewUser, OAuthProfile, PasswordDigest, PasswordRecord, ProviderEmail,
    ServiceAgreement, ServiceAgreementRecord, User, UserId, UserProfileUpdate,
};

use super::{AccountService, CredentialStore, PasswordVault, PepperedHasher};
use crate::db::{IdentityStore, MemoryIdentityStore, RepositoryError};
use crate::dns::{DomainClassifier, StaticMxResolver};

pub const PEPPER: &str = "kV8#qL2!zR6@wN4$tX9%bM1^hF7&cJ3*";

#[allow(clippy::unwrap_used)]
pub fn fast_params() -> Params {
    Params::new(256, 1, 1, Some(32)).unwrap()
}

pub fn hasher() -> PepperedHasher {
    PepperedHasher::new(SecretString::from(PEPPER), fast_params())
}

pub fn google_profile(subject: &str) -> OAuthProfile {
    OAuthProfile::Google(GoogleProfile {
        provider_id: subject.to_owned(),
        given_name: Some("Jane".to_owned()),
        family_name: Some("Doe".to_owned()),
        locale: Some("en".to_owned()),
    })
}

pub fn github_profile(id: &str) -> OAuthProfile {
    OAuthProfile::GitHub(GitHubProfile {
        provider_id: id.to_owned(),
        login: format!("user{id}"),
        node_id: format!("MDQ6VXNlcj{id}"),
        name: None,
        company: None,
        two_factor_authentication: true,
    })
}

/// Memory store, offline classifier and a cheap hasher.
///
/// `corp.test` is a Google Workspace domain; every other unknown domain
/// fails its MX lookup.
pub struct Env {
    pub store: MemoryIdentityStore,
    pub classifier: DomainClassifier,
    pub hasher: PepperedHasher,
}

#[allow(clippy::unwrap_used)]
impl Env {
    pub fn new() -> Self {
        let resolver =
            StaticMxResolver::new().with_domain("corp.test", ["aspmx.l.google.com."]);
        Self {
            store: MemoryIdentityStore::new(),
            classifier: DomainClassifier::new(Arc::new(resolver), Duration::from_millis(200)),
            hasher: hasher(),
        }
    }

    pub fn credentials(&self) -> CredentialStore<'_> {
        CredentialStore::new(&self.store, &self.classifier)
    }

    pub fn passwords(&self) -> PasswordVault<'_> {
        PasswordVault::new(&self.store, &self.hasher)
    }

    pub fn accounts(&self) -> AccountService<'_> {
        AccountService::new(&self.store)
    }

    pub async fn user(&self, username: &str) -> User {
        self.accounts()
            .create_user(
                &NewUser::new("Ada", "Lovelace", username).unwrap(),
                ServiceAgreement::accept(true, true).unwrap(),
            )
            .await
            .unwrap()
    }

    pub async fn email_account(&self, username: &str, email: &str) -> (User, Credential) {
        let user = self.user(username).await;
        let credential = self
            .credentials()
            .create_from_email_signup(email, user.id, true, false)
            .await
            .unwrap();
        (user, credential)
    }

    pub async fn unbound_google(&self, subject: &str, email: &str) -> Credential {
        self.credentials()
            .create_from_oauth(
                google_profile(subject),
                &ProviderEmail {
                    email: email.to_owned(),
                    verified: true,
                    primary: true,
                },
                false,
                false,
                None,
            )
            .await
            .unwrap()
    }
}

/// Memory store that yields to the scheduler before every call, so
/// concurrently joined service calls interleave between store round trips.
#[derive(Default)]
pub struct YieldingStore {
    pub inner: MemoryIdentityStore,
}

#[async_trait]
impl IdentityStore for YieldingStore {
    async fn create_user(
        &self,
        user: &NewUser,
        agreement: ServiceAgreement,
    ) -> Result<User, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.create_user(user, agreement).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_user(id).await
    }

    async fn update_user(
        &self,
        id: UserId,
        update: &UserProfileUpdate,
    ) -> Result<User, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.update_user(id, update).await
    }

    async fn get_service_agreement(
        &self,
        user_id: UserId,
    ) -> Result<Option<ServiceAgreementRecord>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_service_agreement(user_id).await
    }

    async fn insert_credential(
        &self,
        credential: &NewCredential,
    ) -> Result<Credential, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.insert_credential(credential).await
    }

    async fn get_credential(
        &self,
        id: CredentialId,
    ) -> Result<Option<Credential>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.get_credential(id).await
    }

    async fn credentials_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Credential>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.credentials_for_user(user_id).await
    }

    async fn credentials_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<Credential>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.credentials_by_fingerprint(fingerprint).await
    }

    async fn bind_credentials(
        &self,
        ids: &[CredentialId],
        user_id: UserId,
    ) -> Result<Vec<Credential>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.bind_credentials(ids, user_id).await
    }

    async fn set_credential_verified(
        &self,
        id: CredentialId,
    ) -> Result<Credential, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.set_credential_verified(id).await
    }

    async fn set_credential_disabled(
        &self,
        id: CredentialId,
        disabled: bool,
    ) -> Result<Credential, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.set_credential_disabled(id, disabled).await
    }

    async fn update_credential_email(
        &self,
        id: CredentialId,
        email: &str,
        canonical_email: &CanonicalEmail,
        fingerprint: &Fingerprint,
    ) -> Result<Credential, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner
            .update_credential_email(id, email, canonical_email, fingerprint)
            .await
    }

    async fn current_password(
        &self,
        credential_id: CredentialId,
    ) -> Result<Option<PasswordRecord>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.current_password(credential_id).await
    }

    async fn password_records(
        &self,
        credential_id: CredentialId,
    ) -> Result<Vec<PasswordRecord>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.password_records(credential_id).await
    }

    async fn password_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PasswordDigest>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.password_history(user_id).await
    }

    async fn rotate_password(
        &self,
        credential_id: CredentialId,
        digest: &PasswordDigest,
    ) -> Result<PasswordRecord, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner.rotate_password(credential_id, digest).await
    }

    async fn rotate_password_unless_reused(
        &self,
        credential_id: CredentialId,
        owner: UserId,
        digest: &PasswordDigest,
    ) -> Result<Option<PasswordRecord>, RepositoryError> {
        tokio::task::yield_now().await;
        self.inner
            .rotate_password_unless_reused(credential_id, owner, digest)
            .await
    }
}
