//! In-process [`IdentityStore`].
//!
//! All state sits behind one mutex, so every call is trivially atomic. The
//! same uniqueness, binding and single-current-password rules as the
//! `PostgreSQL` schema are enforced here.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use likeness_core::{
    Binding, CanonicalEmail, Credential, CredentialId, Fingerprint, NewCredential, NewUser,
    PasswordDigest, PasswordRecord, PasswordRecordId, ProviderKind, ServiceAgreement,
    ServiceAgreementRecord, User, UserId, UserProfileUpdate,
};

use super::{IdentityStore, RepositoryError};

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    agreements: Vec<ServiceAgreementRecord>,
    credentials: Vec<Credential>,
    passwords: Vec<PasswordRecord>,
    next_user_id: i32,
    next_credential_id: i32,
    next_password_id: i32,
}

impl MemoryState {
    fn user_exists(&self, id: UserId) -> bool {
        self.users.iter().any(|u| u.id == id)
    }

    fn credential_mut(&mut self, id: CredentialId) -> Result<&mut Credential, RepositoryError> {
        self.credentials
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RepositoryError::not_found("credential", id))
    }

    fn username_taken(&self, username: &str, except: Option<UserId>) -> bool {
        self.users
            .iter()
            .any(|u| u.username.as_str() == username && Some(u.id) != except)
    }

    fn password_history(&self, user_id: UserId) -> Vec<PasswordDigest> {
        let owned: Vec<CredentialId> = self
            .credentials
            .iter()
            .filter(|c| c.user_id() == Some(user_id))
            .map(|c| c.id)
            .collect();

        self.passwords
            .iter()
            .filter(|p| owned.contains(&p.credential_id))
            .map(|p| p.digest.clone())
            .collect()
    }

    fn rotate_password(
        &mut self,
        credential_id: CredentialId,
        digest: &PasswordDigest,
    ) -> Result<PasswordRecord, RepositoryError> {
        self.credential_mut(credential_id)?;

        let mut previous = None;
        for record in &mut self.passwords {
            if record.credential_id == credential_id && record.is_current {
                record.is_current = false;
                previous = Some(record.digest.clone());
            }
        }

        let record = PasswordRecord {
            id: PasswordRecordId::new(next(&mut self.next_password_id)),
            credential_id,
            digest: digest.clone(),
            previous_digest: previous,
            is_current: true,
            created_at: Utc::now(),
        };
        self.passwords.push(record.clone());
        Ok(record)
    }

    fn email_fingerprint_taken(&self, fingerprint: &Fingerprint, except: Option<CredentialId>) -> bool {
        self.credentials.iter().any(|c| {
            c.provider() == ProviderKind::EmailPass
                && &c.fingerprint == fingerprint
                && Some(c.id) != except
        })
    }
}

/// Store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    state: Mutex<MemoryState>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn next(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_user(
        &self,
        user: &NewUser,
        agreement: ServiceAgreement,
    ) -> Result<User, RepositoryError> {
        let mut state = self.lock();
        if state.username_taken(user.username.as_str(), None) {
            return Err(RepositoryError::Conflict("username already exists".to_owned()));
        }

        let now = Utc::now();
        let created = User {
            id: UserId::new(next(&mut state.next_user_id)),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.username.clone(),
            created_at: now,
            updated_at: now,
        };
        state.agreements.push(ServiceAgreementRecord {
            user_id: created.id,
            agreement,
            created_at: now,
        });
        state.users.push(created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn update_user(
        &self,
        id: UserId,
        update: &UserProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let mut state = self.lock();
        if let Some(username) = &update.username
            && state.username_taken(username.as_str(), Some(id))
        {
            return Err(RepositoryError::Conflict("username already exists".to_owned()));
        }

        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| RepositoryError::not_found("user", id))?;
        update.apply(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn get_service_agreement(
        &self,
        user_id: UserId,
    ) -> Result<Option<ServiceAgreementRecord>, RepositoryError> {
        Ok(self
            .lock()
            .agreements
            .iter()
            .find(|a| a.user_id == user_id)
            .cloned())
    }

    async fn insert_credential(
        &self,
        credential: &NewCredential,
    ) -> Result<Credential, RepositoryError> {
        let mut state = self.lock();
        let provider = credential.profile.kind();

        if let Some(user_id) = credential.binding.user_id()
            && !state.user_exists(user_id)
        {
            return Err(RepositoryError::not_found("user", user_id));
        }
        if provider == ProviderKind::EmailPass && !credential.binding.is_bound() {
            return Err(RepositoryError::DataCorruption(
                "email credentials must be bound to a user".to_owned(),
            ));
        }
        if provider == ProviderKind::EmailPass
            && state.email_fingerprint_taken(&credential.fingerprint, None)
        {
            return Err(RepositoryError::Conflict(
                "an email credential already exists for this address".to_owned(),
            ));
        }
        if let Some(provider_id) = credential.profile.provider_id()
            && state.credentials.iter().any(|c| {
                c.provider() == provider && c.profile.provider_id() == Some(provider_id)
            })
        {
            return Err(RepositoryError::Conflict(
                "this provider account is already linked".to_owned(),
            ));
        }

        let now = Utc::now();
        let created = Credential {
            id: CredentialId::new(next(&mut state.next_credential_id)),
            binding: credential.binding,
            profile: credential.profile.clone(),
            email: credential.email.clone(),
            canonical_email: credential.canonical_email.clone(),
            fingerprint: credential.fingerprint.clone(),
            is_verified: credential.is_verified,
            is_third_party_verified: credential.is_third_party_verified,
            is_signup_credential: credential.is_signup_credential,
            is_disabled: false,
            created_at: now,
            updated_at: now,
        };
        state.credentials.push(created.clone());
        Ok(created)
    }

    async fn get_credential(
        &self,
        id: CredentialId,
    ) -> Result<Option<Credential>, RepositoryError> {
        Ok(self.lock().credentials.iter().find(|c| c.id == id).cloned())
    }

    async fn credentials_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Credential>, RepositoryError> {
        Ok(self
            .lock()
            .credentials
            .iter()
            .filter(|c| c.user_id() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn credentials_by_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Vec<Credential>, RepositoryError> {
        Ok(self
            .lock()
            .credentials
            .iter()
            .filter(|c| &c.fingerprint == fingerprint)
            .cloned()
            .collect())
    }

    async fn bind_credentials(
        &self,
        ids: &[CredentialId],
        user_id: UserId,
    ) -> Result<Vec<Credential>, RepositoryError> {
        let mut state = self.lock();

        for id in ids {
            let credential = state
                .credentials
                .iter()
                .find(|c| c.id == *id)
                .ok_or_else(|| RepositoryError::not_found("credential", id))?;
            if !credential.binding.can_bind_to(user_id) {
                return Err(RepositoryError::Conflict(format!(
                    "credential {id} is already bound to another user"
                )));
            }
        }
        if !state.user_exists(user_id) {
            return Err(RepositoryError::not_found("user", user_id));
        }

        let now = Utc::now();
        let mut bound = Vec::with_capacity(ids.len());
        for credential in &mut state.credentials {
            if !ids.contains(&credential.id) {
                continue;
            }
            if credential.binding == Binding::Unbound {
                credential.binding = Binding::Bound(user_id);
                credential.updated_at = now;
            }
            bound.push(credential.clone());
        }
        Ok(bound)
    }

    async fn set_credential_verified(
        &self,
        id: CredentialId,
    ) -> Result<Credential, RepositoryError> {
        let mut state = self.lock();
        let credential = state.credential_mut(id)?;
        credential.is_verified = true;
        credential.updated_at = Utc::now();
        Ok(credential.clone())
    }

    async fn set_credential_disabled(
        &self,
        id: CredentialId,
        disabled: bool,
    ) -> Result<Credential, RepositoryError> {
        let mut state = self.lock();
        let credential = state.credential_mut(id)?;
        credential.is_disabled = disabled;
        credential.updated_at = Utc::now();
        Ok(credential.clone())
    }

    async fn update_credential_email(
        &self,
        id: CredentialId,
        email: &str,
        canonical_email: &CanonicalEmail,
        fingerprint: &Fingerprint,
    ) -> Result<Credential, RepositoryError> {
        let mut state = self.lock();
        if state.email_fingerprint_taken(fingerprint, Some(id)) {
            return Err(RepositoryError::Conflict(
                "an email credential already exists for this address".to_owned(),
            ));
        }

        let credential = state
            .credentials
            .iter_mut()
            .find(|c| c.id == id && c.provider() == ProviderKind::EmailPass)
            .ok_or_else(|| RepositoryError::not_found("email credential", id))?;
        email.clone_into(&mut credential.email);
        credential.canonical_email = canonical_email.clone();
        credential.fingerprint = fingerprint.clone();
        credential.is_verified = false;
        credential.is_third_party_verified = false;
        credential.updated_at = Utc::now();
        Ok(credential.clone())
    }

    async fn current_password(
        &self,
        credential_id: CredentialId,
    ) -> Result<Option<PasswordRecord>, RepositoryError> {
        Ok(self
            .lock()
            .passwords
            .iter()
            .find(|p| p.credential_id == credential_id && p.is_current)
            .cloned())
    }

    async fn password_records(
        &self,
        credential_id: CredentialId,
    ) -> Result<Vec<PasswordRecord>, RepositoryError> {
        Ok(self
            .lock()
            .passwords
            .iter()
            .filter(|p| p.credential_id == credential_id)
            .cloned()
            .collect())
    }

    async fn password_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PasswordDigest>, RepositoryError> {
        Ok(self.lock().password_history(user_id))
    }

    async fn rotate_password(
        &self,
        credential_id: CredentialId,
        digest: &PasswordDigest,
    ) -> Result<PasswordRecord, RepositoryError> {
        self.lock().rotate_password(credential_id, digest)
    }

    async fn rotate_password_unless_reused(
        &self,
        credential_id: CredentialId,
        owner: UserId,
        digest: &PasswordDigest,
    ) -> Result<Option<PasswordRecord>, RepositoryError> {
        let mut state = self.lock();
        if !state.user_exists(owner) {
            return Err(RepositoryError::not_found("user", owner));
        }
        if state.credential_mut(credential_id)?.user_id() != Some(owner) {
            return Err(RepositoryError::Conflict(
                "credential is bound to a different user".to_owned(),
            ));
        }
        if state.password_history(owner).contains(digest) {
            return Ok(None);
        }

        state.rotate_password(credential_id, digest).map(Some)
    }
}
