//! Credential creation, linking and lookup.

use tracing::{debug, info, instrument, warn};

use likeness_core::{
    Binding, CanonicalEmail, Credential, CredentialId, Email, Fingerprint, NewCredential,
    OAuthProfile, ProviderEmail, ProviderKind, ProviderProfile, UserId, Violations, predicates,
};

use super::IdentityError;
use crate::db::IdentityStore;
use crate::dns::DomainClassifier;

/// Canonical identity of a raw address.
struct Normalized {
    canonical: CanonicalEmail,
    fingerprint: Fingerprint,
}

fn parse_email(raw: &str) -> Result<Email, IdentityError> {
    Email::parse(raw).map_err(|e| Violations::single("email", e.to_string()).into())
}

/// Credential operations.
pub struct CredentialStore<'a> {
    store: &'a dyn IdentityStore,
    classifier: &'a DomainClassifier,
}

impl<'a> CredentialStore<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn IdentityStore, classifier: &'a DomainClassifier) -> Self {
        Self { store, classifier }
    }

    async fn normalize(&self, email: &str) -> Normalized {
        let google = self.classifier.is_google_managed(email).await;
        let canonical = likeness_core::normalize::canonicalize(email, google);
        let fingerprint = Fingerprint::of(&canonical);
        Normalized {
            canonical,
            fingerprint,
        }
    }

    /// Record a completed OAuth exchange.
    ///
    /// The credential is verified if either the platform or the provider
    /// vouches for the address. Without `user` it starts unbound.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` if the address is malformed.
    /// Returns `IdentityError::Conflict` if the provider account is already linked.
    /// Returns `IdentityError::NotFound` if `user` doesn't exist.
    #[instrument(skip(self, profile, email), fields(provider = %profile.kind()))]
    pub async fn create_from_oauth(
        &self,
        profile: OAuthProfile,
        email: &ProviderEmail,
        is_signup_credential: bool,
        platform_verified: bool,
        user: Option<UserId>,
    ) -> Result<Credential, IdentityError> {
        let address = parse_email(&email.email)?;
        let normalized = self.normalize(address.as_str()).await;

        let credential = self
            .store
            .insert_credential(&NewCredential {
                binding: Binding::from(user),
                profile: ProviderProfile::from(profile),
                email: address.into_inner(),
                canonical_email: normalized.canonical,
                fingerprint: normalized.fingerprint,
                is_verified: platform_verified || email.verified,
                is_third_party_verified: email.verified,
                is_signup_credential,
            })
            .await?;

        info!(
            credential_id = %credential.id,
            fingerprint = %credential.fingerprint,
            bound = credential.binding.is_bound(),
            "OAuth credential created"
        );
        Ok(credential)
    }

    /// Record an email/password signup. Always bound to `user`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Validation` if the address is malformed.
    /// Returns `IdentityError::Conflict` if the address is already registered.
    /// Returns `IdentityError::NotFound` if `user` doesn't exist.
    #[instrument(skip(self, email), fields(user_id = %user))]
    pub async fn create_from_email_signup(
        &self,
        email: &str,
        user: UserId,
        is_signup_credential: bool,
        platform_verified: bool,
    ) -> Result<Credential, IdentityError> {
        let address = parse_email(email)?;
        let normalized = self.normalize(address.as_str()).await;

        let credential = self
            .store
            .insert_credential(&NewCredential {
                binding: Binding::Bound(user),
                profile: ProviderProfile::Email,
                email: address.into_inner(),
                canonical_email: normalized.canonical,
                fingerprint: normalized.fingerprint,
                is_verified: platform_verified,
                is_third_party_verified: false,
                is_signup_credential,
            })
            .await?;

        info!(
            credential_id = %credential.id,
            fingerprint = %credential.fingerprint,
            "Email credential created"
        );
        Ok(credential)
    }

    /// Owner of the first bound credential whose address is equivalent to
    /// `email`, across all providers.
    ///
    /// When equivalent credentials belong to different users the lowest
    /// credential id wins and the disagreement is logged.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Repository` if the lookup fails.
    #[instrument(skip(self, email))]
    pub async fn lookup_user_for_email(&self, email: &str) -> Result<Option<UserId>, IdentityError> {
        let normalized = self.normalize(email).await;
        let matches = self
            .store
            .credentials_by_fingerprint(&normalized.fingerprint)
            .await?;

        let mut owners = matches.iter().filter_map(Credential::user_id);
        let Some(first) = owners.next() else {
            debug!(fingerprint = %normalized.fingerprint, candidates = matches.len(), "No bound credential");
            return Ok(None);
        };

        let others: Vec<UserId> = owners.filter(|owner| *owner != first).collect();
        if !others.is_empty() {
            warn!(
                fingerprint = %normalized.fingerprint,
                chosen = %first,
                other_owners = ?others,
                "Equivalent credentials belong to different users; using the first match"
            );
        }

        Ok(Some(first))
    }

    /// Bind every credential in `ids` to `user` and return the re-read rows.
    ///
    /// Rebinding to the current owner is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if an id or the user doesn't exist.
    /// Returns `IdentityError::Conflict` if a credential belongs to someone else.
    #[instrument(skip(self, ids), fields(user_id = %user, count = ids.len()))]
    pub async fn attach_user_to_credentials(
        &self,
        ids: &[CredentialId],
        user: UserId,
    ) -> Result<Vec<Credential>, IdentityError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let bound = self.store.bind_credentials(ids, user).await?;
        info!(bound = bound.len(), "Credentials attached");
        Ok(bound)
    }

    /// Whether an email-only account may move its email credential to
    /// `proposed_email`.
    ///
    /// Requires the account to hold no OAuth credential and the proposal to
    /// be unknown to every provider.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Repository` if the lookup fails.
    pub async fn user_can_update_email_auth_address(
        &self,
        credentials: &[Credential],
        proposed_email: &str,
    ) -> Result<bool, IdentityError> {
        let normalized = self.normalize(proposed_email).await;
        self.may_move_to(credentials, &normalized.fingerprint).await
    }

    async fn may_move_to(
        &self,
        credentials: &[Credential],
        fingerprint: &Fingerprint,
    ) -> Result<bool, IdentityError> {
        if !predicates::has_only_email(credentials) {
            return Ok(false);
        }

        let taken = self.store.credentials_by_fingerprint(fingerprint).await?;
        Ok(taken.is_empty())
    }

    /// Move an email credential to `new_email`, clearing its verification.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the credential doesn't exist.
    /// Returns `IdentityError::Validation` if it isn't a bound email
    /// credential, the address is malformed, or the move isn't allowed.
    /// Returns `IdentityError::Conflict` if the address was registered
    /// concurrently.
    #[instrument(skip(self, new_email), fields(credential_id = %credential_id))]
    pub async fn update_email_auth_address(
        &self,
        credential_id: CredentialId,
        new_email: &str,
    ) -> Result<Credential, IdentityError> {
        let credential = self.credential(credential_id).await?;
        if credential.provider() != ProviderKind::EmailPass {
            return Err(Violations::single("credential", "not an email credential").into());
        }
        let Some(owner) = credential.user_id() else {
            return Err(Violations::single("credential", "credential is not bound to a user").into());
        };

        let address = parse_email(new_email)?;
        let normalized = self.normalize(address.as_str()).await;
        let account = self.store.credentials_for_user(owner).await?;
        if !self.may_move_to(&account, &normalized.fingerprint).await? {
            return Err(Violations::single(
                "email",
                "this account cannot switch to that address",
            )
            .into());
        }

        let updated = self
            .store
            .update_credential_email(
                credential_id,
                address.as_str(),
                &normalized.canonical,
                &normalized.fingerprint,
            )
            .await?;

        info!(fingerprint = %updated.fingerprint, "Email credential moved");
        Ok(updated)
    }

    /// Get a credential by its ID.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if it doesn't exist.
    pub async fn credential(&self, id: CredentialId) -> Result<Credential, IdentityError> {
        self.store
            .get_credential(id)
            .await?
            .ok_or_else(|| IdentityError::not_found("credential", id))
    }

    /// All credentials of a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Repository` if the query fails.
    pub async fn credentials_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<Credential>, IdentityError> {
        Ok(self.store.credentials_for_user(user).await?)
    }

    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the credential doesn't exist.
    #[instrument(skip(self))]
    pub async fn mark_verified(&self, id: CredentialId) -> Result<Credential, IdentityError> {
        Ok(self.store.set_credential_verified(id).await?)
    }

    /// # Errors
    ///
    /// Returns `IdentityError::NotFound` if the credential doesn't exist.
    #[instrument(skip(self))]
    pub async fn set_disabled(
        &self,
        id: CredentialId,
        disabled: bool,
    ) -> Result<Credential, IdentityError> {
        let credential = self.store.set_credential_disabled(id, disabled).await?;
        info!(disabled, "Credential kill-switch updated");
        Ok(credential)
    }
}
