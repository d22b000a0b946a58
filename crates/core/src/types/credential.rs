//! Authentication credentials and their binding to a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{CredentialId, UserId};
use super::provider::{ProviderKind, ProviderProfile};
use crate::normalize::{CanonicalEmail, Fingerprint};

/// Ownership state of a credential.
///
/// A credential from an OAuth exchange may start `Unbound` while the caller
/// decides which account it belongs to. Once `Bound`, it stays bound to the
/// same user for the rest of its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "user_id", rename_all = "snake_case")]
pub enum Binding {
    #[default]
    Unbound,
    Bound(UserId),
}

impl Binding {
    /// The owning user, if any.
    #[must_use]
    pub const fn user_id(self) -> Option<UserId> {
        match self {
            Self::Unbound => None,
            Self::Bound(id) => Some(id),
        }
    }

    #[must_use]
    pub const fn is_bound(self) -> bool {
        matches!(self, Self::Bound(_))
    }

    /// Whether binding to `user` is a legal transition from this state.
    ///
    /// Unbound credentials may bind to anyone; bound credentials only
    /// "rebind" to their current owner, which is a no-op.
    #[must_use]
    pub fn can_bind_to(self, user: UserId) -> bool {
        match self {
            Self::Unbound => true,
            Self::Bound(owner) => owner == user,
        }
    }
}

impl From<Option<UserId>> for Binding {
    fn from(user: Option<UserId>) -> Self {
        user.map_or(Self::Unbound, Self::Bound)
    }
}

impl From<Binding> for Option<UserId> {
    fn from(binding: Binding) -> Self {
        binding.user_id()
    }
}

/// One authentication method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub binding: Binding,
    /// Provider-specific attributes; its variant is the provider type.
    pub profile: ProviderProfile,
    /// Address exactly as supplied.
    pub email: String,
    pub canonical_email: CanonicalEmail,
    pub fingerprint: Fingerprint,
    /// Verified by this platform, or by the provider at creation time.
    pub is_verified: bool,
    /// Verified by the OAuth provider.
    pub is_third_party_verified: bool,
    /// The credential the account was created with.
    pub is_signup_credential: bool,
    /// Administrative kill-switch.
    pub is_disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    #[must_use]
    pub const fn provider(&self) -> ProviderKind {
        self.profile.kind()
    }

    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        self.binding.user_id()
    }
}

/// Everything needed to insert a credential; the store assigns id and
/// timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredential {
    pub binding: Binding,
    pub profile: ProviderProfile,
    pub email: String,
    pub canonical_email: CanonicalEmail,
    pub fingerprint: Fingerprint,
    pub is_verified: bool,
    pub is_third_party_verified: bool,
    pub is_signup_credential: bool,
}
