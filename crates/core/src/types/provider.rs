//! Authentication provider discriminator and provider-specific profiles.

use serde::{Deserialize, Serialize};

/// Which authentication method a credential represents.
///
/// Stored in the `identity.provider_kind` enum and immutable once a
/// credential has been created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "identity.provider_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Email address plus password.
    EmailPass,
    /// Google OAuth.
    GoogleOauth,
    /// GitHub OAuth.
    GithubOauth,
}

impl ProviderKind {
    /// Whether this provider is an OAuth provider.
    #[must_use]
    pub const fn is_oauth(self) -> bool {
        matches!(self, Self::GoogleOauth | Self::GithubOauth)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmailPass => write!(f, "email_pass"),
            Self::GoogleOauth => write!(f, "google_oauth"),
            Self::GithubOauth => write!(f, "github_oauth"),
        }
    }
}

/// Profile attributes reported by Google.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleProfile {
    /// Google account subject id.
    pub provider_id: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub locale: Option<String>,
}

/// Profile attributes reported by GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubProfile {
    /// Numeric GitHub user id, kept as text.
    pub provider_id: String,
    pub login: String,
    pub node_id: String,
    pub name: Option<String>,
    pub company: Option<String>,
    /// Whether the GitHub account has two-factor authentication enabled.
    pub two_factor_authentication: bool,
}

/// Provider-specific attributes of a credential.
///
/// The variant always agrees with the credential's [`ProviderKind`], so
/// fields belonging to another provider cannot be populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderProfile {
    Email,
    Google(GoogleProfile),
    #[serde(rename = "github")]
    GitHub(GitHubProfile),
}

impl ProviderProfile {
    /// The storage discriminator for this profile.
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        match self {
            Self::Email => ProviderKind::EmailPass,
            Self::Google(_) => ProviderKind::GoogleOauth,
            Self::GitHub(_) => ProviderKind::GithubOauth,
        }
    }

    /// The provider-side account id, if this is an OAuth profile.
    #[must_use]
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Self::Email => None,
            Self::Google(p) => Some(&p.provider_id),
            Self::GitHub(p) => Some(&p.provider_id),
        }
    }
}

/// A completed OAuth exchange, as handed over by the provider client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OAuthProfile {
    Google(GoogleProfile),
    GitHub(GitHubProfile),
}

impl OAuthProfile {
    /// The provider this exchange was made with.
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        match self {
            Self::Google(_) => ProviderKind::GoogleOauth,
            Self::GitHub(_) => ProviderKind::GithubOauth,
        }
    }
}

impl From<OAuthProfile> for ProviderProfile {
    fn from(profile: OAuthProfile) -> Self {
        match profile {
            OAuthProfile::Google(p) => Self::Google(p),
            OAuthProfile::GitHub(p) => Self::GitHub(p),
        }
    }
}

/// One email address as reported by an OAuth provider.
///
/// Google reports a single address on the profile; GitHub reports a list of
/// addresses, each with its own verification flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEmail {
    pub email: String,
    /// Whether the provider has verified this address.
    pub verified: bool,
    pub primary: bool,
}
