//! Questions about an account's set of credentials.
//!
//! All functions are pure and operate on a list the caller just fetched;
//! nothing here caches or performs I/O.

use crate::types::{Credential, ProviderKind};

fn has_provider(credentials: &[Credential], kind: ProviderKind) -> bool {
    credentials.iter().any(|c| c.provider() == kind)
}

/// The set is exactly one credential of `kind`.
fn is_only(credentials: &[Credential], kind: ProviderKind) -> bool {
    matches!(credentials, [only] if only.provider() == kind)
}

#[must_use]
pub fn has_verified_credential(credentials: &[Credential]) -> bool {
    credentials.iter().any(|c| c.is_verified)
}

#[must_use]
pub fn has_signup_credential(credentials: &[Credential]) -> bool {
    credentials.iter().any(|c| c.is_signup_credential)
}

#[must_use]
pub fn has_third_party_verified_credential(credentials: &[Credential]) -> bool {
    credentials.iter().any(|c| c.is_third_party_verified)
}

#[must_use]
pub fn has_email_credential(credentials: &[Credential]) -> bool {
    has_provider(credentials, ProviderKind::EmailPass)
}

#[must_use]
pub fn has_google_credential(credentials: &[Credential]) -> bool {
    has_provider(credentials, ProviderKind::GoogleOauth)
}

#[must_use]
pub fn has_github_credential(credentials: &[Credential]) -> bool {
    has_provider(credentials, ProviderKind::GithubOauth)
}

#[must_use]
pub fn has_any_oauth(credentials: &[Credential]) -> bool {
    credentials.iter().any(|c| c.provider().is_oauth())
}

/// The account consists of a single OAuth credential and nothing else.
///
/// `{google}` and `{github}` qualify; `{google, github}` and
/// `{google, email}` do not, because neither is a one-element set.
#[must_use]
pub fn has_only_single_oauth(credentials: &[Credential]) -> bool {
    is_only(credentials, ProviderKind::GoogleOauth) ^ is_only(credentials, ProviderKind::GithubOauth)
}

#[must_use]
pub fn has_only_email(credentials: &[Credential]) -> bool {
    has_email_credential(credentials) && !has_any_oauth(credentials)
}

#[must_use]
pub fn has_only_oauth(credentials: &[Credential]) -> bool {
    !has_email_credential(credentials) && has_any_oauth(credentials)
}

/// An all-OAuth account may add an email credential. An empty set may not.
#[must_use]
pub fn can_add_email_auth(credentials: &[Credential]) -> bool {
    has_only_oauth(credentials)
}
