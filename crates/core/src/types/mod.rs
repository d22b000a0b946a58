//! Core identity types.

pub mod credential;
pub mod email;
pub mod id;
pub mod password;
pub mod provider;
pub mod user;

pub use credential::{Binding, Credential, NewCredential};
pub use email::{Email, EmailError};
pub use id::*;
pub use password::{PasswordDigest, PasswordRecord};
pub use provider::{
    GitHubProfile, GoogleProfile, OAuthProfile, ProviderEmail, ProviderKind, ProviderProfile,
};
pub use user::{
    NewUser, ServiceAgreement, ServiceAgreementRecord, User, UserProfileUpdate, Username,
};
