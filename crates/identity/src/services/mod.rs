//! Business logic services for identity.
//!
//! # Services
//!
//! - `credentials` - Credential creation, linking and lookup
//! - `passwords` - Password hashing, rotation and reuse prevention
//! - `accounts` - Users and service agreements
//!
//! Services borrow an [`IdentityStore`](crate::db::IdentityStore) and are
//! cheap to construct per call; [`IdentityEngine`](crate::IdentityEngine)
//! hands them out.

pub mod accounts;
pub mod credentials;
mod error;
pub mod passwords;

#[cfg(test)]
pub(crate) mod testing;

pub use accounts::AccountService;
pub use credentials::CredentialStore;
pub use error::IdentityError;
pub use passwords::{PasswordVault, PepperedHasher};
