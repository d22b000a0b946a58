//! Likeness identity engine.
//!
//! Decides whether login attempts through different providers belong to the
//! same person, keeps a fingerprint index of email addresses, and manages
//! password hashing, rotation and reuse prevention.
//!
//! ```rust,ignore
//! let config = IdentityConfig::from_env()?;
//! let engine = IdentityEngine::connect(&config).await?;
//!
//! let owner = engine.credentials().lookup_user_for_email("j.doe@gmail.com").await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod dns;
pub mod engine;
pub mod services;

pub use config::{Argon2Config, ConfigError, DnsConfig, IdentityConfig};
pub use db::{IdentityStore, MemoryIdentityStore, PgIdentityStore, RepositoryError};
pub use dns::{DomainClassifier, HickoryMxResolver, MxResolver, StaticMxResolver};
pub use engine::{EngineError, IdentityEngine};
pub use services::{
    AccountService, CredentialStore, IdentityError, PasswordVault, PepperedHasher,
};
