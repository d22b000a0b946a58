//! Shared handle over the store, classifier and hasher.

use std::sync::Arc;

use crate::config::{ConfigError, IdentityConfig};
use crate::db::{self, IdentityStore, PgIdentityStore};
use crate::dns::DomainClassifier;
use crate::services::{AccountService, CredentialStore, PasswordVault, PepperedHasher};

/// Error building an [`IdentityEngine`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Entry point of the identity engine.
///
/// This struct is cheaply cloneable via `Arc`; services are borrowed from it
/// per call.
#[derive(Clone)]
pub struct IdentityEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<dyn IdentityStore>,
    classifier: DomainClassifier,
    hasher: PepperedHasher,
}

impl IdentityEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        classifier: DomainClassifier,
        hasher: PepperedHasher,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                classifier,
                hasher,
            }),
        }
    }

    /// Connect to `PostgreSQL` and the system resolver.
    ///
    /// Falls back to the default public resolvers when the system resolver
    /// configuration can't be read.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Database` if the pool can't be created.
    /// Returns `EngineError::Config` if the Argon2 parameters are invalid.
    pub async fn connect(config: &IdentityConfig) -> Result<Self, EngineError> {
        let hasher = PepperedHasher::from_config(config)?;
        let pool = db::create_pool(&config.database_url).await?;

        let classifier = DomainClassifier::from_config(&config.dns);

        Ok(Self::new(
            Arc::new(PgIdentityStore::new(pool)),
            classifier,
            hasher,
        ))
    }

    #[must_use]
    pub fn store(&self) -> &dyn IdentityStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn credentials(&self) -> CredentialStore<'_> {
        CredentialStore::new(self.store(), &self.inner.classifier)
    }

    #[must_use]
    pub fn passwords(&self) -> PasswordVault<'_> {
        PasswordVault::new(self.store(), &self.inner.hasher)
    }

    #[must_use]
    pub fn accounts(&self) -> AccountService<'_> {
        AccountService::new(self.store())
    }
}

impl std::fmt::Debug for IdentityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityEngine")
            .field("classifier", &self.inner.classifier)
            .field("hasher", &self.inner.hasher)
            .finish_non_exhaustive()
    }
}
