//! Integration tests for Likeness.
//!
//! # Running Tests
//!
//! ```bash
//! # Start a throwaway database
//! docker run --rm -e POSTGRES_PASSWORD=postgres -p 5432:5432 postgres:16
//!
//! # Run integration tests
//! LIKENESS_TEST_DATABASE_URL=postgres://... cargo test -p likeness-integration-tests
//! ```
//!
//! Tests return early without asserting anything when
//! `LIKENESS_TEST_DATABASE_URL` is unset.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use likeness_identity::{
    DomainClassifier, IdentityEngine, PepperedHasher, PgIdentityStore, StaticMxResolver, db,
};

/// Environment variable holding the test database URL.
pub const DATABASE_URL_VAR: &str = "LIKENESS_TEST_DATABASE_URL";

/// Engine wired to the test database.
pub struct TestContext {
    pub engine: IdentityEngine,
    pub pool: sqlx::PgPool,
}

impl TestContext {
    /// Connect and migrate, or `None` when no test database is configured.
    ///
    /// # Panics
    ///
    /// Panics if the database is configured but unreachable.
    #[allow(clippy::expect_used)]
    pub async fn connect() -> Option<Self> {
        let url = std::env::var(DATABASE_URL_VAR).ok()?;
        let pool = db::create_pool(&SecretString::from(url))
            .await
            .expect("Failed to connect to test database");
        db::migrate(&pool).await.expect("Failed to run migrations");

        let resolver = StaticMxResolver::new().with_domain("corp.test", ["aspmx.l.google.com."]);
        let classifier = DomainClassifier::new(Arc::new(resolver), Duration::from_millis(200));
        let hasher = PepperedHasher::new(
            SecretString::from("qZ4!mP8@vW2#xK6$nB1%tR5^yH9&jD3*"),
            argon2::Params::new(256, 1, 1, Some(32)).expect("valid argon2 params"),
        );

        let engine = IdentityEngine::new(
            Arc::new(PgIdentityStore::new(pool.clone())),
            classifier,
            hasher,
        );
        Some(Self { engine, pool })
    }
}

/// Suffix that keeps usernames and addresses unique across runs.
#[must_use]
pub fn unique() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
