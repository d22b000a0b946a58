//! Identity diagnostics.
//!
//! # Environment Variables
//!
//! - `LIKENESS_DNS_TIMEOUT_MS` - MX lookup timeout
//! - `LIKENESS_GOOGLE_DOMAINS` - Extra Google-managed domains
//! - `LIKENESS_DATABASE_URL` - Required by `lookup` only

use likeness_core::normalize;
use likeness_identity::config::database_url_from_env;
use likeness_identity::{CredentialStore, DnsConfig, DomainClassifier, PgIdentityStore, db};

use super::CommandError;

/// Print the classification, canonical form and fingerprint of `email`.
///
/// # Errors
///
/// Returns `CommandError::Config` if the DNS settings are invalid.
pub async fn classify(email: &str) -> Result<(), CommandError> {
    let classifier = DomainClassifier::from_config(&DnsConfig::from_env()?);

    let google = classifier.is_google_managed(email).await;
    let canonical = normalize::canonicalize(email, google);
    let fingerprint = likeness_core::Fingerprint::of(&canonical);

    #[allow(clippy::print_stdout)]
    {
        println!("google_managed: {google}");
        println!("canonical:      {canonical}");
        println!("fingerprint:    {fingerprint}");
    }
    Ok(())
}

/// Print the id of the user owning `email`, or `none`.
///
/// # Errors
///
/// Returns `CommandError` if configuration is missing or the query fails.
pub async fn lookup(email: &str) -> Result<(), CommandError> {
    let classifier = DomainClassifier::from_config(&DnsConfig::from_env()?);
    let store = PgIdentityStore::new(db::create_pool(&database_url_from_env()?).await?);

    let owner = CredentialStore::new(&store, &classifier)
        .lookup_user_for_email(email)
        .await?;

    #[allow(clippy::print_stdout)]
    {
        match owner {
            Some(user_id) => println!("{user_id}"),
            None => println!("none"),
        }
    }
    Ok(())
}
