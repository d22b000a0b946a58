//! Google-managed domain classification.
//!
//! A handful of consumer domains are known up front. Anything else is
//! classified by its MX records: a domain whose mail is handled by Google
//! (Workspace) gets Google's address folding rules. Lookup failures and
//! timeouts classify the domain as not Google-managed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use likeness_core::normalize;

use crate::config::DnsConfig;

/// Default bound on a single MX lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from an MX lookup.
#[derive(Debug, Error)]
pub enum DnsError {
    /// The resolver failed or returned an error response.
    #[error("MX lookup for {domain} failed: {message}")]
    Lookup { domain: String, message: String },

    /// The resolver could not be constructed.
    #[error("resolver setup failed: {0}")]
    Setup(String),
}

/// Source of MX records.
#[async_trait]
pub trait MxResolver: Send + Sync {
    /// Mail exchange host names for `domain`.
    async fn mx_exchanges(&self, domain: &str) -> Result<Vec<String>, DnsError>;
}

/// [`MxResolver`] on top of `hickory-resolver`.
pub struct HickoryMxResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryMxResolver {
    /// Resolver using the public default upstreams.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), options(timeout)),
        }
    }

    /// Resolver using the host's `/etc/resolv.conf`.
    ///
    /// # Errors
    ///
    /// Returns `DnsError::Setup` if the system configuration can't be read.
    pub fn from_system_conf(timeout: Duration) -> Result<Self, DnsError> {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf()
            .map_err(|e| DnsError::Setup(e.to_string()))?;
        opts.timeout = timeout;
        Ok(Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        })
    }
}

fn options(timeout: Duration) -> ResolverOpts {
    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    opts.attempts = 1;
    opts
}

impl std::fmt::Debug for HickoryMxResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryMxResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl MxResolver for HickoryMxResolver {
    async fn mx_exchanges(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let lookup = self
            .resolver
            .mx_lookup(domain)
            .await
            .map_err(|e| DnsError::Lookup {
                domain: domain.to_owned(),
                message: e.to_string(),
            })?;

        Ok(lookup.iter().map(|mx| mx.exchange().to_string()).collect())
    }
}

/// Fixed MX table for tests and offline use. Unknown domains fail.
#[derive(Debug, Clone, Default)]
pub struct StaticMxResolver {
    records: HashMap<String, Vec<String>>,
}

impl StaticMxResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the MX hosts of `domain`.
    #[must_use]
    pub fn with_domain<I, S>(mut self, domain: &str, exchanges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.records.insert(
            domain.to_lowercase(),
            exchanges.into_iter().map(Into::into).collect(),
        );
        self
    }
}

#[async_trait]
impl MxResolver for StaticMxResolver {
    async fn mx_exchanges(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        self.records
            .get(&domain.to_lowercase())
            .cloned()
            .ok_or_else(|| DnsError::Lookup {
                domain: domain.to_owned(),
                message: "no records".to_owned(),
            })
    }
}

/// Decides whether an address follows Google's folding rules.
#[derive(Clone)]
pub struct DomainClassifier {
    resolver: Arc<dyn MxResolver>,
    timeout: Duration,
    extra_domains: Vec<String>,
}

impl DomainClassifier {
    #[must_use]
    pub fn new(resolver: Arc<dyn MxResolver>, timeout: Duration) -> Self {
        Self {
            resolver,
            timeout,
            extra_domains: Vec::new(),
        }
    }

    /// Classifier on the system resolver, falling back to the default
    /// public resolvers when the system configuration can't be read.
    #[must_use]
    pub fn from_config(config: &DnsConfig) -> Self {
        let resolver = HickoryMxResolver::from_system_conf(config.timeout).unwrap_or_else(|e| {
            warn!(error = %e, "Using default DNS resolvers");
            HickoryMxResolver::new(config.timeout)
        });
        Self::new(Arc::new(resolver), config.timeout)
            .with_extra_domains(config.google_domains.iter().cloned())
    }

    /// Treat `domains` as Google-managed without a lookup.
    #[must_use]
    pub fn with_extra_domains(mut self, domains: impl IntoIterator<Item = String>) -> Self {
        self.extra_domains = domains
            .into_iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        self
    }

    /// Whether `email`'s domain is run by Google.
    ///
    /// Never fails: lookup errors and timeouts yield `false`.
    #[instrument(skip(self, email))]
    pub async fn is_google_managed(&self, email: &str) -> bool {
        if normalize::is_known_google_domain(email) {
            return true;
        }
        let Some(domain) = normalize::domain_of(email) else {
            return false;
        };
        if self.extra_domains.contains(&domain) {
            return true;
        }

        match tokio::time::timeout(self.timeout, self.resolver.mx_exchanges(&domain)).await {
            Ok(Ok(exchanges)) => {
                let google = exchanges
                    .iter()
                    .any(|mx| mx.to_ascii_lowercase().contains("google"));
                debug!(%domain, records = exchanges.len(), google, "MX lookup");
                google
            }
            Ok(Err(e)) => {
                warn!(%domain, error = %e, "MX lookup failed; treating as not Google-managed");
                false
            }
            Err(_) => {
                warn!(%domain, timeout_ms = self.timeout.as_millis(), "MX lookup timed out; treating as not Google-managed");
                false
            }
        }
    }
}

impl std::fmt::Debug for DomainClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainClassifier")
            .field("timeout", &self.timeout)
            .field("extra_domains", &self.extra_domains)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowResolver;

    #[async_trait]
    impl MxResolver for SlowResolver {
        async fn mx_exchanges(&self, _domain: &str) -> Result<Vec<String>, DnsError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec!["aspmx.l.google.com.".to_owned()])
        }
    }

    fn classifier(resolver: StaticMxResolver) -> DomainClassifier {
        DomainClassifier::new(Arc::new(resolver), DEFAULT_LOOKUP_TIMEOUT)
    }

    #[tokio::test]
    async fn test_known_domains_skip_lookup() {
        let c = classifier(StaticMxResolver::new());
        assert!(c.is_google_managed("someone@GMail.com").await);
        assert!(c.is_google_managed("someone@googlemail.com").await);
    }

    #[tokio::test]
    async fn test_google_mx_is_google_managed() {
        let c = classifier(
            StaticMxResolver::new()
                .with_domain("acme.io", ["ASPMX.L.GOOGLE.COM.", "alt1.aspmx.l.google.com."]),
        );
        assert!(c.is_google_managed("dev@acme.io").await);
    }

    #[tokio::test]
    async fn test_other_mx_is_not_google_managed() {
        let c = classifier(
            StaticMxResolver::new().with_domain("example.com", ["mx.example-mail.net."]),
        );
        assert!(!c.is_google_managed("dev@example.com").await);
    }

    #[tokio::test]
    async fn test_lookup_failure_fails_open() {
        let c = classifier(StaticMxResolver::new());
        assert!(!c.is_google_managed("dev@unknown.test").await);
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        let c = DomainClassifier::new(Arc::new(SlowResolver), Duration::from_millis(50));
        assert!(!c.is_google_managed("dev@slow.test").await);
    }

    #[tokio::test]
    async fn test_extra_domains() {
        let c = classifier(StaticMxResolver::new())
            .with_extra_domains(vec![" Corp.Example ".to_owned(), String::new()]);
        assert!(c.is_google_managed("dev@corp.example").await);
    }

    #[tokio::test]
    async fn test_missing_domain_is_not_google_managed() {
        let c = classifier(StaticMxResolver::new());
        assert!(!c.is_google_managed("not-an-address").await);
    }
}
