//! Identity engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LIKENESS_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `LIKENESS_PASSWORD_PEPPER` - Server-side password pepper (min 32 chars, high entropy)
//!
//! ## Optional
//! - `LIKENESS_DNS_TIMEOUT_MS` - MX lookup timeout in milliseconds (default: 3000)
//! - `LIKENESS_GOOGLE_DOMAINS` - Comma-separated extra Google-managed domains
//! - `LIKENESS_ARGON2_MEMORY_KIB` - Argon2 memory cost (default: 19456)
//! - `LIKENESS_ARGON2_ITERATIONS` - Argon2 time cost (default: 2)
//! - `LIKENESS_ARGON2_PARALLELISM` - Argon2 lanes (default: 1)

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::dns::DEFAULT_LOOKUP_TIMEOUT;

const MIN_PEPPER_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Length of the raw Argon2 output in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "pepper",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Identity engine configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct IdentityConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Pepper mixed into every password digest
    pub password_pepper: SecretString,
    /// Domain classification settings
    pub dns: DnsConfig,
    /// Password hashing cost
    pub argon2: Argon2Config,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("database_url", &"[REDACTED]")
            .field("password_pepper", &"[REDACTED]")
            .field("dns", &self.dns)
            .field("argon2", &self.argon2)
            .finish()
    }
}

/// Domain classification settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsConfig {
    /// Upper bound on one MX lookup
    pub timeout: Duration,
    /// Domains treated as Google-managed without a lookup
    pub google_domains: Vec<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOOKUP_TIMEOUT,
            google_domains: Vec::new(),
        }
    }
}

impl DnsConfig {
    /// Load only the DNS settings, for commands that need no secrets.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the timeout isn't a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let lookup = |key: &str| std::env::var(key).ok();
        Self::load(&Env(&lookup))
    }

    fn load(env: &Env<'_>) -> Result<Self, ConfigError> {
        let timeout = env
            .parsed::<u64>("LIKENESS_DNS_TIMEOUT_MS")?
            .map_or(DEFAULT_LOOKUP_TIMEOUT, Duration::from_millis);

        let google_domains = env
            .optional("LIKENESS_GOOGLE_DOMAINS")
            .map(|list| {
                list.split(',')
                    .map(|d| d.trim().to_lowercase())
                    .filter(|d| !d.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            timeout,
            google_domains,
        })
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Config {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl Argon2Config {
    /// Build the argon2 parameter set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if argon2 rejects the combination.
    pub fn params(&self) -> Result<argon2::Params, ConfigError> {
        argon2::Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(DIGEST_LENGTH),
        )
        .map_err(|e| ConfigError::InvalidEnvVar("LIKENESS_ARGON2_*".to_string(), e.to_string()))
    }
}

impl IdentityConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the pepper fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`IdentityConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let database_url = env.database_url("LIKENESS_DATABASE_URL")?;
        let password_pepper = env.validated_secret("LIKENESS_PASSWORD_PEPPER")?;
        validate_pepper_length(&password_pepper, "LIKENESS_PASSWORD_PEPPER")?;

        let dns = DnsConfig::load(&env)?;

        let defaults = Argon2Config::default();
        let argon2 = Argon2Config {
            memory_kib: env
                .parsed("LIKENESS_ARGON2_MEMORY_KIB")?
                .unwrap_or(defaults.memory_kib),
            iterations: env
                .parsed("LIKENESS_ARGON2_ITERATIONS")?
                .unwrap_or(defaults.iterations),
            parallelism: env
                .parsed("LIKENESS_ARGON2_PARALLELISM")?
                .unwrap_or(defaults.parallelism),
        };
        argon2.params()?;

        Ok(Self {
            database_url,
            password_pepper,
            dns,
            argon2,
        })
    }
}

/// Read only the database URL, for commands that never hash passwords.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither variable is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    let lookup = |key: &str| std::env::var(key).ok();
    Env(&lookup).database_url("LIKENESS_DATABASE_URL")
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get an optional environment variable.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    /// Get a required environment variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Parse an optional environment variable.
    fn parsed<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|v| {
                v.trim()
                    .parse::<T>()
                    .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
            })
            .transpose()
    }

    /// Get database URL with fallback to generic `DATABASE_URL`.
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        self.optional(primary_key)
            .or_else(|| self.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_secret_strength(&value, key)?;
        Ok(SecretString::from(value))
    }
}

/// Validate that the pepper meets minimum length requirements.
fn validate_pepper_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_PEPPER_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_PEPPER_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated value."
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PEPPER: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%D";

    fn load(vars: &[(&str, &str)]) -> Result<IdentityConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IdentityConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-pepper-here", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let err = validate_secret_strength(&"a".repeat(40), "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength(PEPPER, "TEST_VAR").is_ok());
    }

    #[test]
    fn test_short_pepper_rejected() {
        let err = load(&[
            ("LIKENESS_DATABASE_URL", "postgres://localhost/likeness"),
            ("LIKENESS_PASSWORD_PEPPER", "aB3$xY9!mK2@"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("LIKENESS_DATABASE_URL", "postgres://localhost/likeness"),
            ("LIKENESS_PASSWORD_PEPPER", PEPPER),
        ])
        .unwrap();

        assert_eq!(config.dns, DnsConfig::default());
        assert_eq!(config.dns.timeout, Duration::from_secs(3));
        assert_eq!(config.argon2, Argon2Config::default());
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[
            ("DATABASE_URL", "postgres://fallback/likeness"),
            ("LIKENESS_PASSWORD_PEPPER", PEPPER),
        ])
        .unwrap();
        assert_eq!(
            config.database_url.expose_secret(),
            "postgres://fallback/likeness"
        );
    }

    #[test]
    fn test_missing_pepper() {
        let err = load(&[("LIKENESS_DATABASE_URL", "postgres://localhost/likeness")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "LIKENESS_PASSWORD_PEPPER"));
    }

    #[test]
    fn test_optional_overrides() {
        let config = load(&[
            ("LIKENESS_DATABASE_URL", "postgres://localhost/likeness"),
            ("LIKENESS_PASSWORD_PEPPER", PEPPER),
            ("LIKENESS_DNS_TIMEOUT_MS", "250"),
            ("LIKENESS_GOOGLE_DOMAINS", "Corp.Example, ,mail.test"),
            ("LIKENESS_ARGON2_MEMORY_KIB", "4096"),
            ("LIKENESS_ARGON2_ITERATIONS", "3"),
        ])
        .unwrap();

        assert_eq!(config.dns.timeout, Duration::from_millis(250));
        assert_eq!(config.dns.google_domains, vec!["corp.example", "mail.test"]);
        assert_eq!(config.argon2.memory_kib, 4096);
        assert_eq!(config.argon2.iterations, 3);
        assert_eq!(config.argon2.parallelism, 1);
    }

    #[test]
    fn test_invalid_timeout() {
        let err = load(&[
            ("LIKENESS_DATABASE_URL", "postgres://localhost/likeness"),
            ("LIKENESS_PASSWORD_PEPPER", PEPPER),
            ("LIKENESS_DNS_TIMEOUT_MS", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[
            ("LIKENESS_DATABASE_URL", "postgres://user:hunter2@db/likeness"),
            ("LIKENESS_PASSWORD_PEPPER", PEPPER),
        ])
        .unwrap();

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
        assert!(!debug_output.contains(PEPPER));
    }
}
