//! Email canonicalization and fingerprinting.
//!
//! Two addresses refer to the same mailbox when their canonical forms are
//! equal. Google treats `j.doe+work@gmail.com` and `jdoe@gmail.com` as one
//! inbox, so for Google-managed domains the local part drops dots and any
//! `+tag`. Every other domain only gets case and whitespace folding.
//!
//! The [`Fingerprint`] is a SHA-256 digest of the canonical form. It is the
//! only key used for duplicate detection, which lets raw addresses be redacted
//! later without losing the ability to recognise a returning person.
//!
//! Whether a domain is Google-managed is decided by the caller (see the DNS
//! classifier in `likeness-identity`); [`is_known_google_domain`] covers the
//! consumer domains that never need a lookup.

use core::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Consumer domains that are always Google-managed.
pub const KNOWN_GOOGLE_DOMAINS: &[&str] = &["gmail.com", "googlemail.com", "google.com"];

/// An email address after provider equivalence rules were applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalEmail(String);

impl CanonicalEmail {
    /// Wrap a value read back from storage.
    #[must_use]
    pub const fn from_stored(value: String) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex-encoded SHA-256 digest of a [`CanonicalEmail`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a value read back from storage.
    #[must_use]
    pub const fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// Digest an already canonical address.
    #[must_use]
    pub fn of(canonical: &CanonicalEmail) -> Self {
        Self(hex::encode(Sha256::digest(canonical.as_str().as_bytes())))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `email`'s domain is one of [`KNOWN_GOOGLE_DOMAINS`].
#[must_use]
pub fn is_known_google_domain(email: &str) -> bool {
    domain_of(email).is_some_and(|domain| {
        KNOWN_GOOGLE_DOMAINS
            .iter()
            .any(|known| domain.eq_ignore_ascii_case(known))
    })
}

/// Lowercased domain of `email`, if it has one.
#[must_use]
pub fn domain_of(email: &str) -> Option<String> {
    let (_, domain) = email.trim().rsplit_once('@')?;
    if domain.is_empty() {
        return None;
    }
    Some(domain.to_lowercase())
}

/// Canonical form of `email`.
///
/// Always trims and lowercases. When `google_managed` is set, the local part
/// also loses everything from the first `+` and every `.`. Input without an
/// `@` is only trimmed and lowercased.
///
/// The function is idempotent.
#[must_use]
pub fn canonicalize(email: &str, google_managed: bool) -> CanonicalEmail {
    let folded = email.trim().to_lowercase();

    if !google_managed {
        return CanonicalEmail(folded);
    }

    let Some((local, domain)) = folded.rsplit_once('@') else {
        return CanonicalEmail(folded);
    };

    let untagged = local.split_once('+').map_or(local, |(head, _)| head);
    let local: String = untagged.chars().filter(|&c| c != '.').collect();

    CanonicalEmail(format!("{local}@{domain}"))
}

/// Fingerprint of `email` under the given domain classification.
#[must_use]
pub fn fingerprint(email: &str, google_managed: bool) -> Fingerprint {
    Fingerprint::of(&canonicalize(email, google_managed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_equivalent_addresses_collapse() {
        for raw in ["a.b+tag@gmail.com", "ab@gmail.com", "A.B@GMAIL.COM"] {
            assert_eq!(canonicalize(raw, true).as_str(), "ab@gmail.com", "{raw}");
        }
        assert_eq!(
            fingerprint("a.b+tag@gmail.com", true),
            fingerprint("A.B@GMAIL.COM", true)
        );
    }

    #[test]
    fn test_other_domains_keep_dots_and_tags() {
        let tagged = canonicalize(" A.B+tag@Foo.com ", false);
        assert_eq!(tagged.as_str(), "a.b+tag@foo.com");
        assert_ne!(tagged, canonicalize("ab@foo.com", false));
        assert_ne!(
            fingerprint("a.b+tag@foo.com", false),
            fingerprint("ab@foo.com", false)
        );
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        for (raw, google) in [
            ("J.Doe+work@Gmail.com", true),
            ("  x.y+z@example.org", false),
            ("no-at-sign ", true),
            ("a+b+c@googlemail.com", true),
        ] {
            let once = canonicalize(raw, google);
            let twice = canonicalize(once.as_str(), google);
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn test_plus_tag_cut_at_first_plus() {
        assert_eq!(
            canonicalize("a+b+c@gmail.com", true).as_str(),
            "a@gmail.com"
        );
    }

    #[test]
    fn test_input_without_at_is_only_folded() {
        assert_eq!(canonicalize(" A.B+C ", true).as_str(), "a.b+c");
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let fp = fingerprint("ab@gmail.com", true);
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!fp.as_str().contains("gmail"));
    }

    #[test]
    fn test_known_google_domains() {
        assert!(is_known_google_domain("someone@GMAIL.com"));
        assert!(is_known_google_domain("someone@googlemail.com"));
        assert!(!is_known_google_domain("someone@example.com"));
        assert!(!is_known_google_domain("gmail.com"));
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("x@Example.COM ").as_deref(), Some("example.com"));
        assert_eq!(domain_of("x@"), None);
        assert_eq!(domain_of("nothing"), None);
    }
}
