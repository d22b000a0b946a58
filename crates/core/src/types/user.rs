//! Users and their service agreements.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::UserId;
use crate::validation::{ViolationCollector, Violations};

/// Maximum length of a first or last name.
pub const MAX_NAME_LENGTH: usize = 100;

/// A unique handle.
///
/// 3-39 ASCII alphanumerics, `-` or `_`, not starting with `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub const MIN_LENGTH: usize = 3;
    pub const MAX_LENGTH: usize = 39;

    /// Parse a username.
    ///
    /// # Errors
    ///
    /// Returns the violations found on field `username`.
    pub fn parse(s: &str) -> Result<Self, Violations> {
        let mut violations = ViolationCollector::new();
        check_username(s, &mut violations);
        violations.finish()?;
        Ok(Self(s.to_owned()))
    }

    /// Wrap a value read back from storage.
    #[must_use]
    pub const fn from_stored(value: String) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn check_username(s: &str, violations: &mut ViolationCollector) {
    let len = s.chars().count();
    if !(Username::MIN_LENGTH..=Username::MAX_LENGTH).contains(&len) {
        violations.push(
            "username",
            format!(
                "must be {}-{} characters",
                Username::MIN_LENGTH,
                Username::MAX_LENGTH
            ),
        );
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        violations.push(
            "username",
            "may only contain letters, digits, '-' and '_'",
        );
    }
    if s.starts_with('-') {
        violations.push("username", "cannot start with '-'");
    }
}

fn check_name(field: &'static str, s: &str, violations: &mut ViolationCollector) {
    if s.trim().is_empty() {
        violations.push(field, "cannot be empty");
    } else if s.chars().count() > MAX_NAME_LENGTH {
        violations.push(field, format!("must be at most {MAX_NAME_LENGTH} characters"));
    }
}

/// The identity root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub username: Username,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated user ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub username: Username,
}

impl NewUser {
    /// Validate all fields at once.
    ///
    /// # Errors
    ///
    /// Returns every violation across `first_name`, `last_name` and
    /// `username`.
    pub fn new(first_name: &str, last_name: &str, username: &str) -> Result<Self, Violations> {
        let mut violations = ViolationCollector::new();
        check_name("first_name", first_name, &mut violations);
        check_name("last_name", last_name, &mut violations);
        check_username(username, &mut violations);
        violations.finish()?;

        Ok(Self {
            first_name: first_name.trim().to_owned(),
            last_name: last_name.trim().to_owned(),
            username: Username(username.to_owned()),
        })
    }
}

/// Owner-initiated profile changes. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<Username>,
}

impl UserProfileUpdate {
    /// Validate the supplied fields.
    ///
    /// # Errors
    ///
    /// Returns every violation among the fields that are present.
    pub fn new(
        first_name: Option<&str>,
        last_name: Option<&str>,
        username: Option<&str>,
    ) -> Result<Self, Violations> {
        let mut violations = ViolationCollector::new();
        if let Some(name) = first_name {
            check_name("first_name", name, &mut violations);
        }
        if let Some(name) = last_name {
            check_name("last_name", name, &mut violations);
        }
        if let Some(handle) = username {
            check_username(handle, &mut violations);
        }
        violations.finish()?;

        Ok(Self {
            first_name: first_name.map(|s| s.trim().to_owned()),
            last_name: last_name.map(|s| s.trim().to_owned()),
            username: username.map(|s| Username(s.to_owned())),
        })
    }

    /// Apply this update to `user` in place.
    pub fn apply(&self, user: &mut User) {
        if let Some(name) = &self.first_name {
            user.first_name.clone_from(name);
        }
        if let Some(name) = &self.last_name {
            user.last_name.clone_from(name);
        }
        if let Some(handle) = &self.username {
            user.username = handle.clone();
        }
    }
}

/// Consent to the terms of service and the privacy policy.
///
/// Only full consent is representable: the sole constructor rejects any
/// other combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceAgreement {
    agreed_to_tos: bool,
    agreed_to_privacy_policy: bool,
}

impl ServiceAgreement {
    /// Record consent.
    ///
    /// # Errors
    ///
    /// Returns a violation for each flag that is `false`.
    pub fn accept(agreed_to_tos: bool, agreed_to_privacy_policy: bool) -> Result<Self, Violations> {
        let mut violations = ViolationCollector::new();
        if !agreed_to_tos {
            violations.push("agreed_to_tos", "the terms of service must be accepted");
        }
        if !agreed_to_privacy_policy {
            violations.push(
                "agreed_to_privacy_policy",
                "the privacy policy must be accepted",
            );
        }
        violations.finish()?;

        Ok(Self {
            agreed_to_tos,
            agreed_to_privacy_policy,
        })
    }

    #[must_use]
    pub const fn agreed_to_tos(&self) -> bool {
        self.agreed_to_tos
    }

    #[must_use]
    pub const fn agreed_to_privacy_policy(&self) -> bool {
        self.agreed_to_privacy_policy
    }
}

/// A persisted agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceAgreementRecord {
    pub user_id: UserId,
    pub agreement: ServiceAgreement,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_trims_names() {
        let user = NewUser::new(" Jane ", "Doe", "jdoe").unwrap();
        assert_eq!(user.first_name, "Jane");
        assert_eq!(user.username.as_str(), "jdoe");
    }

    #[test]
    fn test_new_user_reports_every_bad_field() {
        let err = NewUser::new("", "  ", "-x").unwrap_err();
        assert!(err.has_field("first_name"));
        assert!(err.has_field("last_name"));
        assert!(err.has_field("username"));
        // too short and leading dash
        assert_eq!(err.iter().filter(|v| v.field == "username").count(), 2);
    }

    #[test]
    fn test_username_rules() {
        assert!(Username::parse("octo_cat-99").is_ok());
        assert!(Username::parse("ab").is_err());
        assert!(Username::parse(&"a".repeat(40)).is_err());
        assert!(Username::parse("has space").is_err());
        assert!(Username::parse("ünï").is_err());
    }

    #[test]
    fn test_partial_consent_is_unrepresentable() {
        assert!(ServiceAgreement::accept(true, true).is_ok());

        let err = ServiceAgreement::accept(true, false).unwrap_err();
        assert!(err.has_field("agreed_to_privacy_policy"));
        assert!(!err.has_field("agreed_to_tos"));

        assert_eq!(ServiceAgreement::accept(false, false).unwrap_err().len(), 2);
    }

    #[test]
    fn test_profile_update_applies_only_present_fields() {
        let mut user = User {
            id: UserId::new(1),
            first_name: "Jane".to_owned(),
            last_name: "Doe".to_owned(),
            username: Username::parse("jdoe").unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let update = UserProfileUpdate::new(None, Some("Roe"), None).unwrap();
        update.apply(&mut user);
        assert_eq!(user.first_name, "Jane");
        assert_eq!(user.last_name, "Roe");
        assert_eq!(user.username.as_str(), "jdoe");
    }
}
