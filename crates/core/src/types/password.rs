//! Password digests and their history.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::id::{CredentialId, PasswordRecordId};

/// Hex-encoded password digest.
///
/// `Debug` is redacted so digests never end up in logs by accident.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Hex-encode raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
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

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest([REDACTED])")
    }
}

/// One password snapshot of an email credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordRecord {
    pub id: PasswordRecordId,
    pub credential_id: CredentialId,
    pub digest: PasswordDigest,
    /// Digest of the record this one replaced.
    pub previous_digest: Option<PasswordDigest>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}
