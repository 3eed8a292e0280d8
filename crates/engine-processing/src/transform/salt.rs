use crate::error::SaltError;
use model::records::record::{PseudonymizedRecord, SourceEntry};
use sha2::{Digest, Sha256};
use std::fmt;

/// Lower-case hex SHA-256 of the key with the salt appended.
pub fn salted_hash(key: impl fmt::Display, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Unsalted digest of the key. Trivially reversible for small key spaces.
pub fn plain_hash(key: impl fmt::Display) -> String {
    salted_hash(key, "")
}

/// Derives `alt_id`s from natural keys with a fixed secret.
#[derive(Clone)]
pub struct Salter {
    secret: String,
    fingerprint: String,
}

impl Salter {
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        let fingerprint = fingerprint_of(&secret);
        Self {
            secret,
            fingerprint,
        }
    }

    pub fn salt(&self, key: i64) -> String {
        salted_hash(key, &self.secret)
    }

    /// blake3 fingerprint of the secret, safe to persist and compare across runs.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn pseudonymize(&self, entry: &SourceEntry) -> Result<PseudonymizedRecord, SaltError> {
        let key = entry.record.device_id.ok_or(SaltError::InvalidInput {
            message_id: entry.record.message_id,
            offset: entry.offset,
        })?;

        Ok(PseudonymizedRecord {
            alt_id: self.salt(key),
            offset: entry.offset,
            record: entry.record.clone(),
        })
    }
}

impl fmt::Debug for Salter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Salter")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

fn fingerprint_of(secret: &str) -> String {
    let mut h = blake3::Hasher::new();
    h.update(b"saltmerge/salt/v1");
    h.update(secret.as_bytes());
    h.finalize().to_hex()[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use model::records::record::{MessageId, Record};

    fn entry(device_id: Option<i64>) -> SourceEntry {
        SourceEntry::new(
            4,
            Record {
                device_id,
                message_id: MessageId(11),
                rpm: Some(7.0),
                angle: None,
                timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            },
        )
    }

    #[test]
    fn matches_sha256_of_key_and_salt() {
        assert_eq!(
            Salter::new("TEST").salt(123),
            "8934c9c641f2e7bb700a43304df2c2f1ca2ee89e62217b056c172f2e474a80e9"
        );
        assert_eq!(
            plain_hash(123),
            "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3"
        );
    }

    #[test]
    fn deterministic_and_salt_sensitive() {
        let a = Salter::new("TEST");
        let b = Salter::new("OTHER");
        assert_eq!(a.salt(123), a.salt(123));
        assert_ne!(a.salt(123), b.salt(123));
        assert_eq!(
            b.salt(123),
            "ce19061f99c516aa9ae68373c33da23e59ad33a3479c8325af4de2f2242e9970"
        );
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn null_key_is_rejected_with_context() {
        let err = Salter::new("TEST").pseudonymize(&entry(None)).unwrap_err();
        assert_eq!(
            err,
            SaltError::InvalidInput {
                message_id: MessageId(11),
                offset: 4
            }
        );
    }

    #[test]
    fn pseudonymize_keeps_payload_and_offset() {
        let out = Salter::new("TEST").pseudonymize(&entry(Some(123))).unwrap();
        assert_eq!(out.offset, 4);
        assert_eq!(out.record.rpm, Some(7.0));
        assert_eq!(out.alt_id.len(), 64);
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", Salter::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }
}
