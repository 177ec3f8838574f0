//! Backup Code Set Value Object
//!
//! Single-use recovery codes substituting for TOTP. Only SHA-256 hashes are
//! kept: a stored array of issued hashes plus a separate array of consumed
//! hashes. A code authenticates iff its hash is in the first and not in the
//! second; consumption appends to the second.
//!
//! The in-memory `consume` here carries the semantics; repositories make the
//! check-then-append atomic (conditional UPDATE in Postgres, map lock in the
//! test fake).

use serde::{Deserialize, Serialize};

use platform::crypto::{random_code, sha256, to_base64};

/// Number of codes issued per generation
pub const BACKUP_CODE_COUNT: usize = 10;
/// Characters per code half ("XXXXX-XXXXX")
const HALF_LEN: usize = 5;

/// Why a code did not consume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupCodeRejection {
    /// Hash not in the stored set
    Unknown,
    /// Hash already in the used set
    AlreadyUsed,
}

/// Stored backup code state for one user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupCodeSet {
    hashes: Vec<String>,
    used: Vec<String>,
}

impl BackupCodeSet {
    /// Issue a fresh set, replacing anything prior. Returns the set and the
    /// plaintext codes, the only time they exist outside the client.
    pub fn generate(count: usize) -> (Self, Vec<String>) {
        let codes: Vec<String> = (0..count)
            .map(|_| format!("{}-{}", random_code(HALF_LEN), random_code(HALF_LEN)))
            .collect();

        let set = Self {
            hashes: codes.iter().map(|c| Self::hash_code(c)).collect(),
            used: Vec::new(),
        };

        (set, codes)
    }

    /// Restore from stored arrays
    pub fn from_parts(hashes: Vec<String>, used: Vec<String>) -> Self {
        Self { hashes, used }
    }

    /// Canonical hash of a user-entered code. Normalization forgives case
    /// and separator differences when retyping.
    pub fn hash_code(code: &str) -> String {
        let normalized: String = code
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        to_base64(&sha256(normalized.as_bytes()))
    }

    /// Consume a code by hash: present in the issued set AND absent from the
    /// used set, then appended to used. At most one consumption per code.
    pub fn consume_hash(&mut self, code_hash: &str) -> Result<u32, BackupCodeRejection> {
        if !self.hashes.iter().any(|h| h == code_hash) {
            return Err(BackupCodeRejection::Unknown);
        }
        if self.used.iter().any(|h| h == code_hash) {
            return Err(BackupCodeRejection::AlreadyUsed);
        }
        self.used.push(code_hash.to_string());
        Ok(self.remaining())
    }

    pub fn total(&self) -> u32 {
        self.hashes.len() as u32
    }

    pub fn remaining(&self) -> u32 {
        (self.hashes.len() - self.used.len()) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn hashes(&self) -> &[String] {
        &self.hashes
    }

    pub fn used(&self) -> &[String] {
        &self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_shape() {
        let (set, codes) = BackupCodeSet::generate(BACKUP_CODE_COUNT);
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        assert_eq!(set.total(), BACKUP_CODE_COUNT as u32);
        assert_eq!(set.remaining(), BACKUP_CODE_COUNT as u32);

        for code in &codes {
            assert_eq!(code.len(), HALF_LEN * 2 + 1);
            assert_eq!(code.chars().filter(|&c| c == '-').count(), 1);
        }

        // Plaintext never equals the stored material
        for (code, hash) in codes.iter().zip(set.hashes()) {
            assert_ne!(code, hash);
        }
    }

    #[test]
    fn test_consume_once_only() {
        let (mut set, codes) = BackupCodeSet::generate(3);
        let hash = BackupCodeSet::hash_code(&codes[0]);

        assert_eq!(set.consume_hash(&hash), Ok(2));
        assert_eq!(
            set.consume_hash(&hash),
            Err(BackupCodeRejection::AlreadyUsed)
        );
        assert_eq!(set.remaining(), 2);
    }

    #[test]
    fn test_unknown_code_rejected() {
        let (mut set, _codes) = BackupCodeSet::generate(3);
        let hash = BackupCodeSet::hash_code("AAAAA-AAAAA");
        assert_eq!(set.consume_hash(&hash), Err(BackupCodeRejection::Unknown));
        assert_eq!(set.remaining(), 3);
    }

    #[test]
    fn test_normalization_forgives_formatting() {
        let canonical = BackupCodeSet::hash_code("ABCDE-23456");
        assert_eq!(BackupCodeSet::hash_code("abcde 23456"), canonical);
        assert_eq!(BackupCodeSet::hash_code(" ABCDE23456 "), canonical);
        assert_ne!(BackupCodeSet::hash_code("ABCDE-23457"), canonical);
    }

    #[test]
    fn test_regeneration_replaces_prior_set() {
        let (set_one, codes_one) = BackupCodeSet::generate(3);
        let (mut set_two, _codes_two) = BackupCodeSet::generate(3);

        // Codes from the first generation are unknown to the second
        let old_hash = BackupCodeSet::hash_code(&codes_one[0]);
        assert!(set_one.hashes().contains(&old_hash));
        assert_eq!(
            set_two.consume_hash(&old_hash),
            Err(BackupCodeRejection::Unknown)
        );
    }

    #[test]
    fn test_from_parts_roundtrip() {
        let (set, codes) = BackupCodeSet::generate(2);
        let mut restored =
            BackupCodeSet::from_parts(set.hashes().to_vec(), set.used().to_vec());

        let hash = BackupCodeSet::hash_code(&codes[1]);
        assert_eq!(restored.consume_hash(&hash), Ok(1));
    }
}
