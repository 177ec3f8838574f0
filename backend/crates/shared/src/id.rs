//! Common ID Types
//!
//! Type-safe ID wrappers for domain entities, plus the globally ordered
//! snowflake id used by the audit log.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generic typed ID wrapper
///
/// Usage:
/// ```
/// use kernel::id::{Id, markers};
/// type UserId = Id<markers::User>;
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id<T> {
    value: uuid::Uuid,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    /// Create a new random ID (UUID v4)
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4(),
            _marker: PhantomData,
        }
    }

    /// Create from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            value: uuid,
            _marker: PhantomData,
        }
    }

    /// Parse from the canonical string form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self::from_uuid(s.parse()?))
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.value
    }

    /// Convert to UUID
    pub fn into_uuid(self) -> Uuid {
        self.value
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> From<Uuid> for Id<T> {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl<T> From<Id<T>> for Uuid {
    fn from(id: Id<T>) -> Self {
        id.value
    }
}

impl<T> serde::Serialize for Id<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de, T> serde::Deserialize<'de> for Id<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_uuid(Uuid::deserialize(deserializer)?))
    }
}

/// Marker types for different entity IDs
pub mod markers {
    /// Marker for User IDs
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub struct User;

    /// Marker for Session IDs
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Session;

    /// Marker for login transaction IDs
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AuthTx;

    /// Marker for known-device IDs
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Device;
}

/// Type aliases for common IDs
pub type UserId = Id<markers::User>;
pub type SessionId = Id<markers::Session>;
pub type AuthTxId = Id<markers::AuthTx>;
pub type DeviceId = Id<markers::Device>;

// ============================================================================
// Audit log ids (snowflake)
// ============================================================================

/// Epoch for log ids: 2024-01-01T00:00:00Z
const LOG_ID_EPOCH_MS: i64 = 1_704_067_200_000;

const WORKER_ID_BITS: u8 = 10;
const SEQUENCE_BITS: u8 = 12;
const MAX_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// Globally ordered audit log id
///
/// Layout: 41 bits of milliseconds since [`LOG_ID_EPOCH_MS`], 10 bits of
/// worker id, 12 bits of per-millisecond sequence. Ids generated by the same
/// process are strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct LogId(pub i64);

impl LogId {
    /// Millisecond timestamp embedded in the id
    pub fn timestamp_ms(&self) -> i64 {
        (self.0 >> (WORKER_ID_BITS + SEQUENCE_BITS)) + LOG_ID_EPOCH_MS
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snowflake generator for [`LogId`]s
///
/// One instance per process; cheap to share behind an `Arc`.
pub struct LogIdGenerator {
    worker_id: u16,
    state: Mutex<(i64, u16)>,
}

impl LogIdGenerator {
    /// Create a generator for the given worker id (wraps at 10 bits)
    pub fn new(worker_id: u16) -> Self {
        Self {
            worker_id: worker_id & MAX_WORKER_ID,
            state: Mutex::new((0, 0)),
        }
    }

    /// Generate the next id, strictly greater than any previous one
    pub fn next_id(&self) -> LogId {
        let mut state = self.state.lock().expect("log id state poisoned");
        let (last_ms, seq) = *state;

        let mut now_ms = Self::now_ms();
        if now_ms < last_ms {
            // Clock went backwards; keep issuing within the last observed ms
            now_ms = last_ms;
        }

        let seq = if now_ms == last_ms {
            if seq >= MAX_SEQUENCE {
                // Sequence exhausted for this millisecond, move to the next
                now_ms += 1;
                0
            } else {
                seq + 1
            }
        } else {
            0
        };

        *state = (now_ms, seq);

        let ts = now_ms - LOG_ID_EPOCH_MS;
        LogId(
            (ts << (WORKER_ID_BITS + SEQUENCE_BITS))
                | ((self.worker_id as i64) << SEQUENCE_BITS)
                | seq as i64,
        )
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_type_safety() {
        let user_id: UserId = Id::new();
        let session_id: SessionId = Id::new();

        // These are different types, cannot be mixed
        let _u: Uuid = user_id.into_uuid();
        let _s: Uuid = session_id.into_uuid();
    }

    #[test]
    fn test_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let id: AuthTxId = Id::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn test_id_parse_roundtrip() {
        let id: AuthTxId = Id::new();
        let parsed = AuthTxId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_log_ids_strictly_increasing() {
        let generator = LogIdGenerator::new(1);
        let mut prev = generator.next_id();
        for _ in 0..10_000 {
            let next = generator.next_id();
            assert!(next > prev, "log ids must be strictly increasing");
            prev = next;
        }
    }

    #[test]
    fn test_log_id_timestamp_recoverable() {
        let generator = LogIdGenerator::new(3);
        let before = LogIdGenerator::now_ms();
        let id = generator.next_id();
        let after = LogIdGenerator::now_ms() + 1;

        assert!(id.timestamp_ms() >= before);
        assert!(id.timestamp_ms() <= after);
    }

    #[test]
    fn test_worker_id_masked() {
        let generator = LogIdGenerator::new(u16::MAX);
        assert_eq!(generator.worker_id, MAX_WORKER_ID);
    }
}
