//! List Sessions Use Case
//!
//! Keyset cursor pagination over sessions, newest first. The ownership
//! scope is decided here, not by the client: callers without the
//! `session:revoke:any` permission always see their own sessions only, no
//! matter what filter they sent.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use kernel::id::SessionId;
use kernel::principal::CurrentUser;

use crate::domain::entity::Session;
use crate::domain::repository::{SessionCursor, SessionFilter, SessionRepository};
use crate::error::{SessionError, SessionResult};

const DEFAULT_TAKE: i64 = 20;
const MAX_TAKE: i64 = 100;

/// One page of sessions
#[derive(Debug)]
pub struct SessionPage {
    pub docs: Vec<Session>,
    pub has_next: bool,
    pub next_cursor: Option<String>,
}

/// List sessions use case
pub struct ListSessionsUseCase<S>
where
    S: SessionRepository,
{
    repo: Arc<S>,
}

impl<S> ListSessionsUseCase<S>
where
    S: SessionRepository,
{
    pub fn new(repo: Arc<S>) -> Self {
        Self { repo }
    }

    pub async fn execute(
        &self,
        current_user: &CurrentUser,
        mut filter: SessionFilter,
        cursor: Option<String>,
        take: Option<i64>,
    ) -> SessionResult<SessionPage> {
        // Server-side scoping: the client-supplied owner filter is only
        // honored for privileged callers.
        if !current_user.has_permission("session:revoke:any") {
            filter.user_id = Some(current_user.user_id);
        }

        let cursor = cursor.map(|raw| decode_cursor(&raw)).transpose()?;
        let take = take.unwrap_or(DEFAULT_TAKE).clamp(1, MAX_TAKE);

        // Fetch one extra row to learn whether a next page exists
        let mut docs = self.repo.list_page(&filter, cursor, take + 1).await?;

        let has_next = docs.len() as i64 > take;
        if has_next {
            docs.truncate(take as usize);
        }

        let next_cursor = if has_next {
            docs.last().map(|session| {
                encode_cursor(&SessionCursor {
                    created_at_micros: session.created_at.timestamp_micros(),
                    session_id: session.session_id,
                })
            })
        } else {
            None
        };

        Ok(SessionPage {
            docs,
            has_next,
            next_cursor,
        })
    }
}

/// Cursor wire format: base64url of `{created_at_micros}.{session_id}`
pub fn encode_cursor(cursor: &SessionCursor) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}.{}", cursor.created_at_micros, cursor.session_id))
}

pub fn decode_cursor(raw: &str) -> SessionResult<SessionCursor> {
    let decoded = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| SessionError::InvalidCursor)
        .and_then(|bytes| {
            String::from_utf8(bytes).map_err(|_| SessionError::InvalidCursor)
        })?;

    let (micros, id) = decoded
        .split_once('.')
        .ok_or(SessionError::InvalidCursor)?;

    Ok(SessionCursor {
        created_at_micros: micros
            .parse()
            .map_err(|_| SessionError::InvalidCursor)?,
        session_id: SessionId::parse(id)
            .map_err(|_| SessionError::InvalidCursor)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_roundtrip() {
        let cursor = SessionCursor {
            created_at_micros: 1_700_000_000_123_456,
            session_id: SessionId::new(),
        };
        let encoded = encode_cursor(&cursor);
        assert_eq!(decode_cursor(&encoded).unwrap(), cursor);
    }

    #[test]
    fn test_malformed_cursors_rejected() {
        assert!(decode_cursor("!!!not-base64!!!").is_err());
        assert!(decode_cursor(&URL_SAFE_NO_PAD.encode("no-dot")).is_err());
        assert!(decode_cursor(&URL_SAFE_NO_PAD.encode("abc.not-a-uuid")).is_err());
    }
}
