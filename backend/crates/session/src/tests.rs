//! Unit tests for the session crate
//!
//! Use cases run against an in-memory repository fake injected through the
//! same trait the Postgres implementation satisfies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use audit::AuditPipeline;
use kernel::context::RequestContext;
use kernel::id::{LogIdGenerator, SessionId, UserId};
use kernel::principal::{CurrentUser, UserRole};
use platform::client::ClientFingerprint;
use platform::faststore::InMemoryFastStore;
use platform::lock::LockManager;

use crate::application::config::SessionConfig;
use crate::application::{
    IssueSessionUseCase, ListSessionsUseCase, ResolveSessionUseCase, RevokeSessionsUseCase,
};
use crate::domain::entity::Session;
use crate::domain::repository::{
    SessionCursor, SessionFilter, SessionRepository,
};
use crate::error::{SessionError, SessionResult};

// ============================================================================
// In-memory repository fake
// ============================================================================

#[derive(Clone, Default)]
struct MemorySessionRepository {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
}

impl MemorySessionRepository {
    fn new() -> Self {
        Self::default()
    }

    fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id.as_uuid())
            .cloned()
    }
}

impl SessionRepository for MemorySessionRepository {
    async fn create(&self, session: &Session) -> SessionResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.into_uuid(), session.clone());
        Ok(())
    }

    async fn find_by_id(&self, session_id: SessionId) -> SessionResult<Option<Session>> {
        Ok(self.get(session_id))
    }

    async fn find_active_by_user(&self, user_id: &UserId) -> SessionResult<Vec<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == *user_id && s.is_active())
            .cloned()
            .collect())
    }

    async fn touch(&self, session_id: SessionId, at: DateTime<Utc>) -> SessionResult<()> {
        if let Some(session) = self
            .sessions
            .lock()
            .unwrap()
            .get_mut(session_id.as_uuid())
        {
            session.last_activity_at = at;
        }
        Ok(())
    }

    async fn revoke_for_user(
        &self,
        user_id: &UserId,
        ids: Option<&[SessionId]>,
    ) -> SessionResult<Vec<SessionId>> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut revoked = Vec::new();
        for session in sessions.values_mut() {
            if session.user_id != *user_id || !session.is_active() {
                continue;
            }
            if let Some(ids) = ids {
                if !ids.contains(&session.session_id) {
                    continue;
                }
            }
            session.revoked = true;
            revoked.push(session.session_id);
        }
        Ok(revoked)
    }

    async fn revoke_many(&self, ids: &[SessionId]) -> SessionResult<Vec<(UserId, SessionId)>> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut revoked = Vec::new();
        for id in ids {
            if let Some(session) = sessions.get_mut(id.as_uuid()) {
                if !session.revoked {
                    session.revoked = true;
                    revoked.push((session.user_id, session.session_id));
                }
            }
        }
        Ok(revoked)
    }

    async fn list_page(
        &self,
        filter: &SessionFilter,
        cursor: Option<SessionCursor>,
        take: i64,
    ) -> SessionResult<Vec<Session>> {
        let mut docs: Vec<Session> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| filter.user_id.is_none_or(|u| s.user_id == u))
            .filter(|s| !filter.active_only || s.is_active())
            .cloned()
            .collect();

        docs.sort_by(|a, b| {
            (b.created_at, b.session_id.into_uuid()).cmp(&(a.created_at, a.session_id.into_uuid()))
        });

        if let Some(cursor) = cursor {
            docs.retain(|s| {
                (s.created_at.timestamp_micros(), s.session_id.into_uuid())
                    < (cursor.created_at_micros, cursor.session_id.into_uuid())
            });
        }

        docs.truncate(take as usize);
        Ok(docs)
    }

    async fn cleanup_expired(&self) -> SessionResult<u64> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn pipeline() -> (
    AuditPipeline,
    tokio::sync::mpsc::UnboundedReceiver<audit::AuditLogEntry>,
) {
    AuditPipeline::new(Arc::new(LogIdGenerator::new(1)))
}

fn fingerprint() -> ClientFingerprint {
    ClientFingerprint::new([7u8; 32], [9u8; 32], "10.0.0.1".parse().ok(), Some("test agent".into()))
}

fn issue_use_case(
    repo: &MemorySessionRepository,
    config: SessionConfig,
) -> IssueSessionUseCase<MemorySessionRepository, InMemoryFastStore> {
    let (pipeline, _receiver) = AuditPipeline::new(Arc::new(LogIdGenerator::new(1)));
    IssueSessionUseCase::new(
        Arc::new(repo.clone()),
        Arc::new(LockManager::new(Arc::new(InMemoryFastStore::new()))),
        pipeline,
        Arc::new(config),
    )
}

// ============================================================================
// Issue + resolve
// ============================================================================

mod issue_and_resolve {
    use super::*;

    #[tokio::test]
    async fn test_issued_token_resolves_to_current_user() {
        let repo = MemorySessionRepository::new();
        let config = SessionConfig::with_random_secret();
        let use_case = issue_use_case(&repo, config.clone());

        let user_id = UserId::new();
        let issued = use_case
            .execute(user_id, UserRole::User, &fingerprint(), &RequestContext::new())
            .await
            .unwrap();

        assert!(!issued.refresh_token.is_empty());
        assert!(issued.expires_at_ms > Utc::now().timestamp_millis());

        let resolver = ResolveSessionUseCase::new(Arc::new(repo), Arc::new(config));
        let current_user = resolver
            .execute(&issued.access_token, &[7u8; 32])
            .await
            .unwrap();

        assert_eq!(current_user.user_id, user_id);
        assert_eq!(current_user.session_id, issued.session_id);
        assert_eq!(current_user.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_refresh_token_is_stored_only_as_hash() {
        let repo = MemorySessionRepository::new();
        let use_case = issue_use_case(&repo, SessionConfig::with_random_secret());

        let issued = use_case
            .execute(
                UserId::new(),
                UserRole::User,
                &fingerprint(),
                &RequestContext::new(),
            )
            .await
            .unwrap();

        let stored = repo.get(issued.session_id).unwrap();
        assert_eq!(
            stored.refresh_token_hash,
            platform::crypto::sha256(issued.refresh_token.as_bytes()).to_vec()
        );
        assert_ne!(stored.refresh_token_hash, issued.refresh_token.into_bytes());
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_rejected() {
        let repo = MemorySessionRepository::new();
        let config = SessionConfig::with_random_secret();
        let use_case = issue_use_case(&repo, config.clone());

        let issued = use_case
            .execute(
                UserId::new(),
                UserRole::User,
                &fingerprint(),
                &RequestContext::new(),
            )
            .await
            .unwrap();

        let resolver = ResolveSessionUseCase::new(Arc::new(repo), Arc::new(config));
        let err = resolver
            .execute(&issued.access_token, &[8u8; 32])
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::FingerprintMismatch));
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let repo = MemorySessionRepository::new();
        let resolver = ResolveSessionUseCase::new(
            Arc::new(repo),
            Arc::new(SessionConfig::with_random_secret()),
        );
        let err = resolver.execute("garbage", &[7u8; 32]).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionInvalid));
    }
}

// ============================================================================
// Single-session policy
// ============================================================================

mod single_session {
    use super::*;

    fn single_session_config() -> SessionConfig {
        SessionConfig {
            single_session: true,
            ..SessionConfig::with_random_secret()
        }
    }

    #[tokio::test]
    async fn test_prior_session_revoked_before_new_one_usable() {
        let repo = MemorySessionRepository::new();
        let use_case = issue_use_case(&repo, single_session_config());
        let user_id = UserId::new();

        let first = use_case
            .execute(user_id, UserRole::User, &fingerprint(), &RequestContext::new())
            .await
            .unwrap();
        let second = use_case
            .execute(user_id, UserRole::User, &fingerprint(), &RequestContext::new())
            .await
            .unwrap();

        assert!(repo.get(first.session_id).unwrap().revoked);
        assert!(!repo.get(second.session_id).unwrap().revoked);

        let active = repo.find_active_by_user(&user_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, second.session_id);
    }

    #[tokio::test]
    async fn test_concurrent_issuance_leaves_exactly_one_active() {
        let repo = MemorySessionRepository::new();
        let use_case = Arc::new(issue_use_case(&repo, single_session_config()));
        let user_id = UserId::new();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let use_case = use_case.clone();
            handles.push(tokio::spawn(async move {
                use_case
                    .execute(user_id, UserRole::User, &fingerprint(), &RequestContext::new())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let active = repo.find_active_by_user(&user_id).await.unwrap();
        assert_eq!(active.len(), 1, "single-session policy must hold under races");
    }

    #[tokio::test]
    async fn test_other_users_unaffected() {
        let repo = MemorySessionRepository::new();
        let use_case = issue_use_case(&repo, single_session_config());

        let alice = UserId::new();
        let bob = UserId::new();

        use_case
            .execute(alice, UserRole::User, &fingerprint(), &RequestContext::new())
            .await
            .unwrap();
        use_case
            .execute(bob, UserRole::User, &fingerprint(), &RequestContext::new())
            .await
            .unwrap();

        assert_eq!(repo.find_active_by_user(&alice).await.unwrap().len(), 1);
        assert_eq!(repo.find_active_by_user(&bob).await.unwrap().len(), 1);
    }
}

// ============================================================================
// Revocation
// ============================================================================

mod revocation {
    use super::*;

    async fn seeded(repo: &MemorySessionRepository, user_id: UserId, n: usize) -> Vec<SessionId> {
        let use_case = issue_use_case(repo, SessionConfig::with_random_secret());
        let mut ids = Vec::new();
        for _ in 0..n {
            let issued = use_case
                .execute(user_id, UserRole::User, &fingerprint(), &RequestContext::new())
                .await
                .unwrap();
            ids.push(issued.session_id);
        }
        ids
    }

    #[tokio::test]
    async fn test_revoke_all_then_again_is_noop() {
        let repo = MemorySessionRepository::new();
        let user_id = UserId::new();
        seeded(&repo, user_id, 3).await;

        let (pipeline, _rx) = pipeline();
        let use_case = RevokeSessionsUseCase::new(Arc::new(repo.clone()), pipeline);
        let caller = CurrentUser::new(user_id, SessionId::new(), UserRole::User);

        let first = use_case
            .execute(&caller, None, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(first, 3);

        // Idempotent: nothing left to revoke, still a success
        let second = use_case
            .execute(&caller, None, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_revoke_subset_ignores_foreign_sessions() {
        let repo = MemorySessionRepository::new();
        let alice = UserId::new();
        let bob = UserId::new();
        let alice_ids = seeded(&repo, alice, 2).await;
        let bob_ids = seeded(&repo, bob, 1).await;

        let (pipeline, _rx) = pipeline();
        let use_case = RevokeSessionsUseCase::new(Arc::new(repo.clone()), pipeline);
        let caller = CurrentUser::new(alice, SessionId::new(), UserRole::User);

        // Alice names one of her own sessions and one of Bob's
        let revoked = use_case
            .execute(
                &caller,
                Some(vec![alice_ids[0], bob_ids[0]]),
                &RequestContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(revoked, 1);
        assert!(!repo.get(bob_ids[0]).unwrap().revoked);
    }

    #[tokio::test]
    async fn test_revoked_session_never_resolves_again() {
        let repo = MemorySessionRepository::new();
        let config = SessionConfig::with_random_secret();
        let use_case = issue_use_case(&repo, config.clone());
        let user_id = UserId::new();

        let issued = use_case
            .execute(user_id, UserRole::User, &fingerprint(), &RequestContext::new())
            .await
            .unwrap();

        let (pipeline, _rx) = pipeline();
        let revoke = RevokeSessionsUseCase::new(Arc::new(repo.clone()), pipeline);
        let caller = CurrentUser::new(user_id, issued.session_id, UserRole::User);
        revoke
            .execute(&caller, None, &RequestContext::new())
            .await
            .unwrap();

        let resolver = ResolveSessionUseCase::new(Arc::new(repo), Arc::new(config));
        let err = resolver
            .execute(&issued.access_token, &[7u8; 32])
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionInvalid));
    }

    #[tokio::test]
    async fn test_revoke_many_audits_each_session() {
        let repo = MemorySessionRepository::new();
        let alice_ids = seeded(&repo, UserId::new(), 2).await;
        let bob_ids = seeded(&repo, UserId::new(), 1).await;

        let (pipeline, mut receiver) = pipeline();
        let use_case = RevokeSessionsUseCase::new(Arc::new(repo.clone()), pipeline);

        let mut all: Vec<SessionId> = alice_ids.clone();
        all.extend(bob_ids);
        let revoked = use_case
            .execute_many(&all, &RequestContext::new())
            .await
            .unwrap();
        assert_eq!(revoked, 3);

        // One SessionRevoked entry per revoked session
        let mut audited = 0;
        while let Ok(entry) = receiver.try_recv() {
            assert!(matches!(
                entry.event,
                audit::AuditEvent::SessionRevoked { by_admin: true, .. }
            ));
            audited += 1;
        }
        assert_eq!(audited, 3);
    }
}

// ============================================================================
// Listing
// ============================================================================

mod listing {
    use super::*;

    #[tokio::test]
    async fn test_non_privileged_callers_are_scoped_to_self() {
        let repo = MemorySessionRepository::new();
        let use_case = issue_use_case(&repo, SessionConfig::with_random_secret());

        let alice = UserId::new();
        let bob = UserId::new();
        use_case
            .execute(alice, UserRole::User, &fingerprint(), &RequestContext::new())
            .await
            .unwrap();
        use_case
            .execute(bob, UserRole::User, &fingerprint(), &RequestContext::new())
            .await
            .unwrap();

        let list = ListSessionsUseCase::new(Arc::new(repo));
        let caller = CurrentUser::new(alice, SessionId::new(), UserRole::User);

        // The client-echoed owner filter must not be trusted
        let page = list
            .execute(
                &caller,
                SessionFilter {
                    user_id: Some(bob),
                    active_only: false,
                },
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(page.docs.len(), 1);
        assert_eq!(page.docs[0].user_id, alice);
    }

    #[tokio::test]
    async fn test_admin_may_filter_by_user() {
        let repo = MemorySessionRepository::new();
        let use_case = issue_use_case(&repo, SessionConfig::with_random_secret());

        let alice = UserId::new();
        let admin = UserId::new();
        use_case
            .execute(alice, UserRole::User, &fingerprint(), &RequestContext::new())
            .await
            .unwrap();

        let list = ListSessionsUseCase::new(Arc::new(repo));
        let caller = CurrentUser::new(admin, SessionId::new(), UserRole::Admin);

        let page = list
            .execute(
                &caller,
                SessionFilter {
                    user_id: Some(alice),
                    active_only: false,
                },
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(page.docs.len(), 1);
        assert_eq!(page.docs[0].user_id, alice);
    }

    #[tokio::test]
    async fn test_cursor_pagination_walks_all_sessions() {
        let repo = MemorySessionRepository::new();
        let use_case = issue_use_case(&repo, SessionConfig::with_random_secret());
        let user_id = UserId::new();

        for _ in 0..5 {
            use_case
                .execute(user_id, UserRole::User, &fingerprint(), &RequestContext::new())
                .await
                .unwrap();
        }

        let list = ListSessionsUseCase::new(Arc::new(repo));
        let caller = CurrentUser::new(user_id, SessionId::new(), UserRole::User);

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = list
                .execute(&caller, SessionFilter::default(), cursor, Some(2))
                .await
                .unwrap();
            seen.extend(page.docs.iter().map(|s| s.session_id));
            if !page.has_next {
                break;
            }
            cursor = page.next_cursor;
        }

        assert_eq!(seen.len(), 5);
        let unique: std::collections::HashSet<_> =
            seen.iter().map(|id| id.into_uuid()).collect();
        assert_eq!(unique.len(), 5, "no session may appear on two pages");
    }
}
