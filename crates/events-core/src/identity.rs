//! Identity collaborator contract.
//!
//! Cookie/storage precedence and anonymous-id migration live outside the SDK
//! core; the core only reads the current ids when stamping events.

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

/// Source of the ids stamped onto outgoing events.
pub trait IdentityProvider: Send + Sync {
    /// Current user id, if the user has been identified.
    fn user_id(&self) -> Option<String>;

    /// Current anonymous id.
    fn anonymous_id(&self) -> Option<String>;

    /// Current session id (unix millis of session start).
    fn session_id(&self) -> Option<i64>;

    /// Replace the user id.
    fn set_user_id(&self, user_id: Option<String>);

    /// Replace the anonymous id.
    fn set_anonymous_id(&self, anonymous_id: Option<String>);
}

#[derive(Debug, Default)]
struct IdentityState {
    user_id: Option<String>,
    anonymous_id: Option<String>,
    session_id: Option<i64>,
}

/// Process-local identity store.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
    state: RwLock<IdentityState>,
}

impl MemoryIdentity {
    /// Create an identity with a generated anonymous id and a new session.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IdentityState {
                user_id: None,
                anonymous_id: Some(Uuid::new_v4().to_string()),
                session_id: Some(Utc::now().timestamp_millis()),
            }),
        }
    }

    /// Create an identity with no ids at all.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl IdentityProvider for MemoryIdentity {
    fn user_id(&self) -> Option<String> {
        self.state.read().user_id.clone()
    }

    fn anonymous_id(&self) -> Option<String> {
        self.state.read().anonymous_id.clone()
    }

    fn session_id(&self) -> Option<i64> {
        self.state.read().session_id
    }

    fn set_user_id(&self, user_id: Option<String>) {
        self.state.write().user_id = user_id;
    }

    fn set_anonymous_id(&self, anonymous_id: Option<String>) {
        self.state.write().anonymous_id = anonymous_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_identity_has_anonymous_id_and_session() {
        let identity = MemoryIdentity::new();
        assert!(identity.anonymous_id().is_some());
        assert!(identity.session_id().is_some());
        assert!(identity.user_id().is_none());
    }

    #[test]
    fn test_empty_identity() {
        let identity = MemoryIdentity::empty();
        assert!(identity.anonymous_id().is_none());
        assert!(identity.session_id().is_none());
    }

    #[test]
    fn test_set_ids() {
        let identity = MemoryIdentity::empty();
        identity.set_user_id(Some("user-1".into()));
        identity.set_anonymous_id(Some("anon-1".into()));
        assert_eq!(identity.user_id().as_deref(), Some("user-1"));
        assert_eq!(identity.anonymous_id().as_deref(), Some("anon-1"));

        identity.set_user_id(None);
        assert!(identity.user_id().is_none());
    }
}
