//! Per-invocation request context.
//!
//! [`RequestContext`] carries read-only caller data (identity, session,
//! free-form metadata) alongside the conversation state for exactly one
//! turn. It is rebuilt from the incoming request on every call and never
//! persisted as history.

use serde::{Deserialize, Serialize};

/// Read-only data accompanying one invocation of one conversation.
///
/// **Interaction**: built by the HTTP facade per request; read by tools
/// (e.g. `user_info`) and middleware during engine execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_id: String,
    pub session_id: String,
    /// Caller role, e.g. for permission-based tool filtering.
    pub role: String,
    /// Arbitrary caller-supplied fields.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            session_id: String::new(),
            role: "user".to_string(),
            metadata: serde_json::Map::new(),
        }
    }
}

impl RequestContext {
    /// Context for one turn: caller identity plus the session (thread) id.
    pub fn for_session(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// The user id, or `"anonymous"` when the caller did not identify itself.
    pub fn user_or_anonymous(&self) -> &str {
        if self.user_id.is_empty() {
            "anonymous"
        } else {
            &self.user_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_role_is_user() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.role, "user");
        assert_eq!(ctx.user_or_anonymous(), "anonymous");
    }

    #[test]
    fn for_session_sets_identity() {
        let ctx = RequestContext::for_session("u1", "t1");
        assert_eq!(ctx.user_id, "u1");
        assert_eq!(ctx.session_id, "t1");
        assert_eq!(ctx.user_or_anonymous(), "u1");
    }
}
