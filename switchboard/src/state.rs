//! Conversation state: the checkpointable record for one thread.
//!
//! State flows state-in, state-out: every update helper returns a new
//! [`ConversationState`] and leaves the input untouched, so in-flight
//! conversations can be read concurrently while a turn executes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// One turn's output from the engine: messages to append and extension
/// updates to merge, in that order.
#[derive(Clone, Debug, Default)]
pub struct TurnUpdate {
    pub messages: Vec<Message>,
    pub extensions: BTreeMap<String, serde_json::Value>,
}

/// The accumulated record for one thread.
///
/// Created on the first request for an unseen `thread_id`, then read and
/// replaced (never mutated in place) on every subsequent turn. Retention is
/// owned by the [`ThreadStore`](crate::memory::ThreadStore) holding it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    /// Ordered history; append-only within a turn.
    pub messages: Vec<Message>,
    /// The node that produced the most recent turn. Empty until first routed.
    pub active_node: String,
    /// Node-specific derived data (running summary, notes, preferences).
    #[serde(default)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            active_node: String::new(),
            extensions: BTreeMap::new(),
        }
    }

    /// New state with one user message appended.
    pub fn with_user_message(&self, content: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.messages.push(Message::user(content));
        next
    }

    /// New state with a finished turn merged in: messages appended in arrival
    /// order, extension keys overwritten by the update, `active_node` set to
    /// the node that ran.
    pub fn applying(&self, turn: TurnUpdate, node: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.messages.extend(turn.messages);
        next.extensions.extend(turn.extensions);
        next.active_node = node.into();
        next
    }

    /// Content of the most recent assistant message, if any.
    pub fn last_assistant_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}
