//! Mock engine: canned replies and invocation recording for tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::AgentError;
use crate::factory::AgentDescriptor;
use crate::message::Message;
use crate::state::{ConversationState, TurnUpdate};

use super::AgentEngine;

/// Stateless engine stub: returns a fixed assistant reply and counts how
/// often it was invoked. Bypasses middleware and tools.
#[derive(Debug, Default)]
pub struct MockEngine {
    reply: String,
    calls: AtomicUsize,
}

impl MockEngine {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many turns this engine has executed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentEngine for MockEngine {
    async fn execute(
        &self,
        _descriptor: &AgentDescriptor,
        _state: &ConversationState,
        _ctx: &RequestContext,
    ) -> Result<TurnUpdate, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TurnUpdate {
            messages: vec![Message::assistant(self.reply.clone())],
            extensions: Default::default(),
        })
    }
}
