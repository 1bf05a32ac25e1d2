//! Agent-execution engine contract.
//!
//! The engine consumes {descriptor, conversation state, request context}
//! and produces one turn's [`TurnUpdate`], either whole or as an
//! incremental chunk stream followed by the complete update. Routing never
//! looks inside: retries, tool loops, and middleware application are engine
//! concerns.

mod mock;
mod openai;

pub use mock::MockEngine;
pub use openai::OpenAiEngine;

pub use async_openai::config::OpenAIConfig;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::context::RequestContext;
use crate::error::AgentError;
use crate::factory::AgentDescriptor;
use crate::state::{ConversationState, TurnUpdate};

/// One increment of assistant text from a streaming turn.
#[derive(Clone, Debug)]
pub struct ReplyChunk {
    pub content: String,
}

/// Exponential-backoff policy for the model call inside a turn.
///
/// `max_attempts` counts the first try; `disabled()` means one attempt and
/// no waiting. Delay doubles per attempt, capped at `max_delay`.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retrying after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Executes one conversational turn for a resolved agent descriptor.
#[async_trait]
pub trait AgentEngine: Send + Sync {
    /// One turn: read the state, return messages to append and extension
    /// updates. Must not mutate the input state.
    async fn execute(
        &self,
        descriptor: &AgentDescriptor,
        state: &ConversationState,
        ctx: &RequestContext,
    ) -> Result<TurnUpdate, AgentError>;

    /// Streaming variant: send [`ReplyChunk`]s through `chunk_tx` as they
    /// arrive, then return the complete update. The default runs
    /// [`execute`](Self::execute) and forwards the final assistant text as
    /// one chunk.
    async fn execute_stream(
        &self,
        descriptor: &AgentDescriptor,
        state: &ConversationState,
        ctx: &RequestContext,
        chunk_tx: mpsc::Sender<ReplyChunk>,
    ) -> Result<TurnUpdate, AgentError> {
        let turn = self.execute(descriptor, state, ctx).await?;
        if let Some(reply) = turn
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::Role::Assistant)
        {
            if !reply.content.is_empty() {
                let _ = chunk_tx
                    .send(ReplyChunk {
                        content: reply.content.clone(),
                    })
                    .await;
            }
        }
        Ok(turn)
    }
}
