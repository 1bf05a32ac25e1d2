//! Router: validated dispatch from node name to engine execution.
//!
//! The router owns the only path from a request to a turn: validate the
//! node against the registry, build its descriptor, hand state and context
//! to the engine, and fold the returned [`TurnUpdate`] into a new state
//! snapshot. Unknown nodes are rejected before the engine is touched.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::context::RequestContext;
use crate::engine::{AgentEngine, ReplyChunk};
use crate::error::AgentError;
use crate::factory::AgentFactory;
use crate::state::ConversationState;

pub struct Router {
    factory: AgentFactory,
    engine: Arc<dyn AgentEngine>,
}

impl Router {
    pub fn new(factory: AgentFactory, engine: Arc<dyn AgentEngine>) -> Self {
        Self { factory, engine }
    }

    pub fn factory(&self) -> &AgentFactory {
        &self.factory
    }

    /// Runs one turn on `node` and returns the updated state. The input
    /// state is read only; callers decide whether to persist the result.
    pub async fn route(
        &self,
        node: &str,
        state: &ConversationState,
        ctx: &RequestContext,
    ) -> Result<ConversationState, AgentError> {
        let descriptor = self.factory.build(node)?;
        debug!(node, thread_id = %state.thread_id, "routing turn");
        let turn = self.engine.execute(&descriptor, state, ctx).await?;
        Ok(state.applying(turn, node))
    }

    /// Streaming variant of [`route`](Self::route): forwards reply chunks
    /// through `chunk_tx` while the turn runs.
    pub async fn route_stream(
        &self,
        node: &str,
        state: &ConversationState,
        ctx: &RequestContext,
        chunk_tx: mpsc::Sender<ReplyChunk>,
    ) -> Result<ConversationState, AgentError> {
        let descriptor = self.factory.build(node)?;
        debug!(node, thread_id = %state.thread_id, stream = true, "routing turn");
        let turn = self
            .engine
            .execute_stream(&descriptor, state, ctx, chunk_tx)
            .await?;
        Ok(state.applying(turn, node))
    }
}
