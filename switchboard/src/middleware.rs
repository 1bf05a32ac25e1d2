//! Middleware: named extension points around the model call.
//!
//! This is a closed capability interface, not arbitrary injected code: a
//! hook may rewrite the pending system prompt, prune the request message
//! window, or adjust the finished turn, and nothing else. Hooks run in
//! pipeline order on both sides of the model call.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::context::RequestContext;
use crate::message::Message;
use crate::state::TurnUpdate;

/// What a `before_model` hook sees and may alter: the prompt and message
/// window for the upcoming model call, plus extension updates that will be
/// merged into the turn.
#[derive(Clone, Debug)]
pub struct PendingCall {
    pub system_prompt: String,
    /// Request window. Pruning here shrinks what the model sees; the
    /// persisted history is untouched.
    pub messages: Vec<Message>,
    pub extensions: BTreeMap<String, serde_json::Value>,
}

/// One named hook in an agent descriptor's pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before each model call; may rewrite the pending call.
    async fn before_model(&self, _call: &mut PendingCall, _ctx: &RequestContext) {}

    /// Runs after the turn is assembled; may adjust the update.
    async fn after_model(&self, _turn: &mut TurnUpdate, _ctx: &RequestContext) {}
}

/// Logs a preview of the outgoing request and the shape of the reply.
/// Enabled by `ENABLE_LOGGING`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestLogging;

const PREVIEW_LEN: usize = 100;

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_LEN).collect();
    if text.chars().count() > PREVIEW_LEN {
        out.push_str("...");
    }
    out
}

#[async_trait]
impl Middleware for RequestLogging {
    fn name(&self) -> &str {
        "request_logging"
    }

    async fn before_model(&self, call: &mut PendingCall, ctx: &RequestContext) {
        let last = call.messages.last().map(|m| preview(&m.content));
        info!(
            user = ctx.user_or_anonymous(),
            message_count = call.messages.len(),
            last = last.as_deref().unwrap_or(""),
            "model request"
        );
    }

    async fn after_model(&self, turn: &mut TurnUpdate, _ctx: &RequestContext) {
        debug!(appended = turn.messages.len(), "model response merged");
    }
}

/// Prunes the request window once history grows past `max_history`,
/// keeping the most recent `keep` messages and recording a running note in
/// `extensions["summary"]`. Enabled by `ENABLE_SUMMARIZATION`.
#[derive(Clone, Copy, Debug)]
pub struct HistoryCompaction {
    /// Window size that triggers compaction.
    pub max_history: usize,
    /// Messages kept after compaction.
    pub keep: usize,
}

impl Default for HistoryCompaction {
    fn default() -> Self {
        Self {
            max_history: 24,
            keep: 10,
        }
    }
}

const SUMMARY_KEY: &str = "summary";
const SUMMARY_COUNT_KEY: &str = "summary_dropped";

#[async_trait]
impl Middleware for HistoryCompaction {
    fn name(&self) -> &str {
        "history_compaction"
    }

    async fn before_model(&self, call: &mut PendingCall, _ctx: &RequestContext) {
        if call.messages.len() <= self.max_history {
            return;
        }
        // keep may exceed the window when both fields are set by hand
        let dropped = call.messages.len().saturating_sub(self.keep);
        if dropped == 0 {
            return;
        }
        call.messages.drain(..dropped);

        let prior = call
            .extensions
            .get(SUMMARY_COUNT_KEY)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        let total = prior + dropped as u64;
        call.extensions.insert(
            SUMMARY_COUNT_KEY.to_string(),
            serde_json::Value::from(total),
        );
        call.extensions.insert(
            SUMMARY_KEY.to_string(),
            serde_json::Value::String(format!(
                "{total} earlier messages compacted out of the model window"
            )),
        );
        info!(dropped, kept = self.keep, "history compacted");
    }
}
