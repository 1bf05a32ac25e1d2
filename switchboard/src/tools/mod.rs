//! Tool capability set: specs the model sees and the executor behind them.
//!
//! A [`ToolSpec`] describes one callable tool (name, description, JSON
//! schema for arguments). A [`Toolbox`] lists specs and executes calls; the
//! engine feeds the specs to the model and routes returned tool calls back
//! through [`Toolbox::call`]. A tool may update conversation extension
//! fields by returning them in its [`ToolOutcome`].

mod builtin;

pub use builtin::BuiltinToolbox;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::context::RequestContext;

/// Definition of one tool as presented to the model.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    /// JSON schema for the arguments object.
    pub input_schema: serde_json::Value,
}

/// Result of one tool execution: text for the model plus extension-field
/// updates to merge into the turn.
#[derive(Clone, Debug, Default)]
pub struct ToolOutcome {
    pub content: String,
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl ToolOutcome {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extensions: BTreeMap::new(),
        }
    }
}

/// Error from resolving or executing a tool call.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("tool {tool} failed: {message}")]
    Failed { tool: String, message: String },
}

/// Executes tool calls against a fixed set of specs.
///
/// **Interaction**: specs go into the model request; the engine converts a
/// failed call into a tool message so the model can recover, rather than
/// failing the turn.
#[async_trait]
pub trait Toolbox: Send + Sync {
    /// Tool definitions, in a stable order.
    fn specs(&self) -> Vec<ToolSpec>;

    /// Executes one call by name with parsed JSON arguments.
    async fn call(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        ctx: &RequestContext,
    ) -> Result<ToolOutcome, ToolError>;
}
