//! Agent factory: node name to capability bundle.
//!
//! One factory method per node, the same way the node list in
//! [`registry`](crate::registry) is one entry per node. `build` dispatches
//! by name; `verify` builds every registered node once at startup so a
//! missing prompt or factory entry aborts the process instead of failing a
//! request later.
//!
//! To add a node: append its name to [`NODES`](crate::registry::NODES), add
//! a method here, and drop a prompt document under `prompts/`.

use std::sync::Arc;

use crate::engine::RetryPolicy;
use crate::error::AgentError;
use crate::memory::{MemoryPreferenceStore, PreferenceStore};
use crate::middleware::{HistoryCompaction, Middleware, RequestLogging};
use crate::prompts::PromptStore;
use crate::registry::NodeRegistry;
use crate::tools::{BuiltinToolbox, Toolbox};

/// Known model identifiers.
pub mod models {
    pub const GPT_5_2: &str = "gpt-5.2";
    pub const GPT_5_MINI: &str = "gpt-5-mini";
    pub const O4_MINI: &str = "o4-mini";
    pub const O3: &str = "o3";
}

/// Resolved configuration for one node: everything the engine needs to run
/// a turn. Immutable once built; cheap to rebuild per call.
pub struct AgentDescriptor {
    pub node: String,
    pub model: String,
    pub system_prompt: String,
    pub toolbox: Arc<dyn Toolbox>,
    pub middleware: Vec<Arc<dyn Middleware>>,
    pub retry: RetryPolicy,
    pub temperature: Option<f32>,
}

// Hand-written: the trait objects have no Debug bound, so we print the
// tool and middleware names instead.
impl std::fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tools: Vec<String> = self.toolbox.specs().into_iter().map(|s| s.name).collect();
        let middleware: Vec<&str> = self.middleware.iter().map(|m| m.name()).collect();
        f.debug_struct("AgentDescriptor")
            .field("node", &self.node)
            .field("model", &self.model)
            .field("tools", &tools)
            .field("middleware", &middleware)
            .field("retry", &self.retry)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

/// Process-wide knobs shared by every factory entry, derived from settings
/// at startup.
#[derive(Clone, Debug)]
pub struct FactoryConfig {
    pub model: String,
    pub enable_logging: bool,
    pub enable_summarization: bool,
    /// Model-call retry inside the engine; `RetryPolicy::disabled()` unless
    /// retries are turned on.
    pub retry: RetryPolicy,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            model: models::GPT_5_MINI.to_string(),
            enable_logging: false,
            enable_summarization: true,
            retry: RetryPolicy::disabled(),
        }
    }
}

/// Maps node names to [`AgentDescriptor`]s.
pub struct AgentFactory {
    registry: NodeRegistry,
    prompts: PromptStore,
    config: FactoryConfig,
    prefs: Arc<dyn PreferenceStore>,
}

impl AgentFactory {
    pub fn new(prompts: PromptStore, config: FactoryConfig) -> Self {
        Self {
            registry: NodeRegistry::default(),
            prompts,
            config,
            prefs: Arc::new(MemoryPreferenceStore::new()),
        }
    }

    /// Swaps the per-user preference backend shared by every node's tools.
    pub fn with_preference_store(mut self, prefs: Arc<dyn PreferenceStore>) -> Self {
        self.prefs = prefs;
        self
    }

    /// The registry this factory serves; same ordered set the facade lists.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Builds the descriptor for a node. Fails with
    /// [`AgentError::UnknownNode`] for names outside the registry.
    pub fn build(&self, node: &str) -> Result<AgentDescriptor, AgentError> {
        if !self.registry.is_valid(node) {
            return Err(AgentError::UnknownNode(node.to_string()));
        }
        match node {
            "assistant" => self.assistant(),
            other => Err(AgentError::UnknownNode(other.to_string())),
        }
    }

    /// Builds every registered node once and checks its prompt is
    /// non-empty. Run at startup; any failure is a configuration error.
    pub fn verify(&self) -> Result<(), AgentError> {
        for node in self.registry.list() {
            let descriptor = self.build(node)?;
            if descriptor.system_prompt.trim().is_empty() {
                return Err(AgentError::PromptNotFound(node.clone()));
            }
        }
        Ok(())
    }

    /// General assistant: built-in tools, default pipeline.
    fn assistant(&self) -> Result<AgentDescriptor, AgentError> {
        Ok(AgentDescriptor {
            node: "assistant".to_string(),
            model: self.config.model.clone(),
            system_prompt: self.prompts.load("assistant")?,
            toolbox: Arc::new(BuiltinToolbox::new(self.prefs.clone())),
            middleware: self.default_pipeline(),
            retry: self.config.retry.clone(),
            temperature: None,
        })
    }

    /// Pipeline order: compaction, then logging.
    fn default_pipeline(&self) -> Vec<Arc<dyn Middleware>> {
        let mut pipeline: Vec<Arc<dyn Middleware>> = Vec::new();
        if self.config.enable_summarization {
            pipeline.push(Arc::new(HistoryCompaction::default()));
        }
        if self.config.enable_logging {
            pipeline.push(Arc::new(RequestLogging));
        }
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(config: FactoryConfig) -> AgentFactory {
        AgentFactory::new(PromptStore::with_dir("/nonexistent_prompts_dir_12345"), config)
    }

    #[test]
    fn build_unknown_node_fails() {
        let err = factory(FactoryConfig::default()).build("researcher").unwrap_err();
        assert!(matches!(err, AgentError::UnknownNode(_)));
    }

    #[test]
    fn verify_succeeds_with_embedded_prompts() {
        factory(FactoryConfig::default()).verify().unwrap();
    }

    #[test]
    fn descriptor_carries_configured_model() {
        let config = FactoryConfig {
            model: models::O4_MINI.to_string(),
            ..FactoryConfig::default()
        };
        let descriptor = factory(config).build("assistant").unwrap();
        assert_eq!(descriptor.model, models::O4_MINI);
        assert!(!descriptor.system_prompt.trim().is_empty());
        assert_eq!(descriptor.toolbox.specs().len(), 4);
    }

    /// `unwrap_err` on a build result needs the descriptor to be Debug.
    #[test]
    fn descriptor_debug_names_tools_and_pipeline() {
        let d = factory(FactoryConfig::default()).build("assistant").unwrap();
        let rendered = format!("{d:?}");
        assert!(rendered.contains("\"assistant\""));
        assert!(rendered.contains("calculate"));
        assert!(rendered.contains("history_compaction"));
    }

    #[test]
    fn pipeline_follows_feature_flags() {
        let none = FactoryConfig {
            enable_logging: false,
            enable_summarization: false,
            ..FactoryConfig::default()
        };
        assert!(factory(none).build("assistant").unwrap().middleware.is_empty());

        let both = FactoryConfig {
            enable_logging: true,
            enable_summarization: true,
            ..FactoryConfig::default()
        };
        let pipeline = factory(both).build("assistant").unwrap().middleware;
        let names: Vec<&str> = pipeline.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["history_compaction", "request_logging"]);
    }

    /// Every registered node builds and loads a non-empty prompt.
    #[test]
    fn every_registered_node_builds() {
        let f = factory(FactoryConfig::default());
        for node in f.registry().list() {
            let d = f.build(node).unwrap();
            assert!(!d.system_prompt.trim().is_empty(), "empty prompt: {node}");
        }
    }
}
