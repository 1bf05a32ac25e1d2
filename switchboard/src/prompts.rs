//! Prompt documents, one markdown file per node.
//!
//! **Canonical source**: default prompt text lives in `prompts/*.md` and is
//! embedded at compile time. A `PROMPTS_DIR` environment variable (or an
//! explicit directory) points at on-disk documents that override the
//! embedded defaults. Documents are static for the process lifetime, so the
//! first successful read is cached.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::error::AgentError;

const EMBED_ASSISTANT: &str = include_str!("../prompts/assistant.md");

/// Returns the embedded default document for a node, when one exists.
fn embedded(node: &str) -> Option<&'static str> {
    match node {
        "assistant" => Some(EMBED_ASSISTANT),
        _ => None,
    }
}

/// Loads and caches system-prompt documents by node name.
pub struct PromptStore {
    dir: Option<PathBuf>,
    cache: DashMap<String, String>,
}

impl PromptStore {
    /// Store with the directory taken from `PROMPTS_DIR` when set, else
    /// embedded defaults only.
    pub fn new() -> Self {
        Self {
            dir: std::env::var("PROMPTS_DIR").ok().map(PathBuf::from),
            cache: DashMap::new(),
        }
    }

    /// Store reading `<dir>/<node>.md` before falling back to embedded text.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            cache: DashMap::new(),
        }
    }

    /// Loads the prompt document for a node. Fails with
    /// [`AgentError::PromptNotFound`] when neither the directory nor the
    /// embedded defaults have a non-empty document.
    pub fn load(&self, node: &str) -> Result<String, AgentError> {
        if let Some(hit) = self.cache.get(node) {
            return Ok(hit.clone());
        }
        let text = self.read_uncached(node)?;
        self.cache.insert(node.to_string(), text.clone());
        Ok(text)
    }

    fn read_uncached(&self, node: &str) -> Result<String, AgentError> {
        if let Some(dir) = &self.dir {
            match read_document(dir, node) {
                Ok(Some(text)) => return Ok(text),
                Ok(None) => {} // fall through to embedded default
                Err(e) => return Err(e),
            }
        }
        match embedded(node) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(AgentError::PromptNotFound(node.to_string())),
        }
    }
}

impl Default for PromptStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads `<dir>/<node>.md`. Missing or empty file returns `Ok(None)`; any
/// other read failure is a configuration error for that node.
fn read_document(dir: &Path, node: &str) -> Result<Option<String>, AgentError> {
    let path = dir.join(format!("{node}.md"));
    match std::fs::read_to_string(&path) {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AgentError::PromptNotFound(format!(
            "{node} ({}: {e})",
            path.display()
        ))),
    }
}
