//! Node registry: the closed, ordered set of addressable nodes.
//!
//! Declared once at process start; every name here has exactly one factory
//! entry and one prompt document (checked by
//! [`AgentFactory::verify`](crate::factory::AgentFactory::verify)).
//! Membership tests never fail; rejecting an unknown name is the caller's
//! job.

/// Node names in catalog order. Add a node here, give it a factory method
/// in [`AgentFactory`](crate::factory::AgentFactory), and add a prompt
/// document under `prompts/`.
pub const NODES: &[&str] = &["assistant"];

/// Ordered set of valid node names.
#[derive(Clone, Debug)]
pub struct NodeRegistry {
    names: Vec<String>,
}

impl NodeRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// All node names, in configured order.
    pub fn list(&self) -> &[String] {
        &self.names
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new(NODES.iter().copied())
    }
}
