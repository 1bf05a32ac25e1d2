//! # Switchboard
//!
//! A node-routed agent service core. Conversations flow through named
//! **nodes**: a request names a node, the router validates it against the
//! registry, the factory resolves it to a model + prompt + tool bundle, and
//! an engine runs one turn with a **state-in, state-out** contract: the
//! engine reads an immutable state snapshot and returns the messages and
//! extension updates to append, never mutating in place.
//!
//! ## Design principles
//!
//! - **Single state type**: one [`ConversationState`] per thread carries
//!   the message history, the last-routed node, and an open extension map.
//! - **One turn per call**: the engine receives state and returns a
//!   [`TurnUpdate`]; the router folds it into a new snapshot.
//! - **Nodes are data**: the registry is an ordered name list, the factory
//!   maps each name to an [`AgentDescriptor`]. Adding a node touches the
//!   list, the factory, and a prompt file.
//! - **Engines are pluggable**: [`AgentEngine`] hides the model provider;
//!   [`OpenAiEngine`] runs Chat Completions with tools and retry,
//!   [`MockEngine`] serves tests.
//!
//! ## Main modules
//!
//! - [`registry`]: [`NodeRegistry`], the ordered node-name list.
//! - [`factory`]: [`AgentFactory`], [`AgentDescriptor`], [`FactoryConfig`].
//! - [`router`]: [`Router`], validated dispatch to the engine.
//! - [`state`]: [`ConversationState`], [`TurnUpdate`].
//! - [`engine`]: [`AgentEngine`], [`OpenAiEngine`], [`MockEngine`],
//!   [`RetryPolicy`], [`ReplyChunk`].
//! - [`tools`]: [`Toolbox`] trait and the built-in toolbox.
//! - [`middleware`]: [`Middleware`] hooks around the model call.
//! - [`memory`]: [`ThreadStore`] per thread, [`PreferenceStore`] per user.
//! - [`prompts`]: [`PromptStore`], embedded prompts with disk overrides.
//! - [`message`] / [`context`] / [`error`]: shared value types.
//!
//! Key types are re-exported at crate root:
//! `use switchboard::{Router, ConversationState, AgentError};`.

pub mod context;
pub mod engine;
pub mod error;
pub mod factory;
pub mod memory;
pub mod message;
pub mod middleware;
pub mod prompts;
pub mod registry;
pub mod router;
pub mod state;
pub mod tools;

pub use context::RequestContext;
pub use engine::{AgentEngine, MockEngine, OpenAiEngine, ReplyChunk, RetryPolicy};
pub use error::AgentError;
pub use factory::{AgentDescriptor, AgentFactory, FactoryConfig};
pub use memory::{
    MemoryPreferenceStore, MemoryThreadStore, PreferenceStore, StoreError, ThreadStore,
};
pub use message::{Message, Role};
pub use middleware::{Middleware, PendingCall};
pub use prompts::PromptStore;
pub use registry::{NodeRegistry, NODES};
pub use router::Router;
pub use state::{ConversationState, TurnUpdate};
pub use tools::{BuiltinToolbox, ToolError, ToolOutcome, ToolSpec, Toolbox};
