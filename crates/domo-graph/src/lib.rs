//! `domo-graph` — the assistant conversation graph.
//!
//! One graph run handles one inbound event end to end:
//!
//! ```text
//! init_state → load_context → retrieve_memories → load_user_facts
//!      ↓
//! should_summarize → [summarize_history] → ensure_context_limit
//!      ↓
//! assistant (LLM) → tools? → back to should_summarize
//!      ↓ (no tool calls)
//! finalize_processing
//! ```
//!
//! The graph is a plain state machine over [`GraphState`]: each node takes
//! the state, produces a message delta and field updates, and the
//! [`reducer`] merges deltas while enforcing the tool-pair and
//! single-summary invariants. A [`Checkpointer`] persists the state after
//! every node so an interrupted run can resume.

pub mod checkpoint;
pub mod error;
pub mod graph;
pub mod message;
pub mod nodes;
pub mod reducer;
pub mod state;
pub mod tokens;

pub use checkpoint::{Checkpointer, MemoryCheckpointer, ThreadLocks};
pub use error::{GraphError, Result};
pub use graph::{ConversationGraph, GraphDeps, GraphOutcome};
pub use message::GraphMessage;
pub use state::GraphState;
