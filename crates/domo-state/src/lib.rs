//! `domo-state` — typed client for the state-store REST collaborator.
//!
//! All durable entities (users, assistants, tools, messages, summaries,
//! memories, reminders, settings, job executions) live behind an HTTP CRUD
//! service owned by another team. This crate is the only place that knows
//! its paths and payload shapes. Every call carries the correlation id,
//! retries transient failures with backoff, and is guarded by a circuit
//! breaker so a dead collaborator fails fast instead of stacking timeouts.

pub mod breaker;
pub mod cache;
pub mod client;
pub mod error;
pub mod models;
pub mod secretary;

pub use breaker::CircuitBreaker;
pub use cache::StateCache;
pub use client::StateStoreClient;
pub use error::{Result, StateStoreError};
pub use secretary::SecretaryDirectory;
