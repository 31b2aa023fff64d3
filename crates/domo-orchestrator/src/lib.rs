//! `domo-orchestrator` — the inbound consumer loop.
//!
//! N consumers share one consumer group on `stream_in`. Each entry is
//! parsed, routed to the user's active secretary, run through the
//! conversation graph, and answered on `stream_out`. Failures follow the
//! bounded-retry policy: an external attempt counter (INCR + EXPIRE) is
//! bumped, the entry is left pending for reclamation until the budget is
//! spent, then the original payload moves to the dead-letter stream and
//! the entry is acked. Nothing is ever silently dropped: every inbound
//! entry ends as an outbound response, a DLQ record, or a pending entry
//! another consumer will pick up.

pub mod consumer;
pub mod error;
pub mod sub_runner;

pub use consumer::{Orchestrator, OrchestratorDeps, OrchestratorSettings};
pub use error::ProcessError;
