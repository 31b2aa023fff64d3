//! `domo-scheduler` — turns durable reminders into inbound trigger events.
//!
//! # Overview
//!
//! A reconciling loop periodically reads the active reminder set from the
//! state store and mirrors it into an in-process [`wheel::TimeWheel`]; a
//! 1-second dispatcher fires due entries by appending `Trigger` envelopes
//! to the inbound stream, where the orchestrator handles them exactly like
//! user messages.
//!
//! # Reminder kinds
//!
//! | Kind        | Behaviour                                               |
//! |-------------|---------------------------------------------------------|
//! | `one_shot`  | Fires once at `trigger_at` (UTC), then `completed`      |
//! | `recurring` | Cron expression in the reminder's timezone; re-armed    |
//!
//! Fire-path failures are logged and never kill the loop; every fire is
//! recorded as a JobExecution row for the operators.

pub mod cron_eval;
pub mod engine;
pub mod error;
pub mod wheel;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use wheel::TimeWheel;
