//! `domo-extractor` — periodic fact extraction from recent dialogs.
//!
//! Flow: read extraction settings → enumerate conversations since the
//! watermark → one prompt per conversation listing the user's existing
//! facts → submit as a provider batch → poll → for each extracted fact,
//! dedup against stored memories by embedding similarity and insert or
//! update → enforce the per-user memory cap.
//!
//! The worker is restart-tolerant: every submitted batch is recorded as a
//! BatchJob row, and unfinished rows are resumed by polling the provider
//! before any new work is enumerated.

pub mod error;
pub mod facts;
pub mod worker;

pub use error::{ExtractorError, Result};
pub use worker::MemoryExtractor;
