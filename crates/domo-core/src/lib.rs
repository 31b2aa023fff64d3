//! `domo-core` — shared foundation for the domo orchestration services.
//!
//! Holds the pieces every other crate needs and nothing else: the merged
//! TOML + env configuration, the cross-component error taxonomy, the
//! per-request correlation context, and the closed event vocabulary used
//! in structured log lines.

pub mod config;
pub mod context;
pub mod error;
pub mod events;

pub use config::DomoConfig;
pub use context::RequestContext;
pub use error::{CoreError, ErrorKind};
pub use events::EventKind;
