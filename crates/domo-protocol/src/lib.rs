//! `domo-protocol` — wire types for the inbound, outbound, and dead-letter
//! streams.
//!
//! Front-ends append [`InboundEvent`]s to `stream_in`; the orchestrator
//! answers with [`AssistantResponse`]s on `stream_out`; entries that exhaust
//! their retry budget land on `stream_in:dlq` as [`DlqEntry`] field maps.
//! Validation is strict on purpose: unknown fields and unknown `kind`
//! discriminators are deserialization errors, so a malformed producer fails
//! at the boundary instead of deep inside a graph run.

pub mod dlq;
pub mod envelope;

pub use dlq::DlqEntry;
pub use envelope::{
    AssistantResponse, EventSource, InboundEvent, MessageMetadata, ResponseStatus, Trigger,
    TriggerType, UserMessage,
};

/// Stream-entry field holding the serialized envelope.
pub const PAYLOAD_FIELD: &str = "payload";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid envelope: {0}")]
    Invalid(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
