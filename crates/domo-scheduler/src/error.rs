use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("State store error: {0}")]
    State(#[from] domo_state::StateStoreError),

    #[error("Stream error: {0}")]
    Stream(#[from] domo_stream::StreamError),

    /// The reminder's cron expression or timezone cannot be evaluated.
    #[error("Invalid schedule for reminder {reminder_id}: {reason}")]
    InvalidSchedule { reminder_id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
