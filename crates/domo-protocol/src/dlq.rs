use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::ProtocolError;

/// Dead-letter entries keep at most this much of the error message.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// One entry on the `<stream>:dlq` stream.
///
/// Stored as a flat field map (every value a string) so operators can
/// inspect entries with plain `XRANGE` and the requeue path can re-append
/// `payload` untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlqEntry {
    /// Original envelope bytes, exactly as read from the inbound stream.
    pub payload: Vec<u8>,
    pub original_message_id: String,
    pub error_type: String,
    /// Truncated to [`MAX_ERROR_MESSAGE_CHARS`] on construction.
    pub error_message: String,
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
    pub user_id: Option<i64>,
}

impl DlqEntry {
    pub fn new(
        payload: Vec<u8>,
        original_message_id: impl Into<String>,
        error_type: impl Into<String>,
        error_message: &str,
        retry_count: u32,
        failed_at: DateTime<Utc>,
        user_id: Option<i64>,
    ) -> Self {
        Self {
            payload,
            original_message_id: original_message_id.into(),
            error_type: error_type.into(),
            error_message: truncate_chars(error_message, MAX_ERROR_MESSAGE_CHARS),
            retry_count,
            failed_at,
            user_id,
        }
    }

    /// Field pairs in stream-entry layout. `retry_count` is stringified and
    /// `failed_at` rendered as RFC 3339.
    pub fn to_fields(&self) -> Vec<(String, Vec<u8>)> {
        let mut fields = vec![
            ("payload".to_string(), self.payload.clone()),
            (
                "original_message_id".to_string(),
                self.original_message_id.as_bytes().to_vec(),
            ),
            ("error_type".to_string(), self.error_type.as_bytes().to_vec()),
            (
                "error_message".to_string(),
                self.error_message.as_bytes().to_vec(),
            ),
            (
                "retry_count".to_string(),
                self.retry_count.to_string().into_bytes(),
            ),
            (
                "failed_at".to_string(),
                self.failed_at.to_rfc3339().into_bytes(),
            ),
        ];
        if let Some(user_id) = self.user_id {
            fields.push(("user_id".to_string(), user_id.to_string().into_bytes()));
        }
        fields
    }

    /// Rebuild an entry from a stream field map, as returned by `XRANGE`.
    pub fn from_fields(fields: &HashMap<String, Vec<u8>>) -> Result<Self, ProtocolError> {
        let text = |key: &str| -> Result<String, ProtocolError> {
            fields
                .get(key)
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .ok_or_else(|| ProtocolError::Invalid(format!("DLQ entry missing field '{key}'")))
        };

        let payload = fields
            .get("payload")
            .cloned()
            .ok_or_else(|| ProtocolError::Invalid("DLQ entry missing field 'payload'".into()))?;
        let retry_count = text("retry_count")?
            .parse::<u32>()
            .map_err(|e| ProtocolError::Invalid(format!("bad retry_count: {e}")))?;
        let failed_at = DateTime::parse_from_rfc3339(&text("failed_at")?)
            .map_err(|e| ProtocolError::Invalid(format!("bad failed_at: {e}")))?
            .with_timezone(&Utc);
        let user_id = match fields.get("user_id") {
            Some(raw) => Some(
                String::from_utf8_lossy(raw)
                    .parse::<i64>()
                    .map_err(|e| ProtocolError::Invalid(format!("bad user_id: {e}")))?,
            ),
            None => None,
        };

        Ok(Self {
            payload,
            original_message_id: text("original_message_id")?,
            error_type: text("error_type")?,
            error_message: text("error_message")?,
            retry_count,
            failed_at,
            user_id,
        })
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_error_messages_are_truncated() {
        let long = "x".repeat(2_000);
        let entry = DlqEntry::new(b"{}".to_vec(), "1-0", "Timeout", &long, 3, Utc::now(), None);
        assert_eq!(entry.error_message.chars().count(), MAX_ERROR_MESSAGE_CHARS);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Multi-byte input must not be split mid-codepoint.
        let long: String = "пример ".repeat(200);
        let entry = DlqEntry::new(b"{}".to_vec(), "1-0", "Timeout", &long, 1, Utc::now(), None);
        assert_eq!(entry.error_message.chars().count(), MAX_ERROR_MESSAGE_CHARS);
    }

    #[test]
    fn field_round_trip() {
        let entry = DlqEntry::new(
            br#"{"kind":"user_message"}"#.to_vec(),
            "1700000000-3",
            "DependencyUnavailable",
            "state store returned 503",
            3,
            Utc::now(),
            Some(42),
        );

        let map: HashMap<String, Vec<u8>> = entry.to_fields().into_iter().collect();
        let back = DlqEntry::from_fields(&map).unwrap();
        assert_eq!(back.original_message_id, entry.original_message_id);
        assert_eq!(back.retry_count, 3);
        assert_eq!(back.user_id, Some(42));
        assert_eq!(back.payload, entry.payload);
    }

    #[test]
    fn missing_field_is_an_error() {
        let map: HashMap<String, Vec<u8>> = HashMap::new();
        assert!(DlqEntry::from_fields(&map).is_err());
    }
}
