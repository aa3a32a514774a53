use crate::record::{FieldValue, LogRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire form of one [`LogRecord`], as indexed into the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Data")]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(rename = "Level")]
    pub level: String,
}

impl Document {
    /// Encode `record` for the given host.
    ///
    /// Error values are replaced by their display string; every other
    /// field is carried over unchanged.
    pub fn encode(record: &LogRecord, host: &str) -> Self {
        let data = record
            .fields
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    FieldValue::Json(json) => json.clone(),
                    FieldValue::Error(err) => serde_json::Value::String(err.to_string()),
                };
                (key.clone(), value)
            })
            .collect();

        Document {
            host: host.to_string(),
            timestamp: rfc3339_nano(&record.timestamp),
            message: record.message.clone(),
            data,
            level: record.level.as_str().to_uppercase(),
        }
    }
}

/// RFC 3339 timestamp in UTC with nanosecond precision and trailing
/// fractional zeros removed (`2024-01-02T03:04:05.12Z`).
pub fn rfc3339_nano(ts: &DateTime<Utc>) -> String {
    let full = ts.to_rfc3339_opts(SecondsFormat::Nanos, true);
    match full.split_once('.') {
        Some((seconds, fraction)) => {
            let digits = fraction.trim_end_matches('Z').trim_end_matches('0');
            if digits.is_empty() {
                format!("{seconds}Z")
            } else {
                format!("{seconds}.{digits}Z")
            }
        }
        None => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ERROR_KEY;
    use crate::severity::Severity;
    use chrono::{TimeZone, Timelike};

    #[derive(thiserror::Error, Debug)]
    #[error("connection refused")]
    struct Refused;

    fn at(nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .unwrap()
            .with_nanosecond(nanos)
            .unwrap()
    }

    #[test]
    fn level_label_is_upper_cased() {
        for level in Severity::ALL {
            let doc = Document::encode(&LogRecord::new(level, "m"), "h1");
            assert_eq!(doc.level, level.as_str().to_uppercase());
        }
        let doc = Document::encode(&LogRecord::new(Severity::Warn, "m"), "h1");
        assert_eq!(doc.level, "WARNING");
    }

    #[test]
    fn attached_error_becomes_its_string_form() {
        let record = LogRecord::new(Severity::Error, "dial failed").with_error(Refused);
        let doc = Document::encode(&record, "h1");
        assert_eq!(
            doc.data.get(ERROR_KEY),
            Some(&serde_json::Value::String("connection refused".into()))
        );
    }

    #[test]
    fn non_error_value_under_reserved_key_passes_through() {
        let record = LogRecord::new(Severity::Error, "m").with_field(ERROR_KEY, 42i64);
        let doc = Document::encode(&record, "h1");
        assert_eq!(doc.data.get(ERROR_KEY), Some(&serde_json::json!(42)));
    }

    #[test]
    fn carries_host_message_and_fields() {
        let record = LogRecord::new(Severity::Info, "user login")
            .with_field("user_id", 7u64)
            .with_field("ok", true);
        let doc = Document::encode(&record, "web-1");
        assert_eq!(doc.host, "web-1");
        assert_eq!(doc.message, "user login");
        assert_eq!(doc.data.len(), 2);
        assert_eq!(doc.data["user_id"], serde_json::json!(7));
    }

    #[test]
    fn serializes_with_wire_keys() {
        let record = LogRecord::new(Severity::Error, "m").with_timestamp(at(0));
        let json = serde_json::to_value(Document::encode(&record, "h")).unwrap();
        assert_eq!(json["Host"], "h");
        assert_eq!(json["@timestamp"], "2024-01-02T03:04:05Z");
        assert_eq!(json["Message"], "m");
        assert_eq!(json["Level"], "ERROR");
        assert!(json["Data"].is_object());
    }

    #[test]
    fn timestamp_trims_trailing_zeros() {
        assert_eq!(rfc3339_nano(&at(0)), "2024-01-02T03:04:05Z");
        assert_eq!(rfc3339_nano(&at(120_000_000)), "2024-01-02T03:04:05.12Z");
        assert_eq!(rfc3339_nano(&at(123_456_789)), "2024-01-02T03:04:05.123456789Z");
    }
}
