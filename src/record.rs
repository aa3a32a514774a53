use crate::severity::Severity;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Reserved field key under which an attached error value is stored.
pub const ERROR_KEY: &str = "error";

/// Value of a single structured field on a [`LogRecord`].
#[derive(Clone)]
pub enum FieldValue {
    Json(serde_json::Value),
    Error(Arc<dyn Error + Send + Sync>),
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            FieldValue::Error(err) => f.debug_tuple("Error").field(&err.to_string()).finish(),
        }
    }
}

macro_rules! json_field_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Json(serde_json::Value::from(value))
                }
            }
        )*
    };
}

json_field_value!(&str, String, bool, i64, u64, f64, serde_json::Value);

/// A single log event as handed to the hook by the logging framework.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Severity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl LogRecord {
    /// Create a record stamped with the current time and no fields.
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        LogRecord {
            level,
            timestamp: Utc::now(),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attach an error value under [`ERROR_KEY`].
    pub fn with_error<E>(mut self, err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.fields
            .insert(ERROR_KEY.to_string(), FieldValue::Error(Arc::new(err)));
        self
    }

    /// The attached error value, if the reserved key holds one.
    pub fn error(&self) -> Option<&(dyn Error + Send + Sync)> {
        match self.fields.get(ERROR_KEY) {
            Some(FieldValue::Error(err)) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Error captured from a `tracing` field.
///
/// `tracing` only lends errors by reference, so the display form and the
/// source chain are copied out when the event is recorded.
#[derive(Debug, Clone)]
pub struct CapturedError {
    message: String,
    sources: Vec<String>,
}

impl CapturedError {
    pub fn capture(err: &(dyn Error + 'static)) -> Self {
        let mut sources = Vec::new();
        let mut source = err.source();
        while let Some(inner) = source {
            sources.push(inner.to_string());
            source = inner.source();
        }
        CapturedError {
            message: err.to_string(),
            sources,
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for source in &self.sources {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl Error for CapturedError {}
