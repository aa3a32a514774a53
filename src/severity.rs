use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Log severity, ordered from most to least severe.
///
/// The derived ordering follows declaration order, so `Panic < Trace`:
/// a severity is "at or above" a threshold when it compares `<=` to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Panic,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Severity {
    /// Every severity, most severe first.
    pub const ALL: [Severity; 7] = [
        Severity::Panic,
        Severity::Fatal,
        Severity::Error,
        Severity::Warn,
        Severity::Info,
        Severity::Debug,
        Severity::Trace,
    ];

    /// Lower-case label used in shipped documents before upper-casing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Panic => "panic",
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warn => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
            Severity::Trace => "trace",
        }
    }

    /// Whether `self` is at least as severe as `threshold`.
    pub fn is_at_or_above(&self, threshold: Severity) -> bool {
        *self <= threshold
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Severity::Error,
            tracing::Level::WARN => Severity::Warn,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::DEBUG => Severity::Debug,
            _ => Severity::Trace,
        }
    }
}

/// Error returned when a severity label cannot be parsed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown severity: {0:?}")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "panic" => Ok(Severity::Panic),
            "fatal" => Ok(Severity::Fatal),
            "error" => Ok(Severity::Error),
            "warn" | "warning" => Ok(Severity::Warn),
            "info" => Ok(Severity::Info),
            "debug" => Ok(Severity::Debug),
            "trace" => Ok(Severity::Trace),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

/// Compute the severities a hook with the given minimum threshold
/// reacts to, most severe first.
pub fn levels_at_or_above(threshold: Severity) -> Vec<Severity> {
    Severity::ALL
        .iter()
        .copied()
        .filter(|level| level.is_at_or_above(threshold))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_threshold_keeps_only_more_severe_levels() {
        assert_eq!(
            levels_at_or_above(Severity::Error),
            vec![Severity::Panic, Severity::Fatal, Severity::Error]
        );
    }

    #[test]
    fn trace_threshold_keeps_everything() {
        assert_eq!(levels_at_or_above(Severity::Trace), Severity::ALL.to_vec());
    }

    #[test]
    fn panic_threshold_keeps_only_panic() {
        assert_eq!(levels_at_or_above(Severity::Panic), vec![Severity::Panic]);
    }

    #[test]
    fn levels_below_threshold_are_excluded() {
        for threshold in Severity::ALL {
            let levels = levels_at_or_above(threshold);
            for level in Severity::ALL {
                assert_eq!(levels.contains(&level), level <= threshold, "{level} vs {threshold}");
            }
        }
    }

    #[test]
    fn parses_labels_case_insensitively() {
        assert_eq!("WARN".parse::<Severity>(), Ok(Severity::Warn));
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Warn));
        assert_eq!(" Info ".parse::<Severity>(), Ok(Severity::Info));
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn maps_tracing_levels() {
        assert_eq!(Severity::from(tracing::Level::ERROR), Severity::Error);
        assert_eq!(Severity::from(tracing::Level::TRACE), Severity::Trace);
    }
}
