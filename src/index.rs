use chrono::Utc;

/// Produces the name of the index a document is written to.
///
/// Called once when the hook provisions its index and again for every
/// delivery, so implementations can partition indices by time.
pub trait IndexNameResolver: Send + Sync {
    fn resolve(&self) -> String;
}

/// Always resolves to the same index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantIndex(pub String);

impl ConstantIndex {
    pub fn new(name: impl Into<String>) -> Self {
        ConstantIndex(name.into())
    }
}

impl IndexNameResolver for ConstantIndex {
    fn resolve(&self) -> String {
        self.0.clone()
    }
}

impl IndexNameResolver for String {
    fn resolve(&self) -> String {
        self.clone()
    }
}

impl IndexNameResolver for &'static str {
    fn resolve(&self) -> String {
        (*self).to_string()
    }
}

impl<F> IndexNameResolver for F
where
    F: Fn() -> String + Send + Sync,
{
    fn resolve(&self) -> String {
        self()
    }
}

/// One index per UTC day: `{prefix}-{date}`, e.g. `logs-2024.01.02`.
#[derive(Debug, Clone)]
pub struct DailyIndex {
    prefix: String,
    date_format: String,
}

impl DailyIndex {
    pub fn new(prefix: impl Into<String>) -> Self {
        DailyIndex {
            prefix: prefix.into(),
            date_format: "%Y.%m.%d".to_string(),
        }
    }

    /// Override the `chrono` strftime pattern used for the date suffix.
    pub fn with_date_format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = date_format.into();
        self
    }
}

impl IndexNameResolver for DailyIndex {
    fn resolve(&self) -> String {
        format!("{}-{}", self.prefix, Utc::now().format(&self.date_format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn constant_resolvers_return_the_same_name() {
        assert_eq!(ConstantIndex::new("logs").resolve(), "logs");
        assert_eq!("logs".resolve(), "logs");
        assert_eq!(String::from("logs").resolve(), "logs");
    }

    #[test]
    fn closures_are_invoked_on_every_resolve() {
        let calls = AtomicUsize::new(0);
        let resolver = || format!("logs-{}", calls.fetch_add(1, Ordering::SeqCst));
        assert_eq!(resolver.resolve(), "logs-0");
        assert_eq!(resolver.resolve(), "logs-1");
    }

    #[test]
    fn daily_index_uses_current_utc_date() {
        let expected = format!("app-{}", Utc::now().format("%Y.%m.%d"));
        assert_eq!(DailyIndex::new("app").resolve(), expected);
    }

    #[test]
    fn daily_index_accepts_custom_format() {
        let expected = format!("app-{}", Utc::now().format("%Y%m"));
        assert_eq!(DailyIndex::new("app").with_date_format("%Y%m").resolve(), expected);
    }
}
