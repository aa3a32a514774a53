pub mod severity;
pub mod record;
pub mod document;
pub mod index;
pub mod store;
pub mod provision;
pub mod delivery;
pub mod bulk;
pub mod hook;
pub mod layer;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

pub mod backend;
pub mod env;
pub mod init;
pub mod memory_store;

pub use bulk::{BulkConfig, BulkError};
pub use delivery::{DeliveryError, StatsSnapshot, StrategyKind};
pub use document::Document;
pub use hook::{HookConfig, LogHook};
pub use index::{ConstantIndex, DailyIndex, IndexNameResolver};
pub use layer::EsHookLayer;
pub use provision::ProvisionError;
pub use record::{FieldValue, LogRecord, ERROR_KEY};
pub use severity::Severity;
pub use store::{DocumentStore, StoreError};
