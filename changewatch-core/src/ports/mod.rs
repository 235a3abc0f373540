// changewatch-core/src/ports/mod.rs

// Capabilities the engine consumes, without knowing how they are provided.

pub mod dataset;
pub mod log_sink;
pub mod notifier;
pub mod store;

pub use dataset::DatasetProvider;
pub use log_sink::CalculationLogSink;
pub use notifier::FailureNotifier;
pub use store::{ChangeStore, DatapointStore, VariableStore};
