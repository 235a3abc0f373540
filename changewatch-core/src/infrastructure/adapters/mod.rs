pub mod dataset_dir;
pub mod duckdb;
pub mod memory;
pub mod notifier;

pub use dataset_dir::DatasetDirectory;
pub use duckdb::DuckDBStore;
pub use memory::MemoryBackend;
pub use notifier::{SpoolNotifier, TracingNotifier, notifier_for};
