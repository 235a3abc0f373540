// changewatch-core/src/application/mod.rs

pub mod alerting;
pub mod calculation;
pub mod change_writer;
pub mod coordinator;
pub mod detection;
pub mod ports;

// --- RE-EXPORTS (FACADE PATTERN) ---
// Lets the CLI write
// `use changewatch_core::application::{AlertingService, RecalculationRequest};`
// without knowing the file layout.

pub use alerting::AlertingService;
pub use calculation::VariableCalculator;
pub use change_writer::ChangeWriter;
pub use coordinator::{EnginePorts, RecalculationCoordinator, RecalculationRequest};
pub use detection::fold_history;
