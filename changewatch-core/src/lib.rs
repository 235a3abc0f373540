// changewatch-core/src/lib.rs

#![allow(missing_docs)]
// Memory safety
#![deny(unsafe_code)]
// Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (async capabilities consumed by the engine)
// Datasets, change store, datapoints, calculation log, failure notifier.
pub mod ports;

// 2. Domain (pure business rules)
// Variables, label resolution, detectors, status records.
// Depends on nothing else in the crate.
pub mod domain;

// 3. Infrastructure (adapters)
// DuckDB, in-memory stores, dataset directory, notifiers, minijinja, config files.
pub mod infrastructure;

// 4. Application (use cases)
// Calculator, change writer, recalculation coordinator, alerting facade.
pub mod application;

// --- GLOBAL ERROR HANDLING ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use error::ChangewatchError;
