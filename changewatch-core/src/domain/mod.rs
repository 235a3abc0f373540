pub mod change;
pub mod dashboard;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod labels;
pub mod log;
pub mod project;
pub mod status;
pub mod variable;

pub use error::DomainError;
