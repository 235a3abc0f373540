pub mod project;

pub use crate::domain::project::ProjectConfig;
pub use project::{database_location, datasets_dir, load_project_config, load_variables};
