pub mod paths;
pub mod settings;
pub mod validation;

pub use paths::AppPaths;
pub use settings::{DeployEnv, Settings};
pub use validation::ConfigError;
