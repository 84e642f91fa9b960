pub mod app_config;
pub mod registry;

pub use app_config::{Config, EngineRules};
pub use registry::{PnrRegistry, RegistryError};
