pub mod admin_executor;
pub mod app_config;
pub mod observability;

pub use admin_executor::{AdminConfig, ExecutorConfig};
pub use app_config::AppConfig;
pub use observability::ObservabilityConfig;
