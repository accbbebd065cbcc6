pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod time;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
pub use logging::init_logging;

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
