//! 配置管理
//!
//! 配置按以下顺序叠加：内置默认值、TOML配置文件、`SCHEDULER_` 前缀的环境变量。
//!
//! ```toml
//! [admin]
//! bind_address = "0.0.0.0:8080"
//!
//! [executor]
//! enabled = true
//! app_name = "job-executor-sample"
//! admin_addresses = ["http://127.0.0.1:8080"]
//! ```

pub mod models;


pub use models::{AdminConfig, AppConfig, ExecutorConfig, ObservabilityConfig};
