use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum RegistryGroup {
    #[default]
    #[serde(rename = "EXECUTOR")]
    Executor,
    #[serde(rename = "ADMIN")]
    Admin,
}

/// 注册表记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEntry {
    pub id: i64,
    pub registry_group: RegistryGroup,
    /// 执行器AppName
    pub registry_key: String,
    /// 执行器地址
    pub registry_value: String,
    pub update_time: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn is_alive(&self, now: DateTime<Utc>, dead_timeout_seconds: i64) -> bool {
        (now - self.update_time).num_seconds() < dead_timeout_seconds
    }
}
