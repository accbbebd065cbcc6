use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{models::TriggerType, SchedulerResult};

/// 一次触发请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerRequest {
    pub job_id: i64,
    pub trigger_type: TriggerType,
    /// 小于0时使用任务配置
    #[serde(default = "default_fail_retry_count")]
    pub fail_retry_count: i32,
    #[serde(default)]
    pub sharding_param: Option<String>,
    #[serde(default)]
    pub executor_param: Option<String>,
    /// 覆盖执行器分组的地址列表
    #[serde(default)]
    pub address_list: Option<Vec<String>>,
}

fn default_fail_retry_count() -> i32 {
    -1
}

impl TriggerRequest {
    pub fn new(job_id: i64, trigger_type: TriggerType) -> Self {
        Self {
            job_id,
            trigger_type,
            fail_retry_count: -1,
            sharding_param: None,
            executor_param: None,
            address_list: None,
        }
    }

    pub fn with_fail_retry_count(mut self, count: i32) -> Self {
        self.fail_retry_count = count;
        self
    }

    pub fn with_sharding_param(mut self, sharding_param: Option<String>) -> Self {
        self.sharding_param = sharding_param;
        self
    }

    pub fn with_executor_param(mut self, executor_param: Option<String>) -> Self {
        self.executor_param = executor_param;
        self
    }

    pub fn with_address_list(mut self, address_list: Option<Vec<String>>) -> Self {
        self.address_list = address_list;
        self
    }
}

/// 异步提交触发请求
#[async_trait]
pub trait TriggerSubmitter: Send + Sync {
    async fn submit(&self, request: TriggerRequest) -> SchedulerResult<()>;
}
