use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    models::{
        HandleCallbackParam, IdleBeatParam, JobInfo, JobLog, KillParam, LogParam, LogResult,
        RegistryParam, RpcResponse, TriggerParam,
    },
    SchedulerResult,
};

/// 执行器侧RPC接口
///
/// `Err` 表示传输层失败，业务失败通过 `RpcResponse::code` 返回。
#[async_trait]
pub trait ExecutorBiz: Send + Sync {
    async fn beat(&self) -> SchedulerResult<RpcResponse<String>>;

    /// 任务线程空闲检测
    async fn idle_beat(&self, param: IdleBeatParam) -> SchedulerResult<RpcResponse<String>>;

    async fn run(&self, param: TriggerParam) -> SchedulerResult<RpcResponse<String>>;

    async fn kill(&self, param: KillParam) -> SchedulerResult<RpcResponse<String>>;

    async fn log(&self, param: LogParam) -> SchedulerResult<RpcResponse<LogResult>>;
}

/// 调度中心侧RPC接口
#[async_trait]
pub trait AdminBiz: Send + Sync {
    async fn callback(
        &self,
        params: Vec<HandleCallbackParam>,
    ) -> SchedulerResult<RpcResponse<String>>;

    async fn registry(&self, param: RegistryParam) -> SchedulerResult<RpcResponse<String>>;

    async fn registry_remove(&self, param: RegistryParam) -> SchedulerResult<RpcResponse<String>>;
}

/// 按地址获取执行器客户端
pub trait ExecutorClientFactory: Send + Sync {
    fn executor_client(&self, address: &str) -> SchedulerResult<Arc<dyn ExecutorBiz>>;
}

/// 告警发送接口
#[async_trait]
pub trait AlarmSender: Send + Sync {
    async fn send_alarm(
        &self,
        job: &JobInfo,
        log: &JobLog,
        recipients: &[String],
        content: &str,
    ) -> SchedulerResult<()>;
}
