use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("任务未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("执行器分组未找到: {id}")]
    JobGroupNotFound { id: i64 },

    #[error("调度日志未找到: {id}")]
    JobLogNotFound { id: i64 },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("无效的参数: {0}")]
    InvalidParam(String),

    #[error("路由失败: {0}")]
    Routing(String),

    #[error("触发线程池已满，拒绝任务: job_id={job_id}")]
    PoolRejected { job_id: i64 },

    #[error("获取调度锁超时")]
    LockTimeout,

    #[error("任务执行超时")]
    ExecutionTimeout,

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl SchedulerError {
    /// 是否属于可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SchedulerError::Network(_)
                | SchedulerError::LockTimeout
                | SchedulerError::Storage(_)
                | SchedulerError::PoolRejected { .. }
        )
    }
}
