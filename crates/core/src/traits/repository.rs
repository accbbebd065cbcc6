use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    models::{AddressType, AlarmStatus, JobGroup, JobInfo, JobLog, RegistryEntry, RegistryGroup},
    SchedulerResult,
};

/// 调度循环对单个任务的推进结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleUpdate {
    pub job_id: i64,
    pub running: bool,
    pub trigger_last_time: i64,
    pub trigger_next_time: i64,
}

/// 任务定义仓储接口
#[async_trait]
pub trait JobInfoRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobInfo>>;

    /// 查询运行中且 `trigger_next_time <= max_next_time` 的任务，按下次触发时间升序
    async fn schedule_job_query(
        &self,
        max_next_time: i64,
        limit: usize,
    ) -> SchedulerResult<Vec<JobInfo>>;

    /// 批量写回调度时间，要么全部成功要么全部不生效
    async fn schedule_update_batch(&self, updates: &[ScheduleUpdate]) -> SchedulerResult<()>;

    /// 新增或覆盖任务定义，id<=0 时分配新id
    async fn save(&self, job: JobInfo) -> SchedulerResult<JobInfo>;
}

/// 执行器分组仓储接口
#[async_trait]
pub trait JobGroupRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobGroup>>;

    async fn find_by_address_type(&self, address_type: AddressType)
        -> SchedulerResult<Vec<JobGroup>>;

    async fn update_addresses(&self, id: i64, addresses: Vec<String>) -> SchedulerResult<()>;

    async fn save(&self, group: JobGroup) -> SchedulerResult<JobGroup>;
}

/// 调度日志仓储接口
#[async_trait]
pub trait JobLogRepository: Send + Sync {
    /// 插入日志并返回带id的记录
    async fn create(&self, log: JobLog) -> SchedulerResult<JobLog>;

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobLog>>;

    /// 写入调度相关字段（地址、参数、触发结果）
    async fn update_trigger_info(&self, log: &JobLog) -> SchedulerResult<()>;

    /// 写入执行结果字段
    async fn update_handle_info(&self, log: &JobLog) -> SchedulerResult<()>;

    /// 失败且告警状态为默认值的日志id
    async fn find_fail_job_log_ids(&self, limit: usize) -> SchedulerResult<Vec<i64>>;

    /// 条件更新告警状态，返回是否命中
    async fn update_alarm_status(
        &self,
        id: i64,
        expected: AlarmStatus,
        new_status: AlarmStatus,
    ) -> SchedulerResult<bool>;
}

/// 注册表仓储接口
#[async_trait]
pub trait JobRegistryRepository: Send + Sync {
    /// 存在则刷新更新时间，不存在则插入
    async fn registry_upsert(
        &self,
        group: RegistryGroup,
        key: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    async fn registry_delete(
        &self,
        group: RegistryGroup,
        key: &str,
        value: &str,
    ) -> SchedulerResult<()>;

    /// 删除超时的记录，返回删除条数
    async fn remove_dead(
        &self,
        dead_timeout_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<usize>;

    /// 仍在存活期内的记录
    async fn find_alive(
        &self,
        dead_timeout_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<RegistryEntry>>;
}

/// 调度锁持有凭证，drop时释放
pub struct ScheduleLockGuard {
    _inner: Box<dyn Any + Send>,
}

impl ScheduleLockGuard {
    pub fn new<T: Any + Send>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

/// 多个调度中心实例之间的互斥锁
#[async_trait]
pub trait ScheduleLock: Send + Sync {
    async fn acquire(&self, timeout: Duration) -> SchedulerResult<ScheduleLockGuard>;
}
