pub mod biz;
pub mod repository;
pub mod scheduler;

pub use biz::{AdminBiz, AlarmSender, ExecutorBiz, ExecutorClientFactory};
pub use repository::{
    JobGroupRepository, JobInfoRepository, JobLogRepository, JobRegistryRepository, ScheduleLock,
    ScheduleLockGuard, ScheduleUpdate,
};
pub use scheduler::{TriggerRequest, TriggerSubmitter};
