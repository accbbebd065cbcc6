//! 调度中心
//!
//! 调度主循环与时间轮、快慢调度池、任务触发与路由、注册表监控、失败监控，
//! 以及执行器回调/注册的服务端实现。`JobScheduler` 负责装配与启停。

pub mod admin_biz;
pub mod cron_utils;
pub mod fail_monitor;
pub mod registry_monitor;
pub mod schedule_helper;
pub mod scheduler;
pub mod strategies;
pub mod time_wheel;
pub mod trigger;
pub mod trigger_pool;

#[cfg(test)]
mod strategies_test;

pub use admin_biz::AdminBizImpl;
pub use cron_utils::CronScheduler;
pub use fail_monitor::JobFailMonitor;
pub use registry_monitor::JobRegistryMonitor;
pub use schedule_helper::{JobScheduleHelper, ScheduleRoundStats};
pub use scheduler::{JobScheduler, SchedulerStores};
pub use strategies::{ExecutorRouter, RouterTable};
pub use time_wheel::TimeWheel;
pub use trigger::JobTrigger;
pub use trigger_pool::{JobTriggerPool, TriggerExecutor, TriggerPoolConfig};
