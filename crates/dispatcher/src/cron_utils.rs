use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use scheduler_core::{time::millis_to_datetime, SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 获取严格晚于 `from` 的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 毫秒时间戳版本
    pub fn next_after_millis(&self, from_millis: i64) -> Option<i64> {
        self.next_execution_time(millis_to_datetime(from_millis))
            .map(|t| t.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_invalid_cron() {
        let result = CronScheduler::new("not a cron");
        assert!(matches!(result, Err(SchedulerError::InvalidCron { .. })));
        assert!(CronScheduler::new("0/5 * * * * *").is_ok());
    }

    #[test]
    fn test_next_after_is_strictly_later() {
        let cron = CronScheduler::new("0/5 * * * * *").unwrap();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        let next = cron.next_execution_time(base).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 15).unwrap());

        let millis = base.timestamp_millis() + 1;
        assert_eq!(cron.next_after_millis(millis), Some(next.timestamp_millis()));
    }

    #[test]
    fn test_expired_schedule_has_no_next() {
        let cron = CronScheduler::new("0 0 0 1 1 * 2020").unwrap();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(cron.next_execution_time(base).is_none());
    }
}
