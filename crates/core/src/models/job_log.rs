use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rpc::SUCCESS_CODE;
use super::TriggerType;

/// 一次调度尝试的日志记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobLog {
    pub id: i64,
    pub job_id: i64,
    pub group_id: i64,
    pub trigger_type: TriggerType,
    pub trigger_time: DateTime<Utc>,
    pub executor_address: Option<String>,
    pub executor_handler: String,
    pub executor_param: String,
    /// 仅分片广播时记录 `index/total`
    pub executor_sharding_param: Option<String>,
    /// 剩余失败重试次数
    pub executor_fail_retry_count: i32,
    pub trigger_code: i32,
    pub trigger_msg: String,
    pub handle_time: Option<DateTime<Utc>>,
    pub handle_code: i32,
    pub handle_msg: String,
    pub alarm_status: AlarmStatus,
}

impl JobLog {
    pub fn new(job_id: i64, group_id: i64, trigger_type: TriggerType) -> Self {
        Self {
            id: 0,
            job_id,
            group_id,
            trigger_type,
            trigger_time: Utc::now(),
            executor_address: None,
            executor_handler: String::new(),
            executor_param: String::new(),
            executor_sharding_param: None,
            executor_fail_retry_count: 0,
            trigger_code: 0,
            trigger_msg: String::new(),
            handle_time: None,
            handle_code: 0,
            handle_msg: String::new(),
            alarm_status: AlarmStatus::Default,
        }
    }

    /// 触发失败或执行失败（0表示尚无结果）
    pub fn is_failed(&self) -> bool {
        let ok = |code: i32| code == 0 || code == SUCCESS_CODE;
        !(ok(self.trigger_code) && ok(self.handle_code))
    }
}

/// 告警状态，只能沿 Default -> Locked -> 终态 迁移
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AlarmStatus {
    #[default]
    Default,
    Locked,
    NoAlarmNeeded,
    AlarmSent,
    AlarmFailed,
}

impl AlarmStatus {
    pub fn code(&self) -> i32 {
        match self {
            AlarmStatus::Default => 0,
            AlarmStatus::Locked => -1,
            AlarmStatus::NoAlarmNeeded => 1,
            AlarmStatus::AlarmSent => 2,
            AlarmStatus::AlarmFailed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AlarmStatus::NoAlarmNeeded | AlarmStatus::AlarmSent | AlarmStatus::AlarmFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_failed() {
        let mut log = JobLog::new(1, 1, TriggerType::Cron);
        assert!(!log.is_failed());
        log.trigger_code = 200;
        assert!(!log.is_failed());
        log.handle_code = 500;
        assert!(log.is_failed());
        log.handle_code = 200;
        log.trigger_code = 500;
        assert!(log.is_failed());
    }
}
