//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use scheduler_core::models::{
    AddressType, BlockStrategy, GlueType, JobGroup, JobInfo, JobLog, RouteStrategy, TriggerParam,
    TriggerType,
};

/// Builder for creating test JobInfo entities
pub struct JobInfoBuilder {
    job: JobInfo,
}

impl JobInfoBuilder {
    pub fn new() -> Self {
        Self {
            job: JobInfo {
                id: 1,
                group_id: 1,
                description: "test_job".to_string(),
                cron: "0/5 * * * * *".to_string(),
                route_strategy: RouteStrategy::First,
                handler: "demoJobHandler".to_string(),
                executor_params: String::new(),
                block_strategy: BlockStrategy::SerialExecution,
                timeout_seconds: 0,
                fail_retry_count: 0,
                glue_type: GlueType::Bean,
                glue_source: String::new(),
                glue_updated_at: 0,
                alarm_email: String::new(),
                child_job_ids: vec![],
                running: true,
                trigger_last_time: 0,
                trigger_next_time: 0,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_group_id(mut self, group_id: i64) -> Self {
        self.job.group_id = group_id;
        self
    }

    pub fn with_cron(mut self, cron: &str) -> Self {
        self.job.cron = cron.to_string();
        self
    }

    pub fn with_route_strategy(mut self, route_strategy: RouteStrategy) -> Self {
        self.job.route_strategy = route_strategy;
        self
    }

    pub fn with_block_strategy(mut self, block_strategy: BlockStrategy) -> Self {
        self.job.block_strategy = block_strategy;
        self
    }

    pub fn with_handler(mut self, handler: &str) -> Self {
        self.job.handler = handler.to_string();
        self
    }

    pub fn with_executor_params(mut self, params: &str) -> Self {
        self.job.executor_params = params.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: i32) -> Self {
        self.job.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_fail_retry_count(mut self, count: i32) -> Self {
        self.job.fail_retry_count = count;
        self
    }

    pub fn with_alarm_email(mut self, alarm_email: &str) -> Self {
        self.job.alarm_email = alarm_email.to_string();
        self
    }

    pub fn with_child_job_ids(mut self, child_job_ids: Vec<i64>) -> Self {
        self.job.child_job_ids = child_job_ids;
        self
    }

    pub fn with_running(mut self, running: bool) -> Self {
        self.job.running = running;
        self
    }

    pub fn with_next_trigger_time(mut self, next: i64) -> Self {
        self.job.trigger_next_time = next;
        self
    }

    pub fn build(self) -> JobInfo {
        self.job
    }
}

impl Default for JobInfoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test JobGroup entities
pub struct JobGroupBuilder {
    group: JobGroup,
}

impl JobGroupBuilder {
    pub fn new() -> Self {
        Self {
            group: JobGroup {
                id: 1,
                app_name: "test-executor".to_string(),
                title: "测试执行器".to_string(),
                address_type: AddressType::Auto,
                addresses: vec![],
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.group.id = id;
        self
    }

    pub fn with_app_name(mut self, app_name: &str) -> Self {
        self.group.app_name = app_name.to_string();
        self
    }

    pub fn with_address_type(mut self, address_type: AddressType) -> Self {
        self.group.address_type = address_type;
        self
    }

    pub fn with_addresses(mut self, addresses: &[&str]) -> Self {
        self.group.addresses = addresses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> JobGroup {
        self.group
    }
}

impl Default for JobGroupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test JobLog entities
pub struct JobLogBuilder {
    log: JobLog,
}

impl JobLogBuilder {
    pub fn new() -> Self {
        Self {
            log: JobLog::new(1, 1, TriggerType::Cron),
        }
    }

    pub fn with_job_id(mut self, job_id: i64) -> Self {
        self.log.job_id = job_id;
        self
    }

    pub fn with_trigger_code(mut self, code: i32) -> Self {
        self.log.trigger_code = code;
        self
    }

    pub fn with_handle_code(mut self, code: i32) -> Self {
        self.log.handle_code = code;
        self
    }

    pub fn with_fail_retry_count(mut self, count: i32) -> Self {
        self.log.executor_fail_retry_count = count;
        self
    }

    pub fn with_sharding_param(mut self, sharding_param: &str) -> Self {
        self.log.executor_sharding_param = Some(sharding_param.to_string());
        self
    }

    pub fn with_trigger_msg(mut self, msg: &str) -> Self {
        self.log.trigger_msg = msg.to_string();
        self
    }

    pub fn build(self) -> JobLog {
        self.log
    }
}

impl Default for JobLogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test TriggerParam payloads
pub struct TriggerParamBuilder {
    param: TriggerParam,
}

impl TriggerParamBuilder {
    pub fn new() -> Self {
        Self {
            param: TriggerParam {
                job_id: 1,
                executor_handler: "demoJobHandler".to_string(),
                executor_params: String::new(),
                executor_block_strategy: BlockStrategy::SerialExecution,
                executor_timeout: 0,
                log_id: 1,
                log_date_time: chrono::Utc::now().timestamp_millis(),
                glue_type: GlueType::Bean,
                glue_source: String::new(),
                glue_updatetime: 0,
                broadcast_index: 0,
                broadcast_total: 1,
            },
        }
    }

    pub fn with_job_id(mut self, job_id: i64) -> Self {
        self.param.job_id = job_id;
        self
    }

    pub fn with_log_id(mut self, log_id: i64) -> Self {
        self.param.log_id = log_id;
        self
    }

    pub fn with_handler(mut self, handler: &str) -> Self {
        self.param.executor_handler = handler.to_string();
        self
    }

    pub fn with_params(mut self, params: &str) -> Self {
        self.param.executor_params = params.to_string();
        self
    }

    pub fn with_block_strategy(mut self, block_strategy: BlockStrategy) -> Self {
        self.param.executor_block_strategy = block_strategy;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: i32) -> Self {
        self.param.executor_timeout = timeout_seconds;
        self
    }

    pub fn with_glue(mut self, glue_type: GlueType, source: &str, updated_at: i64) -> Self {
        self.param.glue_type = glue_type;
        self.param.glue_source = source.to_string();
        self.param.glue_updatetime = updated_at;
        self
    }

    pub fn with_broadcast(mut self, index: i32, total: i32) -> Self {
        self.param.broadcast_index = index;
        self.param.broadcast_total = total;
        self
    }

    pub fn build(self) -> TriggerParam {
        self.param
    }
}

impl Default for TriggerParamBuilder {
    fn default() -> Self {
        Self::new()
    }
}
