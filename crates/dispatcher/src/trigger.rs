use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use scheduler_core::{
    models::{
        AddressType, JobGroup, JobInfo, JobLog, RouteStrategy, RpcResponse, ShardingParam,
        TriggerParam, TriggerType,
    },
    traits::{
        ExecutorClientFactory, JobGroupRepository, JobInfoRepository, JobLogRepository,
        TriggerRequest,
    },
    SchedulerError, SchedulerResult,
};
use scheduler_infrastructure::MetricsCollector;

use crate::strategies::RouterTable;
use crate::trigger_pool::TriggerExecutor;

/// 解析任务、分组与路由，调用执行器并记录调度日志
pub struct JobTrigger {
    job_repo: Arc<dyn JobInfoRepository>,
    group_repo: Arc<dyn JobGroupRepository>,
    log_repo: Arc<dyn JobLogRepository>,
    executor_clients: Arc<dyn ExecutorClientFactory>,
    routers: RouterTable,
    /// 本调度中心地址，写入调度备注
    admin_address: String,
    metrics: Arc<MetricsCollector>,
}

impl JobTrigger {
    pub fn new(
        job_repo: Arc<dyn JobInfoRepository>,
        group_repo: Arc<dyn JobGroupRepository>,
        log_repo: Arc<dyn JobLogRepository>,
        executor_clients: Arc<dyn ExecutorClientFactory>,
        admin_address: String,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let routers = RouterTable::new(Arc::clone(&executor_clients));
        Self {
            job_repo,
            group_repo,
            log_repo,
            executor_clients,
            routers,
            admin_address,
            metrics,
        }
    }

    /// 触发一次调度，返回生成的调度日志（任务不存在时为空）
    pub async fn trigger(&self, request: TriggerRequest) -> SchedulerResult<Vec<JobLog>> {
        let Some(mut job) = self.job_repo.find_by_id(request.job_id).await? else {
            warn!("触发调度失败，任务不存在: job_id={}", request.job_id);
            return Ok(Vec::new());
        };

        if let Some(executor_param) = request.executor_param {
            job.executor_params = executor_param;
        }
        let fail_retry_count = if request.fail_retry_count >= 0 {
            request.fail_retry_count
        } else {
            job.fail_retry_count
        };

        let mut group = self
            .group_repo
            .find_by_id(job.group_id)
            .await?
            .ok_or(SchedulerError::JobGroupNotFound { id: job.group_id })?;

        if let Some(address_list) = request.address_list.filter(|l| !l.is_empty()) {
            group.address_type = AddressType::Manual;
            group.addresses = address_list;
        }

        let sharding = request
            .sharding_param
            .as_deref()
            .and_then(ShardingParam::parse);

        let mut logs = Vec::new();
        if job.route_strategy == RouteStrategy::ShardingBroadcast
            && !group.addresses.is_empty()
            && sharding.is_none()
        {
            let total = group.addresses.len() as i32;
            for index in 0..total {
                let log = self
                    .process_trigger(
                        &group,
                        &job,
                        fail_retry_count,
                        request.trigger_type,
                        ShardingParam::new(index, total),
                    )
                    .await?;
                logs.push(log);
            }
        } else {
            let sharding = sharding.unwrap_or(ShardingParam::new(0, 1));
            let log = self
                .process_trigger(
                    &group,
                    &job,
                    fail_retry_count,
                    request.trigger_type,
                    sharding,
                )
                .await?;
            logs.push(log);
        }
        Ok(logs)
    }

    async fn process_trigger(
        &self,
        group: &JobGroup,
        job: &JobInfo,
        fail_retry_count: i32,
        trigger_type: TriggerType,
        sharding: ShardingParam,
    ) -> SchedulerResult<JobLog> {
        let block_strategy = job.block_strategy;
        let route_strategy = job.route_strategy;
        let broadcast = route_strategy == RouteStrategy::ShardingBroadcast;
        let sharding_param = broadcast.then(|| sharding.to_string());

        let mut log = JobLog::new(job.id, job.group_id, trigger_type);
        log.trigger_time = Utc::now();
        let mut log = self.log_repo.create(log).await?;
        debug!("调度日志已创建: job_id={}, log_id={}", job.id, log.id);

        let trigger_param = TriggerParam {
            job_id: job.id,
            executor_handler: job.handler.clone(),
            executor_params: job.executor_params.clone(),
            executor_block_strategy: block_strategy,
            executor_timeout: job.timeout_seconds,
            log_id: log.id,
            log_date_time: log.trigger_time.timestamp_millis(),
            glue_type: job.glue_type,
            glue_source: job.glue_source.clone(),
            glue_updatetime: job.glue_updated_at,
            broadcast_index: sharding.index,
            broadcast_total: sharding.total,
        };

        let route_result = self
            .resolve_address(group, route_strategy, sharding, &trigger_param)
            .await;

        let (address, trigger_result) = match route_result.content.clone() {
            Some(address) if route_result.is_success() => {
                let result = self.run_executor(trigger_param, &address).await;
                (Some(address), result)
            }
            _ => {
                let mut failed = route_result.clone();
                if failed.is_success() {
                    failed = RpcResponse::fail("调度失败：未选出执行器地址");
                }
                (None, failed)
            }
        };

        let mut narrative = format!(
            "任务触发类型：{}<br>调度机器：{}<br>执行器-注册方式：{}<br>执行器-地址列表：{:?}<br>路由策略：{}",
            trigger_type.title(),
            self.admin_address,
            match group.address_type {
                AddressType::Auto => "自动注册",
                AddressType::Manual => "手动录入",
            },
            group.addresses,
            route_strategy.title(),
        );
        if let Some(sp) = &sharding_param {
            narrative.push_str(&format!("({sp})"));
        }
        narrative.push_str(&format!(
            "<br>阻塞处理策略：{}<br>任务超时时间：{}<br>失败重试次数：{}",
            block_strategy.title(),
            job.timeout_seconds,
            fail_retry_count
        ));
        narrative.push_str("<br><br>>>>>>>>>>>>触发调度<<<<<<<<<<<<br>");
        if let Some(route_msg) = route_result.msg.as_deref().filter(|m| !m.is_empty()) {
            narrative.push_str(route_msg);
            narrative.push_str("<br><br>");
        }
        if address.is_some() {
            narrative.push_str(trigger_result.msg_or_empty());
        }

        log.executor_address = address;
        log.executor_handler = job.handler.clone();
        log.executor_param = job.executor_params.clone();
        log.executor_sharding_param = sharding_param;
        log.executor_fail_retry_count = fail_retry_count;
        log.trigger_code = trigger_result.code;
        log.trigger_msg = narrative;
        self.log_repo.update_trigger_info(&log).await?;

        self.metrics
            .record_trigger(trigger_type, trigger_result.is_success());
        info!(
            job_id = job.id,
            log_id = log.id,
            code = trigger_result.code,
            "任务调度完成"
        );
        Ok(log)
    }

    async fn resolve_address(
        &self,
        group: &JobGroup,
        route_strategy: RouteStrategy,
        sharding: ShardingParam,
        trigger_param: &TriggerParam,
    ) -> RpcResponse<String> {
        let addresses = &group.addresses;
        if addresses.is_empty() {
            return RpcResponse::fail("调度失败：执行器地址为空");
        }

        if route_strategy == RouteStrategy::ShardingBroadcast {
            let index = usize::try_from(sharding.index).unwrap_or(0);
            let address = addresses.get(index).unwrap_or(&addresses[0]);
            return RpcResponse::success_with(address.clone());
        }

        match self.routers.get(route_strategy) {
            Some(router) => {
                let result = router.route(trigger_param, addresses).await;
                debug!(
                    "路由策略 {} 返回: code={}, address={:?}",
                    router.name(),
                    result.code,
                    result.content
                );
                result
            }
            None => RpcResponse::fail(format!("路由策略未配置: {route_strategy:?}")),
        }
    }

    /// 调用执行器并将结果整理成调度备注
    async fn run_executor(&self, param: TriggerParam, address: &str) -> RpcResponse<String> {
        let result = match self.executor_clients.executor_client(address) {
            Ok(client) => match client.run(param).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("调用执行器失败: address={}, error={}", address, e);
                    RpcResponse::fail(e.to_string())
                }
            },
            Err(e) => RpcResponse::fail(e.to_string()),
        };

        RpcResponse {
            code: result.code,
            msg: Some(format!(
                "触发调度：<br>address：{}<br>code：{}<br>msg：{}",
                address,
                result.code,
                result.msg_or_empty()
            )),
            content: result.content,
        }
    }
}

#[async_trait]
impl TriggerExecutor for JobTrigger {
    async fn execute(&self, request: TriggerRequest) -> SchedulerResult<()> {
        self.trigger(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::{BlockStrategy, SUCCESS_CODE};
    use scheduler_infrastructure::InMemoryJobStore;
    use scheduler_testing_utils::{JobGroupBuilder, JobInfoBuilder, MockExecutorClientFactory};

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        executors: Arc<MockExecutorClientFactory>,
        trigger: JobTrigger,
    }

    async fn fixture(job: JobInfo, addresses: &[&str]) -> Fixture {
        let store = Arc::new(InMemoryJobStore::new());
        let executors = Arc::new(MockExecutorClientFactory::new());
        JobInfoRepository::save(store.as_ref(), job).await.unwrap();
        JobGroupRepository::save(
            store.as_ref(),
            JobGroupBuilder::new().with_id(1).with_addresses(addresses).build(),
        )
        .await
        .unwrap();
        let trigger = JobTrigger::new(
            store.clone(),
            store.clone(),
            store.clone(),
            executors.clone(),
            "http://admin:8080".to_string(),
            Arc::new(MetricsCollector::new()),
        );
        Fixture {
            store,
            executors,
            trigger,
        }
    }

    #[tokio::test]
    async fn test_missing_job_creates_no_log() {
        let f = fixture(JobInfoBuilder::new().with_id(1).build(), &["http://a/"]).await;
        let logs = f
            .trigger
            .trigger(TriggerRequest::new(99, TriggerType::Manual))
            .await
            .unwrap();
        assert!(logs.is_empty());
        assert!(f.store.all_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_fans_out_to_every_address() {
        let job = JobInfoBuilder::new()
            .with_id(1)
            .with_route_strategy(RouteStrategy::ShardingBroadcast)
            .build();
        let f = fixture(job, &["http://a/", "http://b/", "http://c/"]).await;

        let logs = f
            .trigger
            .trigger(TriggerRequest::new(1, TriggerType::Cron))
            .await
            .unwrap();
        assert_eq!(logs.len(), 3);

        let stored = f.store.all_logs().await;
        assert_eq!(stored.len(), 3);
        let mut shards: Vec<String> = stored
            .iter()
            .map(|l| l.executor_sharding_param.clone().unwrap())
            .collect();
        shards.sort();
        assert_eq!(shards, vec!["0/3", "1/3", "2/3"]);

        let mut addresses: Vec<String> = stored
            .iter()
            .map(|l| l.executor_address.clone().unwrap())
            .collect();
        addresses.sort();
        addresses.dedup();
        assert_eq!(addresses.len(), 3);

        let calls = f.executors.all_run_calls();
        assert_eq!(calls.len(), 3);
        for (address, param) in calls {
            assert_eq!(param.broadcast_total, 3);
            let expected = ["http://a/", "http://b/", "http://c/"][param.broadcast_index as usize];
            assert_eq!(address, expected);
        }
    }

    #[tokio::test]
    async fn test_sharding_override_triggers_single_shard() {
        let job = JobInfoBuilder::new()
            .with_id(1)
            .with_route_strategy(RouteStrategy::ShardingBroadcast)
            .build();
        let f = fixture(job, &["http://a/", "http://b/"]).await;

        let request = TriggerRequest::new(1, TriggerType::Retry)
            .with_fail_retry_count(1)
            .with_sharding_param(Some("1/2".to_string()));
        let logs = f.trigger.trigger(request).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].executor_address.as_deref(), Some("http://b/"));
        assert_eq!(logs[0].executor_sharding_param.as_deref(), Some("1/2"));
        assert_eq!(logs[0].executor_fail_retry_count, 1);
    }

    #[tokio::test]
    async fn test_empty_address_list_fails_without_rpc() {
        let f = fixture(JobInfoBuilder::new().with_id(1).build(), &[]).await;
        let logs = f
            .trigger
            .trigger(TriggerRequest::new(1, TriggerType::Cron))
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_ne!(logs[0].trigger_code, SUCCESS_CODE);
        assert!(logs[0].executor_address.is_none());
        assert!(logs[0].trigger_msg.contains("执行器地址为空"));
        assert!(f.executors.all_run_calls().is_empty());
    }

    #[tokio::test]
    async fn test_overrides_and_narrative() {
        let job = JobInfoBuilder::new()
            .with_id(1)
            .with_executor_params("from-job")
            .with_fail_retry_count(3)
            .with_block_strategy(BlockStrategy::DiscardLater)
            .build();
        let f = fixture(job, &["http://a/"]).await;

        let request = TriggerRequest::new(1, TriggerType::Manual)
            .with_executor_param(Some("from-request".to_string()));
        let logs = f.trigger.trigger(request).await.unwrap();
        let log = &logs[0];
        assert_eq!(log.trigger_code, SUCCESS_CODE);
        assert_eq!(log.executor_param, "from-request");
        assert_eq!(log.executor_fail_retry_count, 3);
        assert!(log.executor_sharding_param.is_none());
        assert!(log.trigger_msg.contains("手动触发"));
        assert!(log.trigger_msg.contains("Discard Later"));
        assert!(log.trigger_msg.contains("address：http://a/"));

        let calls = f.executors.executor("http://a/").run_calls();
        assert_eq!(calls[0].executor_params, "from-request");
        assert_eq!(calls[0].log_id, log.id);
    }

    #[tokio::test]
    async fn test_unreachable_executor_records_failure() {
        let f = fixture(JobInfoBuilder::new().with_id(1).build(), &["http://a/"]).await;
        f.executors.executor("http://a/").set_reachable(false);

        let logs = f
            .trigger
            .trigger(TriggerRequest::new(1, TriggerType::Cron))
            .await
            .unwrap();
        assert_ne!(logs[0].trigger_code, SUCCESS_CODE);
        assert!(logs[0].trigger_msg.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_address_list_override() {
        let f = fixture(JobInfoBuilder::new().with_id(1).build(), &["http://a/"]).await;
        let request = TriggerRequest::new(1, TriggerType::Manual)
            .with_address_list(Some(vec!["http://manual/".to_string()]));
        let logs = f.trigger.trigger(request).await.unwrap();
        assert_eq!(logs[0].executor_address.as_deref(), Some("http://manual/"));
        assert!(logs[0].trigger_msg.contains("手动录入"));
    }
}
