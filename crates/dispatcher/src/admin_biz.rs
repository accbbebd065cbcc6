use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use scheduler_core::{
    models::{HandleCallbackParam, RegistryParam, RpcResponse, TriggerType, SUCCESS_CODE},
    traits::{
        AdminBiz, JobInfoRepository, JobLogRepository, JobRegistryRepository, TriggerRequest,
        TriggerSubmitter,
    },
    SchedulerResult,
};
use scheduler_infrastructure::MetricsCollector;

/// 调度中心对执行器暴露的RPC实现
pub struct AdminBizImpl {
    job_repo: Arc<dyn JobInfoRepository>,
    log_repo: Arc<dyn JobLogRepository>,
    registry_repo: Arc<dyn JobRegistryRepository>,
    submitter: Arc<dyn TriggerSubmitter>,
    metrics: Arc<MetricsCollector>,
}

impl AdminBizImpl {
    pub fn new(
        job_repo: Arc<dyn JobInfoRepository>,
        log_repo: Arc<dyn JobLogRepository>,
        registry_repo: Arc<dyn JobRegistryRepository>,
        submitter: Arc<dyn TriggerSubmitter>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            job_repo,
            log_repo,
            registry_repo,
            submitter,
            metrics,
        }
    }

    async fn handle_callback(&self, param: HandleCallbackParam) -> SchedulerResult<RpcResponse<String>> {
        let Some(mut log) = self.log_repo.find_by_id(param.log_id).await? else {
            return Ok(RpcResponse::fail("log item not found."));
        };
        if log.handle_code > 0 {
            return Ok(RpcResponse::fail("log repeate callback."));
        }

        let mut handle_msg = String::new();
        if !log.handle_msg.is_empty() {
            handle_msg.push_str(&log.handle_msg);
            handle_msg.push_str("<br>");
        }
        if let Some(msg) = param.handle_msg.as_deref() {
            handle_msg.push_str(msg);
        }

        if param.handle_code == SUCCESS_CODE {
            if let Some(narrative) = self.trigger_children(log.job_id).await? {
                handle_msg.push_str(&narrative);
            }
        }

        log.handle_time = Some(Utc::now());
        log.handle_code = param.handle_code;
        log.handle_msg = handle_msg;
        self.log_repo.update_handle_info(&log).await?;
        self.metrics.record_callback(param.handle_code);
        debug!(
            log_id = log.id,
            handle_code = log.handle_code,
            "执行结果回调已处理"
        );
        Ok(RpcResponse::success())
    }

    /// 触发子任务，返回追加到执行备注的说明
    async fn trigger_children(&self, job_id: i64) -> SchedulerResult<Option<String>> {
        let Some(job) = self.job_repo.find_by_id(job_id).await? else {
            return Ok(None);
        };
        if job.child_job_ids.is_empty() {
            return Ok(None);
        }

        let total = job.child_job_ids.len();
        let mut narrative = String::from("<br><br>>>>>>>>>>>>触发子任务<<<<<<<<<<<<br>");
        for (i, child_id) in job.child_job_ids.iter().copied().enumerate() {
            let position = i + 1;
            if child_id <= 0 {
                narrative.push_str(&format!(
                    "{position}/{total} [任务ID={child_id}], 触发失败, 触发备注: 任务ID无效 <br>"
                ));
                continue;
            }
            let request = TriggerRequest::new(child_id, TriggerType::Parent);
            match self.submitter.submit(request).await {
                Ok(()) => narrative.push_str(&format!(
                    "{position}/{total} [任务ID={child_id}], 触发成功 <br>"
                )),
                Err(e) => {
                    warn!("子任务触发失败: parent={}, child={}, error={}", job_id, child_id, e);
                    narrative.push_str(&format!(
                        "{position}/{total} [任务ID={child_id}], 触发失败, 触发备注: {e} <br>"
                    ));
                }
            }
        }
        Ok(Some(narrative))
    }
}

#[async_trait]
impl AdminBiz for AdminBizImpl {
    async fn callback(
        &self,
        params: Vec<HandleCallbackParam>,
    ) -> SchedulerResult<RpcResponse<String>> {
        for param in params {
            let log_id = param.log_id;
            let result = self.handle_callback(param).await?;
            if !result.is_success() {
                warn!("执行结果回调被拒绝: log_id={}, msg={}", log_id, result.msg_or_empty());
            }
        }
        Ok(RpcResponse::success())
    }

    async fn registry(&self, param: RegistryParam) -> SchedulerResult<RpcResponse<String>> {
        if !param.is_valid() {
            return Ok(RpcResponse::fail("Illegal Argument."));
        }
        self.registry_repo
            .registry_upsert(
                param.registry_group,
                &param.registry_key,
                &param.registry_value,
                Utc::now(),
            )
            .await?;
        debug!(
            "执行器注册: app_name={}, address={}",
            param.registry_key, param.registry_value
        );
        Ok(RpcResponse::success())
    }

    async fn registry_remove(&self, param: RegistryParam) -> SchedulerResult<RpcResponse<String>> {
        if !param.is_valid() {
            return Ok(RpcResponse::fail("Illegal Argument."));
        }
        self.registry_repo
            .registry_delete(
                param.registry_group,
                &param.registry_key,
                &param.registry_value,
            )
            .await?;
        info!(
            "执行器摘除: app_name={}, address={}",
            param.registry_key, param.registry_value
        );
        Ok(RpcResponse::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::{JobLog, RegistryGroup};
    use scheduler_infrastructure::InMemoryJobStore;
    use scheduler_testing_utils::{JobInfoBuilder, JobLogBuilder, MockTriggerSubmitter};

    async fn setup(child_job_ids: Vec<i64>) -> (Arc<InMemoryJobStore>, Arc<MockTriggerSubmitter>, AdminBizImpl, JobLog) {
        let store = Arc::new(InMemoryJobStore::new());
        JobInfoRepository::save(
            store.as_ref(),
            JobInfoBuilder::new()
                .with_id(1)
                .with_child_job_ids(child_job_ids)
                .build(),
        )
        .await
        .unwrap();
        let log = store
            .create(JobLogBuilder::new().with_job_id(1).with_trigger_code(200).build())
            .await
            .unwrap();
        let submitter = Arc::new(MockTriggerSubmitter::new());
        let biz = AdminBizImpl::new(
            store.clone(),
            store.clone(),
            store.clone(),
            submitter.clone(),
            Arc::new(MetricsCollector::new()),
        );
        (store, submitter, biz, log)
    }

    #[tokio::test]
    async fn test_callback_updates_log_and_triggers_children() {
        let (store, submitter, biz, log) = setup(vec![2, 0, 3]).await;
        let result = biz
            .callback(vec![HandleCallbackParam::new(
                log.id,
                0,
                SUCCESS_CODE,
                Some("done".to_string()),
            )])
            .await
            .unwrap();
        assert!(result.is_success());

        let stored = JobLogRepository::find_by_id(store.as_ref(), log.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.handle_code, SUCCESS_CODE);
        assert!(stored.handle_time.is_some());
        assert!(stored.handle_msg.starts_with("done"));
        assert!(stored.handle_msg.contains("触发子任务"));
        assert!(stored.handle_msg.contains("2/3 [任务ID=0], 触发失败, 触发备注: 任务ID无效"));

        let requests = submitter.requests();
        let ids: Vec<i64> = requests.iter().map(|r| r.job_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(requests.iter().all(|r| r.trigger_type == TriggerType::Parent));
    }

    #[tokio::test]
    async fn test_failed_callback_skips_children() {
        let (store, submitter, biz, log) = setup(vec![2]).await;
        biz.callback(vec![HandleCallbackParam::new(log.id, 0, 500, None)])
            .await
            .unwrap();
        assert!(submitter.requests().is_empty());
        let stored = JobLogRepository::find_by_id(store.as_ref(), log.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.handle_code, 500);
    }

    #[tokio::test]
    async fn test_repeated_and_unknown_callbacks_are_rejected() {
        let (_store, submitter, biz, log) = setup(vec![2]).await;
        let first = HandleCallbackParam::new(log.id, 0, SUCCESS_CODE, None);
        assert!(biz.handle_callback(first.clone()).await.unwrap().is_success());

        let repeated = biz.handle_callback(first).await.unwrap();
        assert_eq!(repeated.msg.as_deref(), Some("log repeate callback."));
        assert_eq!(submitter.requests().len(), 1);

        let unknown = biz
            .handle_callback(HandleCallbackParam::new(999, 0, SUCCESS_CODE, None))
            .await
            .unwrap();
        assert_eq!(unknown.msg.as_deref(), Some("log item not found."));
    }

    #[tokio::test]
    async fn test_registry_and_remove() {
        let (store, _, biz, _) = setup(vec![]).await;
        let param = RegistryParam::executor("app-a", "http://127.0.0.1:9999/");
        assert!(biz.registry(param.clone()).await.unwrap().is_success());
        assert!(biz.registry(param.clone()).await.unwrap().is_success());

        let entries = store.all_registry().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].registry_group, RegistryGroup::Executor);

        assert!(biz.registry_remove(param).await.unwrap().is_success());
        assert!(store.all_registry().await.is_empty());

        let invalid = RegistryParam::executor("", "http://127.0.0.1:9999/");
        assert!(!biz.registry(invalid).await.unwrap().is_success());
    }
}
