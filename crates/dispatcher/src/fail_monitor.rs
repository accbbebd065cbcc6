use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use scheduler_core::{
    models::{AlarmStatus, JobInfo, JobLog, TriggerType, SUCCESS_CODE},
    traits::{AlarmSender, JobInfoRepository, JobLogRepository, TriggerRequest, TriggerSubmitter},
    SchedulerResult,
};
use scheduler_infrastructure::MetricsCollector;

const FAIL_LOG_BATCH: usize = 1000;
const RETRY_MARKER: &str = "<br><br>>>>>>>>>>>>失败重试触发<<<<<<<<<<<<br>";
const RETRY_REJECTED_MARKER: &str = "<br><br>>>>>>>>>>>>失败重试提交失败<<<<<<<<<<<<br>";

/// 扫描失败日志，负责失败重试与告警
///
/// 多实例并发扫描时依靠告警状态的条件更新保证每条日志只处理一次。
pub struct JobFailMonitor {
    job_repo: Arc<dyn JobInfoRepository>,
    log_repo: Arc<dyn JobLogRepository>,
    submitter: Arc<dyn TriggerSubmitter>,
    alarm_sender: Arc<dyn AlarmSender>,
    metrics: Arc<MetricsCollector>,
    interval: Duration,
}

impl JobFailMonitor {
    pub fn new(
        job_repo: Arc<dyn JobInfoRepository>,
        log_repo: Arc<dyn JobLogRepository>,
        submitter: Arc<dyn TriggerSubmitter>,
        alarm_sender: Arc<dyn AlarmSender>,
        metrics: Arc<MetricsCollector>,
        interval: Duration,
    ) -> Self {
        Self {
            job_repo,
            log_repo,
            submitter,
            alarm_sender,
            metrics,
            interval,
        }
    }

    /// 处理一批失败日志，返回本轮实际处理的条数
    pub async fn scan_once(&self) -> SchedulerResult<usize> {
        let ids = self.log_repo.find_fail_job_log_ids(FAIL_LOG_BATCH).await?;
        let mut handled = 0;
        for log_id in ids {
            let locked = self
                .log_repo
                .update_alarm_status(log_id, AlarmStatus::Default, AlarmStatus::Locked)
                .await?;
            if !locked {
                continue;
            }
            handled += 1;

            let final_status = match self.handle_fail_log(log_id).await {
                Ok(status) => status,
                Err(e) => {
                    error!("处理失败日志出错: log_id={}, error={}", log_id, e);
                    AlarmStatus::AlarmFailed
                }
            };
            self.log_repo
                .update_alarm_status(log_id, AlarmStatus::Locked, final_status)
                .await?;
        }
        Ok(handled)
    }

    async fn handle_fail_log(&self, log_id: i64) -> SchedulerResult<AlarmStatus> {
        let Some(mut log) = self.log_repo.find_by_id(log_id).await? else {
            return Ok(AlarmStatus::NoAlarmNeeded);
        };
        let job = self.job_repo.find_by_id(log.job_id).await?;

        // 重试提交失败时写入日志说明，并照常走告警流程
        let mut retry_error = None;
        if log.executor_fail_retry_count > 0 {
            let request = TriggerRequest::new(log.job_id, TriggerType::Retry)
                .with_fail_retry_count(log.executor_fail_retry_count - 1)
                .with_sharding_param(log.executor_sharding_param.clone());
            match self.submitter.submit(request).await {
                Ok(()) => {
                    self.metrics.record_retry_trigger();
                    log.trigger_msg.push_str(RETRY_MARKER);
                }
                Err(e) => {
                    warn!("失败重试提交失败: log_id={}, error={}", log_id, e);
                    log.trigger_msg.push_str(RETRY_REJECTED_MARKER);
                    log.trigger_msg.push_str(&e.to_string());
                    retry_error = Some(e.to_string());
                }
            }
            self.log_repo.update_trigger_info(&log).await?;
        }

        let Some(job) = job else {
            return Ok(AlarmStatus::NoAlarmNeeded);
        };
        let recipients = job.alarm_recipients();
        if recipients.is_empty() {
            return Ok(AlarmStatus::NoAlarmNeeded);
        }

        let content = alarm_content(&job, &log, retry_error.as_deref());
        match self
            .alarm_sender
            .send_alarm(&job, &log, &recipients, &content)
            .await
        {
            Ok(()) => {
                self.metrics.record_alarm("sent");
                Ok(AlarmStatus::AlarmSent)
            }
            Err(e) => {
                warn!("告警发送失败: job_id={}, log_id={}, error={}", job.id, log.id, e);
                self.metrics.record_alarm("failed");
                Ok(AlarmStatus::AlarmFailed)
            }
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!("失败监控已启动");
        loop {
            match self.scan_once().await {
                Ok(handled) if handled > 0 => info!("失败监控处理日志: {}", handled),
                Ok(_) => {}
                Err(e) => error!("失败监控扫描出错: {}", e),
            }
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("失败监控已停止");
    }
}

fn alarm_content(job: &JobInfo, log: &JobLog, retry_error: Option<&str>) -> String {
    let mut content = format!("Alarm Job LogId={}", log.id);
    content.push_str(&format!("<br>JobId={}<br>JobDesc={}", job.id, job.description));
    if log.trigger_code != SUCCESS_CODE {
        content.push_str(&format!("<br>TriggerMsg=<br>{}", log.trigger_msg));
    }
    if log.handle_code > 0 && log.handle_code != SUCCESS_CODE {
        content.push_str(&format!("<br>HandleCode={}", log.handle_msg));
    }
    if let Some(e) = retry_error {
        content.push_str(&format!("<br>RetryMsg={e}"));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_infrastructure::InMemoryJobStore;
    use scheduler_testing_utils::{
        JobInfoBuilder, JobLogBuilder, MockAlarmSender, MockTriggerSubmitter,
    };

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        submitter: Arc<MockTriggerSubmitter>,
        alarms: Arc<MockAlarmSender>,
        monitor: JobFailMonitor,
    }

    async fn fixture(job: JobInfo, alarms: MockAlarmSender) -> Fixture {
        let store = Arc::new(InMemoryJobStore::new());
        JobInfoRepository::save(store.as_ref(), job).await.unwrap();
        let submitter = Arc::new(MockTriggerSubmitter::new());
        let alarms = Arc::new(alarms);
        let monitor = JobFailMonitor::new(
            store.clone(),
            store.clone(),
            submitter.clone(),
            alarms.clone(),
            Arc::new(MetricsCollector::new()),
            Duration::from_secs(10),
        );
        Fixture {
            store,
            submitter,
            alarms,
            monitor,
        }
    }

    async fn log_status(store: &InMemoryJobStore, id: i64) -> JobLog {
        JobLogRepository::find_by_id(store, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_retry_without_recipients() {
        let f = fixture(JobInfoBuilder::new().with_id(1).build(), MockAlarmSender::new()).await;
        let log = f
            .store
            .create(
                JobLogBuilder::new()
                    .with_job_id(1)
                    .with_trigger_code(500)
                    .with_fail_retry_count(2)
                    .with_sharding_param("1/3")
                    .build(),
            )
            .await
            .unwrap();

        assert_eq!(f.monitor.scan_once().await.unwrap(), 1);

        let requests = f.submitter.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].trigger_type, TriggerType::Retry);
        assert_eq!(requests[0].fail_retry_count, 1);
        assert_eq!(requests[0].sharding_param.as_deref(), Some("1/3"));
        assert!(f.alarms.sent().is_empty());

        let stored = log_status(&f.store, log.id).await;
        assert_eq!(stored.alarm_status, AlarmStatus::NoAlarmNeeded);
        assert!(stored.trigger_msg.contains("失败重试触发"));

        // 第二轮不再处理同一条日志
        assert_eq!(f.monitor.scan_once().await.unwrap(), 0);
        assert_eq!(f.submitter.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_alarm_once_with_recipients() {
        let job = JobInfoBuilder::new()
            .with_id(1)
            .with_alarm_email("ops@example.com,dev@example.com")
            .build();
        let f = fixture(job, MockAlarmSender::new()).await;
        let log = f
            .store
            .create(
                JobLogBuilder::new()
                    .with_job_id(1)
                    .with_trigger_code(200)
                    .with_handle_code(500)
                    .build(),
            )
            .await
            .unwrap();

        f.monitor.scan_once().await.unwrap();
        f.monitor.scan_once().await.unwrap();

        assert!(f.submitter.requests().is_empty());
        let sent = f.alarms.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].log_id, log.id);
        assert_eq!(sent[0].recipients.len(), 2);
        assert!(sent[0].content.starts_with(&format!("Alarm Job LogId={}", log.id)));
        assert_eq!(
            log_status(&f.store, log.id).await.alarm_status,
            AlarmStatus::AlarmSent
        );
    }

    #[tokio::test]
    async fn test_failed_alarm_is_terminal() {
        let job = JobInfoBuilder::new()
            .with_id(1)
            .with_alarm_email("ops@example.com")
            .build();
        let f = fixture(job, MockAlarmSender::failing()).await;
        let log = f
            .store
            .create(JobLogBuilder::new().with_job_id(1).with_trigger_code(500).build())
            .await
            .unwrap();

        f.monitor.scan_once().await.unwrap();
        f.monitor.scan_once().await.unwrap();

        assert_eq!(f.alarms.sent().len(), 1);
        let status = log_status(&f.store, log.id).await.alarm_status;
        assert_eq!(status, AlarmStatus::AlarmFailed);
        assert!(status.is_terminal());
    }

    #[tokio::test]
    async fn test_rejected_retry_is_recorded_and_alarmed() {
        let job = JobInfoBuilder::new()
            .with_id(1)
            .with_alarm_email("ops@example.com")
            .build();
        let f = fixture(job, MockAlarmSender::new()).await;
        f.submitter.set_reject(true);
        let log = f
            .store
            .create(
                JobLogBuilder::new()
                    .with_job_id(1)
                    .with_trigger_code(500)
                    .with_fail_retry_count(2)
                    .build(),
            )
            .await
            .unwrap();

        assert_eq!(f.monitor.scan_once().await.unwrap(), 1);
        assert!(f.submitter.requests().is_empty());

        let stored = log_status(&f.store, log.id).await;
        assert!(stored.trigger_msg.contains("失败重试提交失败"));
        assert!(!stored.trigger_msg.contains("失败重试触发"));
        assert_eq!(stored.alarm_status, AlarmStatus::AlarmSent);

        let sent = f.alarms.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].content.contains("RetryMsg="));
    }

    #[tokio::test]
    async fn test_rejected_retry_without_recipients_keeps_note() {
        let f = fixture(JobInfoBuilder::new().with_id(1).build(), MockAlarmSender::new()).await;
        f.submitter.set_reject(true);
        let log = f
            .store
            .create(
                JobLogBuilder::new()
                    .with_job_id(1)
                    .with_handle_code(500)
                    .with_fail_retry_count(1)
                    .build(),
            )
            .await
            .unwrap();

        f.monitor.scan_once().await.unwrap();
        let stored = log_status(&f.store, log.id).await;
        assert!(stored.trigger_msg.contains("失败重试提交失败"));
        assert_eq!(stored.alarm_status, AlarmStatus::NoAlarmNeeded);
    }

    #[tokio::test]
    async fn test_successful_logs_are_ignored() {
        let f = fixture(JobInfoBuilder::new().with_id(1).build(), MockAlarmSender::new()).await;
        f.store
            .create(
                JobLogBuilder::new()
                    .with_job_id(1)
                    .with_trigger_code(200)
                    .with_handle_code(200)
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(f.monitor.scan_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_locked_log_is_skipped() {
        let f = fixture(JobInfoBuilder::new().with_id(1).build(), MockAlarmSender::new()).await;
        let log = f
            .store
            .create(JobLogBuilder::new().with_job_id(1).with_trigger_code(500).build())
            .await
            .unwrap();
        // 另一个实例已经锁定
        f.store
            .update_alarm_status(log.id, AlarmStatus::Default, AlarmStatus::Locked)
            .await
            .unwrap();
        assert_eq!(f.monitor.scan_once().await.unwrap(), 0);
    }
}
