use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scheduler_core::{
    models::{JobInfo, JobLog},
    traits::AlarmSender,
    SchedulerError, SchedulerResult,
};
use serde::Serialize;
use tracing::{info, warn};

/// 只写日志的告警实现
#[derive(Debug, Default, Clone)]
pub struct LoggingAlarmSender;

#[async_trait]
impl AlarmSender for LoggingAlarmSender {
    async fn send_alarm(
        &self,
        job: &JobInfo,
        log: &JobLog,
        recipients: &[String],
        content: &str,
    ) -> SchedulerResult<()> {
        warn!(
            job_id = job.id,
            log_id = log.id,
            recipients = ?recipients,
            "任务调度失败告警: {}",
            content
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    job_id: i64,
    job_desc: &'a str,
    log_id: i64,
    recipients: &'a [String],
    content: &'a str,
}

/// 通过HTTP Webhook投递告警
pub struct WebhookAlarmSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlarmSender {
    pub fn new(url: impl Into<String>, timeout: Duration) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Network(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlarmSender for WebhookAlarmSender {
    async fn send_alarm(
        &self,
        job: &JobInfo,
        log: &JobLog,
        recipients: &[String],
        content: &str,
    ) -> SchedulerResult<()> {
        let payload = WebhookPayload {
            job_id: job.id,
            job_desc: &job.description,
            log_id: log.id,
            recipients,
            content,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("发送告警失败: {e}")))?;

        if !response.status().is_success() {
            return Err(SchedulerError::Network(format!(
                "告警Webhook返回异常状态码: {}",
                response.status()
            )));
        }
        info!("告警已发送: job_id={}, log_id={}", job.id, log.id);
        Ok(())
    }
}

/// 依次调用所有告警渠道，任一失败即视为失败
pub struct CompositeAlarmSender {
    senders: Vec<Arc<dyn AlarmSender>>,
}

impl CompositeAlarmSender {
    pub fn new(senders: Vec<Arc<dyn AlarmSender>>) -> Self {
        Self { senders }
    }
}

#[async_trait]
impl AlarmSender for CompositeAlarmSender {
    async fn send_alarm(
        &self,
        job: &JobInfo,
        log: &JobLog,
        recipients: &[String],
        content: &str,
    ) -> SchedulerResult<()> {
        let mut first_error = None;
        for sender in &self.senders {
            if let Err(e) = sender.send_alarm(job, log, recipients, content).await {
                warn!("告警渠道发送失败: job_id={}, error={}", job.id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
