use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::Router;
use scheduler_api::{create_admin_app, create_executor_app};
use scheduler_core::{traits::AlarmSender, AppConfig, SchedulerResult};
use scheduler_dispatcher::{JobScheduler, SchedulerStores};
use scheduler_infrastructure::{
    install_prometheus_exporter, CompositeAlarmSender, HttpExecutorClientFactory,
    InMemoryJobStore, LoggingAlarmSender, MetricsCollector, WebhookAlarmSender,
};
use scheduler_worker::{HandleResult, JobContext, JobExecutor, JobHandler};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行调度中心
    Admin,
    /// 仅运行执行器
    Executor,
    /// 同一进程内运行调度中心和执行器
    All,
}

impl AppMode {
    fn runs_admin(self) -> bool {
        matches!(self, AppMode::Admin | AppMode::All)
    }

    fn runs_executor(self) -> bool {
        matches!(self, AppMode::Executor | AppMode::All)
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    metrics: Arc<MetricsCollector>,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        if config.observability.metrics_enabled {
            install_prometheus_exporter(&config.observability.metrics_bind_address)?;
        }

        Ok(Self {
            config,
            mode,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// 启动各组件并阻塞到收到关闭信号
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut servers = Vec::new();

        let scheduler = if self.mode.runs_admin() {
            let (scheduler, router) = self.build_admin()?;
            scheduler.start().context("启动调度中心失败")?;
            servers.push(
                spawn_server(&self.config.admin.bind_address, router, shutdown.clone()).await?,
            );
            Some(scheduler)
        } else {
            None
        };

        let executor = if self.mode.runs_executor() {
            let (executor, router) = self.build_executor()?;
            executor.start().context("启动执行器失败")?;
            servers.push(
                spawn_server(
                    &self.config.executor.bind_address(),
                    router,
                    shutdown.clone(),
                )
                .await?,
            );
            Some(executor)
        } else {
            None
        };

        shutdown.cancelled().await;
        info!("开始停止组件");

        // 执行器先摘除注册并送出剩余回调，调度中心随后停止
        if let Some(executor) = executor {
            executor.stop().await;
        }
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
        for server in servers {
            if let Err(e) = server.await {
                error!("HTTP服务异常退出: {}", e);
            }
        }
        Ok(())
    }

    fn build_admin(&self) -> Result<(JobScheduler, Router)> {
        let admin = &self.config.admin;
        let store = Arc::new(InMemoryJobStore::new());
        let executor_clients = Arc::new(HttpExecutorClientFactory::new(
            admin.access_token.clone(),
            Duration::from_millis(admin.executor_timeout_ms),
        ));

        let mut alarm_senders: Vec<Arc<dyn AlarmSender>> = vec![Arc::new(LoggingAlarmSender)];
        if let Some(url) = admin.alarm_webhook_url.as_deref().filter(|u| !u.is_empty()) {
            let webhook = WebhookAlarmSender::new(url, Duration::from_secs(10))
                .context("创建告警Webhook客户端失败")?;
            alarm_senders.push(Arc::new(webhook));
        }

        let scheduler = JobScheduler::new(
            admin,
            admin_address(&admin.bind_address),
            SchedulerStores::from_store(store),
            executor_clients,
            Arc::new(CompositeAlarmSender::new(alarm_senders)),
            Arc::clone(&self.metrics),
        );
        let router = create_admin_app(
            scheduler.admin_biz(),
            scheduler.submitter(),
            admin.access_token.clone(),
        );
        Ok((scheduler, router))
    }

    fn build_executor(&self) -> Result<(JobExecutor, Router)> {
        let executor =
            JobExecutor::from_config(self.config.executor.clone()).context("创建执行器失败")?;
        executor.register_handler("demoJobHandler", Arc::new(DemoJobHandler));
        let router = create_executor_app(
            executor.executor_biz(),
            self.config.executor.access_token.clone(),
        );
        Ok((executor, router))
    }
}

async fn spawn_server(
    bind_address: &str,
    router: Router,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("绑定地址失败: {bind_address}"))?;
    info!("HTTP服务已启动: {}", bind_address);
    Ok(tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await;
        if let Err(e) = result {
            error!("HTTP服务运行失败: {}", e);
        }
    }))
}

/// 调度日志中展示的调度中心地址
fn admin_address(bind_address: &str) -> String {
    let port = bind_address.rsplit(':').next().unwrap_or("8080");
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "127.0.0.1".to_string());
    format!("http://{host}:{port}/")
}

/// 示例任务：记录参数与分片信息
struct DemoJobHandler;

#[async_trait]
impl JobHandler for DemoJobHandler {
    async fn execute(&self, context: &JobContext) -> SchedulerResult<HandleResult> {
        context
            .log(format!(
                "demoJobHandler params={}, shard={}/{}",
                context.params, context.shard_index, context.shard_total
            ))
            .await;
        Ok(HandleResult::success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_address_uses_bind_port() {
        assert!(admin_address("0.0.0.0:8081").ends_with(":8081/"));
        assert!(admin_address("0.0.0.0:8081").starts_with("http://"));
    }

    #[test]
    fn test_mode_components() {
        assert!(AppMode::All.runs_admin() && AppMode::All.runs_executor());
        assert!(!AppMode::Admin.runs_executor());
        assert!(!AppMode::Executor.runs_admin());
    }
}
