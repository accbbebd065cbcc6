use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scheduler_core::{
    config::ExecutorConfig, traits::AdminBiz, SchedulerError, SchedulerResult,
};
use scheduler_infrastructure::HttpAdminClient;

use crate::callback::CallbackPipeline;
use crate::executor_biz::ExecutorBizImpl;
use crate::handler::{HandlerRegistry, JobHandler};
use crate::job_log::JobLogFiles;
use crate::job_thread::{JobThread, JobThreadDeps, JobThreadRepository};
use crate::registry_thread::ExecutorRegistryThread;
use crate::retry_store::CallbackRetryStore;

const SHUTDOWN_REASON: &str = "web container destroy and kill the job.";
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// 执行器
///
/// 组装处理器注册表、任务线程、结果回调与注册心跳。HTTP服务由调用方基于
/// [`JobExecutor::executor_biz`] 搭建。
pub struct JobExecutor {
    config: ExecutorConfig,
    handlers: Arc<HandlerRegistry>,
    log_files: Arc<JobLogFiles>,
    callbacks: Arc<CallbackPipeline>,
    threads: Arc<JobThreadRepository>,
    registry: Arc<ExecutorRegistryThread>,
    biz: Arc<ExecutorBizImpl>,
    registry_token: CancellationToken,
    callback_token: CancellationToken,
    cleaner_token: CancellationToken,
    registry_handle: Mutex<Option<JoinHandle<()>>>,
    background_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobExecutor {
    pub fn new(config: ExecutorConfig, admin_clients: Vec<Arc<dyn AdminBiz>>) -> Self {
        let beat_interval = Duration::from_secs(config.beat_interval_seconds.max(1));
        let log_files = Arc::new(JobLogFiles::new(&config.log_path));
        let callbacks = Arc::new(CallbackPipeline::new(
            admin_clients.clone(),
            CallbackRetryStore::new(config.callback_retry_path()),
            Arc::clone(&log_files),
            beat_interval,
        ));
        let threads = Arc::new(JobThreadRepository::new(JobThreadDeps {
            callbacks: Arc::clone(&callbacks),
            log_files: Arc::clone(&log_files),
        }));
        let handlers = Arc::new(HandlerRegistry::new());
        let biz = Arc::new(ExecutorBizImpl::new(
            Arc::clone(&handlers),
            Arc::clone(&threads),
            Arc::clone(&log_files),
        ));
        let registry = Arc::new(ExecutorRegistryThread::new(
            admin_clients,
            config.app_name.clone(),
            config.registry_address(),
            beat_interval,
        ));

        Self {
            config,
            handlers,
            log_files,
            callbacks,
            threads,
            registry,
            biz,
            registry_token: CancellationToken::new(),
            callback_token: CancellationToken::new(),
            cleaner_token: CancellationToken::new(),
            registry_handle: Mutex::new(None),
            background_handles: Mutex::new(Vec::new()),
        }
    }

    /// 按配置中的调度中心地址创建HTTP客户端
    pub fn from_config(config: ExecutorConfig) -> SchedulerResult<Self> {
        config
            .validate()
            .map_err(|e| SchedulerError::Configuration(e.to_string()))?;
        let timeout = Duration::from_millis(config.admin_timeout_ms);
        let mut admin_clients: Vec<Arc<dyn AdminBiz>> = Vec::new();
        for address in &config.admin_addresses {
            let client = HttpAdminClient::new(address, config.access_token.clone(), timeout)?;
            admin_clients.push(Arc::new(client));
        }
        if admin_clients.is_empty() {
            warn!("未配置调度中心地址，执行结果将只能落盘重试");
        }
        Ok(Self::new(config, admin_clients))
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.register(name, handler);
    }

    pub fn handlers(&self) -> Arc<HandlerRegistry> {
        Arc::clone(&self.handlers)
    }

    pub fn executor_biz(&self) -> Arc<ExecutorBizImpl> {
        Arc::clone(&self.biz)
    }

    pub fn log_files(&self) -> Arc<JobLogFiles> {
        Arc::clone(&self.log_files)
    }

    pub fn running_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn job_thread(&self, job_id: i64) -> Option<Arc<JobThread>> {
        self.threads.get(job_id)
    }

    pub fn start(&self) -> SchedulerResult<()> {
        let mut handles = self.callbacks.start(self.callback_token.clone())?;

        let log_files = Arc::clone(&self.log_files);
        let retention = u32::try_from(self.config.log_retention_days).unwrap_or(0);
        let token = self.cleaner_token.clone();
        handles.push(tokio::spawn(async move {
            log_files.run_cleaner(retention, token).await
        }));
        self.background_handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(handles);

        let registry = Arc::clone(&self.registry);
        let token = self.registry_token.clone();
        *self
            .registry_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner()) =
            Some(tokio::spawn(async move { registry.run(token).await }));

        info!(
            "执行器已启动: app_name={}, address={}",
            self.config.app_name,
            self.config.registry_address()
        );
        Ok(())
    }

    /// 先摘除注册，再终止任务线程，最后发送剩余回调
    pub async fn stop(&self) {
        info!("正在停止执行器...");
        self.registry_token.cancel();
        let registry_handle = self
            .registry_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = registry_handle {
            join_with_timeout(handle).await;
        }

        self.threads.stop_all(SHUTDOWN_REASON).await;

        self.callback_token.cancel();
        self.cleaner_token.cancel();
        let handles: Vec<JoinHandle<()>> = self
            .background_handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            join_with_timeout(handle).await;
        }
        info!("执行器已停止");
    }
}

async fn join_with_timeout(handle: JoinHandle<()>) {
    match tokio::time::timeout(JOIN_TIMEOUT, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("执行器后台任务异常退出: {}", e),
        Err(_) => warn!("等待执行器后台任务超时"),
    }
}
