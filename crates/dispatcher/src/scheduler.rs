use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scheduler_core::{
    config::AdminConfig,
    traits::{
        AdminBiz, AlarmSender, ExecutorClientFactory, JobGroupRepository, JobInfoRepository,
        JobLogRepository, JobRegistryRepository, ScheduleLock, TriggerSubmitter,
    },
    SchedulerError, SchedulerResult,
};
use scheduler_infrastructure::MetricsCollector;

use crate::admin_biz::AdminBizImpl;
use crate::fail_monitor::JobFailMonitor;
use crate::registry_monitor::JobRegistryMonitor;
use crate::schedule_helper::JobScheduleHelper;
use crate::trigger::JobTrigger;
use crate::trigger_pool::{JobTriggerPool, TriggerPoolConfig};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

/// 调度中心使用的存储集合
#[derive(Clone)]
pub struct SchedulerStores {
    pub job_repo: Arc<dyn JobInfoRepository>,
    pub group_repo: Arc<dyn JobGroupRepository>,
    pub log_repo: Arc<dyn JobLogRepository>,
    pub registry_repo: Arc<dyn JobRegistryRepository>,
    pub schedule_lock: Arc<dyn ScheduleLock>,
}

impl SchedulerStores {
    /// 由同时实现全部仓储接口的存储构造
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: JobInfoRepository
            + JobGroupRepository
            + JobLogRepository
            + JobRegistryRepository
            + ScheduleLock
            + 'static,
    {
        Self {
            job_repo: store.clone(),
            group_repo: store.clone(),
            log_repo: store.clone(),
            registry_repo: store.clone(),
            schedule_lock: store,
        }
    }
}

/// 调度中心组件的装配与生命周期管理
pub struct JobScheduler {
    trigger_pool: Arc<JobTriggerPool>,
    schedule_helper: Arc<JobScheduleHelper>,
    registry_monitor: Arc<JobRegistryMonitor>,
    fail_monitor: Arc<JobFailMonitor>,
    admin_biz: Arc<AdminBizImpl>,
    cancellation_token: CancellationToken,
    /// 调度池最后停止，保证时间轮剩余任务能被执行
    pool_token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pool_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(
        config: &AdminConfig,
        admin_address: String,
        stores: SchedulerStores,
        executor_clients: Arc<dyn ExecutorClientFactory>,
        alarm_sender: Arc<dyn AlarmSender>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let trigger = Arc::new(JobTrigger::new(
            stores.job_repo.clone(),
            stores.group_repo.clone(),
            stores.log_repo.clone(),
            executor_clients,
            admin_address,
            metrics.clone(),
        ));

        let pool_config = TriggerPoolConfig {
            fast_max: config.trigger_pool_fast_max,
            slow_max: config.trigger_pool_slow_max,
            ..Default::default()
        };
        let trigger_pool = Arc::new(JobTriggerPool::new(pool_config, trigger, metrics.clone()));
        let submitter: Arc<dyn TriggerSubmitter> = trigger_pool.clone();

        let schedule_helper = Arc::new(JobScheduleHelper::new(
            stores.job_repo.clone(),
            stores.schedule_lock.clone(),
            submitter.clone(),
            metrics.clone(),
            config.pre_read_count(),
            Duration::from_millis(config.schedule_lock_timeout_ms),
        ));

        let registry_monitor = Arc::new(JobRegistryMonitor::new(
            stores.registry_repo.clone(),
            stores.group_repo.clone(),
            metrics.clone(),
            Duration::from_secs(config.beat_timeout_seconds),
            config.registry_dead_timeout_seconds,
        ));

        let fail_monitor = Arc::new(JobFailMonitor::new(
            stores.job_repo.clone(),
            stores.log_repo.clone(),
            submitter.clone(),
            alarm_sender,
            metrics.clone(),
            Duration::from_secs(config.fail_monitor_interval_seconds),
        ));

        let admin_biz = Arc::new(AdminBizImpl::new(
            stores.job_repo,
            stores.log_repo,
            stores.registry_repo,
            submitter,
            metrics,
        ));

        Self {
            trigger_pool,
            schedule_helper,
            registry_monitor,
            fail_monitor,
            admin_biz,
            cancellation_token: CancellationToken::new(),
            pool_token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            pool_handles: Mutex::new(Vec::new()),
        }
    }

    /// 手动/API触发以及子任务触发使用的入口
    pub fn submitter(&self) -> Arc<dyn TriggerSubmitter> {
        self.trigger_pool.clone()
    }

    pub fn admin_biz(&self) -> Arc<dyn AdminBiz> {
        self.admin_biz.clone()
    }

    pub fn start(&self) -> SchedulerResult<()> {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        if !handles.is_empty() {
            return Err(SchedulerError::Internal("调度中心已启动".to_string()));
        }

        let pool_handles = self.trigger_pool.start(self.pool_token.clone())?;
        self.pool_handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(pool_handles);

        let token = self.cancellation_token.clone();

        let helper = Arc::clone(&self.schedule_helper);
        let child = token.child_token();
        handles.push(tokio::spawn(async move { helper.run_schedule_loop(child).await }));

        let helper = Arc::clone(&self.schedule_helper);
        let child = token.child_token();
        handles.push(tokio::spawn(async move { helper.run_ring_loop(child).await }));

        let monitor = Arc::clone(&self.registry_monitor);
        let child = token.child_token();
        handles.push(tokio::spawn(async move { monitor.run(child).await }));

        let monitor = Arc::clone(&self.fail_monitor);
        let child = token.child_token();
        handles.push(tokio::spawn(async move { monitor.run(child).await }));

        info!("调度中心已启动");
        Ok(())
    }

    /// 停止所有后台任务，超时未退出的任务直接放弃等待
    pub async fn stop(&self) {
        info!("正在停止调度中心...");
        self.cancellation_token.cancel();
        join_with_timeout(&self.handles).await;

        self.pool_token.cancel();
        join_with_timeout(&self.pool_handles).await;
        info!("调度中心已停止");
    }
}

async fn join_with_timeout(handles: &Mutex<Vec<JoinHandle<()>>>) {
    let handles: Vec<JoinHandle<()>> = {
        let mut guard = handles.lock().unwrap_or_else(|e| e.into_inner());
        guard.drain(..).collect()
    };
    let join_all = async {
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("后台任务异常退出: {}", e);
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, join_all).await.is_err() {
        warn!("等待后台任务退出超时");
    }
}
