use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::{
    models::HandleCallbackParam, traits::AdminBiz, SchedulerError, SchedulerResult,
};

use crate::job_log::JobLogFiles;
use crate::retry_store::CallbackRetryStore;

/// 执行结果回调
///
/// 结果先进入内存队列，由回调任务批量发送给调度中心；全部调度中心都失败时落盘，
/// 重试任务按心跳周期重新投递。
pub struct CallbackPipeline {
    admin_clients: Vec<Arc<dyn AdminBiz>>,
    retry_store: CallbackRetryStore,
    log_files: Arc<JobLogFiles>,
    retry_interval: Duration,
    tx: mpsc::UnboundedSender<HandleCallbackParam>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<HandleCallbackParam>>>,
}

impl CallbackPipeline {
    pub fn new(
        admin_clients: Vec<Arc<dyn AdminBiz>>,
        retry_store: CallbackRetryStore,
        log_files: Arc<JobLogFiles>,
        retry_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            admin_clients,
            retry_store,
            log_files,
            retry_interval,
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    pub fn push(&self, param: HandleCallbackParam) {
        if self.tx.send(param).is_err() {
            warn!("回调队列已关闭，丢弃回调");
        }
    }

    /// 启动回调任务与重试任务，只能调用一次
    pub fn start(
        self: &Arc<Self>,
        cancellation_token: CancellationToken,
    ) -> SchedulerResult<Vec<JoinHandle<()>>> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| SchedulerError::Internal("回调任务已启动".to_string()))?;

        let pipeline = Arc::clone(self);
        let token = cancellation_token.clone();
        let drain = tokio::spawn(async move { pipeline.run_callback_loop(rx, token).await });

        let pipeline = Arc::clone(self);
        let retry = tokio::spawn(async move { pipeline.run_retry_loop(cancellation_token).await });

        Ok(vec![drain, retry])
    }

    async fn run_callback_loop(
        &self,
        mut rx: mpsc::UnboundedReceiver<HandleCallbackParam>,
        cancellation_token: CancellationToken,
    ) {
        info!("回调任务已启动");
        loop {
            let first = tokio::select! {
                _ = cancellation_token.cancelled() => break,
                param = rx.recv() => match param {
                    Some(param) => param,
                    None => break,
                },
            };
            let mut batch = vec![first];
            while let Ok(param) = rx.try_recv() {
                batch.push(param);
            }
            self.do_callback(batch).await;
        }

        // 停止前发送剩余结果
        rx.close();
        let mut remaining = Vec::new();
        while let Ok(param) = rx.try_recv() {
            remaining.push(param);
        }
        if !remaining.is_empty() {
            self.do_callback(remaining).await;
        }
        info!("回调任务已停止");
    }

    async fn run_retry_loop(&self, cancellation_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
            match self.retry_once().await {
                Ok(delivered) if delivered > 0 => info!("回调重试成功批次: {}", delivered),
                Ok(_) => {}
                Err(e) => error!("回调重试出错: {}", e),
            }
        }
    }

    /// 发送一批回调，失败时落盘
    pub async fn do_callback(&self, batch: Vec<HandleCallbackParam>) {
        if self.deliver(&batch).await {
            return;
        }
        if let Err(e) = self.retry_store.save(&batch).await {
            error!("回调失败批次落盘失败，结果丢失: size={}, error={}", batch.len(), e);
        }
    }

    /// 重投一遍已落盘的批次，返回投递成功的批次数
    ///
    /// 文件只在投递成功后删除；单个文件出错不影响其余批次。
    pub async fn retry_once(&self) -> SchedulerResult<usize> {
        let mut delivered = 0;
        for path in self.retry_store.list().await? {
            let Some(batch) = self.retry_store.load(&path).await else {
                continue;
            };
            if !batch.is_empty() && !self.deliver(&batch).await {
                debug!("回调重试仍失败，保留文件: {}", path.display());
                continue;
            }
            if !batch.is_empty() {
                delivered += 1;
            }
            if let Err(e) = self.retry_store.remove(&path).await {
                warn!("删除已投递的回调重试文件失败: {}, error={}", path.display(), e);
            }
        }
        Ok(delivered)
    }

    /// 依次尝试各调度中心，任意一个成功即返回
    async fn deliver(&self, batch: &[HandleCallbackParam]) -> bool {
        for admin in &self.admin_clients {
            match admin.callback(batch.to_vec()).await {
                Ok(result) if result.is_success() => {
                    self.log_callback(batch, "job callback finish.").await;
                    debug!("回调成功: size={}", batch.len());
                    return true;
                }
                Ok(result) => {
                    self.log_callback(
                        batch,
                        &format!("job callback fail, callbackResult: {}", result.msg_or_empty()),
                    )
                    .await;
                }
                Err(e) => {
                    self.log_callback(batch, &format!("job callback error, errorMsg: {e}"))
                        .await;
                }
            }
        }
        false
    }

    async fn log_callback(&self, batch: &[HandleCallbackParam], line: &str) {
        for param in batch {
            let line = format!("----------- {line}");
            if let Err(e) = self
                .log_files
                .append(param.log_date_time, param.log_id, &line)
                .await
            {
                debug!("写入回调日志失败: log_id={}, error={}", param.log_id, e);
            }
        }
    }
}
