//! 任务线程
//!
//! 每个任务id同一时刻最多一个消费者，调度请求按到达顺序串行执行。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scheduler_core::models::{HandleCallbackParam, RpcResponse, TriggerParam, FAIL_CODE, TIMEOUT_CODE};

use crate::callback::CallbackPipeline;
use crate::handler::{HandleResult, HandlerKey, JobContext, JobHandler};
use crate::job_log::JobLogFiles;

const POLL_TIMEOUT: Duration = Duration::from_secs(3);
/// 连续空轮询超过该次数后线程自行退出
const MAX_IDLE_POLLS: u32 = 30;
const IDLE_STOP_REASON: &str = "executor idle times over limit.";

/// 任务线程共享的依赖
#[derive(Clone)]
pub struct JobThreadDeps {
    pub callbacks: Arc<CallbackPipeline>,
    pub log_files: Arc<JobLogFiles>,
}

pub struct JobThread {
    job_id: i64,
    instance_id: Uuid,
    handler_key: HandlerKey,
    tx: mpsc::UnboundedSender<TriggerParam>,
    queue_len: Arc<AtomicUsize>,
    log_ids: Arc<Mutex<HashSet<i64>>>,
    running: Arc<AtomicBool>,
    stop_token: CancellationToken,
    stop_reason: Arc<Mutex<Option<String>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobThread {
    fn spawn(
        job_id: i64,
        handler: Arc<dyn JobHandler>,
        handler_key: HandlerKey,
        deps: JobThreadDeps,
        threads: Arc<DashMap<i64, Arc<JobThread>>>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = Arc::new(Self {
            job_id,
            instance_id: Uuid::new_v4(),
            handler_key,
            tx,
            queue_len: Arc::new(AtomicUsize::new(0)),
            log_ids: Arc::new(Mutex::new(HashSet::new())),
            running: Arc::new(AtomicBool::new(false)),
            stop_token: CancellationToken::new(),
            stop_reason: Arc::new(Mutex::new(None)),
            handle: Mutex::new(None),
        });

        let worker = JobWorker {
            job_id,
            instance_id: thread.instance_id,
            handler,
            rx,
            queue_len: Arc::clone(&thread.queue_len),
            log_ids: Arc::clone(&thread.log_ids),
            running: Arc::clone(&thread.running),
            stop_token: thread.stop_token.clone(),
            stop_reason: Arc::clone(&thread.stop_reason),
            deps,
            threads,
        };
        let handle = tokio::spawn(worker.run());
        *thread.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        thread
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn handler_key(&self) -> &HandlerKey {
        &self.handler_key
    }

    /// 放入调度请求，同一log id只接受一次
    pub fn push(&self, param: TriggerParam) -> RpcResponse<String> {
        let log_id = param.log_id;
        {
            let mut log_ids = self.log_ids.lock().unwrap_or_else(|e| e.into_inner());
            if !log_ids.insert(log_id) {
                info!("重复的调度请求: job_id={}, log_id={}", self.job_id, log_id);
                return RpcResponse::fail(format!("repeate trigger job, logId:{log_id}"));
            }
        }

        self.queue_len.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(param).is_err() {
            self.queue_len.fetch_sub(1, Ordering::SeqCst);
            self.log_ids
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&log_id);
            return RpcResponse::fail("job thread is stopped.");
        }
        RpcResponse::success()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::SeqCst)
    }

    pub fn is_running_or_has_queue(&self) -> bool {
        self.running.load(Ordering::SeqCst) || self.queue_len() > 0
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_token.is_cancelled()
    }

    /// 通知线程停止，正在执行的任务会被终止
    pub fn stop(&self, reason: &str) {
        {
            let mut stop_reason = self.stop_reason.lock().unwrap_or_else(|e| e.into_inner());
            if stop_reason.is_none() {
                *stop_reason = Some(reason.to_string());
            }
        }
        self.stop_token.cancel();
    }

    /// 等待线程退出
    pub async fn join(&self) {
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("任务线程异常退出: job_id={}, error={}", self.job_id, e);
            }
        }
    }
}

struct JobWorker {
    job_id: i64,
    instance_id: Uuid,
    handler: Arc<dyn JobHandler>,
    rx: mpsc::UnboundedReceiver<TriggerParam>,
    queue_len: Arc<AtomicUsize>,
    log_ids: Arc<Mutex<HashSet<i64>>>,
    running: Arc<AtomicBool>,
    stop_token: CancellationToken,
    stop_reason: Arc<Mutex<Option<String>>>,
    deps: JobThreadDeps,
    threads: Arc<DashMap<i64, Arc<JobThread>>>,
}

impl JobWorker {
    async fn run(mut self) {
        if let Err(e) = self.handler.init().await {
            error!("任务处理器初始化失败: job_id={}, error={}", self.job_id, e);
        }

        let mut idle_polls = 0;
        loop {
            let polled = tokio::select! {
                biased;
                _ = self.stop_token.cancelled() => break,
                polled = tokio::time::timeout(POLL_TIMEOUT, self.rx.recv()) => polled,
            };
            match polled {
                Ok(Some(param)) => {
                    idle_polls = 0;
                    self.queue_len.fetch_sub(1, Ordering::SeqCst);
                    self.log_ids
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&param.log_id);
                    self.running.store(true, Ordering::SeqCst);
                    let result = self.execute(&param).await;
                    self.running.store(false, Ordering::SeqCst);
                    self.push_callback(&param, result);
                }
                Ok(None) => break,
                Err(_) => {
                    idle_polls += 1;
                    if idle_polls > MAX_IDLE_POLLS && self.queue_len.load(Ordering::SeqCst) == 0 {
                        let removed = self
                            .threads
                            .remove_if(&self.job_id, |_, t| t.instance_id == self.instance_id);
                        if removed.is_some() {
                            info!("任务线程空闲超时退出: job_id={}", self.job_id);
                            self.set_stop_reason(IDLE_STOP_REASON);
                            self.stop_token.cancel();
                            break;
                        }
                    }
                }
            }
        }

        self.drain_queue();
        if let Err(e) = self.handler.destroy().await {
            warn!("任务处理器销毁失败: job_id={}, error={}", self.job_id, e);
        }
        debug!("任务线程已退出: job_id={}", self.job_id);
    }

    async fn execute(&self, param: &TriggerParam) -> HandleResult {
        let context = JobContext::new(
            param.job_id,
            param.log_id,
            param.log_date_time,
            param.executor_params.clone(),
            param.broadcast_index,
            param.broadcast_total,
            Arc::clone(&self.deps.log_files),
        );
        context
            .log(format!(
                "----------- job execute start -----------<br>----------- Param:{}",
                param.executor_params
            ))
            .await;

        let handler = Arc::clone(&self.handler);
        let task_context = context.clone();
        let mut task = tokio::spawn(async move { handler.execute(&task_context).await });
        let timeout = Duration::from_secs(u64::try_from(param.executor_timeout).unwrap_or(0));

        let result = tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => HandleResult::fail(e.to_string()),
                Err(e) => HandleResult::fail(format!("job handler panicked: {e}")),
            },
            _ = tokio::time::sleep(timeout), if param.executor_timeout > 0 => {
                context.cancellation_token.cancel();
                task.abort();
                context.log("----------- job execute timeout").await;
                HandleResult::with_code(TIMEOUT_CODE, "job execute timeout ")
            },
            _ = self.stop_token.cancelled() => {
                context.cancellation_token.cancel();
                task.abort();
                HandleResult::fail(format!("{} [job running, killed]", self.current_stop_reason()))
            },
        };

        context
            .log(format!(
                "----------- job execute end(finish) -----------<br>----------- Result: handleCode={}, handleMsg = {}",
                result.code,
                result.msg.as_deref().unwrap_or("")
            ))
            .await;
        result
    }

    fn push_callback(&self, param: &TriggerParam, result: HandleResult) {
        self.deps.callbacks.push(HandleCallbackParam::new(
            param.log_id,
            param.log_date_time,
            result.code,
            result.msg,
        ));
    }

    /// 退出时队列中尚未执行的请求全部以失败回调
    fn drain_queue(&mut self) {
        self.rx.close();
        let reason = self.current_stop_reason();
        while let Ok(param) = self.rx.try_recv() {
            self.queue_len.fetch_sub(1, Ordering::SeqCst);
            self.log_ids
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&param.log_id);
            self.push_callback(
                &param,
                HandleResult::with_code(
                    FAIL_CODE,
                    format!("{reason} [job not executed, in the job queue, killed.]"),
                ),
            );
        }
    }

    fn set_stop_reason(&self, reason: &str) {
        let mut stop_reason = self.stop_reason.lock().unwrap_or_else(|e| e.into_inner());
        if stop_reason.is_none() {
            *stop_reason = Some(reason.to_string());
        }
    }

    fn current_stop_reason(&self) -> String {
        self.stop_reason
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_default()
    }
}

/// job id -> 任务线程
pub struct JobThreadRepository {
    threads: Arc<DashMap<i64, Arc<JobThread>>>,
    deps: JobThreadDeps,
}

impl JobThreadRepository {
    pub fn new(deps: JobThreadDeps) -> Self {
        Self {
            threads: Arc::new(DashMap::new()),
            deps,
        }
    }

    pub fn get(&self, job_id: i64) -> Option<Arc<JobThread>> {
        self.threads.get(&job_id).map(|t| Arc::clone(t.value()))
    }

    /// 创建并登记新线程，旧线程按给定原因停止
    pub fn register(
        &self,
        job_id: i64,
        handler: Arc<dyn JobHandler>,
        handler_key: HandlerKey,
        replace_reason: Option<&str>,
    ) -> Arc<JobThread> {
        let thread = JobThread::spawn(
            job_id,
            handler,
            handler_key,
            self.deps.clone(),
            Arc::clone(&self.threads),
        );
        info!("创建任务线程: job_id={}", job_id);
        if let Some(old) = self.threads.insert(job_id, Arc::clone(&thread)) {
            old.stop(replace_reason.unwrap_or("job thread replaced."));
        }
        thread
    }

    /// 移除并停止线程，返回被移除的线程
    pub fn remove(&self, job_id: i64, reason: &str) -> Option<Arc<JobThread>> {
        let (_, thread) = self.threads.remove(&job_id)?;
        thread.stop(reason);
        Some(thread)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// 停止全部线程并等待退出
    pub async fn stop_all(&self, reason: &str) {
        let job_ids: Vec<i64> = self.threads.iter().map(|e| *e.key()).collect();
        let mut stopped = Vec::new();
        for job_id in job_ids {
            if let Some(thread) = self.remove(job_id, reason) {
                stopped.push(thread);
            }
        }
        for thread in stopped {
            thread.join().await;
        }
    }
}
