//! In-memory doubles for the RPC, alarm and trigger seams
//!
//! Every mock records the calls it receives and exposes switches to simulate
//! unreachable peers or failing deliveries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scheduler_core::{
    models::{
        HandleCallbackParam, IdleBeatParam, JobInfo, JobLog, KillParam, LogParam, LogResult,
        RegistryParam, RpcResponse, TriggerParam,
    },
    traits::{
        AdminBiz, AlarmSender, ExecutorBiz, ExecutorClientFactory, TriggerRequest,
        TriggerSubmitter,
    },
    SchedulerError, SchedulerResult,
};

/// Mock executor endpoint
#[derive(Debug)]
pub struct MockExecutorBiz {
    address: String,
    reachable: AtomicBool,
    idle: AtomicBool,
    run_response: Mutex<RpcResponse<String>>,
    run_calls: Mutex<Vec<TriggerParam>>,
    kill_calls: Mutex<Vec<i64>>,
    beat_count: AtomicUsize,
}

impl MockExecutorBiz {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            reachable: AtomicBool::new(true),
            idle: AtomicBool::new(true),
            run_response: Mutex::new(RpcResponse::success()),
            run_calls: Mutex::new(Vec::new()),
            kill_calls: Mutex::new(Vec::new()),
            beat_count: AtomicUsize::new(0),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    pub fn set_run_response(&self, response: RpcResponse<String>) {
        *self.run_response.lock().unwrap() = response;
    }

    pub fn run_calls(&self) -> Vec<TriggerParam> {
        self.run_calls.lock().unwrap().clone()
    }

    pub fn kill_calls(&self) -> Vec<i64> {
        self.kill_calls.lock().unwrap().clone()
    }

    pub fn beat_count(&self) -> usize {
        self.beat_count.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> SchedulerResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SchedulerError::Network(format!(
                "connection refused: {}",
                self.address
            )))
        }
    }
}

#[async_trait]
impl ExecutorBiz for MockExecutorBiz {
    async fn beat(&self) -> SchedulerResult<RpcResponse<String>> {
        self.beat_count.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(RpcResponse::success())
    }

    async fn idle_beat(&self, _param: IdleBeatParam) -> SchedulerResult<RpcResponse<String>> {
        self.check_reachable()?;
        if self.idle.load(Ordering::SeqCst) {
            Ok(RpcResponse::success())
        } else {
            Ok(RpcResponse::fail("job thread is running or has trigger queue."))
        }
    }

    async fn run(&self, param: TriggerParam) -> SchedulerResult<RpcResponse<String>> {
        self.check_reachable()?;
        self.run_calls.lock().unwrap().push(param);
        Ok(self.run_response.lock().unwrap().clone())
    }

    async fn kill(&self, param: KillParam) -> SchedulerResult<RpcResponse<String>> {
        self.check_reachable()?;
        self.kill_calls.lock().unwrap().push(param.job_id);
        Ok(RpcResponse::success())
    }

    async fn log(&self, param: LogParam) -> SchedulerResult<RpcResponse<LogResult>> {
        self.check_reachable()?;
        Ok(RpcResponse::success_with(LogResult {
            from_line_num: param.from_line_num,
            to_line_num: param.from_line_num,
            log_content: String::new(),
            is_end: true,
        }))
    }
}

/// Mock executor client factory, one MockExecutorBiz per address
#[derive(Debug, Default)]
pub struct MockExecutorClientFactory {
    executors: Mutex<HashMap<String, Arc<MockExecutorBiz>>>,
}

impl MockExecutorClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executor(&self, address: &str) -> Arc<MockExecutorBiz> {
        let mut executors = self.executors.lock().unwrap();
        Arc::clone(
            executors
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(MockExecutorBiz::new(address))),
        )
    }

    /// 所有地址收到的run请求
    pub fn all_run_calls(&self) -> Vec<(String, TriggerParam)> {
        let executors = self.executors.lock().unwrap();
        let mut calls: Vec<(String, TriggerParam)> = executors
            .iter()
            .flat_map(|(address, executor)| {
                executor
                    .run_calls()
                    .into_iter()
                    .map(move |param| (address.clone(), param))
            })
            .collect();
        calls.sort_by_key(|(_, param)| param.log_id);
        calls
    }
}

impl ExecutorClientFactory for MockExecutorClientFactory {
    fn executor_client(&self, address: &str) -> SchedulerResult<Arc<dyn ExecutorBiz>> {
        let executor: Arc<dyn ExecutorBiz> = self.executor(address);
        Ok(executor)
    }
}

/// Mock admin endpoint
#[derive(Debug)]
pub struct MockAdminBiz {
    reachable: AtomicBool,
    callbacks: Mutex<Vec<HandleCallbackParam>>,
    registrations: Mutex<Vec<RegistryParam>>,
    removals: Mutex<Vec<RegistryParam>>,
    callback_attempts: AtomicUsize,
}

impl MockAdminBiz {
    pub fn new() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            callbacks: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
            removals: Mutex::new(Vec::new()),
            callback_attempts: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        let admin = Self::new();
        admin.set_reachable(false);
        admin
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn callbacks(&self) -> Vec<HandleCallbackParam> {
        self.callbacks.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> Vec<RegistryParam> {
        self.registrations.lock().unwrap().clone()
    }

    pub fn removals(&self) -> Vec<RegistryParam> {
        self.removals.lock().unwrap().clone()
    }

    pub fn callback_attempts(&self) -> usize {
        self.callback_attempts.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> SchedulerResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SchedulerError::Network("admin unreachable".to_string()))
        }
    }
}

impl Default for MockAdminBiz {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdminBiz for MockAdminBiz {
    async fn callback(
        &self,
        params: Vec<HandleCallbackParam>,
    ) -> SchedulerResult<RpcResponse<String>> {
        self.callback_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        self.callbacks.lock().unwrap().extend(params);
        Ok(RpcResponse::success())
    }

    async fn registry(&self, param: RegistryParam) -> SchedulerResult<RpcResponse<String>> {
        self.check_reachable()?;
        self.registrations.lock().unwrap().push(param);
        Ok(RpcResponse::success())
    }

    async fn registry_remove(&self, param: RegistryParam) -> SchedulerResult<RpcResponse<String>> {
        self.check_reachable()?;
        self.removals.lock().unwrap().push(param);
        Ok(RpcResponse::success())
    }
}

/// Recorded alarm
#[derive(Debug, Clone, PartialEq)]
pub struct SentAlarm {
    pub job_id: i64,
    pub log_id: i64,
    pub recipients: Vec<String>,
    pub content: String,
}

/// Mock alarm sender
#[derive(Debug, Default)]
pub struct MockAlarmSender {
    fail: AtomicBool,
    sent: Mutex<Vec<SentAlarm>>,
}

impl MockAlarmSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sender = Self::default();
        sender.fail.store(true, Ordering::SeqCst);
        sender
    }

    pub fn sent(&self) -> Vec<SentAlarm> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlarmSender for MockAlarmSender {
    async fn send_alarm(
        &self,
        job: &JobInfo,
        log: &JobLog,
        recipients: &[String],
        content: &str,
    ) -> SchedulerResult<()> {
        self.sent.lock().unwrap().push(SentAlarm {
            job_id: job.id,
            log_id: log.id,
            recipients: recipients.to_vec(),
            content: content.to_string(),
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(SchedulerError::Network("smtp unavailable".to_string()));
        }
        Ok(())
    }
}

/// Mock trigger submitter that only records requests
#[derive(Debug, Default)]
pub struct MockTriggerSubmitter {
    reject: AtomicBool,
    requests: Mutex<Vec<TriggerRequest>>,
}

impl MockTriggerSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<TriggerRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TriggerSubmitter for MockTriggerSubmitter {
    async fn submit(&self, request: TriggerRequest) -> SchedulerResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SchedulerError::PoolRejected {
                job_id: request.job_id,
            });
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}
