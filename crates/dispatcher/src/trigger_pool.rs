use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::{
    time::now_millis,
    traits::{TriggerRequest, TriggerSubmitter},
    SchedulerError, SchedulerResult,
};
use scheduler_infrastructure::MetricsCollector;

/// 单次调度超过该耗时记为一次慢调度
const SLOW_TRIGGER_THRESHOLD: Duration = Duration::from_millis(500);
/// 一分钟内慢调度超过该次数的任务改走慢速通道
const SLOW_TRIGGER_LIMIT: u32 = 10;

/// 真正执行一次调度的组件
#[async_trait]
pub trait TriggerExecutor: Send + Sync {
    async fn execute(&self, request: TriggerRequest) -> SchedulerResult<()>;
}

#[derive(Debug, Clone)]
pub struct TriggerPoolConfig {
    pub fast_max: usize,
    pub fast_queue: usize,
    pub slow_max: usize,
    pub slow_queue: usize,
}

impl Default for TriggerPoolConfig {
    fn default() -> Self {
        Self {
            fast_max: 200,
            fast_queue: 1000,
            slow_max: 100,
            slow_queue: 2000,
        }
    }
}

/// 按分钟统计的慢调度次数
#[derive(Debug, Default)]
struct SlowCounter {
    minute: i64,
    counts: HashMap<i64, u32>,
}

impl SlowCounter {
    fn roll(&mut self, minute: i64) {
        if self.minute != minute {
            self.minute = minute;
            self.counts.clear();
        }
    }

    fn is_slow(&mut self, job_id: i64, minute: i64) -> bool {
        self.roll(minute);
        self.counts.get(&job_id).copied().unwrap_or(0) > SLOW_TRIGGER_LIMIT
    }

    fn record(&mut self, job_id: i64, minute: i64) {
        self.roll(minute);
        *self.counts.entry(job_id).or_default() += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Fast,
    Slow,
}

impl Lane {
    fn label(self) -> &'static str {
        match self {
            Lane::Fast => "fast",
            Lane::Slow => "slow",
        }
    }
}

type LaneReceiver = mpsc::Receiver<TriggerRequest>;

/// 快慢两条调度通道，调度耗时持续偏高的任务会被隔离到慢通道
pub struct JobTriggerPool {
    config: TriggerPoolConfig,
    executor: Arc<dyn TriggerExecutor>,
    metrics: Arc<MetricsCollector>,
    slow_counter: Arc<Mutex<SlowCounter>>,
    fast_tx: mpsc::Sender<TriggerRequest>,
    slow_tx: mpsc::Sender<TriggerRequest>,
    receivers: Mutex<Option<(LaneReceiver, LaneReceiver)>>,
}

impl JobTriggerPool {
    pub fn new(
        config: TriggerPoolConfig,
        executor: Arc<dyn TriggerExecutor>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (fast_tx, fast_rx) = mpsc::channel(config.fast_queue.max(1));
        let (slow_tx, slow_rx) = mpsc::channel(config.slow_queue.max(1));
        Self {
            config,
            executor,
            metrics,
            slow_counter: Arc::new(Mutex::new(SlowCounter::default())),
            fast_tx,
            slow_tx,
            receivers: Mutex::new(Some((fast_rx, slow_rx))),
        }
    }

    /// 启动两条通道的消费循环，只能调用一次
    pub fn start(&self, cancellation_token: CancellationToken) -> SchedulerResult<Vec<JoinHandle<()>>> {
        let (fast_rx, slow_rx) = self
            .receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| SchedulerError::Internal("调度线程池已启动".to_string()))?;

        info!(
            "启动调度线程池: fast_max={}, slow_max={}",
            self.config.fast_max, self.config.slow_max
        );
        Ok(vec![
            self.spawn_lane(Lane::Fast, fast_rx, self.config.fast_max, cancellation_token.clone()),
            self.spawn_lane(Lane::Slow, slow_rx, self.config.slow_max, cancellation_token),
        ])
    }

    fn spawn_lane(
        &self,
        lane: Lane,
        mut rx: LaneReceiver,
        max_concurrency: usize,
        cancellation_token: CancellationToken,
    ) -> JoinHandle<()> {
        let executor = Arc::clone(&self.executor);
        let metrics = Arc::clone(&self.metrics);
        let slow_counter = Arc::clone(&self.slow_counter);
        let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));

        tokio::spawn(async move {
            let mut closing = false;
            loop {
                let permit = match Arc::clone(&permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                // 取消后关闭队列，已入队的请求仍会执行完
                let request = if closing {
                    rx.recv().await
                } else {
                    tokio::select! {
                        _ = cancellation_token.cancelled() => {
                            rx.close();
                            closing = true;
                            continue;
                        }
                        request = rx.recv() => request,
                    }
                };
                let Some(request) = request else {
                    break;
                };

                let executor = Arc::clone(&executor);
                let metrics = Arc::clone(&metrics);
                let slow_counter = Arc::clone(&slow_counter);
                tokio::spawn(async move {
                    let _permit = permit;
                    let job_id = request.job_id;
                    let started = Instant::now();
                    if let Err(e) = executor.execute(request).await {
                        error!("任务调度失败: job_id={}, error={}", job_id, e);
                    }
                    let elapsed = started.elapsed();
                    if elapsed > SLOW_TRIGGER_THRESHOLD {
                        metrics.record_slow_trigger();
                        slow_counter
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .record(job_id, current_minute());
                        debug!("慢调度: job_id={}, elapsed={:?}", job_id, elapsed);
                    }
                });
            }

            // 等待在途调度结束
            let _ = permits.acquire_many(max_concurrency.max(1) as u32).await;
            info!("调度通道 {} 已停止", lane.label());
        })
    }

    fn choose_lane(&self, job_id: i64) -> Lane {
        let mut counter = self.slow_counter.lock().unwrap_or_else(|e| e.into_inner());
        if counter.is_slow(job_id, current_minute()) {
            Lane::Slow
        } else {
            Lane::Fast
        }
    }
}

fn current_minute() -> i64 {
    now_millis() / 60_000
}

#[async_trait]
impl TriggerSubmitter for JobTriggerPool {
    async fn submit(&self, request: TriggerRequest) -> SchedulerResult<()> {
        let job_id = request.job_id;
        let lane = self.choose_lane(job_id);
        let sender = match lane {
            Lane::Fast => &self.fast_tx,
            Lane::Slow => &self.slow_tx,
        };
        match sender.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("调度队列已满，拒绝任务: job_id={}, lane={}", job_id, lane.label());
                self.metrics.record_pool_rejection(lane.label());
                Err(SchedulerError::PoolRejected { job_id })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SchedulerError::Internal("调度线程池已关闭".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::TriggerType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExecutor {
        executed: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl TriggerExecutor for CountingExecutor {
        async fn execute(&self, _request: TriggerRequest) -> SchedulerResult<()> {
            tokio::time::sleep(self.delay).await;
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_slow_counter_resets_each_minute() {
        let mut counter = SlowCounter::default();
        for _ in 0..=SLOW_TRIGGER_LIMIT {
            counter.record(7, 100);
        }
        assert!(counter.is_slow(7, 100));
        assert!(!counter.is_slow(8, 100));
        assert!(!counter.is_slow(7, 101));
    }

    #[tokio::test]
    async fn test_submitted_requests_are_executed() {
        let executor = Arc::new(CountingExecutor::default());
        let pool = JobTriggerPool::new(
            TriggerPoolConfig::default(),
            executor.clone(),
            Arc::new(MetricsCollector::new()),
        );
        let token = CancellationToken::new();
        let handles = pool.start(token.clone()).unwrap();

        for job_id in 0..10 {
            pool.submit(TriggerRequest::new(job_id, TriggerType::Cron))
                .await
                .unwrap();
        }
        let done = scheduler_testing_utils::wait_until(Duration::from_secs(2), || {
            executor.executed.load(Ordering::SeqCst) == 10
        })
        .await;
        assert!(done);

        token.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(pool.start(CancellationToken::new()).is_err());
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let executor = Arc::new(CountingExecutor::default());
        let config = TriggerPoolConfig {
            fast_max: 1,
            fast_queue: 1,
            slow_max: 1,
            slow_queue: 1,
        };
        // 不启动消费者，队列满后立即拒绝
        let pool = JobTriggerPool::new(config, executor, Arc::new(MetricsCollector::new()));
        pool.submit(TriggerRequest::new(1, TriggerType::Cron))
            .await
            .unwrap();
        let rejected = pool.submit(TriggerRequest::new(2, TriggerType::Cron)).await;
        assert!(matches!(rejected, Err(SchedulerError::PoolRejected { job_id: 2 })));
    }

    #[tokio::test]
    async fn test_slow_job_routes_to_slow_lane() {
        let executor = Arc::new(CountingExecutor::default());
        let config = TriggerPoolConfig {
            fast_max: 1,
            fast_queue: 1,
            slow_max: 1,
            slow_queue: 1,
        };
        let pool = JobTriggerPool::new(config, executor, Arc::new(MetricsCollector::new()));
        {
            let mut counter = pool.slow_counter.lock().unwrap();
            for _ in 0..=SLOW_TRIGGER_LIMIT {
                counter.record(5, current_minute());
            }
        }
        assert_eq!(pool.choose_lane(5), Lane::Slow);
        assert_eq!(pool.choose_lane(6), Lane::Fast);

        // 两条通道的队列互不影响
        pool.submit(TriggerRequest::new(5, TriggerType::Cron)).await.unwrap();
        pool.submit(TriggerRequest::new(6, TriggerType::Cron)).await.unwrap();
    }
}
