//! 调度主循环与时间轮ticker
//!
//! 主循环在调度锁保护下预读未来10秒内需要触发的任务，推进下次触发时间并写回，
//! 提交成功后才把任务放入时间轮；ticker每秒取出到期槽位交给调度线程池。

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::{
    models::{JobInfo, TriggerType},
    time::now_millis,
    traits::{JobInfoRepository, ScheduleLock, ScheduleUpdate, TriggerRequest, TriggerSubmitter},
    SchedulerResult,
};
use scheduler_infrastructure::MetricsCollector;

use crate::cron_utils::CronScheduler;
use crate::time_wheel::{RingCursor, TimeWheel, WHEEL_SLOTS};

/// 预读窗口
pub const PRE_READ_MS: i64 = 10_000;
/// 停止时等待时间轮清空的上限
const RING_DRAIN_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleRoundStats {
    pub scanned: usize,
    pub pushed: usize,
    pub missed: usize,
    pub stopped: usize,
}

pub struct JobScheduleHelper {
    job_repo: Arc<dyn JobInfoRepository>,
    schedule_lock: Arc<dyn ScheduleLock>,
    wheel: Arc<TimeWheel>,
    submitter: Arc<dyn TriggerSubmitter>,
    metrics: Arc<MetricsCollector>,
    pre_read_count: usize,
    lock_timeout: Duration,
}

impl JobScheduleHelper {
    pub fn new(
        job_repo: Arc<dyn JobInfoRepository>,
        schedule_lock: Arc<dyn ScheduleLock>,
        submitter: Arc<dyn TriggerSubmitter>,
        metrics: Arc<MetricsCollector>,
        pre_read_count: usize,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            job_repo,
            schedule_lock,
            wheel: Arc::new(TimeWheel::new()),
            submitter,
            metrics,
            pre_read_count,
            lock_timeout,
        }
    }

    pub fn wheel(&self) -> Arc<TimeWheel> {
        Arc::clone(&self.wheel)
    }

    /// 执行一轮预读，任何错误都会放弃整轮的推进
    pub async fn schedule_once(&self, now_ms: i64) -> SchedulerResult<ScheduleRoundStats> {
        let started = Instant::now();
        let guard = self.schedule_lock.acquire(self.lock_timeout).await?;

        let jobs = self
            .job_repo
            .schedule_job_query(now_ms + PRE_READ_MS, self.pre_read_count)
            .await?;

        let mut stats = ScheduleRoundStats {
            scanned: jobs.len(),
            ..Default::default()
        };
        let mut updates = Vec::with_capacity(jobs.len());
        let mut ring_pushes = Vec::new();

        for job in &jobs {
            let plan = plan_job(job, now_ms);
            match plan.slot {
                Some(slot) => ring_pushes.push((slot, job.id)),
                None if plan.update.running => {
                    stats.missed += 1;
                    warn!(
                        job_id = job.id,
                        next = job.trigger_next_time,
                        "任务错过调度时间，跳过本次触发"
                    );
                }
                None => {
                    stats.stopped += 1;
                    warn!(job_id = job.id, cron = %job.cron, "任务CRON无效或无后续触发时间，已停止调度");
                }
            }
            updates.push(plan.update);
        }

        if !updates.is_empty() {
            self.job_repo.schedule_update_batch(&updates).await?;
        }
        drop(guard);

        stats.pushed = ring_pushes.len();
        for (slot, job_id) in ring_pushes {
            self.wheel.push(slot, job_id);
        }

        self.metrics.record_schedule_round(
            started.elapsed().as_secs_f64(),
            stats.pushed,
            stats.missed,
        );
        if stats.scanned > 0 {
            debug!(
                "调度轮次完成: scanned={}, pushed={}, missed={}, stopped={}",
                stats.scanned, stats.pushed, stats.missed, stats.stopped
            );
        }
        Ok(stats)
    }

    /// 调度主循环
    pub async fn run_schedule_loop(&self, cancellation_token: CancellationToken) {
        let initial_delay = 5_000 + (1_000 - now_millis().rem_euclid(1_000)) as u64;
        tokio::select! {
            _ = cancellation_token.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(initial_delay)) => {}
        }
        info!("调度主循环已启动");

        loop {
            if cancellation_token.is_cancelled() {
                break;
            }
            if let Err(e) = self.schedule_once(now_millis()).await {
                error!("调度轮次失败: {}", e);
            }

            let pause = rand::rng().random_range(500..1_000);
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(pause)) => {}
            }
        }
        info!("调度主循环已停止");
    }

    /// 时间轮ticker，停止时把剩余任务触发一次
    pub async fn run_ring_loop(&self, cancellation_token: CancellationToken) {
        let mut cursor = RingCursor::new();
        info!("时间轮已启动");

        loop {
            let wait = 1_000 - now_millis().rem_euclid(1_000);
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(wait as u64)) => {}
            }
            let now_second = current_second();
            let due = cursor.advance(&self.wheel, now_second);
            self.fire(due).await;
        }

        self.drain_ring().await;
        info!("时间轮已停止");
    }

    async fn drain_ring(&self) {
        let deadline = Instant::now() + RING_DRAIN_TIMEOUT;
        let mut cursor = RingCursor::new();
        while !self.wheel.is_empty() && Instant::now() < deadline {
            let due = cursor.advance(&self.wheel, current_second());
            self.fire(due).await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let remaining = self.wheel.drain_all();
        if !remaining.is_empty() {
            info!("停止前触发时间轮剩余任务: {}", remaining.len());
            self.fire(remaining).await;
        }
    }

    async fn fire(&self, job_ids: Vec<i64>) {
        for job_id in job_ids {
            let request = TriggerRequest::new(job_id, TriggerType::Cron);
            if let Err(e) = self.submitter.submit(request).await {
                error!("提交调度失败: job_id={}, error={}", job_id, e);
            }
        }
    }
}

fn current_second() -> u32 {
    TimeWheel::slot_of(now_millis()) % WHEEL_SLOTS
}

struct JobPlan {
    update: ScheduleUpdate,
    slot: Option<u32>,
}

/// 计算单个任务本轮的推进结果
fn plan_job(job: &JobInfo, now_ms: i64) -> JobPlan {
    let stop = || JobPlan {
        update: ScheduleUpdate {
            job_id: job.id,
            running: false,
            trigger_last_time: job.trigger_last_time,
            trigger_next_time: 0,
        },
        slot: None,
    };

    let Ok(cron) = CronScheduler::new(&job.cron) else {
        return stop();
    };

    let next = job.trigger_next_time;
    let (slot, base) = if next < now_ms - PRE_READ_MS {
        (None, now_ms)
    } else if next < now_ms {
        (Some(TimeWheel::slot_of(now_ms)), now_ms)
    } else {
        (Some(TimeWheel::slot_of(next)), next)
    };

    match cron.next_after_millis(base) {
        Some(new_next) => JobPlan {
            update: ScheduleUpdate {
                job_id: job.id,
                running: true,
                trigger_last_time: next,
                trigger_next_time: new_next,
            },
            slot,
        },
        None => stop(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::traits::JobInfoRepository;
    use scheduler_infrastructure::InMemoryJobStore;
    use scheduler_testing_utils::{JobInfoBuilder, MockTriggerSubmitter};

    // 2024-01-01 00:00:00 UTC 对齐到5秒
    const NOW: i64 = 1_704_067_200_000;

    fn helper(store: Arc<InMemoryJobStore>) -> (JobScheduleHelper, Arc<MockTriggerSubmitter>) {
        let submitter = Arc::new(MockTriggerSubmitter::new());
        let helper = JobScheduleHelper::new(
            store.clone(),
            store,
            submitter.clone(),
            Arc::new(MetricsCollector::new()),
            6000,
            Duration::from_millis(500),
        );
        (helper, submitter)
    }

    async fn save(store: &InMemoryJobStore, job: JobInfo) {
        JobInfoRepository::save(store, job).await.unwrap();
    }

    async fn job(store: &InMemoryJobStore, id: i64) -> JobInfo {
        JobInfoRepository::find_by_id(store, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_missed_job_is_not_enqueued() {
        let store = Arc::new(InMemoryJobStore::new());
        save(
            &store,
            JobInfoBuilder::new()
                .with_id(1)
                .with_next_trigger_time(NOW - 60_000)
                .build(),
        )
        .await;
        let (helper, _) = helper(store.clone());

        let stats = helper.schedule_once(NOW).await.unwrap();
        assert_eq!(stats.missed, 1);
        assert_eq!(stats.pushed, 0);
        assert!(helper.wheel().is_empty());

        let job = job(&store, 1).await;
        assert_eq!(job.trigger_last_time, NOW - 60_000);
        assert!(job.trigger_next_time > NOW);
        assert_eq!(job.trigger_next_time, NOW + 5_000);
    }

    #[tokio::test]
    async fn test_recently_expired_job_goes_to_current_slot() {
        let store = Arc::new(InMemoryJobStore::new());
        save(
            &store,
            JobInfoBuilder::new()
                .with_id(1)
                .with_next_trigger_time(NOW - 3_000)
                .build(),
        )
        .await;
        let (helper, _) = helper(store.clone());

        let stats = helper.schedule_once(NOW).await.unwrap();
        assert_eq!(stats.pushed, 1);
        let slot = TimeWheel::slot_of(NOW);
        assert_eq!(helper.wheel().take_due((slot + 59) % 60, slot), vec![1]);
        assert!(job(&store, 1).await.trigger_next_time > NOW);
    }

    #[tokio::test]
    async fn test_expired_job_scheduled_after_tick_fires_next_second() {
        let store = Arc::new(InMemoryJobStore::new());
        let now = NOW + 400;
        save(
            &store,
            JobInfoBuilder::new()
                .with_id(1)
                .with_next_trigger_time(now - 3_400)
                .build(),
        )
        .await;
        let (helper, _) = helper(store.clone());
        let wheel = helper.wheel();

        // ticker在整秒处已经走过当前槽位
        let second = TimeWheel::slot_of(now);
        let mut cursor = RingCursor::new();
        assert!(cursor.advance(&wheel, second).is_empty());

        let stats = helper.schedule_once(now).await.unwrap();
        assert_eq!(stats.pushed, 1);
        assert_eq!(cursor.advance(&wheel, (second + 1) % 60), vec![1]);
        assert!(wheel.is_empty());
    }

    #[tokio::test]
    async fn test_window_jobs_land_in_exactly_one_slot() {
        let store = Arc::new(InMemoryJobStore::new());
        for (id, offset) in [(1, 0), (2, 2_000), (3, 7_000)] {
            save(
                &store,
                JobInfoBuilder::new()
                    .with_id(id)
                    .with_cron("* * * * * *")
                    .with_next_trigger_time(NOW + offset)
                    .build(),
            )
            .await;
        }
        let (helper, _) = helper(store.clone());

        let stats = helper.schedule_once(NOW).await.unwrap();
        assert_eq!(stats.pushed, 3);
        let wheel = helper.wheel();
        assert_eq!(wheel.len(), 3);

        let mut all = Vec::new();
        let start = TimeWheel::slot_of(NOW);
        let mut cursor = RingCursor::new();
        for step in 0..60 {
            all.extend(cursor.advance(&wheel, (start + step) % 60));
        }
        all.sort();
        assert_eq!(all, vec![1, 2, 3]);
        assert!(wheel.is_empty());

        let job = job(&store, 2).await;
        assert_eq!(job.trigger_last_time, NOW + 2_000);
        assert_eq!(job.trigger_next_time, NOW + 3_000);
    }

    #[tokio::test]
    async fn test_invalid_cron_stops_job() {
        let store = Arc::new(InMemoryJobStore::new());
        save(
            &store,
            JobInfoBuilder::new()
                .with_id(1)
                .with_cron("bogus")
                .with_next_trigger_time(NOW)
                .build(),
        )
        .await;
        let (helper, _) = helper(store.clone());

        let stats = helper.schedule_once(NOW).await.unwrap();
        assert_eq!(stats.stopped, 1);
        let job = job(&store, 1).await;
        assert!(!job.running);
        assert_eq!(job.trigger_next_time, 0);

        // 已停止的任务不再被扫描
        let stats = helper.schedule_once(NOW).await.unwrap();
        assert_eq!(stats.scanned, 0);
    }

    #[tokio::test]
    async fn test_lock_timeout_aborts_round() {
        let store = Arc::new(InMemoryJobStore::new());
        save(
            &store,
            JobInfoBuilder::new()
                .with_id(1)
                .with_next_trigger_time(NOW)
                .build(),
        )
        .await;
        let (helper, _) = helper(store.clone());

        let _held = ScheduleLock::acquire(store.as_ref(), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(helper.schedule_once(NOW).await.is_err());
        assert!(helper.wheel().is_empty());
        assert_eq!(job(&store, 1).await.trigger_next_time, NOW);
    }

    #[tokio::test]
    async fn test_drain_ring_fires_remaining_jobs() {
        let store = Arc::new(InMemoryJobStore::new());
        let (helper, submitter) = helper(store);
        helper.wheel().push(TimeWheel::slot_of(now_millis()), 9);

        let token = CancellationToken::new();
        token.cancel();
        helper.run_ring_loop(token).await;

        let requests = submitter.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].job_id, 9);
        assert_eq!(requests[0].trigger_type, TriggerType::Cron);
        assert_eq!(requests[0].fail_retry_count, -1);
    }
}
