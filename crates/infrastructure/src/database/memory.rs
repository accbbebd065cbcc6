use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::{
    models::{AddressType, AlarmStatus, JobGroup, JobInfo, JobLog, RegistryEntry, RegistryGroup},
    traits::{
        JobGroupRepository, JobInfoRepository, JobLogRepository, JobRegistryRepository,
        ScheduleLock, ScheduleLockGuard, ScheduleUpdate,
    },
    SchedulerError, SchedulerResult,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<i64, JobInfo>,
    groups: HashMap<i64, JobGroup>,
    logs: BTreeMap<i64, JobLog>,
    registry: Vec<RegistryEntry>,
    next_job_id: i64,
    next_group_id: i64,
    next_log_id: i64,
    next_registry_id: i64,
}

/// 内存存储实现
///
/// 一个实例同时实现任务、分组、日志、注册表仓储以及调度锁，适用于单进程部署和测试。
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStore {
    state: Arc<RwLock<StoreState>>,
    schedule_lock: Arc<Mutex<()>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有日志，按id升序
    pub async fn all_logs(&self) -> Vec<JobLog> {
        self.state.read().await.logs.values().cloned().collect()
    }

    pub async fn all_registry(&self) -> Vec<RegistryEntry> {
        self.state.read().await.registry.clone()
    }

    /// 直接写入注册记录，用于恢复或测试中构造过期数据
    pub async fn insert_registry(&self, mut entry: RegistryEntry) -> RegistryEntry {
        let mut state = self.state.write().await;
        state.next_registry_id += 1;
        entry.id = state.next_registry_id;
        state.registry.push(entry.clone());
        entry
    }
}

#[async_trait]
impl JobInfoRepository for InMemoryJobStore {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobInfo>> {
        Ok(self.state.read().await.jobs.get(&id).cloned())
    }

    async fn schedule_job_query(
        &self,
        max_next_time: i64,
        limit: usize,
    ) -> SchedulerResult<Vec<JobInfo>> {
        let state = self.state.read().await;
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .values()
            .filter(|job| job.running && job.trigger_next_time <= max_next_time)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| (job.trigger_next_time, job.id));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn schedule_update_batch(&self, updates: &[ScheduleUpdate]) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        if let Some(missing) = updates.iter().find(|u| !state.jobs.contains_key(&u.job_id)) {
            return Err(SchedulerError::JobNotFound {
                id: missing.job_id,
            });
        }
        for update in updates {
            if let Some(job) = state.jobs.get_mut(&update.job_id) {
                job.running = update.running;
                job.trigger_last_time = update.trigger_last_time;
                job.trigger_next_time = update.trigger_next_time;
            }
        }
        debug!("批量更新调度时间: {} 条", updates.len());
        Ok(())
    }

    async fn save(&self, mut job: JobInfo) -> SchedulerResult<JobInfo> {
        let mut state = self.state.write().await;
        if job.id <= 0 {
            state.next_job_id += 1;
            job.id = state.next_job_id;
        } else if job.id > state.next_job_id {
            state.next_job_id = job.id;
        }
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }
}

#[async_trait]
impl JobGroupRepository for InMemoryJobStore {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobGroup>> {
        Ok(self.state.read().await.groups.get(&id).cloned())
    }

    async fn find_by_address_type(
        &self,
        address_type: AddressType,
    ) -> SchedulerResult<Vec<JobGroup>> {
        let state = self.state.read().await;
        let mut groups: Vec<JobGroup> = state
            .groups
            .values()
            .filter(|g| g.address_type == address_type)
            .cloned()
            .collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    async fn update_addresses(&self, id: i64, addresses: Vec<String>) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let group = state
            .groups
            .get_mut(&id)
            .ok_or(SchedulerError::JobGroupNotFound { id })?;
        group.addresses = addresses;
        Ok(())
    }

    async fn save(&self, mut group: JobGroup) -> SchedulerResult<JobGroup> {
        let mut state = self.state.write().await;
        if group.id <= 0 {
            state.next_group_id += 1;
            group.id = state.next_group_id;
        } else if group.id > state.next_group_id {
            state.next_group_id = group.id;
        }
        state.groups.insert(group.id, group.clone());
        Ok(group)
    }
}

#[async_trait]
impl JobLogRepository for InMemoryJobStore {
    async fn create(&self, mut log: JobLog) -> SchedulerResult<JobLog> {
        let mut state = self.state.write().await;
        state.next_log_id += 1;
        log.id = state.next_log_id;
        state.logs.insert(log.id, log.clone());
        Ok(log)
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<JobLog>> {
        Ok(self.state.read().await.logs.get(&id).cloned())
    }

    async fn update_trigger_info(&self, log: &JobLog) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .logs
            .get_mut(&log.id)
            .ok_or(SchedulerError::JobLogNotFound { id: log.id })?;
        stored.trigger_time = log.trigger_time;
        stored.executor_address = log.executor_address.clone();
        stored.executor_handler = log.executor_handler.clone();
        stored.executor_param = log.executor_param.clone();
        stored.executor_sharding_param = log.executor_sharding_param.clone();
        stored.executor_fail_retry_count = log.executor_fail_retry_count;
        stored.trigger_code = log.trigger_code;
        stored.trigger_msg = log.trigger_msg.clone();
        Ok(())
    }

    async fn update_handle_info(&self, log: &JobLog) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .logs
            .get_mut(&log.id)
            .ok_or(SchedulerError::JobLogNotFound { id: log.id })?;
        stored.handle_time = log.handle_time;
        stored.handle_code = log.handle_code;
        stored.handle_msg = log.handle_msg.clone();
        Ok(())
    }

    async fn find_fail_job_log_ids(&self, limit: usize) -> SchedulerResult<Vec<i64>> {
        let state = self.state.read().await;
        Ok(state
            .logs
            .values()
            .filter(|log| log.alarm_status == AlarmStatus::Default && log.is_failed())
            .map(|log| log.id)
            .take(limit)
            .collect())
    }

    async fn update_alarm_status(
        &self,
        id: i64,
        expected: AlarmStatus,
        new_status: AlarmStatus,
    ) -> SchedulerResult<bool> {
        let mut state = self.state.write().await;
        match state.logs.get_mut(&id) {
            Some(log) if log.alarm_status == expected => {
                log.alarm_status = new_status;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                warn!("更新告警状态时日志不存在: log_id={}", id);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl JobRegistryRepository for InMemoryJobStore {
    async fn registry_upsert(
        &self,
        group: RegistryGroup,
        key: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        if let Some(entry) = state.registry.iter_mut().find(|e| {
            e.registry_group == group && e.registry_key == key && e.registry_value == value
        }) {
            entry.update_time = now;
            return Ok(());
        }
        state.next_registry_id += 1;
        let id = state.next_registry_id;
        state.registry.push(RegistryEntry {
            id,
            registry_group: group,
            registry_key: key.to_string(),
            registry_value: value.to_string(),
            update_time: now,
        });
        Ok(())
    }

    async fn registry_delete(
        &self,
        group: RegistryGroup,
        key: &str,
        value: &str,
    ) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        state.registry.retain(|e| {
            !(e.registry_group == group && e.registry_key == key && e.registry_value == value)
        });
        Ok(())
    }

    async fn remove_dead(
        &self,
        dead_timeout_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<usize> {
        let mut state = self.state.write().await;
        let before = state.registry.len();
        state
            .registry
            .retain(|e| e.is_alive(now, dead_timeout_seconds));
        Ok(before - state.registry.len())
    }

    async fn find_alive(
        &self,
        dead_timeout_seconds: i64,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<RegistryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .registry
            .iter()
            .filter(|e| e.is_alive(now, dead_timeout_seconds))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ScheduleLock for InMemoryJobStore {
    async fn acquire(&self, timeout: Duration) -> SchedulerResult<ScheduleLockGuard> {
        let lock = Arc::clone(&self.schedule_lock);
        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(ScheduleLockGuard::new(guard)),
            Err(_) => Err(SchedulerError::LockTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::{BlockStrategy, GlueType, RouteStrategy, TriggerType};

    fn job(id: i64, next: i64, running: bool) -> JobInfo {
        JobInfo {
            id,
            group_id: 1,
            description: format!("job-{id}"),
            cron: "* * * * * *".to_string(),
            route_strategy: RouteStrategy::First,
            handler: "demo".to_string(),
            executor_params: String::new(),
            block_strategy: BlockStrategy::SerialExecution,
            timeout_seconds: 0,
            fail_retry_count: 0,
            glue_type: GlueType::Bean,
            glue_source: String::new(),
            glue_updated_at: 0,
            alarm_email: String::new(),
            child_job_ids: vec![],
            running,
            trigger_last_time: 0,
            trigger_next_time: next,
        }
    }

    #[tokio::test]
    async fn test_schedule_job_query_filters_and_orders() {
        let store = InMemoryJobStore::new();
        JobInfoRepository::save(&store, job(1, 3_000, true)).await.unwrap();
        JobInfoRepository::save(&store, job(2, 1_000, true)).await.unwrap();
        JobInfoRepository::save(&store, job(3, 2_000, false)).await.unwrap();
        JobInfoRepository::save(&store, job(4, 9_000, true)).await.unwrap();

        let jobs = store.schedule_job_query(5_000, 10).await.unwrap();
        let ids: Vec<i64> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![2, 1]);

        let limited = store.schedule_job_query(5_000, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_update_batch_is_atomic() {
        let store = InMemoryJobStore::new();
        JobInfoRepository::save(&store, job(1, 1_000, true)).await.unwrap();

        let updates = vec![
            ScheduleUpdate {
                job_id: 1,
                running: true,
                trigger_last_time: 1_000,
                trigger_next_time: 2_000,
            },
            ScheduleUpdate {
                job_id: 99,
                running: true,
                trigger_last_time: 0,
                trigger_next_time: 0,
            },
        ];
        assert!(store.schedule_update_batch(&updates).await.is_err());
        let stored = JobInfoRepository::find_by_id(&store, 1).await.unwrap().unwrap();
        assert_eq!(stored.trigger_next_time, 1_000);
    }

    #[tokio::test]
    async fn test_alarm_status_cas() {
        let store = InMemoryJobStore::new();
        let mut log = JobLog::new(1, 1, TriggerType::Cron);
        log.trigger_code = 500;
        let log = store.create(log).await.unwrap();

        assert_eq!(store.find_fail_job_log_ids(10).await.unwrap(), vec![log.id]);
        assert!(store
            .update_alarm_status(log.id, AlarmStatus::Default, AlarmStatus::Locked)
            .await
            .unwrap());
        // 第二次抢锁失败
        assert!(!store
            .update_alarm_status(log.id, AlarmStatus::Default, AlarmStatus::Locked)
            .await
            .unwrap());
        assert!(store.find_fail_job_log_ids(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_registry_upsert_and_dead_sweep() {
        let store = InMemoryJobStore::new();
        let now = Utc::now();
        store
            .registry_upsert(RegistryGroup::Executor, "app", "http://a", now)
            .await
            .unwrap();
        store
            .registry_upsert(RegistryGroup::Executor, "app", "http://a", now)
            .await
            .unwrap();
        store
            .registry_upsert(
                RegistryGroup::Executor,
                "app",
                "http://b",
                now - chrono::Duration::seconds(120),
            )
            .await
            .unwrap();
        assert_eq!(store.all_registry().await.len(), 2);

        let alive = store.find_alive(90, now).await.unwrap();
        assert_eq!(alive.len(), 1);
        assert_eq!(store.remove_dead(90, now).await.unwrap(), 1);
        assert_eq!(store.all_registry().await.len(), 1);
    }

    #[tokio::test]
    async fn test_schedule_lock_timeout() {
        let store = InMemoryJobStore::new();
        let guard = store.acquire(Duration::from_millis(50)).await.unwrap();
        let second = store.acquire(Duration::from_millis(50)).await;
        assert!(matches!(second, Err(SchedulerError::LockTimeout)));
        drop(guard);
        assert!(store.acquire(Duration::from_millis(50)).await.is_ok());
    }
}
