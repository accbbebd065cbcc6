use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use scheduler_core::{
    models::{AddressType, RegistryGroup},
    traits::{JobGroupRepository, JobRegistryRepository},
    SchedulerResult,
};
use scheduler_infrastructure::MetricsCollector;

/// 清理过期注册记录，并把存活地址同步到自动注册的执行器分组
pub struct JobRegistryMonitor {
    registry_repo: Arc<dyn JobRegistryRepository>,
    group_repo: Arc<dyn JobGroupRepository>,
    metrics: Arc<MetricsCollector>,
    beat_interval: Duration,
    dead_timeout_seconds: i64,
}

impl JobRegistryMonitor {
    pub fn new(
        registry_repo: Arc<dyn JobRegistryRepository>,
        group_repo: Arc<dyn JobGroupRepository>,
        metrics: Arc<MetricsCollector>,
        beat_interval: Duration,
        dead_timeout_seconds: i64,
    ) -> Self {
        Self {
            registry_repo,
            group_repo,
            metrics,
            beat_interval,
            dead_timeout_seconds,
        }
    }

    /// 返回地址列表发生变化的分组数
    pub async fn refresh_once(&self, now: DateTime<Utc>) -> SchedulerResult<usize> {
        let removed = self
            .registry_repo
            .remove_dead(self.dead_timeout_seconds, now)
            .await?;
        if removed > 0 {
            info!("清理过期注册记录: {}", removed);
        }

        let mut alive: HashMap<String, BTreeSet<String>> = HashMap::new();
        for entry in self
            .registry_repo
            .find_alive(self.dead_timeout_seconds, now)
            .await?
        {
            if entry.registry_group == RegistryGroup::Executor {
                alive
                    .entry(entry.registry_key)
                    .or_default()
                    .insert(entry.registry_value);
            }
        }

        let mut total_addresses = 0;
        let mut changed = 0;
        for group in self
            .group_repo
            .find_by_address_type(AddressType::Auto)
            .await?
        {
            let addresses: Vec<String> = alive
                .get(&group.app_name)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            total_addresses += addresses.len();
            if addresses != group.addresses {
                debug!(
                    "执行器分组地址变更: app_name={}, addresses={:?}",
                    group.app_name, addresses
                );
                self.group_repo.update_addresses(group.id, addresses).await?;
                changed += 1;
            }
        }
        self.metrics.set_registry_addresses(total_addresses);
        Ok(changed)
    }

    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!("注册表监控已启动");
        loop {
            if let Err(e) = self.refresh_once(Utc::now()).await {
                error!("刷新执行器注册表失败: {}", e);
            }
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(self.beat_interval) => {}
            }
        }
        info!("注册表监控已停止");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use scheduler_core::models::RegistryEntry;
    use scheduler_infrastructure::InMemoryJobStore;
    use scheduler_testing_utils::JobGroupBuilder;

    async fn setup() -> (Arc<InMemoryJobStore>, JobRegistryMonitor) {
        let store = Arc::new(InMemoryJobStore::new());
        JobGroupRepository::save(
            store.as_ref(),
            JobGroupBuilder::new()
                .with_id(1)
                .with_app_name("app-a")
                .with_addresses(&["http://stale/"])
                .build(),
        )
        .await
        .unwrap();
        JobGroupRepository::save(
            store.as_ref(),
            JobGroupBuilder::new()
                .with_id(2)
                .with_app_name("app-manual")
                .with_address_type(AddressType::Manual)
                .with_addresses(&["http://fixed/"])
                .build(),
        )
        .await
        .unwrap();
        let monitor = JobRegistryMonitor::new(
            store.clone(),
            store.clone(),
            Arc::new(MetricsCollector::new()),
            Duration::from_secs(30),
            90,
        );
        (store, monitor)
    }

    #[tokio::test]
    async fn test_refresh_rewrites_auto_groups() {
        let (store, monitor) = setup().await;
        let now = Utc::now();
        for address in ["http://b/", "http://a/", "http://a/"] {
            store
                .registry_upsert(RegistryGroup::Executor, "app-a", address, now)
                .await
                .unwrap();
        }
        store
            .registry_upsert(RegistryGroup::Executor, "app-manual", "http://x/", now)
            .await
            .unwrap();

        let changed = monitor.refresh_once(now).await.unwrap();
        assert_eq!(changed, 1);

        let auto = JobGroupRepository::find_by_id(store.as_ref(), 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auto.addresses, vec!["http://a/", "http://b/"]);

        let manual = JobGroupRepository::find_by_id(store.as_ref(), 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manual.addresses, vec!["http://fixed/"]);

        // 无变化时不再写入
        assert_eq!(monitor.refresh_once(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dead_entries_are_removed() {
        let (store, monitor) = setup().await;
        let now = Utc::now();
        store
            .insert_registry(RegistryEntry {
                id: 0,
                registry_group: RegistryGroup::Executor,
                registry_key: "app-a".to_string(),
                registry_value: "http://old/".to_string(),
                update_time: now - ChronoDuration::seconds(300),
            })
            .await;

        monitor.refresh_once(now).await.unwrap();
        assert!(store.all_registry().await.is_empty());

        let auto = JobGroupRepository::find_by_id(store.as_ref(), 1)
            .await
            .unwrap()
            .unwrap();
        assert!(auto.addresses.is_empty());
    }
}
