#[cfg(test)]
mod strategies_tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::strategies::*;
    use scheduler_core::models::{RouteStrategy, TriggerParam};
    use scheduler_testing_utils::{MockExecutorClientFactory, TriggerParamBuilder};

    fn addresses(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn param(job_id: i64) -> TriggerParam {
        TriggerParamBuilder::new().with_job_id(job_id).build()
    }

    #[tokio::test]
    async fn test_first_and_last() {
        let list = addresses(&["A", "B", "C"]);
        let first = FirstRouter.route(&param(1), &list).await;
        let last = LastRouter.route(&param(1), &list).await;
        assert_eq!(first.content.as_deref(), Some("A"));
        assert_eq!(last.content.as_deref(), Some("C"));

        let empty = FirstRouter.route(&param(1), &[]).await;
        assert!(!empty.is_success());
    }

    #[tokio::test]
    async fn test_round_robin_distributes_evenly() {
        let router = RoundRouter::new();
        let list = addresses(&["A", "B", "C"]);

        let mut picks = Vec::new();
        for _ in 0..6 {
            let result = router.route(&param(7), &list).await;
            picks.push(result.content.unwrap());
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for pick in &picks {
            *counts.entry(pick.as_str()).or_default() += 1;
        }
        assert_eq!(counts.get("A"), Some(&2));
        assert_eq!(counts.get("B"), Some(&2));
        assert_eq!(counts.get("C"), Some(&2));

        // 相邻两次选择按顺序轮转
        for window in picks.windows(2) {
            let a = list.iter().position(|x| *x == window[0]).unwrap();
            let b = list.iter().position(|x| *x == window[1]).unwrap();
            assert_eq!((a + 1) % list.len(), b);
        }
    }

    #[tokio::test]
    async fn test_consistent_hash_is_stable() {
        let list = addresses(&["http://a:9999/", "http://b:9999/", "http://c:9999/"]);
        for job_id in 1..50 {
            let first = ConsistentHashRouter.route(&param(job_id), &list).await;
            let second = ConsistentHashRouter.route(&param(job_id), &list).await;
            assert_eq!(first.content, second.content);
        }
    }

    #[tokio::test]
    async fn test_consistent_hash_minimal_remap() {
        let before = addresses(&["http://a:9999/", "http://b:9999/", "http://c:9999/"]);
        let mut after = before.clone();
        after.push("http://d:9999/".to_string());

        let total = 400;
        let mut moved = 0;
        for job_id in 0..total {
            let old = ConsistentHashRouter::select(job_id, &before).unwrap();
            let new = ConsistentHashRouter::select(job_id, &after).unwrap();
            if old != new {
                // 只允许迁移到新节点
                assert_eq!(new, "http://d:9999/");
                moved += 1;
            }
        }
        // 理想值约为 1/4，留足余量
        assert!(moved < total / 2, "moved {moved} of {total}");
    }

    #[tokio::test]
    async fn test_lfu_prefers_least_used() {
        let router = LeastFrequentlyUsedRouter::new();
        let list = addresses(&["A", "B"]);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..20 {
            let picked = router.route(&param(3), &list).await.content.unwrap();
            *counts.entry(picked).or_default() += 1;
        }
        let a = counts.get("A").copied().unwrap_or(0) as i64;
        let b = counts.get("B").copied().unwrap_or(0) as i64;
        assert_eq!(a + b, 20);
        assert!((a - b).abs() <= 2);
    }

    #[tokio::test]
    async fn test_lru_cycles_through_addresses() {
        let router = LeastRecentlyUsedRouter::new();
        let list = addresses(&["A", "B", "C"]);
        let mut picks = Vec::new();
        for _ in 0..3 {
            picks.push(router.route(&param(5), &list).await.content.unwrap());
        }
        picks.sort();
        assert_eq!(picks, list);

        // 地址下线后不再被选中
        let shrunk = addresses(&["B", "C"]);
        for _ in 0..4 {
            let picked = router.route(&param(5), &shrunk).await.content.unwrap();
            assert_ne!(picked, "A");
        }
    }

    #[tokio::test]
    async fn test_failover_skips_dead_executor() {
        let factory = Arc::new(MockExecutorClientFactory::new());
        factory.executor("A").set_reachable(false);
        let router = FailoverRouter::new(factory.clone());

        let result = router.route(&param(1), &addresses(&["A", "B"])).await;
        assert!(result.is_success());
        assert_eq!(result.content.as_deref(), Some("B"));
        assert!(result.msg.unwrap().contains("address：A"));

        factory.executor("B").set_reachable(false);
        let result = router.route(&param(1), &addresses(&["A", "B"])).await;
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_busyover_picks_first_idle() {
        let factory = Arc::new(MockExecutorClientFactory::new());
        factory.executor("A").set_idle(false);
        let router = BusyoverRouter::new(factory.clone());

        let result = router.route(&param(1), &addresses(&["A", "B", "C"])).await;
        assert_eq!(result.content.as_deref(), Some("B"));

        factory.executor("B").set_idle(false);
        factory.executor("C").set_idle(false);
        let result = router.route(&param(1), &addresses(&["A", "B", "C"])).await;
        assert!(!result.is_success());
    }

    #[test]
    fn test_router_table_has_no_broadcast_router() {
        let table = RouterTable::new(Arc::new(MockExecutorClientFactory::new()));
        for strategy in RouteStrategy::ALL {
            let router = table.get(strategy);
            if strategy == RouteStrategy::ShardingBroadcast {
                assert!(router.is_none());
            } else {
                assert!(router.is_some(), "missing router for {strategy:?}");
            }
        }
    }
}
