use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::debug;

use scheduler_core::{
    models::{IdleBeatParam, RouteStrategy, RpcResponse, TriggerParam},
    time::now_millis,
    traits::ExecutorClientFactory,
};

/// 计数类路由状态的重置周期
const CACHE_VALID_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// 一致性哈希每个地址的虚拟节点数
const VIRTUAL_NODE_NUM: usize = 100;

/// 执行器路由策略接口
///
/// 成功时 `content` 为选中的地址，失败时 `msg` 说明原因。
#[async_trait]
pub trait ExecutorRouter: Send + Sync {
    async fn route(&self, param: &TriggerParam, addresses: &[String]) -> RpcResponse<String>;

    fn name(&self) -> &str;
}

fn empty_addresses() -> RpcResponse<String> {
    RpcResponse::fail("执行器地址列表为空")
}

pub struct FirstRouter;

#[async_trait]
impl ExecutorRouter for FirstRouter {
    async fn route(&self, _param: &TriggerParam, addresses: &[String]) -> RpcResponse<String> {
        match addresses.first() {
            Some(address) => RpcResponse::success_with(address.clone()),
            None => empty_addresses(),
        }
    }

    fn name(&self) -> &str {
        "First"
    }
}

pub struct LastRouter;

#[async_trait]
impl ExecutorRouter for LastRouter {
    async fn route(&self, _param: &TriggerParam, addresses: &[String]) -> RpcResponse<String> {
        match addresses.last() {
            Some(address) => RpcResponse::success_with(address.clone()),
            None => empty_addresses(),
        }
    }

    fn name(&self) -> &str {
        "Last"
    }
}

/// 按任务维度的周期性重置状态
struct ExpiringState<T> {
    expire_at: i64,
    per_job: HashMap<i64, T>,
}

impl<T> ExpiringState<T> {
    fn new() -> Self {
        Self {
            expire_at: 0,
            per_job: HashMap::new(),
        }
    }

    fn refresh(&mut self, now: i64) {
        if now > self.expire_at {
            self.per_job.clear();
            self.expire_at = now + CACHE_VALID_MILLIS;
        }
    }
}

/// 轮询：按任务计数，初始值随机以避免所有任务都压到第一台
pub struct RoundRouter {
    state: Mutex<ExpiringState<usize>>,
}

impl RoundRouter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExpiringState::new()),
        }
    }

    fn next_count(&self, job_id: i64) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.refresh(now_millis());
        let counter = state
            .per_job
            .entry(job_id)
            .or_insert_with(|| rand::rng().random_range(0..100));
        let current = *counter;
        *counter = counter.wrapping_add(1);
        current
    }
}

impl Default for RoundRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutorRouter for RoundRouter {
    async fn route(&self, param: &TriggerParam, addresses: &[String]) -> RpcResponse<String> {
        if addresses.is_empty() {
            return empty_addresses();
        }
        let index = self.next_count(param.job_id) % addresses.len();
        debug!(
            "轮询策略选择执行器: {} (索引: {}/{})",
            addresses[index],
            index,
            addresses.len()
        );
        RpcResponse::success_with(addresses[index].clone())
    }

    fn name(&self) -> &str {
        "Round"
    }
}

pub struct RandomRouter;

#[async_trait]
impl ExecutorRouter for RandomRouter {
    async fn route(&self, _param: &TriggerParam, addresses: &[String]) -> RpcResponse<String> {
        if addresses.is_empty() {
            return empty_addresses();
        }
        let index = rand::rng().random_range(0..addresses.len());
        RpcResponse::success_with(addresses[index].clone())
    }

    fn name(&self) -> &str {
        "Random"
    }
}

/// 一致性哈希：同一任务在地址列表不变时总是落在同一台
pub struct ConsistentHashRouter;

impl ConsistentHashRouter {
    /// SHA-256 前8字节
    fn hash(key: &str) -> u64 {
        let digest = Sha256::digest(key.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }

    pub fn select(job_id: i64, addresses: &[String]) -> Option<String> {
        let mut ring: BTreeMap<u64, &String> = BTreeMap::new();
        for address in addresses {
            for node in 0..VIRTUAL_NODE_NUM {
                ring.insert(Self::hash(&format!("SHARD-{address}-NODE-{node}")), address);
            }
        }
        let job_hash = Self::hash(&job_id.to_string());
        ring.range(job_hash..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, address)| (*address).clone())
    }
}

#[async_trait]
impl ExecutorRouter for ConsistentHashRouter {
    async fn route(&self, param: &TriggerParam, addresses: &[String]) -> RpcResponse<String> {
        match Self::select(param.job_id, addresses) {
            Some(address) => RpcResponse::success_with(address),
            None => empty_addresses(),
        }
    }

    fn name(&self) -> &str {
        "ConsistentHash"
    }
}

/// 最不经常使用
pub struct LeastFrequentlyUsedRouter {
    state: Mutex<ExpiringState<HashMap<String, u64>>>,
}

impl LeastFrequentlyUsedRouter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExpiringState::new()),
        }
    }

    fn select(&self, job_id: i64, addresses: &[String]) -> Option<String> {
        if addresses.is_empty() {
            return None;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.refresh(now_millis());
        let counts = state.per_job.entry(job_id).or_default();

        // 新地址以随机小计数加入，避免刚上线的机器瞬间被压满
        let mut rng = rand::rng();
        for address in addresses {
            counts
                .entry(address.clone())
                .or_insert_with(|| rng.random_range(0..addresses.len() as u64));
        }
        counts.retain(|address, _| addresses.contains(address));

        let selected = addresses
            .iter()
            .min_by_key(|address| counts.get(*address).copied().unwrap_or(0))?
            .clone();
        if let Some(count) = counts.get_mut(&selected) {
            *count += 1;
        }
        Some(selected)
    }
}

impl Default for LeastFrequentlyUsedRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutorRouter for LeastFrequentlyUsedRouter {
    async fn route(&self, param: &TriggerParam, addresses: &[String]) -> RpcResponse<String> {
        match self.select(param.job_id, addresses) {
            Some(address) => RpcResponse::success_with(address),
            None => empty_addresses(),
        }
    }

    fn name(&self) -> &str {
        "LeastFrequentlyUsed"
    }
}

/// 最近最久未使用
pub struct LeastRecentlyUsedRouter {
    state: Mutex<ExpiringState<VecDeque<String>>>,
}

impl LeastRecentlyUsedRouter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExpiringState::new()),
        }
    }

    fn select(&self, job_id: i64, addresses: &[String]) -> Option<String> {
        if addresses.is_empty() {
            return None;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.refresh(now_millis());
        let order = state.per_job.entry(job_id).or_default();

        order.retain(|address| addresses.contains(address));
        for address in addresses {
            if !order.contains(address) {
                order.push_back(address.clone());
            }
        }

        let selected = order.pop_front()?;
        order.push_back(selected.clone());
        Some(selected)
    }
}

impl Default for LeastRecentlyUsedRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutorRouter for LeastRecentlyUsedRouter {
    async fn route(&self, param: &TriggerParam, addresses: &[String]) -> RpcResponse<String> {
        match self.select(param.job_id, addresses) {
            Some(address) => RpcResponse::success_with(address),
            None => empty_addresses(),
        }
    }

    fn name(&self) -> &str {
        "LeastRecentlyUsed"
    }
}

/// 故障转移：按顺序心跳检测，第一台存活的机器胜出
pub struct FailoverRouter {
    clients: Arc<dyn ExecutorClientFactory>,
}

impl FailoverRouter {
    pub fn new(clients: Arc<dyn ExecutorClientFactory>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl ExecutorRouter for FailoverRouter {
    async fn route(&self, _param: &TriggerParam, addresses: &[String]) -> RpcResponse<String> {
        if addresses.is_empty() {
            return empty_addresses();
        }
        let mut narrative = String::new();
        for address in addresses {
            let result = match self.clients.executor_client(address) {
                Ok(client) => client
                    .beat()
                    .await
                    .unwrap_or_else(|e| RpcResponse::fail(e.to_string())),
                Err(e) => RpcResponse::fail(e.to_string()),
            };
            if !narrative.is_empty() {
                narrative.push_str("<br><br>");
            }
            narrative.push_str(&format!(
                "心跳检测：<br>address：{}<br>code：{}<br>msg：{}",
                address,
                result.code,
                result.msg_or_empty()
            ));
            if result.is_success() {
                return RpcResponse {
                    code: result.code,
                    msg: Some(narrative),
                    content: Some(address.clone()),
                };
            }
        }
        RpcResponse::fail(narrative)
    }

    fn name(&self) -> &str {
        "Failover"
    }
}

/// 忙碌转移：按顺序空闲检测，第一台空闲的机器胜出
pub struct BusyoverRouter {
    clients: Arc<dyn ExecutorClientFactory>,
}

impl BusyoverRouter {
    pub fn new(clients: Arc<dyn ExecutorClientFactory>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl ExecutorRouter for BusyoverRouter {
    async fn route(&self, param: &TriggerParam, addresses: &[String]) -> RpcResponse<String> {
        if addresses.is_empty() {
            return empty_addresses();
        }
        let mut narrative = String::new();
        for address in addresses {
            let result = match self.clients.executor_client(address) {
                Ok(client) => client
                    .idle_beat(IdleBeatParam {
                        job_id: param.job_id,
                    })
                    .await
                    .unwrap_or_else(|e| RpcResponse::fail(e.to_string())),
                Err(e) => RpcResponse::fail(e.to_string()),
            };
            if !narrative.is_empty() {
                narrative.push_str("<br><br>");
            }
            narrative.push_str(&format!(
                "空闲检测：<br>address：{}<br>code：{}<br>msg：{}",
                address,
                result.code,
                result.msg_or_empty()
            ));
            if result.is_success() {
                return RpcResponse {
                    code: result.code,
                    msg: Some(narrative),
                    content: Some(address.clone()),
                };
            }
        }
        RpcResponse::fail(narrative)
    }

    fn name(&self) -> &str {
        "Busyover"
    }
}

/// 路由策略表，分片广播没有对应的路由器
pub struct RouterTable {
    routers: HashMap<RouteStrategy, Arc<dyn ExecutorRouter>>,
}

impl RouterTable {
    pub fn new(clients: Arc<dyn ExecutorClientFactory>) -> Self {
        let mut routers: HashMap<RouteStrategy, Arc<dyn ExecutorRouter>> = HashMap::new();
        routers.insert(RouteStrategy::First, Arc::new(FirstRouter));
        routers.insert(RouteStrategy::Last, Arc::new(LastRouter));
        routers.insert(RouteStrategy::Round, Arc::new(RoundRouter::new()));
        routers.insert(RouteStrategy::Random, Arc::new(RandomRouter));
        routers.insert(RouteStrategy::ConsistentHash, Arc::new(ConsistentHashRouter));
        routers.insert(
            RouteStrategy::LeastFrequentlyUsed,
            Arc::new(LeastFrequentlyUsedRouter::new()),
        );
        routers.insert(
            RouteStrategy::LeastRecentlyUsed,
            Arc::new(LeastRecentlyUsedRouter::new()),
        );
        routers.insert(
            RouteStrategy::Failover,
            Arc::new(FailoverRouter::new(Arc::clone(&clients))),
        );
        routers.insert(RouteStrategy::Busyover, Arc::new(BusyoverRouter::new(clients)));
        Self { routers }
    }

    pub fn get(&self, strategy: RouteStrategy) -> Option<Arc<dyn ExecutorRouter>> {
        self.routers.get(&strategy).cloned()
    }
}
