use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use scheduler_core::{
    models::{IdleBeatParam, KillParam, LogParam, LogResult, RpcResponse, TriggerParam},
    traits::{ExecutorBiz, ExecutorClientFactory},
    SchedulerError, SchedulerResult,
};

use super::{join_url, post_json};

/// 调度中心调用执行器的HTTP客户端
pub struct HttpExecutorClient {
    client: reqwest::Client,
    address: String,
    access_token: Option<String>,
}

impl HttpExecutorClient {
    pub fn new(
        address: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::Network(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            client,
            address: address.to_string(),
            access_token,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.address, path)
    }
}

#[async_trait]
impl ExecutorBiz for HttpExecutorClient {
    async fn beat(&self) -> SchedulerResult<RpcResponse<String>> {
        post_json(
            &self.client,
            &self.url("beat"),
            self.access_token.as_deref(),
            &serde_json::json!({}),
        )
        .await
    }

    async fn idle_beat(&self, param: IdleBeatParam) -> SchedulerResult<RpcResponse<String>> {
        post_json(
            &self.client,
            &self.url("idleBeat"),
            self.access_token.as_deref(),
            &param,
        )
        .await
    }

    async fn run(&self, param: TriggerParam) -> SchedulerResult<RpcResponse<String>> {
        post_json(
            &self.client,
            &self.url("run"),
            self.access_token.as_deref(),
            &param,
        )
        .await
    }

    async fn kill(&self, param: KillParam) -> SchedulerResult<RpcResponse<String>> {
        post_json(
            &self.client,
            &self.url("kill"),
            self.access_token.as_deref(),
            &param,
        )
        .await
    }

    async fn log(&self, param: LogParam) -> SchedulerResult<RpcResponse<LogResult>> {
        post_json(
            &self.client,
            &self.url("log"),
            self.access_token.as_deref(),
            &param,
        )
        .await
    }
}

/// 按地址缓存执行器客户端
pub struct HttpExecutorClientFactory {
    clients: DashMap<String, Arc<dyn ExecutorBiz>>,
    access_token: Option<String>,
    timeout: Duration,
}

impl HttpExecutorClientFactory {
    pub fn new(access_token: Option<String>, timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            access_token,
            timeout,
        }
    }

    pub fn cached_count(&self) -> usize {
        self.clients.len()
    }
}

impl ExecutorClientFactory for HttpExecutorClientFactory {
    fn executor_client(&self, address: &str) -> SchedulerResult<Arc<dyn ExecutorBiz>> {
        let address = address.trim();
        if address.is_empty() {
            return Err(SchedulerError::InvalidParam("执行器地址为空".to_string()));
        }
        if let Some(client) = self.clients.get(address) {
            return Ok(Arc::clone(client.value()));
        }

        let client: Arc<dyn ExecutorBiz> = Arc::new(HttpExecutorClient::new(
            address,
            self.access_token.clone(),
            self.timeout,
        )?);
        let entry = self
            .clients
            .entry(address.to_string())
            .or_insert_with(|| Arc::clone(&client));
        Ok(Arc::clone(entry.value()))
    }
}
