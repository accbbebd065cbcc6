use std::time::Duration;

use async_trait::async_trait;
use scheduler_core::{
    models::{HandleCallbackParam, RegistryParam, RpcResponse},
    traits::AdminBiz,
    SchedulerError, SchedulerResult,
};

use super::{join_url, post_json};

/// 执行器调用调度中心的HTTP客户端
pub struct HttpAdminClient {
    client: reqwest::Client,
    address: String,
    access_token: Option<String>,
}

impl HttpAdminClient {
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
}

#[async_trait]
impl AdminBiz for HttpAdminClient {
    async fn callback(
        &self,
        params: Vec<HandleCallbackParam>,
    ) -> SchedulerResult<RpcResponse<String>> {
        post_json(
            &self.client,
            &join_url(&self.address, "api/callback"),
            self.access_token.as_deref(),
            &params,
        )
        .await
    }

    async fn registry(&self, param: RegistryParam) -> SchedulerResult<RpcResponse<String>> {
        post_json(
            &self.client,
            &join_url(&self.address, "api/registry"),
            self.access_token.as_deref(),
            &param,
        )
        .await
    }

    async fn registry_remove(&self, param: RegistryParam) -> SchedulerResult<RpcResponse<String>> {
        post_json(
            &self.client,
            &join_url(&self.address, "api/registryRemove"),
            self.access_token.as_deref(),
            &param,
        )
        .await
    }
}
