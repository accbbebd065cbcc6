//! 基于 reqwest 的 JSON-over-HTTP RPC 客户端

pub mod admin_client;
pub mod executor_client;

pub use admin_client::HttpAdminClient;
pub use executor_client::{HttpExecutorClient, HttpExecutorClientFactory};

use scheduler_core::{
    models::{RpcResponse, ACCESS_TOKEN_HEADER},
    SchedulerError, SchedulerResult,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    access_token: Option<&str>,
    body: &B,
) -> SchedulerResult<RpcResponse<R>>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut request = client.post(url).json(body);
    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        request = request.header(ACCESS_TOKEN_HEADER, token);
    }

    let response = request
        .send()
        .await
        .map_err(|e| SchedulerError::Network(format!("请求 {url} 失败: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SchedulerError::Network(format!(
            "请求 {url} 返回异常状态码: {status}"
        )));
    }

    let body = response
        .json::<RpcResponse<R>>()
        .await
        .map_err(|e| SchedulerError::Serialization(format!("解析 {url} 响应失败: {e}")))?;
    debug!("RPC调用完成: url={}, code={}", url, body.code);
    Ok(body)
}
