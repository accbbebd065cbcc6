use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use scheduler_core::{
    models::{HandleCallbackParam, RegistryParam, RpcResponse, TriggerType},
    traits::{AdminBiz, TriggerRequest, TriggerSubmitter},
};

use crate::{
    error::{ApiError, ApiResult},
    routes::AdminState,
};

pub async fn callback(
    State(state): State<AdminState>,
    Json(params): Json<Vec<HandleCallbackParam>>,
) -> ApiResult<Json<RpcResponse<String>>> {
    Ok(Json(state.admin_biz.callback(params).await?))
}

pub async fn registry(
    State(state): State<AdminState>,
    Json(param): Json<RegistryParam>,
) -> ApiResult<Json<RpcResponse<String>>> {
    Ok(Json(state.admin_biz.registry(param).await?))
}

pub async fn registry_remove(
    State(state): State<AdminState>,
    Json(param): Json<RegistryParam>,
) -> ApiResult<Json<RpcResponse<String>>> {
    Ok(Json(state.admin_biz.registry_remove(param).await?))
}

/// 手动触发请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerJobRequest {
    pub job_id: i64,
    #[serde(default)]
    pub executor_param: Option<String>,
    /// 逗号分隔的执行器地址，为空时使用分组地址
    #[serde(default)]
    pub address_list: Option<String>,
}

impl TriggerJobRequest {
    fn into_trigger_request(self) -> TriggerRequest {
        let address_list = self
            .address_list
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty());
        TriggerRequest::new(self.job_id, TriggerType::Manual)
            .with_executor_param(self.executor_param)
            .with_address_list(address_list)
    }
}

pub async fn trigger(
    State(state): State<AdminState>,
    Json(request): Json<TriggerJobRequest>,
) -> ApiResult<Json<RpcResponse<String>>> {
    if request.job_id <= 0 {
        return Err(ApiError::BadRequest("jobId无效".to_string()));
    }
    info!("手动触发任务: job_id={}", request.job_id);
    state.submitter.submit(request.into_trigger_request()).await?;
    Ok(Json(RpcResponse::success()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_list_is_split_and_trimmed() {
        let request: TriggerJobRequest = serde_json::from_str(
            r#"{"jobId":3,"executorParam":"x","addressList":" http://a/ , ,http://b/"}"#,
        )
        .unwrap();
        let trigger = request.into_trigger_request();
        assert_eq!(trigger.job_id, 3);
        assert_eq!(trigger.trigger_type, TriggerType::Manual);
        assert_eq!(trigger.executor_param.as_deref(), Some("x"));
        assert_eq!(
            trigger.address_list,
            Some(vec!["http://a/".to_string(), "http://b/".to_string()])
        );

        let blank: TriggerJobRequest =
            serde_json::from_str(r#"{"jobId":3,"addressList":" , "}"#).unwrap();
        assert!(blank.into_trigger_request().address_list.is_none());
    }
}
