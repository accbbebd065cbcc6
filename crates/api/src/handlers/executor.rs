use axum::{extract::State, Json};
use scheduler_core::{
    models::{IdleBeatParam, KillParam, LogParam, LogResult, RpcResponse, TriggerParam},
    traits::ExecutorBiz,
};

use crate::{error::ApiResult, routes::ExecutorState};

pub async fn beat(State(state): State<ExecutorState>) -> ApiResult<Json<RpcResponse<String>>> {
    Ok(Json(state.executor_biz.beat().await?))
}

pub async fn idle_beat(
    State(state): State<ExecutorState>,
    Json(param): Json<IdleBeatParam>,
) -> ApiResult<Json<RpcResponse<String>>> {
    Ok(Json(state.executor_biz.idle_beat(param).await?))
}

pub async fn run(
    State(state): State<ExecutorState>,
    Json(param): Json<TriggerParam>,
) -> ApiResult<Json<RpcResponse<String>>> {
    Ok(Json(state.executor_biz.run(param).await?))
}

pub async fn kill(
    State(state): State<ExecutorState>,
    Json(param): Json<KillParam>,
) -> ApiResult<Json<RpcResponse<String>>> {
    Ok(Json(state.executor_biz.kill(param).await?))
}

pub async fn log(
    State(state): State<ExecutorState>,
    Json(param): Json<LogParam>,
) -> ApiResult<Json<RpcResponse<LogResult>>> {
    Ok(Json(state.executor_biz.log(param).await?))
}
