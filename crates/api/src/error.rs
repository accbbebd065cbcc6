use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scheduler_core::{models::RpcResponse, SchedulerError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Scheduler(
                SchedulerError::JobNotFound { .. }
                | SchedulerError::JobGroupNotFound { .. }
                | SchedulerError::JobLogNotFound { .. },
            ) => StatusCode::NOT_FOUND,
            ApiError::Scheduler(
                SchedulerError::InvalidParam(_) | SchedulerError::InvalidCron { .. },
            ) => StatusCode::BAD_REQUEST,
            ApiError::Scheduler(SchedulerError::PoolRejected { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Scheduler(e) => e.to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
        };
        let body: RpcResponse<String> = RpcResponse::with_code(i32::from(status.as_u16()), message);
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
