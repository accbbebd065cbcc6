//! # Scheduler API
//!
//! 调度中心与执行器的HTTP接口，JSON over HTTP。
//!
//! 调度中心：
//! - `POST /api/callback` 执行结果回调
//! - `POST /api/registry` / `POST /api/registryRemove` 执行器注册与摘除
//! - `POST /api/trigger` 手动触发任务
//!
//! 执行器：
//! - `POST /beat` / `POST /idleBeat`
//! - `POST /run` / `POST /kill` / `POST /log`
//!
//! 配置了通讯令牌时，请求头 `SCHEDULER-ACCESS-TOKEN` 必须一致。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use scheduler_core::traits::{AdminBiz, ExecutorBiz, TriggerSubmitter};
use tower::ServiceBuilder;

pub use middleware::AccessToken;
use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_admin_routes, create_executor_routes, AdminState, ExecutorState};

/// 调度中心HTTP应用
pub fn create_admin_app(
    admin_biz: Arc<dyn AdminBiz>,
    submitter: Arc<dyn TriggerSubmitter>,
    access_token: Option<String>,
) -> Router {
    let state = AdminState {
        admin_biz,
        submitter,
    };
    create_admin_routes(state, AccessToken::new(access_token)).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}

/// 执行器HTTP应用
pub fn create_executor_app(
    executor_biz: Arc<dyn ExecutorBiz>,
    access_token: Option<String>,
) -> Router {
    let state = ExecutorState { executor_biz };
    create_executor_routes(state, AccessToken::new(access_token)).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
