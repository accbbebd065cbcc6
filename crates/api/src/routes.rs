use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use scheduler_core::traits::{AdminBiz, ExecutorBiz, TriggerSubmitter};

use crate::handlers::{admin, executor, health::health_check};
use crate::middleware::{check_access_token, AccessToken};

/// 调度中心路由状态
#[derive(Clone)]
pub struct AdminState {
    pub admin_biz: Arc<dyn AdminBiz>,
    pub submitter: Arc<dyn TriggerSubmitter>,
}

/// 执行器路由状态
#[derive(Clone)]
pub struct ExecutorState {
    pub executor_biz: Arc<dyn ExecutorBiz>,
}

/// 调度中心路由：执行器回调、注册，以及手动触发
pub fn create_admin_routes(state: AdminState, access_token: AccessToken) -> Router {
    let rpc = Router::new()
        .route("/api/callback", post(admin::callback))
        .route("/api/registry", post(admin::registry))
        .route("/api/registryRemove", post(admin::registry_remove))
        .route("/api/trigger", post(admin::trigger))
        .route_layer(from_fn_with_state(Arc::new(access_token), check_access_token))
        .with_state(state);

    Router::new().route("/health", get(health_check)).merge(rpc)
}

/// 执行器路由
pub fn create_executor_routes(state: ExecutorState, access_token: AccessToken) -> Router {
    let rpc = Router::new()
        .route("/beat", post(executor::beat))
        .route("/idleBeat", post(executor::idle_beat))
        .route("/run", post(executor::run))
        .route("/kill", post(executor::kill))
        .route("/log", post(executor::log))
        .route_layer(from_fn_with_state(Arc::new(access_token), check_access_token))
        .with_state(state);

    Router::new().route("/health", get(health_check)).merge(rpc)
}
