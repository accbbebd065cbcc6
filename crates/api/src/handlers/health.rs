use axum::Json;
use scheduler_core::time::now_millis;
use serde_json::{json, Value};

/// 存活探针，不经过令牌校验
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "code": 200,
        "status": "UP",
        "serverTime": now_millis(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
