use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use scheduler_core::models::{RpcResponse, ACCESS_TOKEN_HEADER};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    info!(
        "完成请求处理: {} {} - 状态: {} - 耗时: {:?}",
        method,
        uri,
        response.status(),
        start.elapsed()
    );

    response
}

/// 通讯令牌
///
/// 未配置令牌时不校验；令牌错误时以业务失败返回，HTTP状态仍为200。
#[derive(Debug, Clone, Default)]
pub struct AccessToken(pub Option<String>);

impl AccessToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }

    fn accepts(&self, provided: Option<&str>) -> bool {
        match self.0.as_deref() {
            None => true,
            Some(expected) => provided == Some(expected),
        }
    }
}

pub async fn check_access_token(
    State(token): State<Arc<AccessToken>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if !token.accepts(provided) {
        warn!("通讯令牌校验失败: {}", request.uri());
        let body: RpcResponse<String> = RpcResponse::fail("The access token is wrong.");
        return Json(body).into_response();
    }
    next.run(request).await
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

pub fn trace_layer(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>>
{
    TraceLayer::new_for_http()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_accepts() {
        let open = AccessToken::new(None);
        assert!(open.accepts(None));
        assert!(open.accepts(Some("anything")));

        let blank = AccessToken::new(Some("  ".to_string()));
        assert!(blank.accepts(None));

        let guarded = AccessToken::new(Some("secret".to_string()));
        assert!(guarded.accepts(Some("secret")));
        assert!(!guarded.accepts(Some("wrong")));
        assert!(!guarded.accepts(None));
    }
}
