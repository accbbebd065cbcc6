//! 调度中心与执行器之间的RPC载荷

use serde::{Deserialize, Serialize};

use super::{BlockStrategy, GlueType, RegistryGroup};

pub const SUCCESS_CODE: i32 = 200;
pub const FAIL_CODE: i32 = 500;
pub const TIMEOUT_CODE: i32 = 502;

/// 通讯令牌请求头
pub const ACCESS_TOKEN_HEADER: &str = "SCHEDULER-ACCESS-TOKEN";

/// 回调消息的最大长度
pub const MAX_HANDLE_MSG_LEN: usize = 50_000;

/// 通用响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse<T> {
    pub code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<T>,
}

impl<T> RpcResponse<T> {
    pub fn success() -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
            content: None,
        }
    }

    pub fn success_with(content: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
            content: Some(content),
        }
    }

    pub fn success_msg(msg: impl Into<String>) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: Some(msg.into()),
            content: None,
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self::with_code(FAIL_CODE, msg)
    }

    pub fn with_code(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
            content: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    pub fn msg_or_empty(&self) -> &str {
        self.msg.as_deref().unwrap_or("")
    }
}

/// 调度请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerParam {
    pub job_id: i64,
    pub executor_handler: String,
    pub executor_params: String,
    pub executor_block_strategy: BlockStrategy,
    pub executor_timeout: i32,
    pub log_id: i64,
    /// 调度时间（毫秒），用于定位执行日志文件
    pub log_date_time: i64,
    pub glue_type: GlueType,
    pub glue_source: String,
    pub glue_updatetime: i64,
    pub broadcast_index: i32,
    pub broadcast_total: i32,
}

/// 执行结果回调
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HandleCallbackParam {
    pub log_id: i64,
    pub log_date_time: i64,
    pub handle_code: i32,
    pub handle_msg: Option<String>,
}

impl HandleCallbackParam {
    pub fn new(
        log_id: i64,
        log_date_time: i64,
        handle_code: i32,
        handle_msg: Option<String>,
    ) -> Self {
        Self {
            log_id,
            log_date_time,
            handle_code,
            handle_msg: handle_msg.map(truncate_handle_msg),
        }
    }
}

/// 超长消息截断并追加 `...`
pub fn truncate_handle_msg(msg: String) -> String {
    if msg.chars().count() <= MAX_HANDLE_MSG_LEN {
        return msg;
    }
    let mut truncated: String = msg.chars().take(MAX_HANDLE_MSG_LEN).collect();
    truncated.push_str("...");
    truncated
}

/// 执行器注册/摘除请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryParam {
    pub registry_group: RegistryGroup,
    pub registry_key: String,
    pub registry_value: String,
}

impl RegistryParam {
    pub fn executor(app_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            registry_group: RegistryGroup::Executor,
            registry_key: app_name.into(),
            registry_value: address.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.registry_key.trim().is_empty() && !self.registry_value.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdleBeatParam {
    pub job_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KillParam {
    pub job_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogParam {
    pub log_date_time: i64,
    pub log_id: i64,
    pub from_line_num: i32,
}

/// 执行日志分段读取结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogResult {
    pub from_line_num: i32,
    pub to_line_num: i32,
    pub log_content: String,
    pub is_end: bool,
}
