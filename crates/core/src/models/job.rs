use serde::{Deserialize, Serialize};

/// 任务定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInfo {
    pub id: i64,
    /// 所属执行器分组
    pub group_id: i64,
    pub description: String,
    /// CRON表达式（秒级，6或7段）
    pub cron: String,
    pub route_strategy: RouteStrategy,
    /// BEAN模式下的执行器Handler名称
    pub handler: String,
    pub executor_params: String,
    pub block_strategy: BlockStrategy,
    /// 执行超时时间（秒），小于等于0表示不限制
    pub timeout_seconds: i32,
    pub fail_retry_count: i32,
    pub glue_type: GlueType,
    pub glue_source: String,
    /// GLUE源码更新时间（毫秒时间戳）
    pub glue_updated_at: i64,
    /// 告警邮件，逗号分隔
    pub alarm_email: String,
    pub child_job_ids: Vec<i64>,
    /// 调度状态：true表示运行中
    pub running: bool,
    pub trigger_last_time: i64,
    pub trigger_next_time: i64,
}

impl JobInfo {
    pub fn alarm_recipients(&self) -> Vec<String> {
        self.alarm_email
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// 执行器分组
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobGroup {
    pub id: i64,
    pub app_name: String,
    pub title: String,
    pub address_type: AddressType,
    /// 有序地址列表
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AddressType {
    /// 自动注册
    #[serde(rename = "AUTO")]
    Auto,
    /// 手动录入
    #[serde(rename = "MANUAL")]
    Manual,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Manual,
    Cron,
    Retry,
    Parent,
    Api,
}

impl TriggerType {
    pub fn title(&self) -> &'static str {
        match self {
            TriggerType::Manual => "手动触发",
            TriggerType::Cron => "Cron触发",
            TriggerType::Retry => "失败重试触发",
            TriggerType::Parent => "父任务触发",
            TriggerType::Api => "API触发",
        }
    }
}

/// 执行器路由策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStrategy {
    First,
    Last,
    Round,
    Random,
    ConsistentHash,
    LeastFrequentlyUsed,
    LeastRecentlyUsed,
    Failover,
    Busyover,
    ShardingBroadcast,
}

impl RouteStrategy {
    pub const ALL: [RouteStrategy; 10] = [
        RouteStrategy::First,
        RouteStrategy::Last,
        RouteStrategy::Round,
        RouteStrategy::Random,
        RouteStrategy::ConsistentHash,
        RouteStrategy::LeastFrequentlyUsed,
        RouteStrategy::LeastRecentlyUsed,
        RouteStrategy::Failover,
        RouteStrategy::Busyover,
        RouteStrategy::ShardingBroadcast,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            RouteStrategy::First => "第一个",
            RouteStrategy::Last => "最后一个",
            RouteStrategy::Round => "轮询",
            RouteStrategy::Random => "随机",
            RouteStrategy::ConsistentHash => "一致性HASH",
            RouteStrategy::LeastFrequentlyUsed => "最不经常使用",
            RouteStrategy::LeastRecentlyUsed => "最近最久未使用",
            RouteStrategy::Failover => "故障转移",
            RouteStrategy::Busyover => "忙碌转移",
            RouteStrategy::ShardingBroadcast => "分片广播",
        }
    }
}

/// 阻塞处理策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockStrategy {
    #[default]
    SerialExecution,
    DiscardLater,
    CoverEarly,
}

impl BlockStrategy {
    pub fn title(&self) -> &'static str {
        match self {
            BlockStrategy::SerialExecution => "Serial execution",
            BlockStrategy::DiscardLater => "Discard Later",
            BlockStrategy::CoverEarly => "Cover Early",
        }
    }
}

/// 任务运行模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum GlueType {
    #[default]
    #[serde(rename = "BEAN")]
    Bean,
    #[serde(rename = "GLUE_SHELL")]
    Shell,
    #[serde(rename = "GLUE_PYTHON")]
    Python,
    #[serde(rename = "GLUE_PHP")]
    Php,
    #[serde(rename = "GLUE_NODEJS")]
    NodeJs,
    #[serde(rename = "GLUE_POWERSHELL")]
    PowerShell,
}

impl GlueType {
    pub fn is_script(&self) -> bool {
        !matches!(self, GlueType::Bean)
    }

    /// 脚本解释器
    pub fn interpreter(&self) -> Option<&'static str> {
        match self {
            GlueType::Bean => None,
            GlueType::Shell => Some("bash"),
            GlueType::Python => Some("python"),
            GlueType::Php => Some("php"),
            GlueType::NodeJs => Some("node"),
            GlueType::PowerShell => Some("powershell"),
        }
    }

    pub fn file_suffix(&self) -> Option<&'static str> {
        match self {
            GlueType::Bean => None,
            GlueType::Shell => Some(".sh"),
            GlueType::Python => Some(".py"),
            GlueType::Php => Some(".php"),
            GlueType::NodeJs => Some(".js"),
            GlueType::PowerShell => Some(".ps1"),
        }
    }
}

/// 分片参数，格式 `index/total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardingParam {
    pub index: i32,
    pub total: i32,
}

impl ShardingParam {
    pub fn new(index: i32, total: i32) -> Self {
        Self { index, total }
    }

    /// 解析 `i/n`，两部分都必须是数字
    pub fn parse(raw: &str) -> Option<Self> {
        let (index, total) = raw.split_once('/')?;
        let index = index.trim().parse::<i32>().ok()?;
        let total = total.trim().parse::<i32>().ok()?;
        Some(Self { index, total })
    }
}

impl std::fmt::Display for ShardingParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}
