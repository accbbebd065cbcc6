use serde::{Deserialize, Serialize};

/// 调度中心配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub bind_address: String,
    /// 调度中心与执行器之间的通讯令牌
    pub access_token: Option<String>,
    /// 快触发池最大并发，不低于200
    pub trigger_pool_fast_max: usize,
    /// 慢触发池最大并发，不低于100
    pub trigger_pool_slow_max: usize,
    pub beat_timeout_seconds: u64,
    /// 注册记录超时时间，默认三个心跳周期
    pub registry_dead_timeout_seconds: i64,
    pub fail_monitor_interval_seconds: u64,
    pub schedule_lock_timeout_ms: u64,
    /// 调度中心调用执行器的超时时间
    pub executor_timeout_ms: u64,
    /// 告警Webhook地址，为空时仅记录日志
    pub alarm_webhook_url: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            access_token: None,
            trigger_pool_fast_max: 200,
            trigger_pool_slow_max: 100,
            beat_timeout_seconds: 30,
            registry_dead_timeout_seconds: 90,
            fail_monitor_interval_seconds: 10,
            schedule_lock_timeout_ms: 5_000,
            executor_timeout_ms: 5_000,
            alarm_webhook_url: None,
        }
    }
}

impl AdminConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_address.is_empty() {
            return Err(anyhow::anyhow!("调度中心监听地址不能为空"));
        }

        if self.trigger_pool_fast_max < 200 {
            return Err(anyhow::anyhow!(
                "快触发池最大并发不能小于200: {}",
                self.trigger_pool_fast_max
            ));
        }

        if self.trigger_pool_slow_max < 100 {
            return Err(anyhow::anyhow!(
                "慢触发池最大并发不能小于100: {}",
                self.trigger_pool_slow_max
            ));
        }

        if self.beat_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("心跳周期必须大于0"));
        }

        if self.registry_dead_timeout_seconds <= self.beat_timeout_seconds as i64 {
            return Err(anyhow::anyhow!("注册超时时间必须大于心跳周期"));
        }

        if self.fail_monitor_interval_seconds == 0 {
            return Err(anyhow::anyhow!("失败监控间隔必须大于0"));
        }

        Ok(())
    }

    /// 单次预读任务数：触发池总并发 * 每秒20次触发
    pub fn pre_read_count(&self) -> usize {
        (self.trigger_pool_fast_max + self.trigger_pool_slow_max) * 20
    }
}

/// 执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub enabled: bool,
    pub app_name: String,
    /// 注册到调度中心的地址，为空时由 ip + port 生成
    pub address: Option<String>,
    pub ip: Option<String>,
    pub port: u16,
    pub admin_addresses: Vec<String>,
    pub access_token: Option<String>,
    /// 执行日志根目录
    pub log_path: String,
    /// 执行日志保留天数，小于3时不清理
    pub log_retention_days: i64,
    pub beat_interval_seconds: u64,
    pub admin_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_name: "job-executor-sample".to_string(),
            address: None,
            ip: None,
            port: 9999,
            admin_addresses: vec!["http://127.0.0.1:8080".to_string()],
            access_token: None,
            log_path: "/tmp/job-scheduler/jobhandler".to_string(),
            log_retention_days: 30,
            beat_interval_seconds: 30,
            admin_timeout_ms: 10_000,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(anyhow::anyhow!("执行器AppName不能为空"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("执行器端口必须大于0"));
        }

        if self.log_path.trim().is_empty() {
            return Err(anyhow::anyhow!("执行日志目录不能为空"));
        }

        if self.beat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳周期必须大于0"));
        }

        for address in &self.admin_addresses {
            if !address.starts_with("http://") && !address.starts_with("https://") {
                return Err(anyhow::anyhow!("无效的调度中心地址: {}", address));
            }
        }

        Ok(())
    }

    /// 对外注册地址
    pub fn registry_address(&self) -> String {
        if let Some(address) = self.address.as_ref().filter(|a| !a.trim().is_empty()) {
            return address.trim().to_string();
        }
        let ip = self.ip.clone().unwrap_or_else(|| "127.0.0.1".to_string());
        format!("http://{}:{}/", ip, self.port)
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn callback_retry_path(&self) -> String {
        format!("{}/callbacklog", self.log_path.trim_end_matches('/'))
    }
}
