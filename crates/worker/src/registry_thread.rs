use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scheduler_core::{models::RegistryParam, traits::AdminBiz};

/// 执行器注册心跳
///
/// 每个心跳周期向调度中心注册一次，停止时摘除。多个调度中心依次尝试，任意一个成功即可。
pub struct ExecutorRegistryThread {
    admin_clients: Vec<Arc<dyn AdminBiz>>,
    app_name: String,
    address: String,
    beat_interval: Duration,
}

impl ExecutorRegistryThread {
    pub fn new(
        admin_clients: Vec<Arc<dyn AdminBiz>>,
        app_name: impl Into<String>,
        address: impl Into<String>,
        beat_interval: Duration,
    ) -> Self {
        Self {
            admin_clients,
            app_name: app_name.into(),
            address: address.into(),
            beat_interval,
        }
    }

    fn param(&self) -> RegistryParam {
        RegistryParam::executor(self.app_name.clone(), self.address.clone())
    }

    pub async fn register_once(&self) -> bool {
        let param = self.param();
        for admin in &self.admin_clients {
            match admin.registry(param.clone()).await {
                Ok(result) if result.is_success() => {
                    debug!("执行器注册成功: {} -> {}", self.app_name, self.address);
                    return true;
                }
                Ok(result) => warn!("执行器注册失败: {}", result.msg_or_empty()),
                Err(e) => warn!("执行器注册出错: {}", e),
            }
        }
        false
    }

    pub async fn remove_once(&self) -> bool {
        let param = self.param();
        for admin in &self.admin_clients {
            match admin.registry_remove(param.clone()).await {
                Ok(result) if result.is_success() => {
                    info!("执行器已摘除: {} -> {}", self.app_name, self.address);
                    return true;
                }
                Ok(result) => warn!("执行器摘除失败: {}", result.msg_or_empty()),
                Err(e) => warn!("执行器摘除出错: {}", e),
            }
        }
        false
    }

    /// 心跳循环，取消后摘除注册再返回
    pub async fn run(&self, cancellation_token: CancellationToken) {
        if self.app_name.trim().is_empty() {
            warn!("执行器AppName为空，不注册");
            return;
        }
        info!("执行器注册任务已启动: {} -> {}", self.app_name, self.address);
        loop {
            self.register_once().await;
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(self.beat_interval) => {}
            }
        }
        self.remove_once().await;
        info!("执行器注册任务已停止");
    }
}
