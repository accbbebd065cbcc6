pub mod metrics_collector;

pub use metrics_collector::MetricsCollector;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// 启动Prometheus指标导出端点
pub fn install_prometheus_exporter(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {bind_address}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus导出器失败")?;
    info!("Prometheus指标导出已启动: {}", addr);
    Ok(())
}
