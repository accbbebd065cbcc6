use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use scheduler_core::{init_logging, AppConfig};
use tracing::{error, info, warn};

mod app;
mod shutdown;

use app::{AppMode, Application};
use shutdown::{wait_for_shutdown_signal, ShutdownManager};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("job-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("分布式任务调度平台")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，不指定时按默认路径查找"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["admin", "executor", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mode_str = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all");

    let config = AppConfig::load(config_path).with_context(|| {
        format!("加载配置失败: {}", config_path.unwrap_or("<默认路径>"))
    })?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.observability.log_format.clone());
    init_logging(&log_level, &log_format)?;

    info!("启动分布式任务调度平台，运行模式: {}", mode_str);

    let mode = parse_app_mode(mode_str, &config)?;
    let app = Application::new(config, mode)?;

    let shutdown_manager = ShutdownManager::new();
    let shutdown = shutdown_manager.subscribe();
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app.run(shutdown).await {
            error!("应用运行失败: {:#}", e);
        }
    });

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown();

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("分布式任务调度平台已退出");
    Ok(())
}

fn parse_app_mode(mode_str: &str, config: &AppConfig) -> Result<AppMode> {
    match mode_str {
        "admin" => {
            if !config.admin.enabled {
                return Err(anyhow::anyhow!("调度中心被禁用，请检查配置"));
            }
            Ok(AppMode::Admin)
        }
        "executor" => {
            if !config.executor.enabled {
                return Err(anyhow::anyhow!("执行器被禁用，请检查配置"));
            }
            Ok(AppMode::Executor)
        }
        "all" => match (config.admin.enabled, config.executor.enabled) {
            (true, true) => Ok(AppMode::All),
            (true, false) => Ok(AppMode::Admin),
            (false, true) => Ok(AppMode::Executor),
            (false, false) => Err(anyhow::anyhow!("调度中心和执行器均被禁用")),
        },
        _ => Err(anyhow::anyhow!("不支持的运行模式: {mode_str}")),
    }
}
