//! 执行日志文件
//!
//! 每次调度尝试对应一个文件 `{base}/{yyyy-MM-dd}/{log_id}.log`，
//! 按天分目录，过期目录由清理任务删除。

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scheduler_core::{
    models::LogResult,
    time::date_dir_name,
    SchedulerResult,
};

/// 保留天数小于该值时不清理
const MIN_RETENTION_DAYS: u32 = 3;
const CLEAN_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct JobLogFiles {
    base: PathBuf,
}

impl JobLogFiles {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn log_file_path(&self, log_date_time: i64, log_id: i64) -> PathBuf {
        self.base
            .join(date_dir_name(log_date_time))
            .join(format!("{log_id}.log"))
    }

    /// 脚本任务源码目录
    pub fn glue_source_dir(&self) -> PathBuf {
        self.base.join("gluesource")
    }

    /// 追加一行日志，行首带时间
    pub async fn append(&self, log_date_time: i64, log_id: i64, line: &str) -> SchedulerResult<()> {
        let path = self.log_file_path(log_date_time, log_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let stamped = format!("{} {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"), line);
        file.write_all(stamped.as_bytes()).await?;
        Ok(())
    }

    /// 从第 `from_line_num` 行（从1开始）读到文件末尾
    pub async fn read_log(&self, log_date_time: i64, log_id: i64, from_line_num: i32) -> LogResult {
        let path = self.log_file_path(log_date_time, log_id);
        let from_line_num = from_line_num.max(1);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("读取执行日志失败: path={}, error={}", path.display(), e);
                return LogResult {
                    from_line_num,
                    to_line_num: 0,
                    log_content: "readLog fail, logFile not exists".to_string(),
                    is_end: true,
                };
            }
        };

        let mut to_line_num = 0;
        let mut log_content = String::new();
        for (index, line) in content.lines().enumerate() {
            let line_num = index as i32 + 1;
            to_line_num = line_num;
            if line_num >= from_line_num {
                log_content.push_str(line);
                log_content.push('\n');
            }
        }

        LogResult {
            from_line_num,
            to_line_num,
            log_content,
            is_end: false,
        }
    }

    /// 删除超过保留天数的日期目录，返回删除数量
    pub async fn clean_expired(&self, retention_days: u32, today: NaiveDate) -> SchedulerResult<usize> {
        if retention_days < MIN_RETENTION_DAYS {
            return Ok(0);
        }
        let mut entries = match fs::read_dir(&self.base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(date) = name
                .to_str()
                .and_then(|n| NaiveDate::parse_from_str(n, "%Y-%m-%d").ok())
            else {
                continue;
            };
            if (today - date).num_days() >= i64::from(retention_days) {
                match fs::remove_dir_all(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("删除过期日志目录失败: {:?}, error={}", name, e),
                }
            }
        }
        Ok(removed)
    }

    /// 每天清理一次过期日志
    pub async fn run_cleaner(&self, retention_days: u32, cancellation_token: CancellationToken) {
        if retention_days < MIN_RETENTION_DAYS {
            info!("日志保留天数小于{}，不启用日志清理", MIN_RETENTION_DAYS);
            return;
        }
        loop {
            let today = Utc::now().date_naive();
            match self.clean_expired(retention_days, today).await {
                Ok(removed) if removed > 0 => info!("已清理过期日志目录: {}", removed),
                Ok(_) => {}
                Err(e) => error!("清理执行日志失败: {}", e),
            }
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(CLEAN_INTERVAL) => {}
            }
        }
    }
}
