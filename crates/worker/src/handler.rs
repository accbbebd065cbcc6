use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scheduler_core::{
    models::{GlueType, FAIL_CODE, SUCCESS_CODE},
    SchedulerError, SchedulerResult,
};

use crate::job_log::JobLogFiles;

/// 任务执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct HandleResult {
    pub code: i32,
    pub msg: Option<String>,
}

impl HandleResult {
    pub fn success() -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: None,
        }
    }

    pub fn success_with(msg: impl Into<String>) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: Some(msg.into()),
        }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self::with_code(FAIL_CODE, msg)
    }

    pub fn with_code(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
        }
    }
}

/// 单次执行的上下文
#[derive(Clone)]
pub struct JobContext {
    pub job_id: i64,
    pub log_id: i64,
    pub log_date_time: i64,
    pub params: String,
    pub shard_index: i32,
    pub shard_total: i32,
    /// 超时或被终止时取消，处理器应尽快返回
    pub cancellation_token: CancellationToken,
    log_files: Arc<JobLogFiles>,
}

impl JobContext {
    pub fn new(
        job_id: i64,
        log_id: i64,
        log_date_time: i64,
        params: String,
        shard_index: i32,
        shard_total: i32,
        log_files: Arc<JobLogFiles>,
    ) -> Self {
        Self {
            job_id,
            log_id,
            log_date_time,
            params,
            shard_index,
            shard_total,
            cancellation_token: CancellationToken::new(),
            log_files,
        }
    }

    /// 写入本次执行的日志文件
    pub async fn log(&self, line: impl AsRef<str>) {
        if let Err(e) = self
            .log_files
            .append(self.log_date_time, self.log_id, line.as_ref())
            .await
        {
            warn!("写入执行日志失败: log_id={}, error={}", self.log_id, e);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// 任务处理器
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// 任务线程启动时调用一次
    async fn init(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn execute(&self, context: &JobContext) -> SchedulerResult<HandleResult>;

    /// 任务线程退出时调用一次
    async fn destroy(&self) -> SchedulerResult<()> {
        Ok(())
    }
}

/// 按名称注册的处理器
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let name = name.into();
        info!("注册任务处理器: {}", name);
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!("任务处理器被覆盖: {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(name).map(|h| Arc::clone(h.value()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// 处理器身份，用于判断任务线程是否需要重建
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKey {
    Bean(String),
    Script { glue_type: GlueType, updated_at: i64 },
}

/// 脚本任务处理器
///
/// 源码写入 `gluesource/{job_id}_{updated_at}{suffix}`，以 `脚本 参数 分片序号 分片总数`
/// 的方式调用解释器，标准输出和错误输出逐行写入执行日志。
pub struct ScriptJobHandler {
    job_id: i64,
    glue_type: GlueType,
    glue_source: String,
    updated_at: i64,
    source_dir: PathBuf,
}

impl ScriptJobHandler {
    pub fn new(
        job_id: i64,
        glue_type: GlueType,
        glue_source: String,
        updated_at: i64,
        source_dir: PathBuf,
    ) -> Self {
        Self {
            job_id,
            glue_type,
            glue_source,
            updated_at,
            source_dir,
        }
    }

    fn script_path(&self) -> SchedulerResult<PathBuf> {
        let suffix = self.glue_type.file_suffix().ok_or_else(|| {
            SchedulerError::InvalidParam(format!("glueType[{:?}] is not valid.", self.glue_type))
        })?;
        Ok(self
            .source_dir
            .join(format!("{}_{}{}", self.job_id, self.updated_at, suffix)))
    }
}

#[async_trait]
impl JobHandler for ScriptJobHandler {
    async fn init(&self) -> SchedulerResult<()> {
        let path = self.script_path()?;
        tokio::fs::create_dir_all(&self.source_dir).await?;
        tokio::fs::write(&path, &self.glue_source).await?;
        Ok(())
    }

    async fn execute(&self, context: &JobContext) -> SchedulerResult<HandleResult> {
        let interpreter = self.glue_type.interpreter().ok_or_else(|| {
            SchedulerError::InvalidParam(format!("glueType[{:?}] is not valid.", self.glue_type))
        })?;
        let script = self.script_path()?;
        if !tokio::fs::try_exists(&script).await? {
            self.init().await?;
        }

        context
            .log(format!("----------- script file: {}", script.display()))
            .await;

        let mut child = Command::new(interpreter)
            .arg(&script)
            .arg(&context.params)
            .arg(context.shard_index.to_string())
            .arg(context.shard_total.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SchedulerError::TaskExecution(format!("启动脚本失败: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SchedulerError::TaskExecution("无法获取stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SchedulerError::TaskExecution("无法获取stderr".to_string()))?;

        let pipe_output = async {
            let mut stdout_lines = BufReader::new(stdout).lines();
            let mut stderr_lines = BufReader::new(stderr).lines();
            let mut stdout_open = true;
            let mut stderr_open = true;
            while stdout_open || stderr_open {
                tokio::select! {
                    line = stdout_lines.next_line(), if stdout_open => match line {
                        Ok(Some(line)) => context.log(line).await,
                        _ => stdout_open = false,
                    },
                    line = stderr_lines.next_line(), if stderr_open => match line {
                        Ok(Some(line)) => context.log(line).await,
                        _ => stderr_open = false,
                    },
                }
            }
            child.wait().await
        };

        let status = tokio::select! {
            status = pipe_output => status
                .map_err(|e| SchedulerError::TaskExecution(format!("等待脚本结束失败: {e}")))?,
            _ = context.cancellation_token.cancelled() => {
                return Ok(HandleResult::fail("script killed"));
            }
        };

        match status.code() {
            Some(0) => Ok(HandleResult::success()),
            code => Ok(HandleResult::fail(format!(
                "script exit value({}) is failed",
                code.unwrap_or(-1)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        async fn execute(&self, context: &JobContext) -> SchedulerResult<HandleResult> {
            Ok(HandleResult::success_with(context.params.clone()))
        }
    }

    fn context(dir: &std::path::Path, params: &str) -> JobContext {
        JobContext::new(
            1,
            42,
            1_709_251_200_000,
            params.to_string(),
            0,
            1,
            Arc::new(JobLogFiles::new(dir)),
        )
    }

    #[tokio::test]
    async fn test_registry_lookup() {
        let registry = HandlerRegistry::new();
        registry.register("echo", Arc::new(EchoHandler));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["echo"]);

        let dir = tempfile::tempdir().unwrap();
        let result = registry
            .get("echo")
            .unwrap()
            .execute(&context(dir.path(), "hi"))
            .await
            .unwrap();
        assert_eq!(result, HandleResult::success_with("hi"));
    }

    #[tokio::test]
    async fn test_context_log_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), "");
        ctx.log("hello").await;
        let files = JobLogFiles::new(dir.path());
        let content = files.read_log(ctx.log_date_time, ctx.log_id, 1).await;
        assert!(content.log_content.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_script_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let ok = ScriptJobHandler::new(
            1,
            GlueType::Shell,
            "echo \"param=$1 shard=$2/$3\"".to_string(),
            1,
            dir.path().join("gluesource"),
        );
        let ctx = context(dir.path(), "abc");
        let result = ok.execute(&ctx).await.unwrap();
        assert_eq!(result.code, SUCCESS_CODE);
        let log = JobLogFiles::new(dir.path())
            .read_log(ctx.log_date_time, ctx.log_id, 1)
            .await;
        assert!(log.log_content.contains("param=abc shard=0/1"));

        let failing = ScriptJobHandler::new(
            2,
            GlueType::Shell,
            "exit 3".to_string(),
            1,
            dir.path().join("gluesource"),
        );
        let result = failing.execute(&context(dir.path(), "")).await.unwrap();
        assert_eq!(result.code, FAIL_CODE);
        assert_eq!(result.msg.as_deref(), Some("script exit value(3) is failed"));
    }
}
