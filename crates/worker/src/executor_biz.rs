use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use scheduler_core::{
    models::{
        BlockStrategy, IdleBeatParam, KillParam, LogParam, LogResult, RpcResponse, TriggerParam,
    },
    traits::ExecutorBiz,
    SchedulerResult,
};

use crate::handler::{HandlerKey, HandlerRegistry, JobHandler, ScriptJobHandler};
use crate::job_log::JobLogFiles;
use crate::job_thread::JobThreadRepository;

const CHANGE_HANDLER_REASON: &str = "change jobhandler or glue type, and terminate the old job thread.";
const KILL_REASON: &str = "scheduling center kill job.";

/// 执行器侧RPC实现
pub struct ExecutorBizImpl {
    handlers: Arc<HandlerRegistry>,
    threads: Arc<JobThreadRepository>,
    log_files: Arc<JobLogFiles>,
}

impl ExecutorBizImpl {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        threads: Arc<JobThreadRepository>,
        log_files: Arc<JobLogFiles>,
    ) -> Self {
        Self {
            handlers,
            threads,
            log_files,
        }
    }

    fn handler_key(param: &TriggerParam) -> HandlerKey {
        if param.glue_type.is_script() {
            HandlerKey::Script {
                glue_type: param.glue_type,
                updated_at: param.glue_updatetime,
            }
        } else {
            HandlerKey::Bean(param.executor_handler.clone())
        }
    }

    fn build_handler(&self, param: &TriggerParam) -> Result<Arc<dyn JobHandler>, String> {
        if param.glue_type.is_script() {
            return Ok(Arc::new(ScriptJobHandler::new(
                param.job_id,
                param.glue_type,
                param.glue_source.clone(),
                param.glue_updatetime,
                self.log_files.glue_source_dir(),
            )));
        }
        self.handlers
            .get(&param.executor_handler)
            .ok_or_else(|| format!("job handler [{}] not found.", param.executor_handler))
    }
}

#[async_trait]
impl ExecutorBiz for ExecutorBizImpl {
    async fn beat(&self) -> SchedulerResult<RpcResponse<String>> {
        Ok(RpcResponse::success())
    }

    async fn idle_beat(&self, param: IdleBeatParam) -> SchedulerResult<RpcResponse<String>> {
        let busy = self
            .threads
            .get(param.job_id)
            .is_some_and(|t| t.is_running_or_has_queue());
        if busy {
            return Ok(RpcResponse::fail("job thread is running or has trigger queue."));
        }
        Ok(RpcResponse::success())
    }

    async fn run(&self, param: TriggerParam) -> SchedulerResult<RpcResponse<String>> {
        let key = Self::handler_key(&param);
        let mut thread = self.threads.get(param.job_id);
        let mut replace_reason = None;

        if thread.as_ref().is_some_and(|t| t.handler_key() != &key) {
            replace_reason = Some(CHANGE_HANDLER_REASON.to_string());
            thread = None;
        }

        if let Some(existing) = thread.as_ref() {
            match param.executor_block_strategy {
                BlockStrategy::DiscardLater if existing.is_running_or_has_queue() => {
                    debug!("丢弃后续调度: job_id={}, log_id={}", param.job_id, param.log_id);
                    return Ok(RpcResponse::fail(format!(
                        "block strategy effect：{}",
                        BlockStrategy::DiscardLater.title()
                    )));
                }
                BlockStrategy::CoverEarly if existing.is_running_or_has_queue() => {
                    replace_reason = Some(format!(
                        "block strategy effect：{}",
                        BlockStrategy::CoverEarly.title()
                    ));
                    thread = None;
                }
                _ => {}
            }
        }

        let thread = match thread {
            Some(thread) => thread,
            None => {
                let handler = match self.build_handler(&param) {
                    Ok(handler) => handler,
                    Err(msg) => return Ok(RpcResponse::fail(msg)),
                };
                if let Some(reason) = replace_reason.as_deref() {
                    info!("替换任务线程: job_id={}, reason={}", param.job_id, reason);
                }
                self.threads
                    .register(param.job_id, handler, key, replace_reason.as_deref())
            }
        };

        Ok(thread.push(param))
    }

    async fn kill(&self, param: KillParam) -> SchedulerResult<RpcResponse<String>> {
        if self.threads.remove(param.job_id, KILL_REASON).is_some() {
            info!("任务线程已终止: job_id={}", param.job_id);
            return Ok(RpcResponse::success());
        }
        Ok(RpcResponse::success_msg("job thread already killed."))
    }

    async fn log(&self, param: LogParam) -> SchedulerResult<RpcResponse<LogResult>> {
        let result = self
            .log_files
            .read_log(param.log_date_time, param.log_id, param.from_line_num)
            .await;
        Ok(RpcResponse::success_with(result))
    }
}
