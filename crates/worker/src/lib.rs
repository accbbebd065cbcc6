//! 执行器
//!
//! 接收调度中心的调度请求，按任务id串行执行，并把执行结果回调给调度中心。

pub mod callback;
pub mod executor;
pub mod executor_biz;
pub mod handler;
pub mod job_log;
pub mod job_thread;
pub mod registry_thread;
pub mod retry_store;

pub use callback::CallbackPipeline;
pub use executor::JobExecutor;
pub use executor_biz::ExecutorBizImpl;
pub use handler::{HandleResult, HandlerKey, HandlerRegistry, JobContext, JobHandler, ScriptJobHandler};
pub use job_log::JobLogFiles;
pub use job_thread::{JobThread, JobThreadDeps, JobThreadRepository};
pub use registry_thread::ExecutorRegistryThread;
pub use retry_store::CallbackRetryStore;
