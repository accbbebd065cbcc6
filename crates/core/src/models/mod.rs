pub mod job;
pub mod job_log;
pub mod registry;
pub mod rpc;

pub use job::{
    AddressType, BlockStrategy, GlueType, JobGroup, JobInfo, RouteStrategy, ShardingParam,
    TriggerType,
};
pub use job_log::{AlarmStatus, JobLog};
pub use registry::{RegistryEntry, RegistryGroup};
pub use rpc::{
    truncate_handle_msg, HandleCallbackParam, IdleBeatParam, KillParam, LogParam, LogResult,
    RegistryParam, RpcResponse, TriggerParam, ACCESS_TOKEN_HEADER, FAIL_CODE, SUCCESS_CODE,
    TIMEOUT_CODE,
};
