//! GitHub check runs: the only user-facing channel for deployment progress.

pub mod cache;
pub mod model;

pub use cache::CheckRunCache;
pub use model::{
    ActionId, CHECK_RUN_TITLE_PREFIX, CheckRunAction, CheckRunExternalId, CheckRunRequest,
    CheckRunResponse, CheckRunState, CheckRunStatus, CreateCheckRunRequest, UpdateCheckRunRequest,
    build_check_run_title,
};
