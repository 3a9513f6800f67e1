use casebridge_core::error::{ApiError, CoreError};

/// Failure of a pipeline stage.
///
/// Stages log and count most failures themselves; this type only reaches
/// the orchestrator when a whole stage cannot continue.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
