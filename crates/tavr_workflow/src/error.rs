// crates/tavr_workflow/src/error.rs

//! 工作流错误

use std::borrow::Cow;
use tavr_foundation::TavrError;
use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// 工作流结果类型
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// 工作流错误
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// 任务不存在
    #[error("任务不存在: {0}")]
    NotFound(JobId),

    /// 任务状态不允许该操作
    #[error("任务 {job} 处于 {status} 状态，无法{action}")]
    InvalidState {
        /// 任务ID
        job: JobId,
        /// 当前状态
        status: JobStatus,
        /// 请求的操作
        action: Cow<'static, str>,
    },

    /// 等待超时
    #[error("等待任务 {job} 超时 ({waited_ms} ms)")]
    Timeout {
        /// 任务ID
        job: JobId,
        /// 已等待的毫秒数
        waited_ms: u128,
    },

    /// 建立或植入阶段的模拟错误
    #[error(transparent)]
    Simulation(#[from] TavrError),

    /// 远端拒绝了请求
    #[error("远端拒绝请求: {0}")]
    Rejected(String),

    /// 请求/响应报文错误
    #[error("协议错误: {0}")]
    Protocol(String),

    /// 传输层错误
    #[error("传输错误: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<WorkflowError> for TavrError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Simulation(inner) => inner,
            WorkflowError::Protocol(message) => TavrError::serialization(message),
            other => TavrError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_error_passes_through() {
        let err = WorkflowError::from(TavrError::invalid_configuration(
            "simulation.time_step",
            -1.0,
            "必须为正",
        ));
        assert!(err.to_string().contains("simulation.time_step"));
        let back: TavrError = err.into();
        assert!(back.is_setup_error());
    }

    #[test]
    fn test_protocol_error_maps_to_serialization() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        let back: TavrError = WorkflowError::from(parse).into();
        assert!(matches!(back, TavrError::Serialization { .. }));
    }
}
