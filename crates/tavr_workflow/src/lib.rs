// crates/tavr_workflow/src/lib.rs

//! TAVR-FSI 工作流层
//!
//! 把物理层的植入、耦合和指标计算封装为可提交、可查询、可取消的分析任务。
//!
//! # 模块结构
//!
//! - [`job`]: 任务ID、状态与进度快照
//! - [`events`]: 生命周期事件与分发
//! - [`analysis`]: 单次分析流水线与报告
//! - [`preflight`]: 提交前的配置与网格检查
//! - [`service`]: `SolverService` 接口与本地线程实现
//! - [`remote`]: JSON 请求/响应报文、服务端与远程客户端
//!
//! # 示例
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tavr_workflow::{AnalysisRequest, LocalSolverService, SolverService};
//!
//! let service = LocalSolverService::new();
//! let id = service.submit(AnalysisRequest::new("patient-07", config, mesh))?;
//! let snapshot = service.wait(id, Duration::from_secs(600))?;
//! let report = service.result(id)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod error;
pub mod events;
pub mod job;
pub mod preflight;
pub mod remote;
pub mod service;

use std::sync::Arc;

use tavr_config::ExecutionSettings;

pub use analysis::{Analysis, AnalysisRequest, RunReport};
pub use error::{WorkflowError, WorkflowResult};
pub use events::{EventDispatcher, EventListener, FnListener, LoggingListener, WorkflowEvent};
pub use job::{JobId, JobProgress, JobSnapshot, JobStatus};
pub use preflight::preflight;
pub use remote::{
    LoopbackTransport, RemoteFault, RemoteSolverClient, ServiceRequest, ServiceResponse, SolverServer,
    Transport,
};
pub use service::{LocalSolverService, SolverService};

/// 按执行设置选择服务
///
/// 启用远程执行时，请求经过 JSON 报文边界送入进程内服务端，
/// 调用方拿到的状态机与本地服务相同。返回的本地服务用于注册事件监听。
pub fn service_for(
    execution: &ExecutionSettings,
) -> (Box<dyn SolverService>, LocalSolverService) {
    let local = LocalSolverService::new();
    if execution.remote_solver_enabled {
        let server = Arc::new(SolverServer::new(local.clone()));
        let client = RemoteSolverClient::new(LoopbackTransport::new(server));
        (Box::new(client), local)
    } else {
        (Box::new(local.clone()), local)
    }
}
