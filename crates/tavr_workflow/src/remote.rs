// crates/tavr_workflow/src/remote.rs

//! 请求/响应边界上的远程求解
//!
//! 报文是 JSON 编码的 [`ServiceRequest`] / [`ServiceResponse`]。
//! [`SolverServer`] 在服务端把请求分派给本地服务，[`RemoteSolverClient`]
//! 通过任意 [`Transport`] 把同一组操作暴露为 [`SolverService`]。
//! 服务端的错误编码为带 [`RemoteFault`] 的 `Error` 响应，客户端还原为同类的
//! [`WorkflowError`]，建立阶段错误在远端仍是同一个 [`TavrError`] 变体。

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tavr_foundation::TavrError;
use tracing::{trace, warn};

use crate::analysis::{AnalysisRequest, RunReport};
use crate::error::{WorkflowError, WorkflowResult};
use crate::job::{JobId, JobSnapshot, JobStatus};
use crate::service::{LocalSolverService, SolverService};

/// 请求报文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServiceRequest {
    /// 提交分析
    Submit {
        /// 分析请求
        request: Box<AnalysisRequest>,
    },
    /// 查询状态
    Poll {
        /// 任务ID
        job: JobId,
    },
    /// 取结果
    Result {
        /// 任务ID
        job: JobId,
    },
    /// 取消
    Cancel {
        /// 任务ID
        job: JobId,
    },
}

/// 错误响应携带的故障分类
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum RemoteFault {
    /// 模拟错误，保留原始类型
    Simulation {
        /// 原始错误
        error: TavrError,
    },
    /// 任务不存在
    NotFound {
        /// 任务ID
        job: JobId,
    },
    /// 任务状态不允许该操作
    InvalidState {
        /// 任务ID
        job: JobId,
        /// 当前状态
        status: JobStatus,
        /// 请求的操作
        action: String,
    },
    /// 其它服务端错误，只保留诊断信息
    Other {
        /// 诊断信息
        message: String,
    },
}

impl From<WorkflowError> for RemoteFault {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Simulation(error) => Self::Simulation { error },
            WorkflowError::NotFound(job) => Self::NotFound { job },
            WorkflowError::InvalidState {
                job,
                status,
                action,
            } => Self::InvalidState {
                job,
                status,
                action: action.into_owned(),
            },
            other => Self::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<RemoteFault> for WorkflowError {
    fn from(fault: RemoteFault) -> Self {
        match fault {
            RemoteFault::Simulation { error } => Self::Simulation(error),
            RemoteFault::NotFound { job } => Self::NotFound(job),
            RemoteFault::InvalidState {
                job,
                status,
                action,
            } => Self::InvalidState {
                job,
                status,
                action: action.into(),
            },
            RemoteFault::Other { message } => Self::Rejected(message),
        }
    }
}

/// 响应报文
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceResponse {
    /// 已接受
    Submitted {
        /// 新任务ID
        job: JobId,
    },
    /// 状态快照
    Status {
        /// 快照
        snapshot: JobSnapshot,
    },
    /// 结果
    Report {
        /// 报告（任务未结束时为 `None`）
        report: Option<Box<RunReport>>,
    },
    /// 取消请求已记录
    CancelRequested {
        /// 请求时的状态
        status: JobStatus,
    },
    /// 请求失败
    Error {
        /// 诊断信息
        message: String,
        /// 故障分类
        fault: RemoteFault,
    },
}

// ============================================================
// 服务端
// ============================================================

/// 服务端：解码请求并分派给本地服务
#[derive(Clone, Default)]
pub struct SolverServer {
    service: LocalSolverService,
}

impl SolverServer {
    /// 包装本地服务
    pub fn new(service: LocalSolverService) -> Self {
        Self { service }
    }

    /// 底层服务
    pub fn service(&self) -> &LocalSolverService {
        &self.service
    }

    /// 处理一条已解码的请求
    pub fn handle(&self, request: ServiceRequest) -> ServiceResponse {
        let outcome = match request {
            ServiceRequest::Submit { request } => self
                .service
                .submit(*request)
                .map(|job| ServiceResponse::Submitted { job }),
            ServiceRequest::Poll { job } => self
                .service
                .poll(job)
                .map(|snapshot| ServiceResponse::Status { snapshot }),
            ServiceRequest::Result { job } => self.service.result(job).map(|report| {
                ServiceResponse::Report {
                    report: report.map(Box::new),
                }
            }),
            ServiceRequest::Cancel { job } => self
                .service
                .cancel(job)
                .map(|status| ServiceResponse::CancelRequested { status }),
        };
        outcome.unwrap_or_else(|e| {
            warn!(error = %e, "远程请求失败");
            ServiceResponse::Error {
                message: e.to_string(),
                fault: e.into(),
            }
        })
    }

    /// 处理一条 JSON 报文，返回 JSON 响应
    pub fn handle_json(&self, payload: &str) -> String {
        let response = match serde_json::from_str::<ServiceRequest>(payload) {
            Ok(request) => self.handle(request),
            Err(e) => {
                let message = format!("无法解析请求: {}", e);
                ServiceResponse::Error {
                    fault: RemoteFault::Other {
                        message: message.clone(),
                    },
                    message,
                }
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            // 编码失败时仍返回合法的错误报文
            format!(
                r#"{{"kind":"error","message":"{0}","fault":{{"category":"other","message":"{0}"}}}}"#,
                format!("无法编码响应: {}", e).replace('"', "'")
            )
        })
    }
}

// ============================================================
// 传输与客户端
// ============================================================

/// 报文传输
pub trait Transport: Send + Sync {
    /// 发送一条请求报文并返回响应报文
    fn exchange(&self, payload: &str) -> WorkflowResult<String>;
}

/// 进程内回环传输，直接调用服务端
#[derive(Clone)]
pub struct LoopbackTransport {
    server: Arc<SolverServer>,
}

impl LoopbackTransport {
    /// 连接到服务端
    pub fn new(server: Arc<SolverServer>) -> Self {
        Self { server }
    }
}

impl Transport for LoopbackTransport {
    fn exchange(&self, payload: &str) -> WorkflowResult<String> {
        Ok(self.server.handle_json(payload))
    }
}

/// 远程客户端
pub struct RemoteSolverClient<T: Transport> {
    transport: T,
}

impl<T: Transport> RemoteSolverClient<T> {
    /// 使用给定传输
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn call(&self, request: &ServiceRequest) -> WorkflowResult<ServiceResponse> {
        let payload = serde_json::to_string(request)?;
        trace!(bytes = payload.len(), "发送请求");
        let reply = self.transport.exchange(&payload)?;
        match serde_json::from_str(&reply)? {
            ServiceResponse::Error { message, fault } => {
                trace!(message = %message, "远端返回错误");
                Err(fault.into())
            }
            response => Ok(response),
        }
    }
}

fn unexpected(response: ServiceResponse) -> WorkflowError {
    WorkflowError::Protocol(format!("意外的响应: {:?}", response))
}

impl<T: Transport> SolverService for RemoteSolverClient<T> {
    fn submit(&self, request: AnalysisRequest) -> WorkflowResult<JobId> {
        let request = ServiceRequest::Submit {
            request: Box::new(request),
        };
        match self.call(&request)? {
            ServiceResponse::Submitted { job } => Ok(job),
            other => Err(unexpected(other)),
        }
    }

    fn poll(&self, id: JobId) -> WorkflowResult<JobSnapshot> {
        match self.call(&ServiceRequest::Poll { job: id })? {
            ServiceResponse::Status { snapshot } => Ok(snapshot),
            other => Err(unexpected(other)),
        }
    }

    fn result(&self, id: JobId) -> WorkflowResult<Option<RunReport>> {
        match self.call(&ServiceRequest::Result { job: id })? {
            ServiceResponse::Report { report } => Ok(report.map(|r| *r)),
            other => Err(unexpected(other)),
        }
    }

    fn cancel(&self, id: JobId) -> WorkflowResult<JobStatus> {
        match self.call(&ServiceRequest::Cancel { job: id })? {
            ServiceResponse::CancelRequested { status } => Ok(status),
            other => Err(unexpected(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_envelope_is_tagged() {
        let job = JobId::new();
        let json = serde_json::to_string(&ServiceRequest::Poll { job }).unwrap();
        assert!(json.contains(r#""op":"poll""#), "{}", json);
        let back: ServiceRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ServiceRequest::Poll { job });
    }

    #[test]
    fn test_malformed_payload_yields_error_response() {
        let server = SolverServer::default();
        let reply = server.handle_json("{\"op\":\"launch\"}");
        let response: ServiceResponse = serde_json::from_str(&reply).unwrap();
        assert!(matches!(response, ServiceResponse::Error { .. }));
    }

    #[test]
    fn test_unknown_job_keeps_its_kind_remotely() {
        let server = Arc::new(SolverServer::default());
        let client = RemoteSolverClient::new(LoopbackTransport::new(server));
        let id = JobId::new();
        let err = client.poll(id).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(job) if job == id), "{:?}", err);
    }
}
