// crates/tavr_workflow/src/service.rs

//! 求解服务
//!
//! [`SolverService`] 是提交/查询/取结果/取消四个操作的统一接口，
//! 本地实现与远程客户端共享同一状态机：
//!
//! - `submit` 同步执行建立阶段校验，失败直接返回错误，不创建任务
//! - 植入不收敛或耦合失败使任务进入 `Failed`，诊断写入快照的 `message`
//! - 取消只在时间步边界生效，已提交的结果保留在报告中

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use tavr_physics::CancellationToken;

use crate::analysis::{Analysis, AnalysisRequest, RunReport};
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{EventDispatcher, WorkflowEvent};
use crate::job::{JobId, JobProgress, JobSnapshot, JobStatus};

/// `wait` 的轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 求解服务接口
pub trait SolverService: Send + Sync {
    /// 提交分析，返回任务ID
    fn submit(&self, request: AnalysisRequest) -> WorkflowResult<JobId>;

    /// 查询任务状态
    fn poll(&self, id: JobId) -> WorkflowResult<JobSnapshot>;

    /// 取结果，任务未结束或没有产生报告时返回 `None`
    fn result(&self, id: JobId) -> WorkflowResult<Option<RunReport>>;

    /// 请求取消，返回请求时的状态
    fn cancel(&self, id: JobId) -> WorkflowResult<JobStatus>;

    /// 阻塞等待任务结束
    fn wait(&self, id: JobId, timeout: Duration) -> WorkflowResult<JobSnapshot> {
        let start = Instant::now();
        loop {
            let snapshot = self.poll(id)?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            if start.elapsed() >= timeout {
                return Err(WorkflowError::Timeout {
                    job: id,
                    waited_ms: start.elapsed().as_millis(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

// ============================================================
// 本地服务
// ============================================================

struct JobEntry {
    snapshot: JobSnapshot,
    token: CancellationToken,
    report: Option<RunReport>,
}

struct ServiceInner {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    events: EventDispatcher,
}

impl ServiceInner {
    /// 修改任务快照；状态变化时在释放锁后发出事件
    fn update<F>(&self, id: JobId, f: F)
    where
        F: FnOnce(&mut JobEntry),
    {
        let change = {
            let mut jobs = self.jobs.write();
            match jobs.get_mut(&id) {
                Some(entry) => {
                    let old = entry.snapshot.status;
                    f(entry);
                    (old != entry.snapshot.status).then_some((old, entry.snapshot.status))
                }
                None => None,
            }
        };
        if let Some((old_status, new_status)) = change {
            self.events.emit(WorkflowEvent::JobStatusChanged {
                job_id: id,
                old_status,
                new_status,
            });
        }
    }

    fn run_job(self: Arc<Self>, id: JobId, analysis: Analysis, token: CancellationToken) {
        self.update(id, |entry| {
            entry.snapshot.status = JobStatus::Running;
            entry.snapshot.started_at = Some(Utc::now());
            entry.snapshot.progress.total_steps = analysis.params().time().total_steps();
        });
        self.events.emit(WorkflowEvent::JobStarted { job_id: id });

        let progress_sink = Arc::clone(&self);
        let outcome = analysis.execute(
            &token,
            |geometry| {
                self.events.emit(WorkflowEvent::ValveDeployed {
                    job_id: id,
                    orifice_radius: geometry.orifice_radius,
                    iterations: geometry.iterations(),
                });
            },
            move |step| {
                let progress = JobProgress::from(step);
                progress_sink.update(id, |entry| entry.snapshot.progress = progress);
                progress_sink.events.emit(WorkflowEvent::JobProgress {
                    job_id: id,
                    progress,
                });
            },
        );

        match outcome {
            Ok(report) => {
                let steps = report.completed_steps();
                let (status, event, message) = if report.is_completed() {
                    (
                        JobStatus::Completed,
                        WorkflowEvent::JobCompleted {
                            job_id: id,
                            duration_secs: report.duration_secs(),
                            total_steps: steps,
                        },
                        report.metrics_error.clone(),
                    )
                } else if report.is_cancelled() {
                    let message = report.failure.as_ref().map(|f| f.to_string());
                    (
                        JobStatus::Cancelled,
                        WorkflowEvent::JobCancelled {
                            job_id: id,
                            completed_steps: steps,
                        },
                        message,
                    )
                } else {
                    let message = report
                        .failure
                        .as_ref()
                        .map_or_else(|| "耦合运行失败".to_string(), |f| f.to_string());
                    (
                        JobStatus::Failed,
                        WorkflowEvent::JobFailed {
                            job_id: id,
                            error: message.clone(),
                        },
                        Some(message),
                    )
                };
                self.update(id, |entry| {
                    entry.snapshot.status = status;
                    entry.snapshot.finished_at = Some(Utc::now());
                    entry.snapshot.message = message;
                    entry.report = Some(report);
                });
                self.events.emit(event);
            }
            Err(e) => {
                let message = e.to_string();
                self.update(id, |entry| {
                    entry.snapshot.status = JobStatus::Failed;
                    entry.snapshot.finished_at = Some(Utc::now());
                    entry.snapshot.message = Some(message.clone());
                });
                self.events.emit(WorkflowEvent::JobFailed {
                    job_id: id,
                    error: message,
                });
            }
        }
    }
}

/// 本地求解服务：每个任务一个工作线程，克隆后共享任务表
#[derive(Clone)]
pub struct LocalSolverService {
    inner: Arc<ServiceInner>,
}

impl Default for LocalSolverService {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSolverService {
    /// 创建服务
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                jobs: RwLock::new(HashMap::new()),
                events: EventDispatcher::new(),
            }),
        }
    }

    /// 事件分发器
    pub fn events(&self) -> &EventDispatcher {
        &self.inner.events
    }

    /// 所有任务的快照
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<_> = self
            .inner
            .jobs
            .read()
            .values()
            .map(|e| e.snapshot.clone())
            .collect();
        snapshots.sort_by_key(|s| s.submitted_at);
        snapshots
    }
}

impl SolverService for LocalSolverService {
    fn submit(&self, request: AnalysisRequest) -> WorkflowResult<JobId> {
        let analysis = Analysis::prepare(request)?;
        let id = JobId::new();
        let name = analysis.name().to_string();
        let token = CancellationToken::new();

        self.inner.jobs.write().insert(
            id,
            JobEntry {
                snapshot: JobSnapshot::pending(id, name.clone()),
                token: token.clone(),
                report: None,
            },
        );
        info!(job = %id, name = %name, "提交分析任务");
        self.inner.events.emit(WorkflowEvent::JobSubmitted { job_id: id, name });

        let inner = Arc::clone(&self.inner);
        thread::Builder::new()
            .name(format!("tavr-job-{}", id))
            .spawn(move || inner.run_job(id, analysis, token))
            .map_err(|e| WorkflowError::Transport(format!("无法启动工作线程: {}", e)))?;
        Ok(id)
    }

    fn poll(&self, id: JobId) -> WorkflowResult<JobSnapshot> {
        self.inner
            .jobs
            .read()
            .get(&id)
            .map(|e| e.snapshot.clone())
            .ok_or(WorkflowError::NotFound(id))
    }

    fn result(&self, id: JobId) -> WorkflowResult<Option<RunReport>> {
        let jobs = self.inner.jobs.read();
        let entry = jobs.get(&id).ok_or(WorkflowError::NotFound(id))?;
        Ok(entry.report.clone())
    }

    fn cancel(&self, id: JobId) -> WorkflowResult<JobStatus> {
        let jobs = self.inner.jobs.read();
        let entry = jobs.get(&id).ok_or(WorkflowError::NotFound(id))?;
        let status = entry.snapshot.status;
        if !status.can_cancel() {
            return Err(WorkflowError::InvalidState {
                job: id,
                status,
                action: "取消".into(),
            });
        }
        entry.token.cancel();
        debug!(job = %id, status = %status, "已请求取消");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_job() {
        let service = LocalSolverService::new();
        let id = JobId::new();
        assert!(matches!(service.poll(id), Err(WorkflowError::NotFound(_))));
        assert!(matches!(service.result(id), Err(WorkflowError::NotFound(_))));
        assert!(matches!(service.cancel(id), Err(WorkflowError::NotFound(_))));
        assert!(service.list().is_empty());
    }
}
