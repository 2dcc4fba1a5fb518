// crates/tavr_workflow/src/events.rs

//! 事件系统
//!
//! 任务生命周期事件由执行任务的工作线程发出，监听器在该线程上同步调用。

use parking_lot::RwLock;
use std::sync::Arc;

use crate::job::{JobId, JobProgress, JobStatus};

/// 工作流事件
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// 任务已提交
    JobSubmitted {
        /// 任务ID
        job_id: JobId,
        /// 任务名称
        name: String,
    },
    /// 任务开始运行
    JobStarted {
        /// 任务ID
        job_id: JobId,
    },
    /// 瓣膜植入完成
    ValveDeployed {
        /// 任务ID
        job_id: JobId,
        /// 瓣口有效半径 [m]
        orifice_radius: f64,
        /// 松弛迭代次数
        iterations: usize,
    },
    /// 时间步已提交
    JobProgress {
        /// 任务ID
        job_id: JobId,
        /// 进度
        progress: JobProgress,
    },
    /// 任务完成
    JobCompleted {
        /// 任务ID
        job_id: JobId,
        /// 运行时长 [s]
        duration_secs: f64,
        /// 时间步总数
        total_steps: usize,
    },
    /// 任务失败
    JobFailed {
        /// 任务ID
        job_id: JobId,
        /// 失败诊断
        error: String,
    },
    /// 任务已取消
    JobCancelled {
        /// 任务ID
        job_id: JobId,
        /// 取消前已提交的步数
        completed_steps: usize,
    },
    /// 状态变更
    JobStatusChanged {
        /// 任务ID
        job_id: JobId,
        /// 旧状态
        old_status: JobStatus,
        /// 新状态
        new_status: JobStatus,
    },
}

impl WorkflowEvent {
    /// 事件所属任务
    pub fn job_id(&self) -> JobId {
        match self {
            Self::JobSubmitted { job_id, .. }
            | Self::JobStarted { job_id }
            | Self::ValveDeployed { job_id, .. }
            | Self::JobProgress { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobCancelled { job_id, .. }
            | Self::JobStatusChanged { job_id, .. } => *job_id,
        }
    }

    /// 事件名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::JobSubmitted { .. } => "JobSubmitted",
            Self::JobStarted { .. } => "JobStarted",
            Self::ValveDeployed { .. } => "ValveDeployed",
            Self::JobProgress { .. } => "JobProgress",
            Self::JobCompleted { .. } => "JobCompleted",
            Self::JobFailed { .. } => "JobFailed",
            Self::JobCancelled { .. } => "JobCancelled",
            Self::JobStatusChanged { .. } => "JobStatusChanged",
        }
    }
}

/// 事件监听器
pub trait EventListener: Send + Sync {
    /// 处理事件
    fn on_event(&self, event: &WorkflowEvent);

    /// 监听器名称（调试用）
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// 闭包监听器
pub struct FnListener<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    name: String,
    handler: F,
}

impl<F> FnListener<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    /// 包装闭包
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> EventListener for FnListener<F>
where
    F: Fn(&WorkflowEvent) + Send + Sync,
{
    fn on_event(&self, event: &WorkflowEvent) {
        (self.handler)(event);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 把事件写入 tracing 日志，逐步进度只在 debug 级别输出
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn on_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::JobSubmitted { job_id, name } => {
                tracing::info!(job = %job_id, name = %name, "任务已提交");
            }
            WorkflowEvent::JobStarted { job_id } => {
                tracing::info!(job = %job_id, "任务开始");
            }
            WorkflowEvent::ValveDeployed {
                job_id,
                orifice_radius,
                iterations,
            } => {
                tracing::info!(
                    job = %job_id,
                    orifice_mm = orifice_radius * 1.0e3,
                    iterations,
                    "瓣膜植入完成"
                );
            }
            WorkflowEvent::JobProgress { job_id, progress } => {
                tracing::debug!(
                    job = %job_id,
                    step = progress.step,
                    total = progress.total_steps,
                    t = progress.sim_time,
                    residual = progress.residual,
                    "时间步已提交"
                );
            }
            WorkflowEvent::JobCompleted {
                job_id,
                duration_secs,
                total_steps,
            } => {
                tracing::info!(job = %job_id, duration_secs, total_steps, "任务完成");
            }
            WorkflowEvent::JobFailed { job_id, error } => {
                tracing::error!(job = %job_id, error = %error, "任务失败");
            }
            WorkflowEvent::JobCancelled {
                job_id,
                completed_steps,
            } => {
                tracing::warn!(job = %job_id, completed_steps, "任务已取消");
            }
            WorkflowEvent::JobStatusChanged {
                job_id,
                old_status,
                new_status,
            } => {
                tracing::debug!(job = %job_id, "状态 {} -> {}", old_status, new_status);
            }
        }
    }

    fn name(&self) -> &str {
        "LoggingListener"
    }
}

/// 事件分发器
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    /// 创建空分发器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加监听器
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        tracing::debug!(listener = listener.name(), "添加事件监听器");
        self.listeners.write().push(listener);
    }

    /// 添加闭包监听器
    pub fn add_fn_listener<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.add_listener(Arc::new(FnListener::new(name, handler)));
    }

    /// 移除监听器
    pub fn remove_listener(&self, listener: &Arc<dyn EventListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// 分发事件
    pub fn emit(&self, event: WorkflowEvent) {
        tracing::trace!(event = event.name(), "分发事件");
        // 先复制监听器列表，监听器内部可以再注册或移除监听器
        let listeners: Vec<_> = self.listeners.read().iter().cloned().collect();
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    /// 监听器数量
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}
