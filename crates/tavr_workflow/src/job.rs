// crates/tavr_workflow/src/job.rs

//! 分析任务的标识、状态与进度快照

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use tavr_physics::StepProgress;

/// 任务ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// 生成新的任务ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// 内部 UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// 任务状态
///
/// ```text
/// Pending ──> Running ──┬──> Completed
///    │                  ├──> Failed
///    └──────────────────┴──> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// 已提交，尚未开始
    Pending,
    /// 运行中
    Running,
    /// 全部时间步完成
    Completed,
    /// 植入或耦合失败
    Failed,
    /// 被取消（保留部分结果）
    Cancelled,
}

impl JobStatus {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// 是否还能取消
    pub fn can_cancel(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

/// 任务进度
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JobProgress {
    /// 已提交时间步
    pub step: usize,
    /// 总时间步
    pub total_steps: usize,
    /// 模拟时间 [s]
    pub sim_time: f64,
    /// 最近一步的组合残差
    pub residual: f64,
    /// 最近一步的耦合迭代数
    pub iterations: usize,
}

impl JobProgress {
    /// 完成比例 [0, 1]
    pub fn fraction(&self) -> f64 {
        if self.total_steps == 0 {
            0.0
        } else {
            (self.step as f64 / self.total_steps as f64).clamp(0.0, 1.0)
        }
    }
}

impl From<&StepProgress> for JobProgress {
    fn from(p: &StepProgress) -> Self {
        Self {
            step: p.step,
            total_steps: p.total_steps,
            sim_time: p.time,
            residual: p.residual,
            iterations: p.iterations,
        }
    }
}

/// 任务状态快照（`poll` 的返回值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// 任务ID
    pub id: JobId,
    /// 任务名称
    pub name: String,
    /// 状态
    pub status: JobStatus,
    /// 进度
    pub progress: JobProgress,
    /// 提交时间
    pub submitted_at: DateTime<Utc>,
    /// 开始时间
    pub started_at: Option<DateTime<Utc>>,
    /// 结束时间
    pub finished_at: Option<DateTime<Utc>>,
    /// 失败诊断或取消说明
    pub message: Option<String>,
}

impl JobSnapshot {
    /// 新提交的任务
    pub fn pending(id: JobId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            message: None,
        }
    }

    /// 运行时长 [s]（未开始时为 `None`）
    pub fn elapsed_secs(&self) -> Option<f64> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Running.can_cancel());
        assert!(!JobStatus::Completed.can_cancel());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert_eq!(serde_json::to_string(&JobStatus::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn test_progress_fraction() {
        let p = JobProgress {
            step: 5,
            total_steps: 20,
            ..Default::default()
        };
        assert_eq!(p.fraction(), 0.25);
        assert_eq!(JobProgress::default().fraction(), 0.0);
    }

    #[test]
    fn test_pending_snapshot_has_no_elapsed_time() {
        let snapshot = JobSnapshot::pending(JobId::new(), "demo");
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert!(snapshot.elapsed_secs().is_none());
    }
}
