// crates/tavr_physics/src/coupling/outcome.rs

//! 运行结果、失败诊断与续算检查点

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::boundary::WindkesselCheckpoint;
use crate::state::{ConvergenceRecord, FieldHistory, FieldState};

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouplingPhase {
    /// 建立初始场
    Initializing,
    /// 时间步进
    Stepping,
    /// 步内耦合迭代
    Converging,
    /// 提交已收敛的时间步
    Advancing,
    /// 正常结束
    Completed,
    /// 失败（含取消）
    Failed,
}

impl CouplingPhase {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// 运行终止状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// 全部时间步完成
    Completed,
    /// 失败或取消，历史保留到最后一个已提交步
    Failed,
}

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// 流体求解发散
    FluidDivergence,
    /// 结构求解发散
    StructuralDivergence,
    /// 耦合迭代达到上限仍未收敛
    CouplingNonConvergence,
    /// 被取消
    Cancelled,
    /// 已收敛的时间步无法提交（场历史拒绝快照）
    Internal,
}

impl FailureKind {
    /// 对应的求解组件名称
    pub fn component(&self) -> &'static str {
        match self {
            Self::FluidDivergence => "流体求解器",
            Self::StructuralDivergence => "结构求解器",
            Self::CouplingNonConvergence => "耦合控制器",
            Self::Cancelled => "用户",
            Self::Internal => "场历史",
        }
    }
}

/// 失败诊断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    /// 类型
    pub kind: FailureKind,
    /// 失败的时间步（从 0 开始）
    pub step: usize,
    /// 失败步的目标时间 [s]
    pub time: f64,
    /// 可读诊断信息
    pub message: String,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 在第 {} 步 (t={:.4} s) 失败: {}",
            self.kind.component(),
            self.step,
            self.time,
            self.message
        )
    }
}

/// 续算检查点：最后一个已提交状态 + Windkessel 状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    /// 已提交步数
    pub step: usize,
    /// 模拟时间 [s]
    pub time: f64,
    /// 最后一个已提交的场
    pub state: FieldState,
    /// 出口状态
    pub windkessel: WindkesselCheckpoint,
}

/// 单步进度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    /// 已提交步数
    pub step: usize,
    /// 总步数
    pub total_steps: usize,
    /// 模拟时间 [s]
    pub time: f64,
    /// 本步耦合迭代次数
    pub iterations: usize,
    /// 本步最终组合残差
    pub residual: f64,
    /// 本步使用的尝试次数
    pub attempt: u8,
}

impl StepProgress {
    /// 完成比例 [0, 1]
    pub fn fraction(&self) -> f64 {
        if self.total_steps == 0 {
            1.0
        } else {
            (self.step as f64 / self.total_steps as f64).clamp(0.0, 1.0)
        }
    }
}

/// 一次运行的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// 终止状态
    pub status: RunStatus,
    /// 场历史
    pub history: FieldHistory,
    /// 收敛记录
    pub record: ConvergenceRecord,
    /// 失败诊断（`Completed` 时为 `None`）
    pub failure: Option<RunFailure>,
    /// 最终出口状态
    pub windkessel: WindkesselCheckpoint,
    /// 可用于续算的检查点
    pub checkpoint: RunCheckpoint,
}

impl RunResult {
    /// 是否正常完成
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// 是否因取消而终止
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.failure, Some(f) if f.kind == FailureKind::Cancelled)
    }
}
