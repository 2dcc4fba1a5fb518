// crates/tavr_physics/src/lib.rs

//! TAVR-FSI Physics Layer
//!
//! 物理层：瓣膜植入、流体与结构求解器、分区流固耦合控制器、血流动力学指标。
//!
//! # 模块概览
//!
//! - [`boundary`]: 入口流量波形、Windkessel 出口、弹性壁面
//! - [`deployment`]: 球囊扩张式瓣膜的准静态植入
//! - [`domain`]: 冻结网格上的求解域（截面分解与瓣膜边界）
//! - [`fluid`]: 准一维轴对称截面流动求解器（Carreau 粘度）
//! - [`structure`]: 薄壁弹性环结构求解器
//! - [`coupling`]: 欠松弛不动点耦合控制器、取消与续算
//! - [`metrics`]: TAWSS/OSI/RRT、跨瓣压差、瓣周漏、冠脉风险、应力统计
//! - [`state`]: 场状态、场历史与收敛记录
//! - [`backend`]: 顺序/批量并行执行后端
//! - [`numerics`]: PCG 与稀疏矩阵
//!
//! # 数据流
//!
//! ```text
//! SimulationParameters ─┬─> deploy ─> VascularMesh(+ValveBoundary)
//!                       │                    │
//!                       └─> CouplingController ── FluidSolver ⇄ StructuralSolver
//!                                            │
//!                                    RunResult{FieldHistory, ConvergenceRecord}
//!                                            │
//!                                     metrics::evaluate
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod boundary;
pub mod coupling;
pub mod deployment;
pub mod domain;
pub mod fluid;
pub mod metrics;
pub mod numerics;
pub mod state;
pub mod structure;

pub use backend::{BackendKind, ExecutionBackend};
pub use boundary::{BoundaryConditionSet, WindkesselCheckpoint};
pub use coupling::{
    CancellationToken, CouplingController, CouplingPhase, FailureKind, RunCheckpoint, RunFailure,
    RunResult, RunStatus, StepProgress,
};
pub use deployment::{deploy, deploy_selected, DeployedValveGeometry, WallGap};
pub use domain::FsiDomain;
pub use fluid::{FluidBoundaryValues, FluidFieldState, FluidSolver};
pub use metrics::{evaluate, HemodynamicReport, MetricsError};
pub use state::{
    ConvergenceEntry, ConvergenceRecord, FieldHistory, FieldState, ResidualSource, SectionFields,
};
pub use structure::{StructuralFieldState, StructuralLoad, StructuralSolver};
