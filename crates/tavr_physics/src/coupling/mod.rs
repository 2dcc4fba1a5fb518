// crates/tavr_physics/src/coupling/mod.rs

//! 流固耦合控制器
//!
//! 分区式 Dirichlet–Neumann 不动点耦合，壁面位移按常数松弛因子欠松弛：
//!
//! ```text
//! Initializing ─> Stepping ─┬─> Converging ─> Advancing ─┐
//!                           └───────────<────────────────┘
//!                           ├─> Completed
//!                           └─> Failed（发散 / 取消）
//! ```
//!
//! 每个时间步内反复调用流体求解器与结构求解器，直到组合残差（流体压力
//! 相对变化 + 壁面位移相对变化）低于收敛残差。某一步失败时以减半的松弛
//! 因子重试一次，仍失败则运行进入 `Failed`，收敛记录完整保留。
//! 同一步内流体与结构都发散时以流体诊断为准。
//!
//! 控制器独占场状态与收敛记录，终止后一次性移交给 [`RunResult`]。

mod cancel;
mod outcome;

pub use cancel::CancellationToken;
pub use outcome::{
    CouplingPhase, FailureKind, RunCheckpoint, RunFailure, RunResult, RunStatus, StepProgress,
};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use tavr_config::SimulationParameters;
use tavr_foundation::error::{TavrError, TavrResult};
use tavr_mesh::VascularMesh;

use crate::backend::ExecutionBackend;
use crate::boundary::BoundaryConditionSet;
use crate::domain::FsiDomain;
use crate::fluid::{FluidBoundaryValues, FluidFieldState, FluidSolver};
use crate::state::{
    ConvergenceEntry, ConvergenceRecord, FieldHistory, FieldState, ResidualSource, SectionFields,
};
use crate::structure::{StructuralFieldState, StructuralLoad, StructuralSolver};

/// 每个时间步的最大尝试次数（首次 + 一次重试）
const MAX_ATTEMPTS: u8 = 2;

/// 入口流量低于峰值的该比例时视为瓣膜关闭
const VALVE_CLOSED_FRACTION: f64 = 0.05;

/// 估计峰值流量时每周期的采样数
const PEAK_SAMPLES: usize = 512;

/// 进度回调
pub type ProgressCallback = Box<dyn FnMut(&StepProgress) + Send>;

/// 一次尝试收敛后的结果
struct ConvergedStep {
    fluid: FluidFieldState,
    structural: StructuralFieldState,
    displacement: Vec<f64>,
    iterations: usize,
    residual: f64,
}

/// 一次尝试的结果及其收敛记录
struct Attempt {
    entries: Vec<ConvergenceEntry>,
    outcome: Result<ConvergedStep, (FailureKind, String)>,
}

/// 时间步内固定的边界输入
#[derive(Debug, Clone, Copy)]
struct StepInputs {
    step: usize,
    time: f64,
    dt: f64,
    inflow: f64,
    outlet_pressure: f64,
    valve_closed: bool,
}

/// 流固耦合控制器
pub struct CouplingController {
    params: Arc<SimulationParameters>,
    domain: Arc<FsiDomain>,
    boundaries: BoundaryConditionSet,
    fluid: FluidSolver,
    structure: StructuralSolver,
    phase: CouplingPhase,
    state: FieldState,
    history: FieldHistory,
    record: ConvergenceRecord,
    peak_inflow: f64,
    length_scale: f64,
    progress: Option<ProgressCallback>,
}

impl CouplingController {
    /// 建立控制器，初始场为静止流动与零位移
    ///
    /// 网格应已完成瓣膜植入，此后只读共享。
    pub fn new(
        params: Arc<SimulationParameters>,
        mesh: Arc<VascularMesh>,
        boundaries: BoundaryConditionSet,
    ) -> TavrResult<Self> {
        let backend = ExecutionBackend::from_settings(params.execution())?;
        let domain = Arc::new(FsiDomain::new(mesh, params.execution().axial_sections)?);
        let fluid = FluidSolver::new(&params, backend);
        let structure = StructuralSolver::new(&params, boundaries.wall);

        let state = FieldState::at_rest(
            &domain,
            boundaries.outlet.outlet_pressure(),
            fluid.radial_cells(),
        );

        let period = params.time().cycle_duration;
        let peak_inflow = (0..PEAK_SAMPLES)
            .map(|i| boundaries.inlet.flow_rate(period * i as f64 / PEAK_SAMPLES as f64))
            .fold(f64::MIN, f64::max);

        let radii = domain.sections().reference_radii();
        let length_scale = (radii.iter().sum::<f64>() / radii.len() as f64).max(f64::MIN_POSITIVE);

        info!(
            sections = domain.section_count(),
            nodes = domain.mesh().node_count(),
            steps = params.time().total_steps(),
            valve = domain.valve().is_some(),
            "耦合控制器初始化完成"
        );

        Ok(Self {
            params,
            domain,
            boundaries,
            fluid,
            structure,
            phase: CouplingPhase::Initializing,
            state,
            history: FieldHistory::new(),
            record: ConvergenceRecord::new(),
            peak_inflow,
            length_scale,
            progress: None,
        })
    }

    /// 替换执行后端
    pub fn with_backend(mut self, backend: ExecutionBackend) -> Self {
        self.fluid = FluidSolver::new(&self.params, backend);
        self
    }

    /// 设置进度回调（每个提交的时间步调用一次）
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&StepProgress) + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// 当前状态
    pub fn phase(&self) -> CouplingPhase {
        self.phase
    }

    /// 求解域
    pub fn domain(&self) -> &Arc<FsiDomain> {
        &self.domain
    }

    /// 最后一个已提交的场
    pub fn state(&self) -> &FieldState {
        &self.state
    }

    /// 总步数
    pub fn total_steps(&self) -> usize {
        self.params.time().total_steps()
    }

    /// 从检查点续算，只能在开始运行前调用
    pub fn resume(&mut self, checkpoint: RunCheckpoint) -> TavrResult<()> {
        if self.phase != CouplingPhase::Initializing {
            return Err(TavrError::internal(format!(
                "只能在初始化阶段续算，当前状态 {:?}",
                self.phase
            )));
        }
        checkpoint.state.check_sizes(&self.domain)?;
        if checkpoint.step > self.total_steps() {
            return Err(TavrError::internal(format!(
                "检查点步数 {} 超过总步数 {}",
                checkpoint.step,
                self.total_steps()
            )));
        }
        self.boundaries.outlet.restore(&checkpoint.windkessel);
        self.state = checkpoint.state;
        info!(step = checkpoint.step, time = checkpoint.time, "从检查点续算");
        Ok(())
    }

    /// 运行到结束、失败或取消
    pub fn run(mut self, cancel: &CancellationToken) -> RunResult {
        let time = *self.params.time();
        let total = time.total_steps();
        let dt = time.time_step;
        self.phase = CouplingPhase::Stepping;

        for step in self.state.step..total {
            if cancel.is_cancelled() {
                let failure = RunFailure {
                    kind: FailureKind::Cancelled,
                    step,
                    time: self.state.time,
                    message: format!("已提交 {} / {} 步", step, total),
                };
                return self.finish(Some(failure));
            }

            match self.advance_step(step, dt) {
                Ok(progress) => {
                    if let Some(callback) = self.progress.as_mut() {
                        callback(&progress);
                    }
                }
                Err(failure) => return self.finish(Some(failure)),
            }
        }
        self.finish(None)
    }

    // ========================================================================
    // 时间步
    // ========================================================================

    fn advance_step(&mut self, step: usize, dt: f64) -> Result<StepProgress, RunFailure> {
        let time = (step + 1) as f64 * dt;
        let inflow = self.boundaries.inlet.flow_rate(time);
        let valve_closed = if self.peak_inflow > 0.0 {
            inflow <= VALVE_CLOSED_FRACTION * self.peak_inflow
        } else {
            inflow <= 0.0
        };
        let inputs = StepInputs {
            step,
            time,
            dt,
            inflow,
            outlet_pressure: self.boundaries.outlet.pressure_for_flow(inflow, dt),
            valve_closed,
        };

        let base = self.params.convergence().relaxation_factor;
        let mut failures = Vec::with_capacity(usize::from(MAX_ATTEMPTS));

        for attempt in 1..=MAX_ATTEMPTS {
            let relaxation = base / f64::from(1u8 << (attempt - 1));
            self.phase = CouplingPhase::Converging;
            let Attempt { entries, outcome } = self.couple(&inputs, attempt, relaxation);

            match outcome {
                Ok(converged) => {
                    self.record.append_attempt(entries, true);
                    let progress = StepProgress {
                        step: step + 1,
                        total_steps: self.total_steps(),
                        time,
                        iterations: converged.iterations,
                        residual: converged.residual,
                        attempt,
                    };
                    self.commit(&inputs, converged)?;
                    debug!(
                        step = step + 1,
                        time,
                        iterations = progress.iterations,
                        residual = progress.residual,
                        attempt,
                        "时间步已提交"
                    );
                    return Ok(progress);
                }
                Err((kind, message)) => {
                    self.record.append_attempt(entries, false);
                    warn!(
                        step,
                        attempt,
                        relaxation,
                        kind = ?kind,
                        "{}",
                        message
                    );
                    failures.push((kind, message));
                }
            }
        }

        let (kind, message) = reported_failure(failures);
        Err(RunFailure {
            kind,
            step,
            time,
            message,
        })
    }

    /// 一次耦合尝试：流体 → 结构 → 位移欠松弛，直到组合残差收敛
    fn couple(&self, inputs: &StepInputs, attempt: u8, relaxation: f64) -> Attempt {
        let convergence = self.params.convergence();
        let domain = self.domain.as_ref();
        let boundary = FluidBoundaryValues {
            inflow: inputs.inflow,
            outlet_pressure: inputs.outlet_pressure,
        };

        let mut entries = Vec::new();
        let mut displacement = self.state.sections.displacement.clone();
        let mut previous_pressure = self.state.sections.pressure.clone();
        let pressure_scale = previous_pressure.iter().fold(1.0_f64, |a, p| a.max(p.abs()));

        for iteration in 1..=convergence.max_iterations {
            let radius = domain.lumen_radius(&displacement);
            let fluid = match self.fluid.solve_step(
                domain,
                &radius,
                &self.state.radial_profiles,
                &boundary,
                inputs.dt,
            ) {
                Ok(fluid) => fluid,
                Err(err) => {
                    let residuals = match &err {
                        TavrError::FluidSolveDivergence { residuals, .. } => residuals.clone(),
                        _ => vec![f64::MAX],
                    };
                    entries.extend(residuals.iter().enumerate().map(|(i, &r)| {
                        ConvergenceEntry::new(
                            inputs.step,
                            attempt,
                            i + 1,
                            ResidualSource::FluidSolver,
                            r,
                            0.0,
                        )
                    }));
                    let message =
                        format!("第 {} 次尝试 (松弛 {:.3}) 耦合迭代 {}: {}", attempt, relaxation, iteration, err);
                    return Attempt {
                        entries,
                        outcome: Err((FailureKind::FluidDivergence, message)),
                    };
                }
            };

            let load = StructuralLoad {
                pressure: &fluid.pressure,
                valve_closed: inputs.valve_closed,
            };
            let structural = match self.structure.solve_step(domain, load) {
                Ok(structural) => structural,
                Err(err) => {
                    let residuals = match &err {
                        TavrError::StructuralSolveDivergence { residuals, .. } => residuals.clone(),
                        _ => vec![f64::MAX],
                    };
                    entries.extend(residuals.iter().enumerate().map(|(i, &r)| {
                        ConvergenceEntry::new(
                            inputs.step,
                            attempt,
                            i + 1,
                            ResidualSource::StructuralSolver,
                            0.0,
                            r,
                        )
                    }));
                    let message =
                        format!("第 {} 次尝试 (松弛 {:.3}) 耦合迭代 {}: {}", attempt, relaxation, iteration, err);
                    return Attempt {
                        entries,
                        outcome: Err((FailureKind::StructuralDivergence, message)),
                    };
                }
            };

            let fluid_residual = max_abs_difference(&fluid.pressure, &previous_pressure) / pressure_scale;
            let structural_residual =
                max_abs_difference(&structural.displacement, &displacement) / self.length_scale;
            for (w, target) in displacement.iter_mut().zip(&structural.displacement) {
                *w += relaxation * (target - *w);
            }
            previous_pressure.clone_from(&fluid.pressure);

            let entry = ConvergenceEntry::new(
                inputs.step,
                attempt,
                iteration,
                ResidualSource::Coupling,
                fluid_residual,
                structural_residual,
            );
            let combined = entry.combined;
            entries.push(entry);

            if combined < convergence.residual {
                return Attempt {
                    entries,
                    outcome: Ok(ConvergedStep {
                        fluid,
                        structural,
                        displacement,
                        iterations: iteration,
                        residual: combined,
                    }),
                };
            }
        }

        let residual = entries.last().map_or(f64::MAX, |e| e.combined);
        let message = format!(
            "第 {} 次尝试 (松弛 {:.3}) {} 次耦合迭代后组合残差 {:.3e}",
            attempt, relaxation, convergence.max_iterations, residual
        );
        Attempt {
            entries,
            outcome: Err((FailureKind::CouplingNonConvergence, message)),
        }
    }

    /// 提交已收敛的时间步，推进 Windkessel 并按输出频率记录历史
    ///
    /// 场历史拒绝快照时运行失败，不静默丢弃输出。
    fn commit(&mut self, inputs: &StepInputs, converged: ConvergedStep) -> Result<(), RunFailure> {
        self.phase = CouplingPhase::Advancing;
        let domain = Arc::clone(&self.domain);
        let outlet_pressure = self.boundaries.outlet.advance(inputs.inflow, inputs.dt);

        let ConvergedStep {
            fluid,
            mut structural,
            displacement,
            ..
        } = converged;
        structural.displacement = displacement;
        let nodal = self.fluid.nodal_fields(&domain, &fluid);

        self.state = FieldState {
            step: inputs.step + 1,
            time: inputs.time,
            inflow: inputs.inflow,
            outlet_pressure,
            velocity: nodal.velocity,
            pressure: nodal.pressure,
            wall_shear: nodal.wall_shear,
            displacement: structural.nodal_displacement(&domain),
            stress: structural.element_stress(&domain),
            sections: SectionFields {
                radius: domain.lumen_radius(&structural.displacement),
                pressure: fluid.pressure,
                mean_velocity: fluid.mean_velocity,
                wall_shear: fluid.wall_shear,
                displacement: structural.displacement,
                hoop_stress: structural.hoop_stress,
            },
            radial_profiles: fluid.profiles,
            frame_stress: structural.frame_stress,
            leaflet_stress: structural.leaflet_stress,
            valve_closed: inputs.valve_closed,
        };

        let stride = self.params.time().output_frequency.max(1);
        if self.state.step % stride == 0 {
            self.history
                .push(self.state.clone())
                .map_err(|e| RunFailure {
                    kind: FailureKind::Internal,
                    step: inputs.step,
                    time: inputs.time,
                    message: format!("快照无法记录: {}", e),
                })?;
        }
        self.phase = CouplingPhase::Stepping;
        Ok(())
    }

    /// 进入终止状态并移交结果
    fn finish(mut self, failure: Option<RunFailure>) -> RunResult {
        let status = match &failure {
            None => {
                self.phase = CouplingPhase::Completed;
                info!(
                    steps = self.state.step,
                    snapshots = self.history.len(),
                    records = self.record.len(),
                    "耦合运行完成"
                );
                RunStatus::Completed
            }
            Some(f) => {
                self.phase = CouplingPhase::Failed;
                if f.kind == FailureKind::Cancelled {
                    info!(step = f.step, time = f.time, "耦合运行已取消");
                } else {
                    error!(kind = ?f.kind, step = f.step, time = f.time, "{}", f);
                }
                RunStatus::Failed
            }
        };

        let windkessel = self.boundaries.outlet.checkpoint();
        RunResult {
            status,
            history: self.history,
            record: self.record,
            failure,
            windkessel,
            checkpoint: RunCheckpoint {
                step: self.state.step,
                time: self.state.time,
                state: self.state,
                windkessel,
            },
        }
    }
}

/// 两组截面量之差的最大绝对值
fn max_abs_difference(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// 从一个时间步各次尝试的失败中选出报告的诊断
///
/// 流体发散优先（流体求解是外层循环），否则取最后一次尝试。
/// 类型与信息总是来自同一次尝试。
fn reported_failure(mut failures: Vec<(FailureKind, String)>) -> (FailureKind, String) {
    let fluid = failures
        .iter()
        .rposition(|(kind, _)| *kind == FailureKind::FluidDivergence);
    match fluid {
        Some(i) => failures.swap_remove(i),
        None => failures
            .pop()
            .unwrap_or((FailureKind::CouplingNonConvergence, String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tavr_config::AnalysisConfig;
    use tavr_mesh::PipeMeshBuilder;

    fn controller(config: &AnalysisConfig) -> CouplingController {
        let params = Arc::new(SimulationParameters::from_config(config).unwrap());
        let mesh = PipeMeshBuilder::new(0.002, 0.02)
            .with_resolution(6, 3, 8)
            .build()
            .unwrap();
        let boundaries = BoundaryConditionSet::from_parameters(&params);
        CouplingController::new(params, Arc::new(mesh), boundaries).unwrap()
    }

    fn short_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.simulation.time_step = 0.01;
        config.simulation.cycle_duration = 0.1;
        config.simulation.simulation_cycles = 1;
        config.boundary.inlet_waveform = "constant".into();
        config.boundary.inlet_flow_rate = 1.0e-6;
        config.execution.threads = 1;
        config
    }

    #[test]
    fn test_phases_and_output_stride() {
        let mut config = short_config();
        config.simulation.output_frequency = 2;
        let c = controller(&config);
        assert_eq!(c.phase(), CouplingPhase::Initializing);
        assert_eq!(c.total_steps(), 10);

        let result = c.run(&CancellationToken::new());
        assert!(result.is_completed());
        assert!(result.failure.is_none());
        assert_eq!(result.history.len(), 5);
        assert_eq!(result.checkpoint.step, 10);
        assert!((result.history.last().unwrap().time - 0.1).abs() < 1e-12);
        assert!(result.record.entries().iter().all(|e| e.accepted));
    }

    #[test]
    fn test_cancel_before_first_step() {
        let c = controller(&short_config());
        let token = CancellationToken::new();
        token.cancel();
        let result = c.run(&token);
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.is_cancelled());
        assert!(result.history.is_empty());
        assert_eq!(result.checkpoint.step, 0);
    }

    #[test]
    fn test_progress_callback() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let c = controller(&short_config()).with_progress(move |p| sink.lock().push(p.step));
        let result = c.run(&CancellationToken::new());
        assert!(result.is_completed());
        assert_eq!(*seen.lock(), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_resume_rejected_after_mismatch() {
        let c = controller(&short_config());
        let mut checkpoint = c.run(&CancellationToken::new()).checkpoint;
        checkpoint.state.pressure.pop();
        let mut fresh = controller(&short_config());
        assert!(matches!(
            fresh.resume(checkpoint),
            Err(TavrError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_structural_divergence_fails_run() {
        // 刚度溢出为无穷大，位移系统无法求解
        let mut config = short_config();
        config.structure.arterial_wall_modulus = 1.7e308;
        config.structure.wall_thickness = 1.0;
        let result = controller(&config).run(&CancellationToken::new());

        assert_eq!(result.status, RunStatus::Failed);
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::StructuralDivergence);
        assert_eq!(failure.step, 0);
        assert!(failure.message.contains("结构求解发散"), "{}", failure.message);
        assert!(failure.to_string().contains("结构求解器"), "{}", failure);

        assert!(result.history.is_empty());
        assert!(result.record.entries().iter().all(|e| !e.accepted));
        for attempt in 1..=MAX_ATTEMPTS {
            assert!(result
                .record
                .for_attempt(0, attempt)
                .all(|e| e.source == ResidualSource::StructuralSolver));
            assert!(result.record.for_attempt(0, attempt).count() > 0);
        }
    }

    #[test]
    fn test_coupling_cap_fails_run() {
        let mut config = short_config();
        config.fluid.blood_viscosity_model = "newtonian".into();
        config.simulation.max_iterations = 1;
        let result = controller(&config).run(&CancellationToken::new());

        assert_eq!(result.status, RunStatus::Failed);
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::CouplingNonConvergence);
        assert_eq!(failure.step, 0);
        // 每次尝试恰好一次耦合迭代
        assert_eq!(result.record.len(), usize::from(MAX_ATTEMPTS));
        assert!(result
            .record
            .entries()
            .iter()
            .all(|e| e.source == ResidualSource::Coupling && !e.accepted));
    }

    #[test]
    fn test_rejected_snapshot_fails_run() {
        let mut c = controller(&short_config());
        // 历史中已有更晚的快照，第一个提交的快照时间不再递增
        let mut stale = c.state.clone();
        stale.time = 5.0;
        c.history.push(stale).unwrap();

        let result = c.run(&CancellationToken::new());
        assert_eq!(result.status, RunStatus::Failed);
        let failure = result.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::Internal);
        assert_eq!(failure.step, 0);
        assert!(failure.message.contains("严格递增"), "{}", failure.message);
        assert!(failure.to_string().contains("场历史"));
        assert_eq!(result.history.len(), 1);
        // 耦合本身已收敛，失败发生在提交阶段
        assert!(result.record.entries().iter().all(|e| e.accepted));
        assert_eq!(result.checkpoint.step, 1);
    }

    #[test]
    fn test_reported_failure_pairs_kind_with_message() {
        let fluid = (FailureKind::FluidDivergence, "流体: 第 1 次尝试".to_string());
        let structural = (FailureKind::StructuralDivergence, "结构: 第 2 次尝试".to_string());

        // 第一次尝试流体发散、重试时结构发散：报告流体那一次
        let (kind, message) = reported_failure(vec![fluid.clone(), structural.clone()]);
        assert_eq!(kind, FailureKind::FluidDivergence);
        assert_eq!(message, fluid.1);

        let (kind, message) = reported_failure(vec![structural.clone(), fluid.clone()]);
        assert_eq!((kind, message), fluid);

        let capped = (FailureKind::CouplingNonConvergence, "上限".to_string());
        let (kind, message) = reported_failure(vec![capped, structural.clone()]);
        assert_eq!((kind, message), structural);
    }

    #[test]
    fn test_max_abs_difference() {
        assert_eq!(max_abs_difference(&[1.0, -2.0], &[0.5, 1.0]), 3.0);
    }
}
