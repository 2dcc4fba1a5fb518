// crates/tavr_physics/src/metrics/mod.rs

//! 血流动力学指标
//!
//! 对已提交的场历史做确定性的纯归约，不修改任何输入：
//!
//! - [`wss`]: 壁面节点 TAWSS / OSI / RRT
//! - [`flow`]: 速度与雷诺数统计、跨瓣压差与有效瓣口面积（Gorlin）
//! - [`leak`]: 瓣周漏扇区分析与分级
//! - [`coronary`]: 冠脉阻塞风险
//! - [`stress`]: 结构应力统计
//!
//! # 平均窗口
//!
//! 默认丢弃预热周期，只对最后一个完整周期求平均，因此要求历史至少覆盖
//! 2 个完整周期；`AllCycles` 对全部已记录快照求平均。

pub mod coronary;
pub mod flow;
pub mod leak;
pub mod stress;
pub mod wss;

pub use coronary::{assess_coronary_risk, CoronaryRisk, RiskCategory};
pub use flow::{flow_summary, transvalvular_gradient, FlowSummary, TransvalvularGradient};
pub use leak::{assess_leak, LeakAssessment, LeakGrade, LeakSector};
pub use stress::{stress_summary, StressSummary};
pub use wss::{wall_shear_indices, WallShearIndices, WallShearSummary};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use tavr_config::{AveragingWindow, SimulationParameters};
use tavr_foundation::error::TavrError;
use tavr_foundation::float::KahanSum;

use crate::deployment::DeployedValveGeometry;
use crate::domain::FsiDomain;
use crate::state::{FieldHistory, FieldState};

/// 平均瓣口压差超过该值 [mmHg] 视为压差升高
const ELEVATED_MEAN_GRADIENT_MMHG: f64 = 20.0;

/// 指标计算错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    /// 历史不足以构成平均窗口
    #[error("丢弃预热周期需要至少 {required} 个完整周期，历史只覆盖 {available} 个")]
    InsufficientCycles {
        /// 需要的周期数
        required: usize,
        /// 历史覆盖的完整周期数
        available: usize,
    },

    /// 平均窗口内没有快照
    #[error("平均窗口内没有场快照")]
    EmptyHistory,

    /// 快照的场尺寸与计算域不一致
    #[error("第 {step} 步快照与计算域不匹配: {reason}")]
    SnapshotMismatch {
        /// 快照步号
        step: usize,
        /// 尺寸检查的诊断
        reason: String,
    },
}

impl From<MetricsError> for TavrError {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::InsufficientCycles { available, .. } => TavrError::invalid_configuration(
                "simulation.simulation_cycles",
                available,
                err.to_string(),
            ),
            MetricsError::EmptyHistory | MetricsError::SnapshotMismatch { .. } => {
                TavrError::internal(err.to_string())
            }
        }
    }
}

/// 实际使用的平均窗口
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragingSpan {
    /// 窗口策略
    pub policy: AveragingWindow,
    /// 起始时间（不含）[s]
    pub start: f64,
    /// 结束时间（含）[s]
    pub end: f64,
    /// 窗口内快照数
    pub snapshots: usize,
    /// 相邻快照的时间间隔 [s]
    pub sample_interval: f64,
}

impl AveragingSpan {
    /// 窗口长度 [s]
    pub fn duration(&self) -> f64 {
        self.snapshots as f64 * self.sample_interval
    }
}

/// 瓣膜功能综合评估
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValveFunctionAssessment {
    /// 平均跨瓣压差 [mmHg]
    pub mean_gradient_mmhg: f64,
    /// 有效瓣口面积 [cm²]
    pub effective_orifice_area: Option<f64>,
    /// 瓣周漏分级
    pub leak_grade: LeakGrade,
    /// 压差是否升高
    pub elevated_gradient: bool,
    /// 压差正常且瓣周漏不超过轻度
    pub acceptable: bool,
}

/// 血流动力学报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HemodynamicReport {
    /// 平均窗口
    pub window: AveragingSpan,
    /// 壁面剪应力指标
    pub wall_shear: WallShearSummary,
    /// 流动统计
    pub flow: FlowSummary,
    /// 跨瓣压差
    pub gradient: TransvalvularGradient,
    /// 瓣周漏（未植入瓣膜时为 `None`）
    pub leak: Option<LeakAssessment>,
    /// 冠脉风险（每个开口一项）
    pub coronary: Vec<CoronaryRisk>,
    /// 应力统计
    pub stress: StressSummary,
    /// 瓣膜功能（未植入瓣膜时为 `None`）
    pub valve_function: Option<ValveFunctionAssessment>,
}

/// 选择平均窗口内的快照
pub fn averaging_window<'a>(
    history: &'a FieldHistory,
    params: &SimulationParameters,
) -> Result<(&'a [FieldState], AveragingSpan), MetricsError> {
    let time = params.time();
    let policy = params.postprocess().averaging;
    let last = history.last().ok_or(MetricsError::EmptyHistory)?;
    let sample_interval = time.time_step * time.output_frequency.max(1) as f64;
    // 快照时间是步长的整数倍，窗口边界偏移半步以避开舍入
    let eps = 0.5 * time.time_step;

    let (start, end) = match policy {
        AveragingWindow::AllCycles => (0.0, last.time),
        AveragingWindow::DiscardWarmup => {
            let period = time.cycle_duration;
            let cycles = ((last.time + eps) / period).floor() as usize;
            let required = policy.required_cycles();
            if cycles < required {
                return Err(MetricsError::InsufficientCycles {
                    required,
                    available: cycles,
                });
            }
            ((cycles - 1) as f64 * period, cycles as f64 * period)
        }
    };

    let window = history.window(start + eps, end + eps);
    if window.is_empty() {
        return Err(MetricsError::EmptyHistory);
    }
    let span = AveragingSpan {
        policy,
        start,
        end,
        snapshots: window.len(),
        sample_interval,
    };
    Ok((window, span))
}

/// 计算全部血流动力学指标
pub fn evaluate(
    history: &FieldHistory,
    domain: &FsiDomain,
    params: &SimulationParameters,
    valve: Option<&DeployedValveGeometry>,
) -> Result<HemodynamicReport, MetricsError> {
    let (window, span) = averaging_window(history, params)?;
    for state in window {
        state
            .check_sizes(domain)
            .map_err(|e| MetricsError::SnapshotMismatch {
                step: state.step,
                reason: e.to_string(),
            })?;
    }

    let wall_nodes = domain.mesh().wall_nodes();
    let wall_shear = wall_shear_indices(window, &wall_nodes);
    let flow = flow_summary(window, domain, params.fluid());
    let gradient = transvalvular_gradient(window, domain);
    let leak = valve.map(|v| assess_leak(window, &span, domain, v, params));
    let coronary = assess_coronary_risk(domain, valve, params.postprocess());
    let stress = stress_summary(window);

    let valve_function = leak.as_ref().map(|leak| {
        let elevated_gradient = gradient.mean_mmhg >= ELEVATED_MEAN_GRADIENT_MMHG;
        ValveFunctionAssessment {
            mean_gradient_mmhg: gradient.mean_mmhg,
            effective_orifice_area: gradient.effective_orifice_area,
            leak_grade: leak.grade,
            elevated_gradient,
            acceptable: !elevated_gradient && leak.grade <= LeakGrade::Mild,
        }
    });

    info!(
        snapshots = span.snapshots,
        start = span.start,
        end = span.end,
        peak_gradient = gradient.peak_mmhg,
        max_tawss = wall_shear.max_tawss,
        "血流动力学指标计算完成"
    );

    Ok(HemodynamicReport {
        window: span,
        wall_shear,
        flow,
        gradient,
        leak,
        coronary,
        stress,
        valve_function,
    })
}

/// 快照序列的算术平均
pub(crate) fn mean_of<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut sum = KahanSum::new();
    let mut n = 0usize;
    for v in values {
        sum.add(v);
        n += 1;
    }
    if n == 0 {
        0.0
    } else {
        sum.value() / n as f64
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tavr_config::{AnalysisConfig, SimulationParameters};
    use tavr_mesh::PipeMeshBuilder;

    use crate::domain::FsiDomain;
    use crate::state::{FieldHistory, FieldState};

    pub fn params(cycles: usize, discard_warmup: bool) -> SimulationParameters {
        let mut config = AnalysisConfig::default();
        config.simulation.time_step = 0.1;
        config.simulation.cycle_duration = 1.0;
        config.simulation.simulation_cycles = cycles;
        config.postprocess.discard_warmup_cycle = discard_warmup;
        SimulationParameters::from_config(&config).unwrap()
    }

    pub fn domain() -> FsiDomain {
        let mesh = PipeMeshBuilder::new(0.01, 0.05)
            .with_resolution(10, 3, 8)
            .build()
            .unwrap();
        FsiDomain::new(Arc::new(mesh), None).unwrap()
    }

    /// 每 0.1 s 一个快照，由回调填充场
    pub fn history<F>(domain: &FsiDomain, steps: usize, mut fill: F) -> FieldHistory
    where
        F: FnMut(usize, &mut FieldState),
    {
        let mut history = FieldHistory::new();
        for step in 1..=steps {
            let mut state = FieldState::at_rest(domain, 1.0e4, 8);
            state.step = step;
            state.time = step as f64 * 0.1;
            fill(step, &mut state);
            history.push(state).unwrap();
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_discard_warmup_uses_last_cycle() {
        let p = params(3, true);
        let d = domain();
        let h = history(&d, 30, |_, _| {});
        let (window, span) = averaging_window(&h, &p).unwrap();
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].step, 21);
        assert_eq!(window[9].step, 30);
        assert!((span.duration() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_discard_warmup_needs_two_cycles() {
        let p = params(1, true);
        let d = domain();
        let h = history(&d, 10, |_, _| {});
        let err = averaging_window(&h, &p).unwrap_err();
        assert_eq!(
            err,
            MetricsError::InsufficientCycles {
                required: 2,
                available: 1
            }
        );
        assert!(matches!(
            TavrError::from(err),
            TavrError::InvalidConfiguration { .. }
        ));
    }

    #[test]
    fn test_all_cycles_window() {
        let p = params(1, false);
        let d = domain();
        let h = history(&d, 10, |_, _| {});
        let (window, span) = averaging_window(&h, &p).unwrap();
        assert_eq!(window.len(), 10);
        assert_eq!(span.policy, AveragingWindow::AllCycles);
    }

    #[test]
    fn test_empty_history() {
        let p = params(2, true);
        assert_eq!(
            averaging_window(&FieldHistory::new(), &p).unwrap_err(),
            MetricsError::EmptyHistory
        );
    }

    #[test]
    fn test_evaluate_without_valve() {
        let p = params(2, true);
        let d = domain();
        let h = history(&d, 20, |_, s| {
            s.inflow = 1.0e-5;
            s.valve_closed = false;
            for (i, v) in s.sections.pressure.iter_mut().enumerate() {
                *v = 1.0e4 - 10.0 * i as f64;
            }
        });
        let report = evaluate(&h, &d, &p, None).unwrap();
        assert!(report.leak.is_none());
        assert!(report.valve_function.is_none());
        assert!(report.gradient.peak_mmhg > 0.0);
        assert_eq!(report.window.snapshots, 10);
    }

    #[test]
    fn test_evaluate_rejects_foreign_history() {
        let p = params(2, true);
        let d = domain();
        let h = history(&d, 20, |step, s| {
            if step == 15 {
                s.wall_shear.truncate(3);
            }
        });
        let err = evaluate(&h, &d, &p, None).unwrap_err();
        assert!(matches!(err, MetricsError::SnapshotMismatch { step: 15, .. }));
        assert!(err.to_string().contains("wall_shear"));
        assert!(matches!(TavrError::from(err), TavrError::Internal { .. }));

        // 预热周期内的快照不参与平均，也不检查
        let h = history(&d, 20, |step, s| {
            if step == 5 {
                s.stress.clear();
            }
        });
        assert!(evaluate(&h, &d, &p, None).is_ok());
    }

    #[test]
    fn test_mean_of() {
        assert_eq!(mean_of(Vec::<f64>::new()), 0.0);
        assert_eq!(mean_of([1.0, 2.0, 3.0]), 2.0);
    }
}
