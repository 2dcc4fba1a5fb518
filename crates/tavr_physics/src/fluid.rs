// crates/tavr_physics/src/fluid.rs

//! 流体求解器：准一维轴对称不可压缩流动
//!
//! 每个轴向截面上求解充分发展的轴向动量方程
//!
//! `ρ ∂u/∂t = −G + (1/r) ∂/∂r (r μ ∂u/∂r)`，`u(R) = 0`
//!
//! 径向采用有限体积离散（单元中心 `r_i = (i+½)Δr`），时间采用隐式 Euler。
//! 压力梯度 `G` 由流量约束 `2π∫u r dr = Q` 确定：方程关于 `G` 线性，
//! 解两个对称正定系统 `A a = b₀`、`A b = c` 后 `u = a − G b`。
//!
//! Carreau 粘度通过对面粘度的 Picard 迭代处理，迭代残差为相邻两次
//! 面粘度的相对变化。残差非有限时记为 `f64::MAX`，达到迭代上限仍未收敛
//! 时返回 [`TavrError::FluidSolveDivergence`]，携带逐次残差。
//!
//! 截面压力从出口（Windkessel 压力）向上游积分：粘性/惯性梯度项、
//! Bernoulli 对流项以及突扩处的 Borda–Carnot 损失。

use glam::DVec3;
use std::f64::consts::PI;
use tracing::{debug, warn};

use tavr_config::{ConvergenceSettings, SimulationParameters, ViscosityModel};
use tavr_foundation::error::{TavrError, TavrResult};
use tavr_foundation::float::{relative_change, sanitize_residual};

use crate::backend::{BackendKind, ExecutionBackend};
use crate::domain::FsiDomain;
use crate::numerics::{PcgConfig, PcgSolver, SymmetricTridiagonal};

/// Carreau 粘度 Picard 更新的松弛系数
const VISCOSITY_RELAXATION: f64 = 0.5;

/// 径向线性系统的相对容差
const LINEAR_TOLERANCE: f64 = 1e-12;

/// 流体边界值（一个时间步内固定）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluidBoundaryValues {
    /// 入口流量 [m³/s]
    pub inflow: f64,
    /// 出口压力 [Pa]
    pub outlet_pressure: f64,
}

/// 流体求解结果
#[derive(Debug, Clone, PartialEq)]
pub struct FluidFieldState {
    /// 每个截面的径向速度剖面
    pub profiles: Vec<Vec<f64>>,
    /// 截面压力梯度 `G = −∂p/∂z` [Pa/m]
    pub gradient: Vec<f64>,
    /// 截面压力 [Pa]
    pub pressure: Vec<f64>,
    /// 截面平均速度 [m/s]
    pub mean_velocity: Vec<f64>,
    /// 带符号的壁面剪应力 [Pa]
    pub wall_shear: Vec<f64>,
    /// 最大 Picard 迭代次数
    pub iterations: usize,
    /// 最终残差
    pub residual: f64,
}

/// 节点场
#[derive(Debug, Clone, PartialEq)]
pub struct NodalFlowFields {
    /// 节点速度
    pub velocity: Vec<DVec3>,
    /// 节点压力
    pub pressure: Vec<f64>,
    /// 节点壁面剪应力
    pub wall_shear: Vec<DVec3>,
}

/// 流体求解器
#[derive(Debug, Clone)]
pub struct FluidSolver {
    density: f64,
    viscosity: ViscosityModel,
    convergence: ConvergenceSettings,
    radial_cells: usize,
    backend: ExecutionBackend,
}

impl FluidSolver {
    /// 创建求解器
    pub fn new(params: &SimulationParameters, backend: ExecutionBackend) -> Self {
        Self {
            density: params.fluid().density,
            viscosity: params.fluid().viscosity,
            convergence: *params.convergence(),
            radial_cells: params.execution().radial_cells,
            backend,
        }
    }

    /// 径向单元数
    pub fn radial_cells(&self) -> usize {
        self.radial_cells
    }

    /// 执行后端
    pub fn backend(&self) -> &ExecutionBackend {
        &self.backend
    }

    /// 推进一个时间步
    ///
    /// - `radius`: 当前几何下各截面管腔半径
    /// - `prior`: 上一时间步的径向速度剖面
    pub fn solve_step(
        &self,
        domain: &FsiDomain,
        radius: &[f64],
        prior: &[Vec<f64>],
        boundary: &FluidBoundaryValues,
        dt: f64,
    ) -> TavrResult<FluidFieldState> {
        let n_sections = domain.section_count();
        TavrError::check_size("lumen_radius", n_sections, radius.len())?;
        TavrError::check_size("radial_profiles", n_sections, prior.len())?;

        let problem = SectionProblem {
            density: self.density,
            viscosity: self.viscosity,
            tolerance: self.convergence.residual,
            max_iterations: self.convergence.max_iterations,
            cells: self.radial_cells,
            kind: self.backend.kind(),
            flow: boundary.inflow,
            dt,
        };
        let solves = self
            .backend
            .map(n_sections, |s| problem.solve(radius[s], &prior[s]));

        // 逐次迭代残差取所有截面的最大值
        let max_len = solves.iter().map(|s| s.history.len()).max().unwrap_or(0);
        let history: Vec<f64> = (0..max_len)
            .map(|m| {
                solves
                    .iter()
                    .map(|s| s.history.get(m).or(s.history.last()).copied().unwrap_or(0.0))
                    .fold(0.0, f64::max)
            })
            .collect();
        let residual = history.last().copied().unwrap_or(0.0);

        if let Some((s, _)) = solves.iter().enumerate().find(|(_, s)| !s.converged) {
            warn!(
                section = s,
                radius = radius[s],
                iterations = max_len,
                residual,
                "流体求解未收敛"
            );
            return Err(TavrError::FluidSolveDivergence {
                iterations: max_len,
                residual,
                residuals: history,
            });
        }

        let mean_velocity: Vec<f64> = radius
            .iter()
            .map(|&r| boundary.inflow / (PI * r * r))
            .collect();
        let gradient: Vec<f64> = solves.iter().map(|s| s.gradient).collect();
        let pressure = integrate_pressure(
            &domain.sections().axial_positions(),
            &gradient,
            &mean_velocity,
            boundary.outlet_pressure,
            boundary.inflow,
            self.density,
        );

        debug!(iterations = max_len, residual, "流体时间步完成");

        Ok(FluidFieldState {
            wall_shear: solves.iter().map(|s| s.wall_shear).collect(),
            profiles: solves.into_iter().map(|s| s.profile).collect(),
            gradient,
            pressure,
            mean_velocity,
            iterations: max_len,
            residual,
        })
    }

    /// 把截面解插值到网格节点
    pub fn nodal_fields(&self, domain: &FsiDomain, state: &FluidFieldState) -> NodalFlowFields {
        let sections = domain.sections();
        let axis = sections.axis();
        let n = domain.mesh().node_count();

        let mut velocity = Vec::with_capacity(n);
        let mut pressure = Vec::with_capacity(n);
        let mut wall_shear = Vec::with_capacity(n);
        for v in 0..n {
            let s = sections.section_of(v);
            let r_ref = sections.section(s).reference_radius;
            let xi = if r_ref > 0.0 {
                (sections.radial(v) / r_ref).clamp(0.0, 1.0)
            } else {
                1.0
            };
            velocity.push(profile_value(&state.profiles[s], xi) * axis);
            pressure.push(state.pressure[s]);
            wall_shear.push(if domain.wall_tag(v).is_some() {
                state.wall_shear[s] * axis
            } else {
                DVec3::ZERO
            });
        }

        NodalFlowFields {
            velocity,
            pressure,
            wall_shear,
        }
    }
}

// ============================================================================
// 单截面求解
// ============================================================================

struct SectionProblem {
    density: f64,
    viscosity: ViscosityModel,
    tolerance: f64,
    max_iterations: usize,
    cells: usize,
    kind: BackendKind,
    flow: f64,
    dt: f64,
}

struct SectionSolve {
    profile: Vec<f64>,
    gradient: f64,
    wall_shear: f64,
    history: Vec<f64>,
    converged: bool,
}

impl SectionProblem {
    fn solve(&self, radius: f64, prior: &[f64]) -> SectionSolve {
        let n = self.cells;
        let h = radius / n as f64;
        let weights: Vec<f64> = (0..n).map(|i| (i as f64 + 0.5) * h * h).collect();
        let prior: Vec<f64> = (0..n).map(|i| prior.get(i).copied().unwrap_or(0.0)).collect();

        // 面粘度：0..n-1 为内部面，n-1 为壁面
        let mut mu: Vec<f64> = shear_rates(&prior, h)
            .into_iter()
            .map(|g| self.viscosity.viscosity(g))
            .collect();
        let mut pcg = PcgSolver::new(PcgConfig::with_tolerance(LINEAR_TOLERANCE, 10 * n + 10));

        let mut history = Vec::new();
        let mut profile = prior.clone();
        let mut gradient = 0.0;
        let mut wall_shear = 0.0;

        for _ in 0..self.max_iterations {
            let outcome = if radius > 0.0 && radius.is_finite() {
                self.linear_step(radius, h, &weights, &prior, &mu, &mut pcg)
            } else {
                None
            };

            let Some((u, g, linear_residual)) = outcome else {
                history.push(f64::MAX);
                continue;
            };

            let new_mu: Vec<f64> = shear_rates(&u, h)
                .into_iter()
                .map(|s| self.viscosity.viscosity(s))
                .collect();
            let residual = sanitize_residual(relative_change(&new_mu, &mu).max(linear_residual));
            history.push(residual);

            wall_shear = mu[n - 1] * u[n - 1] / (0.5 * h);
            profile = u;
            gradient = g;

            if residual < self.tolerance {
                return SectionSolve {
                    profile,
                    gradient,
                    wall_shear,
                    history,
                    converged: true,
                };
            }

            for (m, m_new) in mu.iter_mut().zip(new_mu) {
                *m += VISCOSITY_RELAXATION * (m_new - *m);
            }
        }

        SectionSolve {
            profile,
            gradient,
            wall_shear,
            history,
            converged: false,
        }
    }

    /// 固定面粘度下求解一次，返回 (剖面, 压力梯度, 线性残差)
    fn linear_step(
        &self,
        radius: f64,
        h: f64,
        weights: &[f64],
        prior: &[f64],
        mu: &[f64],
        pcg: &mut PcgSolver,
    ) -> Option<(Vec<f64>, f64, f64)> {
        let n = weights.len();
        let mass: Vec<f64> = weights.iter().map(|w| self.density * w / self.dt).collect();

        let mut diag = mass.clone();
        let mut off = vec![0.0; n.saturating_sub(1)];
        for i in 0..n - 1 {
            // r_{i+½}·μ/Δr
            let a = (i as f64 + 1.0) * mu[i];
            diag[i] += a;
            diag[i + 1] += a;
            off[i] = -a;
        }
        diag[n - 1] += radius * mu[n - 1] / (0.5 * h);

        let matrix = SymmetricTridiagonal::new(diag, off).ok()?;
        let rhs_prior: Vec<f64> = mass.iter().zip(prior).map(|(m, u)| m * u).collect();

        let (a, b, linear_residual) = match self.kind {
            BackendKind::Cpu => {
                let mut a = vec![0.0; n];
                let mut b = vec![0.0; n];
                let ra = pcg.solve(&matrix, &mut a, &rhs_prior);
                let rb = pcg.solve(&matrix, &mut b, weights);
                let res = |r: &crate::numerics::PcgResult| {
                    if r.converged {
                        0.0
                    } else {
                        r.relative_residual
                    }
                };
                let lin = res(&ra).max(res(&rb));
                (a, b, lin)
            }
            BackendKind::Accelerated => {
                let a = matrix.solve_direct(&rhs_prior)?;
                let b = matrix.solve_direct(weights)?;
                (a, b, 0.0)
            }
        };

        let wa: f64 = weights.iter().zip(&a).map(|(w, x)| w * x).sum();
        let wb: f64 = weights.iter().zip(&b).map(|(w, x)| w * x).sum();
        let g = (wa - self.flow / (2.0 * PI)) / wb;
        if !g.is_finite() {
            return None;
        }
        let u: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x - g * y).collect();
        if u.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some((u, g, linear_residual))
    }
}

/// 面剪切率：内部面 `|u_{i+1} − u_i|/Δr`，壁面 `|u_{n−1}|/(Δr/2)`
fn shear_rates(u: &[f64], h: f64) -> Vec<f64> {
    let n = u.len();
    let mut rates: Vec<f64> = (0..n.saturating_sub(1))
        .map(|i| (u[i + 1] - u[i]).abs() / h)
        .collect();
    rates.push(u.last().map_or(0.0, |w| w.abs() / (0.5 * h)));
    rates
}

/// 归一化半径 `ξ ∈ [0, 1]` 处的剖面值
///
/// 单元中心之间线性插值；轴心附近用过前两个单元值、轴上斜率为零的抛物线；
/// 最外单元中心到壁面线性降到零。
pub fn profile_value(profile: &[f64], xi: f64) -> f64 {
    let n = profile.len();
    if n == 0 {
        return 0.0;
    }
    let h = 1.0 / n as f64;
    let first = 0.5 * h;
    let last = 1.0 - 0.5 * h;

    if xi <= first {
        if n == 1 {
            return profile[0];
        }
        // u = A + B ξ²
        let (u0, u1) = (profile[0], profile[1]);
        let b = (u1 - u0) / (2.0 * h * h);
        let a = u0 - b * first * first;
        return a + b * xi * xi;
    }
    if xi >= last {
        let t = ((xi - last) / (0.5 * h)).min(1.0);
        return profile[n - 1] * (1.0 - t);
    }
    let pos = xi / h - 0.5;
    let i = (pos.floor() as usize).min(n - 2);
    let t = pos - i as f64;
    profile[i] * (1.0 - t) + profile[i + 1] * t
}

/// 从出口向上游积分截面压力
fn integrate_pressure(
    axial: &[f64],
    gradient: &[f64],
    mean_velocity: &[f64],
    outlet_pressure: f64,
    flow: f64,
    density: f64,
) -> Vec<f64> {
    let n = axial.len();
    let mut pressure = vec![outlet_pressure; n];
    for s in (0..n.saturating_sub(1)).rev() {
        let dz = axial[s + 1] - axial[s];
        let viscous = 0.5 * (gradient[s] + gradient[s + 1]) * dz;
        let (u_up, u_down) = (mean_velocity[s].abs(), mean_velocity[s + 1].abs());
        let bernoulli = 0.5 * density * (u_down * u_down - u_up * u_up);
        let loss = 0.5 * density * (u_up - u_down) * (u_up - u_down);
        let expansion = if flow >= 0.0 && u_up > u_down {
            loss
        } else if flow < 0.0 && u_down > u_up {
            -loss
        } else {
            0.0
        };
        pressure[s] = pressure[s + 1] + viscous + bernoulli + expansion;
    }
    pressure
}
