// crates/tavr_physics/src/structure.rs

//! 结构求解器：带轴向张力的薄壁弹性环
//!
//! 每个内部截面 `s` 满足
//!
//! `k_s w_s − T (w_{s+1} − 2 w_s + w_{s−1}) / Δz² = p_s − p_ext`
//!
//! 两端截面固支（`w = 0`）。方程两边乘以截面控制长度后得到对称正定的
//! 三对角系统，以 CSR 组装并用 Jacobi 预处理 PCG 求解。PCG 未收敛时返回
//! [`TavrError::StructuralSolveDivergence`]，携带逐次残差。
//!
//! 应力恢复：
//!
//! - 环向膜应力 `σθ = (p − p_ext) R / h`，支架截面按刚度比例分担并叠加残余接触压力
//! - 轴向膜应力 `σz = T / h`
//! - 单元应力为节点 von Mises 应力的平均
//! - 支架环向应力 `σ_f = p_f R_f / (c t_f)`，瓣叶膜应力 `Δp R / (2 t)`

use glam::DVec3;
use tracing::{debug, warn};

use tavr_config::{ConvergenceSettings, SimulationParameters};
use tavr_foundation::error::{TavrError, TavrResult};

use crate::boundary::WallProvider;
use crate::domain::FsiDomain;
use crate::numerics::{CsrBuilder, PcgConfig, PcgSolver};

/// 位移系统的相对容差
const LINEAR_TOLERANCE: f64 = 1e-10;

/// 结构载荷（一次耦合迭代内固定）
#[derive(Debug, Clone, Copy)]
pub struct StructuralLoad<'a> {
    /// 截面流体压力 [Pa]
    pub pressure: &'a [f64],
    /// 瓣膜是否处于关闭相
    pub valve_closed: bool,
}

/// 结构求解结果
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralFieldState {
    /// 截面壁面径向位移 [m]
    pub displacement: Vec<f64>,
    /// 截面环向应力 [Pa]
    pub hoop_stress: Vec<f64>,
    /// 截面 von Mises 应力 [Pa]
    pub von_mises: Vec<f64>,
    /// 支架峰值应力 [Pa]
    pub frame_stress: f64,
    /// 瓣叶应力 [Pa]
    pub leaflet_stress: f64,
    /// PCG 迭代次数
    pub iterations: usize,
    /// 最终相对残差
    pub residual: f64,
}

impl StructuralFieldState {
    /// 节点位移：`w_s (r/R) e_r`
    pub fn nodal_displacement(&self, domain: &FsiDomain) -> Vec<DVec3> {
        let sections = domain.sections();
        (0..domain.mesh().node_count())
            .map(|v| {
                let s = sections.section_of(v);
                let r_ref = sections.section(s).reference_radius;
                if r_ref <= 0.0 {
                    return DVec3::ZERO;
                }
                let xi = (sections.radial(v) / r_ref).min(1.0);
                sections.radial_direction(v) * (self.displacement[s] * xi)
            })
            .collect()
    }

    /// 单元 von Mises 应力：单元各节点所在截面应力的平均
    pub fn element_stress(&self, domain: &FsiDomain) -> Vec<f64> {
        let sections = domain.sections();
        domain
            .mesh()
            .elements()
            .iter()
            .map(|elem| {
                let sum: f64 = elem
                    .nodes
                    .iter()
                    .map(|&v| self.von_mises[sections.section_of(v)])
                    .sum();
                sum / elem.nodes.len().max(1) as f64
            })
            .collect()
    }
}

/// 结构求解器
///
/// 除构造参数外不持有任何状态，相同输入给出相同结果。
#[derive(Debug, Clone)]
pub struct StructuralSolver {
    wall: WallProvider,
    convergence: ConvergenceSettings,
    leaflet_thickness: f64,
    ventricular_diastolic_pressure: f64,
}

impl StructuralSolver {
    /// 创建求解器
    pub fn new(params: &SimulationParameters, wall: WallProvider) -> Self {
        Self {
            wall,
            convergence: *params.convergence(),
            leaflet_thickness: params.valve().material.leaflet_thickness,
            ventricular_diastolic_pressure: params.postprocess().ventricular_diastolic_pressure,
        }
    }

    /// 壁面边界
    pub fn wall(&self) -> &WallProvider {
        &self.wall
    }

    /// 求解一个耦合迭代的壁面位移与应力
    pub fn solve_step(
        &self,
        domain: &FsiDomain,
        load: StructuralLoad<'_>,
    ) -> TavrResult<StructuralFieldState> {
        let n = domain.section_count();
        TavrError::check_size("structural_pressure", n, load.pressure.len())?;

        let (displacement, iterations, residual) = match &self.wall {
            WallProvider::Rigid { .. } => (vec![0.0; n], 0, 0.0),
            WallProvider::Elastic(_) => self.solve_displacement(domain, load.pressure)?,
        };

        let mut state = self.recover_stress(domain, load, displacement);
        state.iterations = iterations;
        state.residual = residual;
        Ok(state)
    }

    /// 组装并求解内部截面的位移系统
    fn solve_displacement(
        &self,
        domain: &FsiDomain,
        pressure: &[f64],
    ) -> TavrResult<(Vec<f64>, usize, f64)> {
        let WallProvider::Elastic(wall) = &self.wall else {
            return Ok((vec![0.0; pressure.len()], 0, 0.0));
        };
        let sections = domain.sections();
        let n = domain.section_count();
        let z = sections.axial_positions();
        let lengths = domain.control_lengths();
        let tension = wall.axial_tension();
        let p_ext = wall.properties().external_pressure;
        let valve = domain.valve();

        // 内部截面 1..n-1 映射到未知量 0..m
        let m = n.saturating_sub(2);
        if m == 0 {
            return Ok((vec![0.0; n], 0, 0.0));
        }

        let mut builder = CsrBuilder::new(m);
        let mut rhs = vec![0.0; m];
        for i in 0..m {
            let s = i + 1;
            let section = sections.section(s);
            let frame = valve.and_then(|v| v.frame_radius_at(s));
            let k = wall.section_stiffness(section, frame);
            let h_lo = z[s] - z[s - 1];
            let h_hi = z[s + 1] - z[s];
            let t_lo = tension / h_lo;
            let t_hi = tension / h_hi;

            builder.add(i, i, k * lengths[s] + t_lo + t_hi);
            if i + 1 < m {
                builder.add(i, i + 1, -t_hi);
                builder.add(i + 1, i, -t_hi);
            }
            rhs[i] = (pressure[s] - p_ext) * lengths[s];
        }
        let matrix = builder.build();

        let cap = self.convergence.max_iterations.max(2 * m);
        let mut solver = PcgSolver::new(PcgConfig::with_tolerance(LINEAR_TOLERANCE, cap));
        let mut x = vec![0.0; m];
        let result = solver.solve(&matrix, &mut x, &rhs);

        if !result.converged {
            warn!(
                iterations = result.iterations,
                residual = result.relative_residual,
                "结构位移系统未收敛"
            );
            return Err(TavrError::StructuralSolveDivergence {
                iterations: result.iterations,
                residual: result.relative_residual,
                residuals: result.history,
            });
        }

        let mut displacement = vec![0.0; n];
        displacement[1..n - 1].copy_from_slice(&x);
        debug!(
            iterations = result.iterations,
            max_displacement = displacement.iter().fold(0.0_f64, |a, w| a.max(w.abs())),
            "结构求解完成"
        );
        Ok((displacement, result.iterations, result.relative_residual))
    }

    /// 由位移与压力恢复应力
    fn recover_stress(
        &self,
        domain: &FsiDomain,
        load: StructuralLoad<'_>,
        displacement: Vec<f64>,
    ) -> StructuralFieldState {
        let props = *self.wall.properties();
        let p_ext = props.external_pressure;
        let h = props.thickness;
        let axial = props.axial_prestretch * props.wall_modulus;
        let radius = domain.lumen_radius(&displacement);
        let valve = domain.valve();
        let sections = domain.sections();
        let n = domain.section_count();

        let mut hoop_stress = Vec::with_capacity(n);
        let mut von_mises = Vec::with_capacity(n);
        let mut frame_stress: f64 = 0.0;

        for s in 0..n {
            let dp = load.pressure[s] - p_ext;
            let section = sections.section(s);
            let r = section.reference_radius + displacement[s];

            let frame_radius = valve.and_then(|v| v.frame_radius_at(s));
            let wall_load = match (&self.wall, frame_radius) {
                (WallProvider::Elastic(wall), Some(rf)) => {
                    let k_wall = wall.wall_stiffness(section);
                    let k_total = wall.section_stiffness(section, Some(rf));
                    let share = if k_total > 0.0 { k_wall / k_total } else { 1.0 };
                    let contact = valve.map_or(0.0, |v| v.contact_pressure_at(s));
                    let frame = wall.frame_material();
                    let sigma_f = ((1.0 - share) * dp + contact) * rf
                        / (frame.frame_coverage * frame.frame_thickness);
                    frame_stress = frame_stress.max(sigma_f.abs());
                    share * dp + contact
                }
                _ => dp,
            };

            let sigma_theta = wall_load * r / h;
            let sigma_z = axial;
            hoop_stress.push(sigma_theta);
            von_mises.push(
                (sigma_theta * sigma_theta - sigma_theta * sigma_z + sigma_z * sigma_z)
                    .max(0.0)
                    .sqrt(),
            );
        }

        let leaflet_stress = valve.map_or(0.0, |v| {
            let l = v.leaflet_section.min(n - 1);
            let dp = if load.valve_closed {
                load.pressure[l] - self.ventricular_diastolic_pressure
            } else {
                load.pressure[l.saturating_sub(1)] - load.pressure[l]
            };
            let r = radius[l].max(v.orifice_radius);
            dp.abs() * r / (2.0 * self.leaflet_thickness)
        });

        StructuralFieldState {
            displacement,
            hoop_stress,
            von_mises,
            frame_stress,
            leaflet_stress,
            iterations: 0,
            residual: 0.0,
        }
    }
}
