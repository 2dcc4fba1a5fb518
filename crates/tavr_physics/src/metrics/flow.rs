// crates/tavr_physics/src/metrics/flow.rs

//! 流动统计与跨瓣压差

use serde::{Deserialize, Serialize};

use tavr_config::FluidProperties;
use tavr_foundation::units::{m3_to_ml, pa_to_mmhg, GORLIN_CONSTANT};

use crate::domain::FsiDomain;
use crate::state::FieldState;

use super::mean_of;

/// 速度与雷诺数统计
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowSummary {
    /// 节点最大速度 [m/s]
    pub max_velocity: f64,
    /// 截面平均速度的时间空间平均 [m/s]
    pub mean_velocity: f64,
    /// 峰值雷诺数（截面直径与截面平均速度）
    pub peak_reynolds: f64,
}

/// 跨瓣压差
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransvalvularGradient {
    /// 上游（心室侧）截面
    pub upstream_section: usize,
    /// 下游（主动脉侧）截面
    pub downstream_section: usize,
    /// 峰值压差 [mmHg]
    pub peak_mmhg: f64,
    /// 前向血流期平均压差 [mmHg]
    pub mean_mmhg: f64,
    /// 前向血流期平均流量 [mL/s]
    pub mean_forward_flow: f64,
    /// Gorlin 有效瓣口面积 [cm²]
    pub effective_orifice_area: Option<f64>,
    /// 参与统计的前向血流快照数
    pub forward_snapshots: usize,
}

/// 速度与雷诺数统计
///
/// 雷诺数使用壁面剪切率 `4ū/R` 下的粘度。
pub fn flow_summary(window: &[FieldState], domain: &FsiDomain, fluid: &FluidProperties) -> FlowSummary {
    let max_velocity = window
        .iter()
        .flat_map(|s| s.velocity.iter().map(|v| v.length()))
        .fold(0.0, f64::max);

    let mean_velocity = mean_of(
        window
            .iter()
            .map(|s| mean_of(s.sections.mean_velocity.iter().map(|u| u.abs()))),
    );

    let peak_reynolds = window
        .iter()
        .flat_map(|s| {
            let radius = domain.lumen_radius(&s.sections.displacement);
            s.sections
                .mean_velocity
                .iter()
                .zip(radius)
                .map(|(u, r)| {
                    let u = u.abs();
                    let mu = fluid.viscosity.viscosity(4.0 * u / r);
                    if mu > 0.0 {
                        fluid.density * u * 2.0 * r / mu
                    } else {
                        0.0
                    }
                })
                .collect::<Vec<_>>()
        })
        .fold(0.0, f64::max);

    FlowSummary {
        max_velocity,
        mean_velocity,
        peak_reynolds,
    }
}

/// 瓣膜两侧的截面；未植入瓣膜时取入口与出口截面
fn gradient_sections(domain: &FsiDomain) -> (usize, usize) {
    let last = domain.section_count().saturating_sub(1);
    match domain.valve() {
        Some(valve) => {
            let first = valve.stented_sections.first().copied().unwrap_or(0);
            let end = valve.stented_sections.last().copied().unwrap_or(last);
            (first.saturating_sub(1), (end + 1).min(last))
        }
        None => (0, last),
    }
}

/// 前向血流期的跨瓣压差与 Gorlin 有效瓣口面积
///
/// `EOA[cm²] = Q[mL/s] / (44.3 · √ΔP_mean[mmHg])`
pub fn transvalvular_gradient(window: &[FieldState], domain: &FsiDomain) -> TransvalvularGradient {
    let (upstream, downstream) = gradient_sections(domain);
    let forward: Vec<&FieldState> = window
        .iter()
        .filter(|s| !s.valve_closed && s.inflow > 0.0)
        .collect();

    let drops: Vec<f64> = forward
        .iter()
        .map(|s| s.sections.pressure[upstream] - s.sections.pressure[downstream])
        .collect();
    let peak_mmhg = pa_to_mmhg(drops.iter().copied().fold(0.0, f64::max));
    let mean_mmhg = pa_to_mmhg(mean_of(drops.iter().copied()));
    let mean_forward_flow = m3_to_ml(mean_of(forward.iter().map(|s| s.inflow)));

    let effective_orifice_area = (mean_mmhg > 0.0 && mean_forward_flow > 0.0)
        .then(|| mean_forward_flow / (GORLIN_CONSTANT * mean_mmhg.sqrt()));

    TransvalvularGradient {
        upstream_section: upstream,
        downstream_section: downstream,
        peak_mmhg,
        mean_mmhg,
        mean_forward_flow,
        effective_orifice_area,
        forward_snapshots: forward.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::*;
    use glam::DVec3;
    use tavr_config::ViscosityModel;
    use tavr_foundation::units::mmhg_to_pa;

    #[test]
    fn test_gorlin_area() {
        let d = domain();
        let last = d.section_count() - 1;
        // 压差恒为 16 mmHg，流量 250 mL/s
        let h = history(&d, 5, |_, s| {
            s.valve_closed = false;
            s.inflow = 250.0e-6;
            s.sections.pressure[0] = 1.0e4 + mmhg_to_pa(16.0);
            s.sections.pressure[last] = 1.0e4;
        });
        let g = transvalvular_gradient(h.snapshots(), &d);
        assert_eq!((g.upstream_section, g.downstream_section), (0, last));
        assert!((g.peak_mmhg - 16.0).abs() < 1e-9);
        assert!((g.mean_mmhg - 16.0).abs() < 1e-9);
        let eoa = g.effective_orifice_area.unwrap();
        assert!((eoa - 250.0 / (44.3 * 4.0)).abs() < 1e-9);
    }

    #[test]
    fn test_closed_valve_excluded() {
        let d = domain();
        let h = history(&d, 5, |_, s| {
            s.inflow = 1.0e-4;
            s.sections.pressure[0] = 5.0e4;
        });
        let g = transvalvular_gradient(h.snapshots(), &d);
        assert_eq!(g.forward_snapshots, 0);
        assert_eq!(g.peak_mmhg, 0.0);
        assert!(g.effective_orifice_area.is_none());
    }

    #[test]
    fn test_reynolds_number() {
        let d = domain();
        let fluid = FluidProperties {
            density: 1000.0,
            viscosity: ViscosityModel::Newtonian { viscosity: 0.004 },
        };
        let h = history(&d, 2, |_, s| {
            s.sections.mean_velocity.iter_mut().for_each(|u| *u = 0.5);
            s.velocity[0] = DVec3::new(0.0, 0.0, 1.0);
        });
        let summary = flow_summary(h.snapshots(), &d, &fluid);
        let r = d.sections().reference_radii().into_iter().fold(0.0, f64::max);
        assert!((summary.max_velocity - 1.0).abs() < 1e-12);
        assert!((summary.mean_velocity - 0.5).abs() < 1e-12);
        assert!((summary.peak_reynolds - 1000.0 * 0.5 * 2.0 * r / 0.004).abs() < 1e-6);
    }
}
