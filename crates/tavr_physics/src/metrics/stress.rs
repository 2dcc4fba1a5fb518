// crates/tavr_physics/src/metrics/stress.rs

//! 结构应力统计

use serde::{Deserialize, Serialize};
use tavr_foundation::float::safe_div;

use crate::state::FieldState;

use super::mean_of;

/// 应力统计
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StressSummary {
    /// 单元 von Mises 应力最大值 [Pa]
    pub max_von_mises: f64,
    /// 峰值时刻的单元平均应力 [Pa]
    pub mean_von_mises: f64,
    /// 应力集中系数（峰值时刻 max / mean）
    pub concentration_factor: f64,
    /// 峰值出现的时间 [s]
    pub peak_time: f64,
    /// 壁面环向应力最大值 [Pa]
    pub max_hoop: f64,
    /// 支架峰值应力 [Pa]
    pub frame_peak: f64,
    /// 瓣叶峰值应力 [Pa]
    pub leaflet_peak: f64,
}

/// 统计窗口内的结构应力
pub fn stress_summary(window: &[FieldState]) -> StressSummary {
    let mut summary = StressSummary::default();

    for state in window {
        let peak = state.stress.iter().copied().fold(0.0, f64::max);
        if peak > summary.max_von_mises {
            let mean = mean_of(state.stress.iter().copied());
            summary.max_von_mises = peak;
            summary.mean_von_mises = mean;
            summary.concentration_factor = safe_div(peak, mean, 1.0);
            summary.peak_time = state.time;
        }
        summary.max_hoop = state
            .sections
            .hoop_stress
            .iter()
            .fold(summary.max_hoop, |m, s| m.max(s.abs()));
        summary.frame_peak = summary.frame_peak.max(state.frame_stress);
        summary.leaflet_peak = summary.leaflet_peak.max(state.leaflet_stress);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::*;

    #[test]
    fn test_peak_snapshot_drives_concentration() {
        let d = domain();
        let h = history(&d, 4, |step, s| {
            s.stress.iter_mut().for_each(|v| *v = 1.0e5 * step as f64);
            if step == 3 {
                s.stress[0] = 2.0e6;
            }
            s.frame_stress = 1.0e7 * step as f64;
            s.leaflet_stress = if step == 2 { 5.0e5 } else { 1.0e5 };
        });
        let summary = stress_summary(h.snapshots());

        assert_eq!(summary.max_von_mises, 2.0e6);
        assert!((summary.peak_time - 0.3).abs() < 1e-12);
        let n = d.mesh().element_count() as f64;
        let mean = (2.0e6 + 3.0e5 * (n - 1.0)) / n;
        assert!((summary.mean_von_mises - mean).abs() < 1e-6);
        assert!((summary.concentration_factor - 2.0e6 / mean).abs() < 1e-9);
        assert_eq!(summary.frame_peak, 4.0e7);
        assert_eq!(summary.leaflet_peak, 5.0e5);
    }

    #[test]
    fn test_unloaded_history() {
        let d = domain();
        let h = history(&d, 2, |_, _| {});
        let summary = stress_summary(h.snapshots());
        assert_eq!(summary.max_von_mises, 0.0);
        assert_eq!(summary.concentration_factor, 0.0);
    }
}
