// crates/tavr_physics/src/metrics/coronary.rs

//! 冠脉阻塞风险
//!
//! 两个几何量与阈值比较：
//!
//! - 冠脉高度：开口中心到瓣环平面的轴向距离，对照 `sov_height_threshold`
//! - VTC 距离：开口处窦壁到被推开的瓣叶（支架半径）的径向距离，对照
//!   `vtc_distance_threshold`
//!
//! 每项按低于阈值的比例给出 0..1 的风险因子，风险百分比为两者均值，
//! 低于 10% 为低风险。

use serde::{Deserialize, Serialize};

use tavr_config::PostprocessSettings;
use tavr_mesh::BoundaryTag;

use crate::deployment::DeployedValveGeometry;
use crate::domain::FsiDomain;

/// 高风险下限 [%]
pub const HIGH_RISK_PERCENT: f64 = 10.0;

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskCategory {
    /// 低风险
    Low,
    /// 高风险
    High,
}

/// 单个冠脉开口的风险
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoronaryRisk {
    /// 左/右冠脉
    pub side: BoundaryTag,
    /// 开口高于瓣环的距离 [m]
    pub height: f64,
    /// 瓣膜-冠脉距离 [m]（未植入瓣膜时为 `None`）
    pub vtc_distance: Option<f64>,
    /// 开口是否位于瓣叶高度范围内
    pub within_leaflet_height: bool,
    /// 风险百分比
    pub risk_percent: f64,
    /// 等级
    pub category: RiskCategory,
}

fn shortfall(value: f64, threshold: f64) -> f64 {
    (1.0 - value / threshold).clamp(0.0, 1.0)
}

/// 评估每个冠脉开口的阻塞风险
pub fn assess_coronary_risk(
    domain: &FsiDomain,
    valve: Option<&DeployedValveGeometry>,
    post: &PostprocessSettings,
) -> Vec<CoronaryRisk> {
    let sections = domain.sections();
    let annulus = valve.map_or_else(|| sections.annulus_section(), |v| v.annulus_section);
    let z_annulus = sections.section(annulus).axial_position;

    sections
        .coronary_ostia()
        .iter()
        .map(|ostium| {
            let height = ostium.axial_position - z_annulus;
            let sinus_radius = sections
                .section(sections.nearest_section(ostium.axial_position))
                .reference_radius;

            let (vtc_distance, within_leaflet_height) = match valve {
                Some(v) => {
                    let leaflet_radius = v
                        .stented_sections
                        .iter()
                        .zip(&v.frame_radius)
                        .min_by(|(a, _), (b, _)| {
                            let da = sections.section(**a).axial_position - ostium.axial_position;
                            let db = sections.section(**b).axial_position - ostium.axial_position;
                            da.abs().total_cmp(&db.abs())
                        })
                        .map_or(v.orifice_radius, |(_, &r)| r);
                    let leaflet_top =
                        sections.section(v.leaflet_section).axial_position + v.leaflet_height;
                    (
                        Some((sinus_radius - leaflet_radius).max(0.0)),
                        ostium.axial_position - ostium.radius <= leaflet_top,
                    )
                }
                None => (None, false),
            };

            let height_factor = shortfall(height, post.sov_height_threshold);
            let distance_factor =
                vtc_distance.map_or(0.0, |d| shortfall(d, post.vtc_distance_threshold));
            let risk_percent = 50.0 * (height_factor + distance_factor);
            let category = if risk_percent >= HIGH_RISK_PERCENT {
                RiskCategory::High
            } else {
                RiskCategory::Low
            };

            CoronaryRisk {
                side: ostium.side,
                height,
                vtc_distance,
                within_leaflet_height,
                risk_percent,
                category,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::deploy_selected;
    use std::sync::Arc;
    use tavr_config::{AnalysisConfig, SimulationParameters};
    use tavr_mesh::PipeMeshBuilder;

    fn root() -> tavr_mesh::VascularMesh {
        PipeMeshBuilder::aortic_root(0.012, 0.06)
            .with_resolution(24, 3, 16)
            .build()
            .unwrap()
    }

    #[test]
    fn test_without_valve_uses_height_only() {
        let params = SimulationParameters::from_config(&AnalysisConfig::default()).unwrap();
        let domain = FsiDomain::new(Arc::new(root()), None).unwrap();
        let risks = assess_coronary_risk(&domain, None, params.postprocess());

        assert_eq!(risks.len(), 2);
        for risk in &risks {
            assert!(risk.vtc_distance.is_none());
            // 开口在瓣环上方约 10.8 mm
            assert!(risk.height > 0.009 && risk.height < 0.013, "height = {}", risk.height);
            assert!(risk.risk_percent < HIGH_RISK_PERCENT);
            assert_eq!(risk.category, RiskCategory::Low);
        }
    }

    #[test]
    fn test_deployed_valve_narrows_vtc() {
        let params = SimulationParameters::from_config(&AnalysisConfig::default()).unwrap();
        let mut mesh = root();
        let valve = deploy_selected(&mut mesh, &params).unwrap();
        let domain = FsiDomain::new(Arc::new(mesh), None).unwrap();
        let risks = assess_coronary_risk(&domain, Some(&valve), params.postprocess());

        assert_eq!(risks.len(), 2);
        let left = risks.iter().find(|r| r.side == BoundaryTag::LeftCoronary).unwrap();
        let vtc = left.vtc_distance.unwrap();
        assert!(vtc > 0.0 && vtc < 0.004, "vtc = {}", vtc);
        assert!(left.risk_percent >= HIGH_RISK_PERCENT);
        assert_eq!(left.category, RiskCategory::High);
    }

    #[test]
    fn test_height_shortfall() {
        let params = SimulationParameters::from_config(&AnalysisConfig::default()).unwrap();
        let post = *params.postprocess();
        assert_eq!(shortfall(0.005, post.sov_height_threshold), 0.5);
        assert_eq!(shortfall(0.02, post.sov_height_threshold), 0.0);
    }
}
