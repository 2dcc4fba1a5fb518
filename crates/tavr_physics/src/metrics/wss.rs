// crates/tavr_physics/src/metrics/wss.rs

//! 壁面剪应力指标
//!
//! 对窗口内等间隔快照求平均：
//!
//! ```text
//! TAWSS = mean(|τ|)
//! OSI   = ½ · (1 − |mean(τ)| / mean(|τ|))
//! RRT   = 1 / ((1 − 2·OSI) · TAWSS) = 1 / |mean(τ)|
//! ```
//!
//! TAWSS 为零时 OSI 无定义，平均剪应力矢量为零时 RRT 无定义。

use glam::DVec3;
use serde::{Deserialize, Serialize};
use tavr_foundation::float::KahanSum;

use crate::state::FieldState;

/// 低剪应力阈值 [Pa]
pub const LOW_WSS_THRESHOLD: f64 = 0.5;

/// 高剪应力阈值 [Pa]
pub const HIGH_WSS_THRESHOLD: f64 = 2.5;

/// 判定剪应力为零的下限 [Pa]
const WSS_FLOOR: f64 = 1.0e-12;

/// 单个壁面节点的剪应力指标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallShearIndices {
    /// 节点索引
    pub node: usize,
    /// 时间平均剪应力 [Pa]
    pub tawss: f64,
    /// 振荡剪切指数 [0, 0.5]
    pub osi: Option<f64>,
    /// 相对驻留时间 [1/Pa]
    pub rrt: Option<f64>,
}

/// 壁面剪应力统计
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WallShearSummary {
    /// 每个壁面节点的指标
    pub nodes: Vec<WallShearIndices>,
    /// 最大 TAWSS [Pa]
    pub max_tawss: f64,
    /// 平均 TAWSS [Pa]
    pub mean_tawss: f64,
    /// 最大 OSI
    pub max_osi: f64,
    /// TAWSS 低于低剪应力阈值的节点
    pub low_wss_nodes: Vec<usize>,
    /// TAWSS 高于高剪应力阈值的节点
    pub high_wss_nodes: Vec<usize>,
}

impl WallShearSummary {
    /// 低剪应力节点占比
    pub fn low_wss_fraction(&self) -> f64 {
        if self.nodes.is_empty() {
            0.0
        } else {
            self.low_wss_nodes.len() as f64 / self.nodes.len() as f64
        }
    }
}

/// 计算壁面节点的剪应力指标
pub fn wall_shear_indices(window: &[FieldState], wall_nodes: &[usize]) -> WallShearSummary {
    if window.is_empty() {
        return WallShearSummary::default();
    }
    let n = window.len() as f64;

    let nodes: Vec<WallShearIndices> = wall_nodes
        .iter()
        .map(|&node| {
            let mut sum = [KahanSum::new(); 3];
            let mut sum_abs = KahanSum::new();
            for state in window {
                let tau = state.wall_shear[node];
                sum_abs.add(tau.length());
                for (acc, component) in sum.iter_mut().zip(tau.to_array()) {
                    acc.add(component);
                }
            }
            let tawss = sum_abs.value() / n;
            let mean = DVec3::new(sum[0].value(), sum[1].value(), sum[2].value());
            let mean_magnitude = mean.length() / n;

            let osi = (tawss > WSS_FLOOR)
                .then(|| (0.5 * (1.0 - mean_magnitude / tawss)).clamp(0.0, 0.5));
            let rrt = (mean_magnitude > WSS_FLOOR).then(|| 1.0 / mean_magnitude);
            WallShearIndices {
                node,
                tawss,
                osi,
                rrt,
            }
        })
        .collect();

    let max_tawss = nodes.iter().map(|i| i.tawss).fold(0.0, f64::max);
    let mean_tawss = super::mean_of(nodes.iter().map(|i| i.tawss));
    let max_osi = nodes.iter().filter_map(|i| i.osi).fold(0.0, f64::max);
    let low_wss_nodes = nodes
        .iter()
        .filter(|i| i.tawss < LOW_WSS_THRESHOLD)
        .map(|i| i.node)
        .collect();
    let high_wss_nodes = nodes
        .iter()
        .filter(|i| i.tawss > HIGH_WSS_THRESHOLD)
        .map(|i| i.node)
        .collect();

    WallShearSummary {
        nodes,
        max_tawss,
        mean_tawss,
        max_osi,
        low_wss_nodes,
        high_wss_nodes,
    }
}
