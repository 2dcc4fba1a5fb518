// crates/tavr_physics/src/metrics/leak.rs

//! 瓣周漏评估
//!
//! 漏口通道由植入时支架与壁面之间的残余间隙决定。沿每个极角，通道宽度取
//! 支架覆盖的所有截面上该角度间隙的最小值（血流必须穿过整个支架段）。
//! 舒张期（瓣膜关闭）的反流速度由主动脉侧压力与左心室舒张压之差按
//! Bernoulli 关系估计：
//!
//! ```text
//! v = √(2·max(p_ao − p_lv, 0) / ρ)
//! ```
//!
//! 反流分数 = 每搏反流量 / 每搏前向流量，分级阈值 5% / 10% / 20%。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;

use tavr_config::SimulationParameters;
use tavr_foundation::units::m3_to_ml;

use crate::deployment::{DeployedValveGeometry, WallGap};
use crate::domain::FsiDomain;
use crate::state::FieldState;

use super::AveragingSpan;

/// 瓣周漏分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LeakGrade {
    /// 无或微量（< 5%）
    NoneOrTrace,
    /// 轻度（< 10%）
    Mild,
    /// 中度（< 20%）
    Moderate,
    /// 重度
    Severe,
}

impl LeakGrade {
    /// 按反流分数 [%] 分级
    pub fn from_fraction(percent: f64) -> Self {
        if percent < 5.0 {
            Self::NoneOrTrace
        } else if percent < 10.0 {
            Self::Mild
        } else if percent < 20.0 {
            Self::Moderate
        } else {
            Self::Severe
        }
    }

    /// 中文名称
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoneOrTrace => "无/微量",
            Self::Mild => "轻度",
            Self::Moderate => "中度",
            Self::Severe => "重度",
        }
    }
}

/// 单个扇区的漏口统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeakSector {
    /// 扇区序号
    pub index: usize,
    /// 起始角 [deg]
    pub start_deg: f64,
    /// 终止角 [deg]
    pub end_deg: f64,
    /// 漏口面积 [m²]
    pub gap_area: f64,
    /// 峰值反流速度 [m/s]
    pub peak_velocity: f64,
    /// 每搏反流量 [mL]
    pub volume_ml: f64,
    /// 峰值速度是否超过阈值
    pub flagged: bool,
}

/// 瓣周漏评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakAssessment {
    /// 扇区统计
    pub sectors: Vec<LeakSector>,
    /// 角度分辨率 [deg]
    pub angle_resolution: f64,
    /// 按角度分辨率划分的漏口面积分布 [m²]
    pub angular_profile: Vec<f64>,
    /// 总漏口面积 [m²]
    pub total_gap_area: f64,
    /// 峰值反流速度 [m/s]
    pub peak_velocity: f64,
    /// 每搏反流量 [mL]
    pub leak_volume_ml: f64,
    /// 每搏前向流量 [mL]
    pub forward_volume_ml: f64,
    /// 反流分数 [%]
    pub leak_fraction: f64,
    /// 分级
    pub grade: LeakGrade,
}

impl LeakAssessment {
    /// 被标记的扇区数
    pub fn flagged_sectors(&self) -> usize {
        self.sectors.iter().filter(|s| s.flagged).count()
    }
}

/// 两个极角之间的最小夹角
fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(2.0 * PI);
    d.min(2.0 * PI - d)
}

/// 通道宽度：各覆盖截面上最近极角节点间隙的最小值
fn channel_gaps(valve: &DeployedValveGeometry) -> Vec<(f64, f64)> {
    let mut by_section: BTreeMap<usize, Vec<&WallGap>> = BTreeMap::new();
    for gap in &valve.wall_gaps {
        by_section.entry(gap.section).or_default().push(gap);
    }
    let Some(sealing) = by_section.get(&valve.sealing_section()) else {
        return Vec::new();
    };

    sealing
        .iter()
        .map(|node| {
            let width = by_section
                .values()
                .filter_map(|gaps| {
                    gaps.iter().min_by(|a, b| {
                        angular_distance(a.angle, node.angle)
                            .total_cmp(&angular_distance(b.angle, node.angle))
                    })
                })
                .map(|g| if g.contact { 0.0 } else { g.gap.max(0.0) })
                .fold(f64::INFINITY, f64::min);
            let width = if width.is_finite() { width } else { 0.0 };
            (node.angle.rem_euclid(2.0 * PI), width * node.arc_length)
        })
        .collect()
}

/// 评估瓣周漏
pub fn assess_leak(
    window: &[FieldState],
    span: &AveragingSpan,
    domain: &FsiDomain,
    valve: &DeployedValveGeometry,
    params: &SimulationParameters,
) -> LeakAssessment {
    let post = params.postprocess();
    let density = params.fluid().density;
    let period = params.time().cycle_duration;

    let last = domain.section_count().saturating_sub(1);
    let aortic = valve
        .stented_sections
        .last()
        .map_or(last, |&s| (s + 1).min(last));

    // 角度分布
    let resolution = post.leak_angle_resolution;
    let bins = (360.0 / resolution).ceil().max(1.0) as usize;
    let regions = post.leak_regions.max(1);
    let sector_width = 360.0 / regions as f64;
    let mut angular_profile = vec![0.0; bins];
    let mut sector_area = vec![0.0; regions];
    for (angle, area) in channel_gaps(valve) {
        let deg = angle.to_degrees();
        angular_profile[((deg / resolution) as usize).min(bins - 1)] += area;
        sector_area[((deg / sector_width) as usize).min(regions - 1)] += area;
    }
    let total_gap_area: f64 = sector_area.iter().sum();

    // 反流速度与每搏流量
    let beats = (span.duration() / period).max(f64::MIN_POSITIVE);
    let mut peak_velocity: f64 = 0.0;
    let mut regurgitant = 0.0;
    let mut forward = 0.0;
    for state in window {
        if state.valve_closed {
            let dp = state.sections.pressure[aortic] - post.ventricular_diastolic_pressure;
            let v = (2.0 * dp.max(0.0) / density).sqrt();
            peak_velocity = peak_velocity.max(v);
            regurgitant += v * span.sample_interval;
        } else {
            forward += state.inflow.max(0.0) * span.sample_interval;
        }
    }

    let leak_volume_ml = m3_to_ml(total_gap_area * regurgitant / beats);
    let forward_volume_ml = m3_to_ml(forward / beats);
    let leak_fraction = if forward_volume_ml > 0.0 {
        100.0 * leak_volume_ml / forward_volume_ml
    } else if leak_volume_ml > 0.0 {
        100.0
    } else {
        0.0
    };

    let sectors = sector_area
        .iter()
        .enumerate()
        .map(|(index, &gap_area)| {
            let sector_peak = if gap_area > 0.0 { peak_velocity } else { 0.0 };
            LeakSector {
                index,
                start_deg: index as f64 * sector_width,
                end_deg: (index + 1) as f64 * sector_width,
                gap_area,
                peak_velocity: sector_peak,
                volume_ml: m3_to_ml(gap_area * regurgitant / beats),
                flagged: sector_peak > post.leak_threshold_velocity,
            }
        })
        .collect();

    LeakAssessment {
        sectors,
        angle_resolution: resolution,
        angular_profile,
        total_gap_area,
        peak_velocity: if total_gap_area > 0.0 { peak_velocity } else { 0.0 },
        leak_volume_ml,
        forward_volume_ml,
        leak_fraction,
        grade: LeakGrade::from_fraction(leak_fraction),
    }
}
