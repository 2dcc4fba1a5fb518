// crates/tavr_physics/src/state.rs

//! 场状态、场历史与收敛记录
//!
//! - [`FieldState`]: 某一时刻的全部节点/单元场，外加截面量和径向速度剖面
//! - [`FieldHistory`]: 按输出频率记录的只追加快照序列，时间严格递增
//! - [`ConvergenceRecord`]: 只追加的迭代残差日志
//!
//! 场数组长度与网格严格对应：节点场长度等于节点数，单元场长度等于单元数。

use glam::DVec3;
use serde::{Deserialize, Serialize};

use tavr_foundation::error::{TavrError, TavrResult};
use tavr_foundation::float::sanitize_residual;

use crate::domain::FsiDomain;

// ============================================================================
// 场状态
// ============================================================================

/// 截面量（每个截面一个值）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectionFields {
    /// 变形后管腔半径 [m]
    pub radius: Vec<f64>,
    /// 截面压力 [Pa]
    pub pressure: Vec<f64>,
    /// 截面平均轴向速度 [m/s]
    pub mean_velocity: Vec<f64>,
    /// 带符号的轴向壁面剪应力 [Pa]
    pub wall_shear: Vec<f64>,
    /// 壁面径向位移 [m]
    pub displacement: Vec<f64>,
    /// 壁面环向应力 [Pa]
    pub hoop_stress: Vec<f64>,
}

/// 某一时刻的全部场
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldState {
    /// 已完成的时间步数
    pub step: usize,
    /// 时间 [s]
    pub time: f64,
    /// 入口流量 [m³/s]
    pub inflow: f64,
    /// 出口压力 [Pa]
    pub outlet_pressure: f64,
    /// 节点速度 [m/s]
    pub velocity: Vec<DVec3>,
    /// 节点压力 [Pa]
    pub pressure: Vec<f64>,
    /// 节点壁面剪应力（非壁面节点为零）[Pa]
    pub wall_shear: Vec<DVec3>,
    /// 节点位移 [m]
    pub displacement: Vec<DVec3>,
    /// 单元 von Mises 应力 [Pa]
    pub stress: Vec<f64>,
    /// 截面量
    pub sections: SectionFields,
    /// 每个截面的径向速度剖面（归一化半径上的单元值）
    pub radial_profiles: Vec<Vec<f64>>,
    /// 支架峰值应力 [Pa]
    pub frame_stress: f64,
    /// 瓣叶峰值应力 [Pa]
    pub leaflet_stress: f64,
    /// 瓣膜是否处于关闭相（舒张期）
    #[serde(default)]
    pub valve_closed: bool,
}

impl FieldState {
    /// 静止初始状态：零速度、零位移、均匀压力
    pub fn at_rest(domain: &FsiDomain, pressure: f64, radial_cells: usize) -> Self {
        let n_nodes = domain.mesh().node_count();
        let n_elements = domain.mesh().element_count();
        let n_sections = domain.section_count();
        let zeros = vec![0.0; n_sections];

        Self {
            step: 0,
            time: 0.0,
            inflow: 0.0,
            outlet_pressure: pressure,
            velocity: vec![DVec3::ZERO; n_nodes],
            pressure: vec![pressure; n_nodes],
            wall_shear: vec![DVec3::ZERO; n_nodes],
            displacement: vec![DVec3::ZERO; n_nodes],
            stress: vec![0.0; n_elements],
            sections: SectionFields {
                radius: domain.lumen_radius(&zeros),
                pressure: vec![pressure; n_sections],
                mean_velocity: zeros.clone(),
                wall_shear: zeros.clone(),
                displacement: zeros.clone(),
                hoop_stress: zeros,
            },
            radial_profiles: vec![vec![0.0; radial_cells]; n_sections],
            frame_stress: 0.0,
            leaflet_stress: 0.0,
            valve_closed: true,
        }
    }

    /// 检查场数组长度与网格一致
    pub fn check_sizes(&self, domain: &FsiDomain) -> TavrResult<()> {
        let n_nodes = domain.mesh().node_count();
        let n_elements = domain.mesh().element_count();
        let n_sections = domain.section_count();
        TavrError::check_size("velocity", n_nodes, self.velocity.len())?;
        TavrError::check_size("pressure", n_nodes, self.pressure.len())?;
        TavrError::check_size("wall_shear", n_nodes, self.wall_shear.len())?;
        TavrError::check_size("displacement", n_nodes, self.displacement.len())?;
        TavrError::check_size("stress", n_elements, self.stress.len())?;
        TavrError::check_size("section_pressure", n_sections, self.sections.pressure.len())?;
        TavrError::check_size(
            "section_displacement",
            n_sections,
            self.sections.displacement.len(),
        )?;
        TavrError::check_size("radial_profiles", n_sections, self.radial_profiles.len())?;
        Ok(())
    }

    /// 边界面的平均壁面剪应力向量
    pub fn face_wall_shear(&self, face_nodes: &[usize]) -> DVec3 {
        if face_nodes.is_empty() {
            return DVec3::ZERO;
        }
        face_nodes.iter().map(|&v| self.wall_shear[v]).sum::<DVec3>() / face_nodes.len() as f64
    }
}

// ============================================================================
// 场历史
// ============================================================================

/// 场历史：只追加，时间严格递增
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldHistory {
    snapshots: Vec<FieldState>,
}

impl FieldHistory {
    /// 创建空历史
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加快照，时间必须严格晚于最后一个快照
    pub fn push(&mut self, state: FieldState) -> TavrResult<()> {
        if let Some(last) = self.snapshots.last() {
            if !(state.time > last.time) {
                return Err(TavrError::internal(format!(
                    "场历史时间必须严格递增: {} <= {}",
                    state.time, last.time
                )));
            }
        }
        self.snapshots.push(state);
        Ok(())
    }

    /// 全部快照
    pub fn snapshots(&self) -> &[FieldState] {
        &self.snapshots
    }

    /// 快照数
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// 最后一个快照
    pub fn last(&self) -> Option<&FieldState> {
        self.snapshots.last()
    }

    /// 追加另一段历史（续算拼接），保持时间递增
    pub fn extend(&mut self, other: FieldHistory) -> TavrResult<()> {
        for state in other.snapshots {
            self.push(state)?;
        }
        Ok(())
    }

    /// 时间在 `(start, end]` 内的快照
    pub fn window(&self, start: f64, end: f64) -> &[FieldState] {
        let lo = self.snapshots.partition_point(|s| s.time <= start);
        let hi = self.snapshots.partition_point(|s| s.time <= end);
        &self.snapshots[lo..hi]
    }
}

// ============================================================================
// 收敛记录
// ============================================================================

/// 残差来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResidualSource {
    /// 耦合迭代
    Coupling,
    /// 流体求解器内部迭代
    FluidSolver,
    /// 结构求解器内部迭代
    StructuralSolver,
}

/// 一次迭代的收敛记录
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceEntry {
    /// 时间步索引（从 0 开始）
    pub step: usize,
    /// 尝试次数（1 为首次，2 为重试）
    pub attempt: u8,
    /// 迭代序号（从 1 开始）
    pub iteration: usize,
    /// 来源
    pub source: ResidualSource,
    /// 流体残差
    pub fluid_residual: f64,
    /// 结构残差
    pub structural_residual: f64,
    /// 组合残差
    pub combined: f64,
    /// 所属尝试是否被接受
    pub accepted: bool,
}

impl ConvergenceEntry {
    /// 创建记录，残差映射为非负有限值
    pub fn new(
        step: usize,
        attempt: u8,
        iteration: usize,
        source: ResidualSource,
        fluid_residual: f64,
        structural_residual: f64,
    ) -> Self {
        let fluid_residual = sanitize_residual(fluid_residual);
        let structural_residual = sanitize_residual(structural_residual);
        Self {
            step,
            attempt,
            iteration,
            source,
            fluid_residual,
            structural_residual,
            combined: sanitize_residual(fluid_residual + structural_residual),
            accepted: false,
        }
    }
}

/// 收敛记录：只追加
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRecord {
    entries: Vec<ConvergenceEntry>,
}

impl ConvergenceRecord {
    /// 创建空记录
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一次尝试的全部记录，并统一设置接受标记
    pub fn append_attempt(&mut self, entries: Vec<ConvergenceEntry>, accepted: bool) {
        self.entries.extend(entries.into_iter().map(|mut e| {
            e.accepted = accepted;
            e
        }));
    }

    /// 全部记录
    pub fn entries(&self) -> &[ConvergenceEntry] {
        &self.entries
    }

    /// 记录数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 某个时间步的记录
    pub fn for_step(&self, step: usize) -> impl Iterator<Item = &ConvergenceEntry> {
        self.entries.iter().filter(move |e| e.step == step)
    }

    /// 某个时间步某次尝试的记录
    pub fn for_attempt(&self, step: usize, attempt: u8) -> impl Iterator<Item = &ConvergenceEntry> {
        self.entries
            .iter()
            .filter(move |e| e.step == step && e.attempt == attempt)
    }

    /// 追加另一段记录（续算拼接）
    pub fn extend(&mut self, other: ConvergenceRecord) {
        self.entries.extend(other.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tavr_mesh::PipeMeshBuilder;

    fn domain() -> FsiDomain {
        let mesh = PipeMeshBuilder::new(0.002, 0.02).with_resolution(4, 2, 6).build().unwrap();
        FsiDomain::new(Arc::new(mesh), None).unwrap()
    }

    #[test]
    fn test_at_rest_sizes() {
        let domain = domain();
        let state = FieldState::at_rest(&domain, 100.0, 8);
        state.check_sizes(&domain).unwrap();
        assert_eq!(state.radial_profiles[0].len(), 8);
        assert!(state.pressure.iter().all(|&p| p == 100.0));

        let mut bad = state.clone();
        bad.stress.pop();
        assert!(matches!(bad.check_sizes(&domain), Err(TavrError::SizeMismatch { .. })));
    }

    #[test]
    fn test_history_strictly_increasing() {
        let domain = domain();
        let mut history = FieldHistory::new();
        let mut s = FieldState::at_rest(&domain, 0.0, 4);
        s.time = 0.1;
        history.push(s.clone()).unwrap();
        assert!(history.push(s.clone()).is_err());
        s.time = 0.2;
        history.push(s.clone()).unwrap();
        s.time = 0.3;
        history.push(s).unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(history.window(0.1, 0.3).len(), 2);
        assert_eq!(history.window(0.0, 0.25).len(), 2);
    }

    #[test]
    fn test_record_sanitizes_and_flags() {
        let mut record = ConvergenceRecord::new();
        record.append_attempt(
            vec![
                ConvergenceEntry::new(0, 1, 1, ResidualSource::FluidSolver, f64::NAN, 0.0),
                ConvergenceEntry::new(0, 1, 2, ResidualSource::FluidSolver, -1.0, 0.0),
            ],
            false,
        );
        record.append_attempt(
            vec![ConvergenceEntry::new(0, 2, 1, ResidualSource::Coupling, 1e-3, 2e-3)],
            true,
        );

        let entries = record.entries();
        assert_eq!(entries[0].fluid_residual, f64::MAX);
        assert_eq!(entries[0].combined, f64::MAX);
        assert_eq!(entries[1].fluid_residual, 1.0);
        assert!(!entries[1].accepted);
        assert!(entries[2].accepted);
        assert!((entries[2].combined - 3e-3).abs() < 1e-15);
        assert_eq!(record.for_attempt(0, 1).count(), 2);
        assert_eq!(record.for_step(0).count(), 3);
    }
}
