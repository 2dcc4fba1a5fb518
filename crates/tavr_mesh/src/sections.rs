// crates/tavr_mesh/src/sections.rs

//! 中心线截面分解
//!
//! 求解器在轴对称截面上工作。`SectionMap` 以入口形心到出口形心为轴，
//! 把节点分配到轴向截面，并给出每个节点的轴向坐标、径向距离和极角。
//!
//! 截面划分有两种方式：
//!
//! - **平面聚类**（默认）：轴向坐标相同的节点归为一个截面，适用于挤出生成的结构化网格
//! - **均匀分箱**：给定截面数时沿轴均匀划分，适用于非结构网格
//!
//! 平面聚类得到的某个截面壁面节点少于 3 个时，自动回退到均匀分箱。

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::{debug, warn};

use crate::error::{MeshError, MeshResult};
use crate::mesh::{BoundaryTag, VascularMesh};

/// 截面最少壁面节点数
const MIN_WALL_NODES: usize = 3;

/// 轴向截面
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// 截面轴向位置（节点轴向坐标均值）[m]
    pub axial_position: f64,
    /// 截面内全部节点
    pub nodes: Vec<usize>,
    /// 截面内壁面节点（按极角升序）
    pub wall_nodes: Vec<usize>,
    /// 参考管腔半径（壁面节点径向距离均值）[m]
    pub reference_radius: f64,
    /// 钙化壁面节点比例
    pub calcified_fraction: f64,
}

/// 冠脉开口位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoronaryOstium {
    /// 左/右冠脉标记
    pub side: BoundaryTag,
    /// 开口中心轴向位置 [m]
    pub axial_position: f64,
    /// 开口中心极角 [rad]
    pub angle: f64,
    /// 开口等效半径 [m]
    pub radius: f64,
}

/// 截面映射
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMap {
    origin: DVec3,
    axis: DVec3,
    e1: DVec3,
    e2: DVec3,
    length: f64,
    node_section: Vec<usize>,
    node_axial: Vec<f64>,
    node_radius: Vec<f64>,
    node_angle: Vec<f64>,
    sections: Vec<Section>,
    ostia: Vec<CoronaryOstium>,
}

impl SectionMap {
    /// 从网格构建截面映射
    ///
    /// `axial_sections` 为 `None` 时使用平面聚类。
    pub fn build(mesh: &VascularMesh, axial_sections: Option<usize>) -> MeshResult<Self> {
        let inlet = tag_centroid(mesh, BoundaryTag::Inlet)?;
        let outlet = tag_centroid(mesh, BoundaryTag::Outlet)?;
        let span = outlet - inlet;
        let length = span.length();
        if length <= f64::EPSILON {
            return Err(MeshError::Degenerate("入口与出口形心重合".into()));
        }
        let axis = span / length;
        let (e1, e2) = orthonormal_basis(axis);

        let n = mesh.node_count();
        let mut node_axial = Vec::with_capacity(n);
        let mut node_radius = Vec::with_capacity(n);
        let mut node_angle = Vec::with_capacity(n);
        for p in mesh.nodes() {
            let d = *p - inlet;
            let s = d.dot(axis);
            let radial = d - s * axis;
            node_axial.push(s);
            node_radius.push(radial.length());
            node_angle.push(radial.dot(e2).atan2(radial.dot(e1)).rem_euclid(TAU));
        }

        let wall_tags = mesh.wall_node_tags();

        let groups = match axial_sections {
            Some(count) => uniform_bins(&node_axial, length, count),
            None => {
                let clusters = plane_clusters(&node_axial, length);
                let sparse = clusters.iter().any(|c| {
                    c.iter().filter(|&&v| wall_tags[v].is_some()).count() < MIN_WALL_NODES
                });
                if sparse {
                    let count = fallback_bin_count(n);
                    warn!(
                        clusters = clusters.len(),
                        bins = count,
                        "平面聚类得到的截面壁面节点不足，回退到均匀分箱"
                    );
                    uniform_bins(&node_axial, length, count)
                } else {
                    clusters
                }
            }
        };

        let mut node_section = vec![0; n];
        let mut sections = Vec::with_capacity(groups.len());
        for (si, nodes) in groups.into_iter().enumerate() {
            let mut wall_nodes: Vec<usize> =
                nodes.iter().copied().filter(|&v| wall_tags[v].is_some()).collect();
            if wall_nodes.len() < MIN_WALL_NODES {
                return Err(MeshError::Degenerate(format!(
                    "截面 {} 只有 {} 个壁面节点，请减少轴向截面数",
                    si,
                    wall_nodes.len()
                )));
            }
            wall_nodes.sort_by(|&a, &b| node_angle[a].total_cmp(&node_angle[b]));

            let reference_radius =
                wall_nodes.iter().map(|&v| node_radius[v]).sum::<f64>() / wall_nodes.len() as f64;
            if !(reference_radius > 0.0) {
                // 完全闭塞的截面保留下来，由流体求解器报告发散
                warn!(section = si, radius = reference_radius, "截面管腔半径为零");
            }
            let calcified = wall_nodes
                .iter()
                .filter(|&&v| wall_tags[v] == Some(BoundaryTag::Calcified))
                .count();
            let axial_position =
                nodes.iter().map(|&v| node_axial[v]).sum::<f64>() / nodes.len() as f64;

            for &v in &nodes {
                node_section[v] = si;
            }
            sections.push(Section {
                axial_position,
                calcified_fraction: calcified as f64 / wall_nodes.len() as f64,
                nodes,
                wall_nodes,
                reference_radius,
            });
        }

        let mut map = Self {
            origin: inlet,
            axis,
            e1,
            e2,
            length,
            node_section,
            node_axial,
            node_radius,
            node_angle,
            sections,
            ostia: Vec::new(),
        };
        map.ostia = [BoundaryTag::LeftCoronary, BoundaryTag::RightCoronary]
            .into_iter()
            .filter_map(|side| map.locate_ostium(mesh, side))
            .collect();

        debug!(
            sections = map.sections.len(),
            length = map.length,
            ostia = map.ostia.len(),
            "截面映射已构建"
        );
        Ok(map)
    }

    fn locate_ostium(&self, mesh: &VascularMesh, side: BoundaryTag) -> Option<CoronaryOstium> {
        let mut area = 0.0;
        let mut weighted = DVec3::ZERO;
        for (_, face) in mesh.faces_with_tag(side) {
            let a = mesh.face_area(face);
            area += a;
            weighted += a * mesh.face_centroid(face);
        }
        if area <= 0.0 {
            return None;
        }
        let c = weighted / area;
        let (s, _, angle) = self.project(c);
        Some(CoronaryOstium {
            side,
            axial_position: s,
            angle,
            radius: (area / std::f64::consts::PI).sqrt(),
        })
    }

    /// 点在截面坐标系中的 (轴向, 径向, 极角)
    pub fn project(&self, p: DVec3) -> (f64, f64, f64) {
        let d = p - self.origin;
        let s = d.dot(self.axis);
        let radial = d - s * self.axis;
        let angle = radial.dot(self.e2).atan2(radial.dot(self.e1)).rem_euclid(TAU);
        (s, radial.length(), angle)
    }

    // ========================================================================
    // 访问器
    // ========================================================================

    /// 截面数
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// 全部截面
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// 单个截面
    pub fn section(&self, i: usize) -> &Section {
        &self.sections[i]
    }

    /// 节点所属截面
    pub fn section_of(&self, node: usize) -> usize {
        self.node_section[node]
    }

    /// 节点轴向坐标
    pub fn axial(&self, node: usize) -> f64 {
        self.node_axial[node]
    }

    /// 节点径向距离
    pub fn radial(&self, node: usize) -> f64 {
        self.node_radius[node]
    }

    /// 节点极角 [0, 2π)
    pub fn angle(&self, node: usize) -> f64 {
        self.node_angle[node]
    }

    /// 节点径向单位向量（轴上节点为零向量）
    pub fn radial_direction(&self, node: usize) -> DVec3 {
        let a = self.node_angle[node];
        if self.node_radius[node] <= f64::EPSILON {
            DVec3::ZERO
        } else {
            a.cos() * self.e1 + a.sin() * self.e2
        }
    }

    /// 轴向单位向量（入口指向出口）
    pub fn axis(&self) -> DVec3 {
        self.axis
    }

    /// 轴线起点（入口形心）
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// 轴线长度
    pub fn length(&self) -> f64 {
        self.length
    }

    /// 各截面参考半径
    pub fn reference_radii(&self) -> Vec<f64> {
        self.sections.iter().map(|s| s.reference_radius).collect()
    }

    /// 各截面轴向位置
    pub fn axial_positions(&self) -> Vec<f64> {
        self.sections.iter().map(|s| s.axial_position).collect()
    }

    /// 冠脉开口
    pub fn coronary_ostia(&self) -> &[CoronaryOstium] {
        &self.ostia
    }

    /// 与给定轴向位置最近的截面
    pub fn nearest_section(&self, axial: f64) -> usize {
        let idx = self
            .sections
            .partition_point(|s| s.axial_position < axial);
        if idx == 0 {
            return 0;
        }
        if idx >= self.sections.len() {
            return self.sections.len() - 1;
        }
        let before = axial - self.sections[idx - 1].axial_position;
        let after = self.sections[idx].axial_position - axial;
        if before <= after {
            idx - 1
        } else {
            idx
        }
    }

    /// 瓣环截面：近端一半中参考半径最小的截面
    pub fn annulus_section(&self) -> usize {
        let half = (self.sections.len() / 2).max(1);
        self.sections[..half]
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.reference_radius.total_cmp(&b.1.reference_radius))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

fn tag_centroid(mesh: &VascularMesh, tag: BoundaryTag) -> MeshResult<DVec3> {
    let nodes = mesh.nodes_with_tag(tag);
    if nodes.is_empty() {
        return Err(MeshError::MissingBoundary(tag));
    }
    let sum: DVec3 = nodes.iter().map(|&v| mesh.node(v)).sum();
    Ok(sum / nodes.len() as f64)
}

fn orthonormal_basis(axis: DVec3) -> (DVec3, DVec3) {
    let seed = if axis.x.abs() < 0.9 { DVec3::X } else { DVec3::Y };
    let e1 = (seed - seed.dot(axis) * axis).normalize();
    let e2 = axis.cross(e1);
    (e1, e2)
}

/// 按轴向坐标聚类：相邻坐标差超过容差即分为新平面
fn plane_clusters(axial: &[f64], length: f64) -> Vec<Vec<usize>> {
    let tol = (1e-6 * length).max(1e-12);
    let mut order: Vec<usize> = (0..axial.len()).collect();
    order.sort_by(|&a, &b| axial[a].total_cmp(&axial[b]));

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut last = f64::NEG_INFINITY;
    for v in order {
        if axial[v] - last > tol || clusters.is_empty() {
            clusters.push(Vec::new());
        }
        last = axial[v];
        if let Some(c) = clusters.last_mut() {
            c.push(v);
        }
    }
    for c in &mut clusters {
        c.sort_unstable();
    }
    clusters
}

fn uniform_bins(axial: &[f64], length: f64, count: usize) -> Vec<Vec<usize>> {
    let count = count.max(1);
    let mut bins = vec![Vec::new(); count];
    for (v, &s) in axial.iter().enumerate() {
        let b = ((s / length) * count as f64).floor();
        let b = if b < 0.0 { 0 } else { (b as usize).min(count - 1) };
        bins[b].push(v);
    }
    bins
}

fn fallback_bin_count(node_count: usize) -> usize {
    ((node_count as f64).cbrt().round() as usize).clamp(2, 64)
}
