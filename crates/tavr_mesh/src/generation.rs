// crates/tavr_mesh/src/generation.rs

//! 网格生成模块
//!
//! 提供结构化管道网格生成工具，用于测试、验证和命令行演示：
//!
//! - [`PipeMeshBuilder`]: 直管或带半径轮廓的管道（中心为三棱柱，其余为六面体）
//! - [`PipeMeshBuilder::aortic_root`]: 带瓣环收缩与主动脉窦膨出的主动脉根部模型
//!
//! 真实病例网格由外部网格生成工具提供，通过 JSON 读入。
//!
//! # 使用示例
//!
//! ```rust
//! use tavr_mesh::generation::PipeMeshBuilder;
//!
//! let mesh = PipeMeshBuilder::new(0.002, 0.02)
//!     .with_resolution(10, 4, 12)
//!     .build()
//!     .unwrap();
//!
//! // 11 个平面，每个平面 1 + 4*12 个节点
//! assert_eq!(mesh.node_count(), 11 * 49);
//! // 每层 12 个三棱柱 + 3*12 个六面体
//! assert_eq!(mesh.element_count(), 10 * 48);
//! ```

use glam::DVec3;
use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use crate::error::{MeshError, MeshResult};
use crate::mesh::{BoundaryFace, BoundaryTag, Element, ElementKind, VascularMesh};

/// 半径轮廓函数：轴向坐标 → 管腔半径
pub type RadiusProfile = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// 钙化带（轴向与角度范围内的壁面标记为钙化）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalcifiedBand {
    /// 起始轴向位置 [m]
    pub z_start: f64,
    /// 结束轴向位置 [m]
    pub z_end: f64,
    /// 起始极角 [rad]
    pub theta_start: f64,
    /// 结束极角 [rad]
    pub theta_end: f64,
}

impl CalcifiedBand {
    fn contains(&self, z: f64, theta: f64) -> bool {
        let theta = theta.rem_euclid(TAU);
        let in_theta = if self.theta_start <= self.theta_end {
            theta >= self.theta_start && theta <= self.theta_end
        } else {
            // 跨越 0 角
            theta >= self.theta_start || theta <= self.theta_end
        };
        z >= self.z_start && z <= self.z_end && in_theta
    }
}

/// 冠脉开口（最靠近给定位置的一个壁面片标记为开口）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OstiumPlacement {
    /// 左/右冠脉
    pub side: BoundaryTag,
    /// 轴向位置 [m]
    pub z: f64,
    /// 极角 [rad]
    pub theta: f64,
}

/// 结构化管道网格生成器
///
/// 节点按平面存储：每个平面先是轴心节点，然后由内到外每个环 `n_theta` 个节点。
pub struct PipeMeshBuilder {
    radius: f64,
    length: f64,
    n_axial: usize,
    n_radial: usize,
    n_theta: usize,
    profile: Option<RadiusProfile>,
    ellipticity: f64,
    calcified: Vec<CalcifiedBand>,
    ostia: Vec<OstiumPlacement>,
}

impl PipeMeshBuilder {
    /// 创建直管生成器
    ///
    /// # 参数
    ///
    /// - `radius`: 管腔半径 [m]
    /// - `length`: 管长 [m]
    pub fn new(radius: f64, length: f64) -> Self {
        Self {
            radius,
            length,
            n_axial: 20,
            n_radial: 4,
            n_theta: 16,
            profile: None,
            ellipticity: 0.0,
            calcified: Vec::new(),
            ostia: Vec::new(),
        }
    }

    /// 主动脉根部模型
    ///
    /// 流出道半径 `annulus_radius * 1.1`，在 `0.3·L` 处收缩到瓣环，
    /// 其上为主动脉窦（最大膨出 `1.3×`），窦管交界之后为升主动脉。
    /// 在窦部放置左右冠脉开口。
    pub fn aortic_root(annulus_radius: f64, length: f64) -> Self {
        let z_annulus = 0.3 * length;
        let z_stj = 0.6 * length;
        let profile = move |z: f64| {
            let r0 = annulus_radius;
            if z <= z_annulus {
                // 流出道向瓣环平滑收缩
                let t = z / z_annulus;
                r0 * (1.1 - 0.1 * (0.5 - 0.5 * (PI * t).cos()))
            } else if z <= z_stj {
                // 窦部膨出
                let t = (z - z_annulus) / (z_stj - z_annulus);
                r0 * (1.0 + 0.3 * (PI * t).sin())
            } else {
                r0 * 1.05
            }
        };
        let z_ostia = z_annulus + 0.6 * (z_stj - z_annulus);
        Self::new(annulus_radius, length)
            .with_profile(profile)
            .with_ostium(BoundaryTag::LeftCoronary, z_ostia, 0.5 * PI)
            .with_ostium(BoundaryTag::RightCoronary, z_ostia, 1.5 * PI)
    }

    /// 设置分辨率（轴向段数、径向环数、周向节点数）
    pub fn with_resolution(mut self, n_axial: usize, n_radial: usize, n_theta: usize) -> Self {
        self.n_axial = n_axial;
        self.n_radial = n_radial;
        self.n_theta = n_theta;
        self
    }

    /// 设置半径轮廓
    pub fn with_profile<F>(mut self, profile: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.profile = Some(Arc::new(profile));
        self
    }

    /// 设置截面椭圆度 `e`：x 方向半轴放大 `1+e`，y 方向缩小 `1-e`
    pub fn with_ellipticity(mut self, e: f64) -> Self {
        self.ellipticity = e;
        self
    }

    /// 添加钙化带
    pub fn with_calcified_band(mut self, band: CalcifiedBand) -> Self {
        self.calcified.push(band);
        self
    }

    /// 添加冠脉开口
    pub fn with_ostium(mut self, side: BoundaryTag, z: f64, theta: f64) -> Self {
        self.ostia.push(OstiumPlacement { side, z, theta });
        self
    }

    /// 每个平面的节点数
    pub fn nodes_per_plane(&self) -> usize {
        1 + self.n_radial * self.n_theta
    }

    /// 节点索引：平面 `k`，环 `j`（0 为轴心），周向 `t`
    pub fn node_index(&self, k: usize, j: usize, t: usize) -> usize {
        let base = k * self.nodes_per_plane();
        if j == 0 {
            base
        } else {
            base + 1 + (j - 1) * self.n_theta + (t % self.n_theta)
        }
    }

    fn radius_at(&self, z: f64) -> f64 {
        match &self.profile {
            Some(f) => f(z),
            None => self.radius,
        }
    }

    /// 构建网格
    pub fn build(&self) -> MeshResult<VascularMesh> {
        if self.n_axial == 0 || self.n_radial == 0 || self.n_theta < 3 {
            return Err(MeshError::Degenerate(format!(
                "分辨率无效: n_axial={}, n_radial={}, n_theta={}",
                self.n_axial, self.n_radial, self.n_theta
            )));
        }
        if !(self.ellipticity.abs() < 1.0) {
            return Err(MeshError::Degenerate(format!("椭圆度无效: {}", self.ellipticity)));
        }
        if !(self.length > 0.0) {
            return Err(MeshError::Degenerate(format!("管长无效: {}", self.length)));
        }

        let dz = self.length / self.n_axial as f64;
        let nt = self.n_theta;

        // 节点
        let mut nodes = Vec::with_capacity((self.n_axial + 1) * self.nodes_per_plane());
        for k in 0..=self.n_axial {
            let z = k as f64 * dz;
            let r_wall = self.radius_at(z);
            if !(r_wall > 0.0) {
                return Err(MeshError::Degenerate(format!("z={} 处半径无效: {}", z, r_wall)));
            }
            nodes.push(DVec3::new(0.0, 0.0, z));
            for j in 1..=self.n_radial {
                let r = r_wall * j as f64 / self.n_radial as f64;
                for t in 0..nt {
                    let theta = TAU * t as f64 / nt as f64;
                    nodes.push(DVec3::new(
                        r * (1.0 + self.ellipticity) * theta.cos(),
                        r * (1.0 - self.ellipticity) * theta.sin(),
                        z,
                    ));
                }
            }
        }

        // 体单元
        let mut elements = Vec::with_capacity(self.n_axial * self.n_radial * nt);
        for k in 0..self.n_axial {
            for t in 0..nt {
                let idx = |kk, j, tt| self.node_index(kk, j, tt);
                elements.push(Element::new(
                    ElementKind::Wedge6,
                    vec![
                        idx(k, 0, t),
                        idx(k, 1, t),
                        idx(k, 1, t + 1),
                        idx(k + 1, 0, t),
                        idx(k + 1, 1, t),
                        idx(k + 1, 1, t + 1),
                    ],
                ));
                for j in 1..self.n_radial {
                    elements.push(Element::new(
                        ElementKind::Hex8,
                        vec![
                            idx(k, j, t),
                            idx(k, j, t + 1),
                            idx(k, j + 1, t + 1),
                            idx(k, j + 1, t),
                            idx(k + 1, j, t),
                            idx(k + 1, j, t + 1),
                            idx(k + 1, j + 1, t + 1),
                            idx(k + 1, j + 1, t),
                        ],
                    ));
                }
            }
        }

        // 边界面
        let mut faces = Vec::new();
        for (k, tag) in [(0, BoundaryTag::Inlet), (self.n_axial, BoundaryTag::Outlet)] {
            for t in 0..nt {
                faces.push(BoundaryFace::new(
                    vec![
                        self.node_index(k, 0, t),
                        self.node_index(k, 1, t),
                        self.node_index(k, 1, t + 1),
                    ],
                    tag,
                ));
                for j in 1..self.n_radial {
                    faces.push(BoundaryFace::new(
                        vec![
                            self.node_index(k, j, t),
                            self.node_index(k, j, t + 1),
                            self.node_index(k, j + 1, t + 1),
                            self.node_index(k, j + 1, t),
                        ],
                        tag,
                    ));
                }
            }
        }

        let outer = self.n_radial;
        let wall_start = faces.len();
        for k in 0..self.n_axial {
            let z_mid = (k as f64 + 0.5) * dz;
            for t in 0..nt {
                let theta_mid = TAU * (t as f64 + 0.5) / nt as f64;
                let tag = if self.calcified.iter().any(|b| b.contains(z_mid, theta_mid)) {
                    BoundaryTag::Calcified
                } else {
                    BoundaryTag::Wall
                };
                faces.push(BoundaryFace::new(
                    vec![
                        self.node_index(k, outer, t),
                        self.node_index(k, outer, t + 1),
                        self.node_index(k + 1, outer, t + 1),
                        self.node_index(k + 1, outer, t),
                    ],
                    tag,
                ));
            }
        }

        // 冠脉开口：最近的壁面片
        for ostium in &self.ostia {
            let k = ((ostium.z / dz).floor().max(0.0) as usize).min(self.n_axial - 1);
            let t = ((ostium.theta.rem_euclid(TAU) / TAU * nt as f64).floor() as usize).min(nt - 1);
            faces[wall_start + k * nt + t].tag = ostium.side;
        }

        VascularMesh::new(nodes, elements, faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_connectivity() {
        let builder = PipeMeshBuilder::new(0.002, 0.01).with_resolution(5, 3, 8);
        let mesh = builder.build().unwrap();

        assert_eq!(mesh.node_count(), 6 * (1 + 3 * 8));
        assert_eq!(mesh.element_count(), 5 * 8 * 3);
        let wedges = mesh
            .elements()
            .iter()
            .filter(|e| e.kind == ElementKind::Wedge6)
            .count();
        assert_eq!(wedges, 5 * 8);

        // 入口/出口各 8 三角形 + 16 四边形，壁面 5*8
        assert_eq!(mesh.faces_with_tag(BoundaryTag::Inlet).count(), 24);
        assert_eq!(mesh.faces_with_tag(BoundaryTag::Outlet).count(), 24);
        assert_eq!(mesh.faces_with_tag(BoundaryTag::Wall).count(), 40);

        // 入口面总面积 = πR²（多边形近似）
        let area: f64 = mesh
            .faces_with_tag(BoundaryTag::Inlet)
            .map(|(_, f)| mesh.face_area(f))
            .sum();
        let polygon = 0.5 * 8.0 * 0.002f64.powi(2) * (TAU / 8.0).sin();
        assert!((area - polygon).abs() < 1e-12);
    }

    #[test]
    fn test_node_index_layout() {
        let builder = PipeMeshBuilder::new(1.0, 1.0).with_resolution(2, 2, 4);
        assert_eq!(builder.node_index(0, 0, 3), 0);
        assert_eq!(builder.node_index(0, 1, 0), 1);
        assert_eq!(builder.node_index(0, 2, 3), 8);
        assert_eq!(builder.node_index(1, 0, 0), 9);
        // 周向索引回绕
        assert_eq!(builder.node_index(1, 1, 4), builder.node_index(1, 1, 0));
    }

    #[test]
    fn test_calcified_band_and_ostia() {
        let mesh = PipeMeshBuilder::new(0.01, 0.04)
            .with_resolution(8, 2, 16)
            .with_calcified_band(CalcifiedBand {
                z_start: 0.0,
                z_end: 0.01,
                theta_start: 0.0,
                theta_end: PI,
            })
            .with_ostium(BoundaryTag::LeftCoronary, 0.025, 0.5 * PI)
            .build()
            .unwrap();

        // 前两层的上半圆周
        assert_eq!(mesh.faces_with_tag(BoundaryTag::Calcified).count(), 2 * 8);
        assert_eq!(mesh.faces_with_tag(BoundaryTag::LeftCoronary).count(), 1);
    }

    #[test]
    fn test_aortic_root_profile() {
        let mesh = PipeMeshBuilder::aortic_root(0.012, 0.06)
            .with_resolution(24, 3, 24)
            .build()
            .unwrap();
        assert_eq!(mesh.faces_with_tag(BoundaryTag::LeftCoronary).count(), 1);
        assert_eq!(mesh.faces_with_tag(BoundaryTag::RightCoronary).count(), 1);
        let max_r = mesh
            .nodes()
            .iter()
            .map(|p| (p.x * p.x + p.y * p.y).sqrt())
            .fold(0.0, f64::max);
        assert!(max_r > 0.012 * 1.25 && max_r <= 0.012 * 1.3 + 1e-12);
    }

    #[test]
    fn test_ellipticity() {
        let mesh = PipeMeshBuilder::new(0.01, 0.02)
            .with_resolution(2, 2, 8)
            .with_ellipticity(0.1)
            .build()
            .unwrap();
        let max_x = mesh.nodes().iter().map(|p| p.x).fold(f64::MIN, f64::max);
        let max_y = mesh.nodes().iter().map(|p| p.y).fold(f64::MIN, f64::max);
        assert!((max_x - 0.011).abs() < 1e-12);
        assert!((max_y - 0.009).abs() < 1e-12);
        assert!(PipeMeshBuilder::new(0.01, 0.02).with_ellipticity(1.0).build().is_err());
    }

    #[test]
    fn test_invalid_resolution() {
        assert!(PipeMeshBuilder::new(0.002, 0.01)
            .with_resolution(0, 3, 8)
            .build()
            .is_err());
        assert!(PipeMeshBuilder::new(0.002, 0.01)
            .with_profile(|_| -1.0)
            .build()
            .is_err());
    }
}
