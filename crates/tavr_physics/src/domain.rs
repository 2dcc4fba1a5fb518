// crates/tavr_physics/src/domain.rs

//! 求解域：只读网格 + 截面分解
//!
//! 植入完成后网格不再修改，流体与结构求解器通过 `Arc<FsiDomain>` 并发只读共享。
//! 变形只存在于场状态中（截面位移），不回写网格节点。

use std::sync::Arc;
use tracing::debug;

use tavr_foundation::error::{TavrError, TavrResult};
use tavr_mesh::{BoundaryTag, SectionMap, ValveBoundary, VascularMesh};

/// 流固耦合求解域
#[derive(Debug, Clone)]
pub struct FsiDomain {
    mesh: Arc<VascularMesh>,
    sections: SectionMap,
    element_section: Vec<usize>,
    wall_tags: Vec<Option<BoundaryTag>>,
    control_lengths: Vec<f64>,
}

impl FsiDomain {
    /// 构建求解域
    pub fn new(mesh: Arc<VascularMesh>, axial_sections: Option<usize>) -> TavrResult<Self> {
        let sections = SectionMap::build(&mesh, axial_sections)?;
        if sections.section_count() < 2 {
            return Err(TavrError::invalid_mesh("至少需要两个轴向截面"));
        }

        let element_section = (0..mesh.element_count())
            .map(|e| {
                let (s, _, _) = sections.project(mesh.element_centroid(e));
                sections.nearest_section(s)
            })
            .collect();
        let wall_tags = mesh.wall_node_tags();

        // 每个截面控制的轴向长度（相邻截面中点之间）
        let z = sections.axial_positions();
        let n = z.len();
        let control_lengths = (0..n)
            .map(|i| {
                let lo = if i == 0 { z[0] } else { 0.5 * (z[i - 1] + z[i]) };
                let hi = if i + 1 == n { z[n - 1] } else { 0.5 * (z[i] + z[i + 1]) };
                hi - lo
            })
            .collect();

        debug!(
            nodes = mesh.node_count(),
            elements = mesh.element_count(),
            sections = sections.section_count(),
            valve = mesh.valve().is_some(),
            "求解域已建立"
        );

        Ok(Self {
            mesh,
            sections,
            element_section,
            wall_tags,
            control_lengths,
        })
    }

    /// 网格
    pub fn mesh(&self) -> &VascularMesh {
        &self.mesh
    }

    /// 共享网格句柄
    pub fn mesh_arc(&self) -> Arc<VascularMesh> {
        Arc::clone(&self.mesh)
    }

    /// 截面映射
    pub fn sections(&self) -> &SectionMap {
        &self.sections
    }

    /// 截面数
    pub fn section_count(&self) -> usize {
        self.sections.section_count()
    }

    /// 单元所属截面
    pub fn element_section(&self, element: usize) -> usize {
        self.element_section[element]
    }

    /// 节点壁面标记
    pub fn wall_tag(&self, node: usize) -> Option<BoundaryTag> {
        self.wall_tags[node]
    }

    /// 截面控制长度 [m]
    pub fn control_lengths(&self) -> &[f64] {
        &self.control_lengths
    }

    /// 已安装的瓣膜
    pub fn valve(&self) -> Option<&ValveBoundary> {
        self.mesh.valve()
    }

    /// 给定壁面位移下的管腔半径
    ///
    /// 瓣叶截面的管腔受瓣口半径限制。
    pub fn lumen_radius(&self, displacement: &[f64]) -> Vec<f64> {
        let mut radius: Vec<f64> = self
            .sections
            .sections()
            .iter()
            .zip(displacement)
            .map(|(s, w)| s.reference_radius + w)
            .collect();
        if let Some(valve) = self.valve() {
            if let Some(r) = radius.get_mut(valve.leaflet_section) {
                *r = r.min(valve.orifice_radius);
            }
        }
        radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tavr_mesh::PipeMeshBuilder;

    #[test]
    fn test_domain_sections() {
        let mesh = PipeMeshBuilder::new(0.002, 0.02).with_resolution(10, 3, 8).build().unwrap();
        let domain = FsiDomain::new(Arc::new(mesh), None).unwrap();
        assert_eq!(domain.section_count(), 11);

        let total: f64 = domain.control_lengths().iter().sum();
        assert!((total - 0.02).abs() < 1e-12);
        // 端部截面控制半个间距
        assert!((domain.control_lengths()[0] - 0.001).abs() < 1e-12);

        // 第一层单元位于截面 0 与 1 之间
        let s = domain.element_section(0);
        assert!(s <= 1);

        let radius = domain.lumen_radius(&vec![1e-4; 11]);
        assert!((radius[5] - 0.0021).abs() < 1e-12);
    }
}
