// crates/tavr_mesh/src/mesh.rs

//! 血管体网格
//!
//! `VascularMesh` 持有节点坐标、体单元连接关系和带标记的边界面。
//! 构造时检查所有连接关系只引用存在的节点，之后的修改仅限于
//! 瓣膜植入阶段的节点位移和面重标记。运行开始后网格以
//! `Arc<VascularMesh>` 只读共享，变形量存放在场数据中。

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{MeshError, MeshResult};

// ============================================================================
// 单元
// ============================================================================

/// 体单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// 四面体
    Tet4,
    /// 三棱柱
    Wedge6,
    /// 六面体
    Hex8,
}

impl ElementKind {
    /// 节点数
    pub const fn node_count(self) -> usize {
        match self {
            Self::Tet4 => 4,
            Self::Wedge6 => 6,
            Self::Hex8 => 8,
        }
    }
}

/// 体单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// 单元类型
    pub kind: ElementKind,
    /// 节点索引
    pub nodes: Vec<usize>,
}

impl Element {
    /// 创建单元
    pub fn new(kind: ElementKind, nodes: Vec<usize>) -> Self {
        Self { kind, nodes }
    }
}

// ============================================================================
// 边界
// ============================================================================

/// 边界面标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryTag {
    /// 入口（左心室流出道侧）
    Inlet,
    /// 出口（升主动脉侧）
    Outlet,
    /// 血管壁
    Wall,
    /// 钙化壁
    Calcified,
    /// 与瓣膜支架接触的壁面
    ValveContact,
    /// 左冠脉开口
    LeftCoronary,
    /// 右冠脉开口
    RightCoronary,
}

impl BoundaryTag {
    /// 是否为壁面类标记（参与结构求解）
    pub fn is_wall_like(self) -> bool {
        matches!(self, Self::Wall | Self::Calcified | Self::ValveContact)
    }

    /// 是否为冠脉开口
    pub fn is_coronary(self) -> bool {
        matches!(self, Self::LeftCoronary | Self::RightCoronary)
    }

    /// 壁面节点标记的优先级（节点同时属于多个面时取最高者）
    fn wall_priority(self) -> u8 {
        match self {
            Self::ValveContact => 3,
            Self::Calcified => 2,
            Self::Wall => 1,
            _ => 0,
        }
    }
}

/// 边界面（三角形或四边形）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryFace {
    /// 节点索引（按边界环绕顺序）
    pub nodes: Vec<usize>,
    /// 标记
    pub tag: BoundaryTag,
}

impl BoundaryFace {
    /// 创建边界面
    pub fn new(nodes: Vec<usize>, tag: BoundaryTag) -> Self {
        Self { nodes, tag }
    }
}

/// 已展开瓣膜在网格边界上的表示
///
/// 由植入模型生成，之后作为网格边界的一部分只读使用。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveBoundary {
    /// 被支架覆盖的截面（升序）
    pub stented_sections: Vec<usize>,
    /// 每个被覆盖截面的支架半径 [m]
    pub frame_radius: Vec<f64>,
    /// 瓣叶所在截面
    pub leaflet_section: usize,
    /// 瓣口有效半径 [m]
    pub orifice_radius: f64,
    /// 与支架接触的壁面节点
    pub contact_nodes: Vec<usize>,
    /// 每个被覆盖截面的残余接触压力 [Pa]
    #[serde(default)]
    pub contact_pressure: Vec<f64>,
}

impl ValveBoundary {
    /// 截面是否被支架覆盖
    pub fn covers(&self, section: usize) -> bool {
        self.stented_sections.binary_search(&section).is_ok()
    }

    /// 被覆盖截面的支架半径
    pub fn frame_radius_at(&self, section: usize) -> Option<f64> {
        self.stented_sections
            .binary_search(&section)
            .ok()
            .map(|i| self.frame_radius[i])
    }

    /// 被覆盖截面的接触压力，未覆盖或未记录时为零
    pub fn contact_pressure_at(&self, section: usize) -> f64 {
        self.stented_sections
            .binary_search(&section)
            .ok()
            .and_then(|i| self.contact_pressure.get(i).copied())
            .unwrap_or(0.0)
    }
}

// ============================================================================
// 网格
// ============================================================================

/// 血管体网格
///
/// 反序列化经过 [`VascularMesh::new`] 的完整验证。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MeshFile")]
pub struct VascularMesh {
    nodes: Vec<DVec3>,
    elements: Vec<Element>,
    faces: Vec<BoundaryFace>,
    valve: Option<ValveBoundary>,
}

/// 网格文件格式，只用于反序列化，转换为 [`VascularMesh`] 时验证
#[derive(Deserialize)]
pub struct MeshFile {
    nodes: Vec<DVec3>,
    elements: Vec<Element>,
    #[serde(alias = "boundary_faces")]
    faces: Vec<BoundaryFace>,
    #[serde(default)]
    valve: Option<ValveBoundary>,
}

impl TryFrom<MeshFile> for VascularMesh {
    type Error = MeshError;

    fn try_from(file: MeshFile) -> MeshResult<Self> {
        let mut mesh = Self::new(file.nodes, file.elements, file.faces)?;
        if let Some(valve) = file.valve {
            mesh.install_valve(valve)?;
        }
        Ok(mesh)
    }
}

impl VascularMesh {
    /// 创建并验证网格
    pub fn new(
        nodes: Vec<DVec3>,
        elements: Vec<Element>,
        faces: Vec<BoundaryFace>,
    ) -> MeshResult<Self> {
        let n = nodes.len();

        for (ei, elem) in elements.iter().enumerate() {
            let expected = elem.kind.node_count();
            if elem.nodes.len() != expected {
                return Err(MeshError::WrongNodeCount {
                    element: ei,
                    kind: elem.kind,
                    expected,
                    actual: elem.nodes.len(),
                });
            }
            if let Some(&node) = elem.nodes.iter().find(|&&v| v >= n) {
                return Err(MeshError::DanglingNode {
                    owner: "单元",
                    index: ei,
                    node,
                    node_count: n,
                });
            }
        }

        for (fi, face) in faces.iter().enumerate() {
            if face.nodes.len() < 3 {
                return Err(MeshError::Degenerate(format!(
                    "边界面 {} 只有 {} 个节点",
                    fi,
                    face.nodes.len()
                )));
            }
            if let Some(&node) = face.nodes.iter().find(|&&v| v >= n) {
                return Err(MeshError::DanglingNode {
                    owner: "边界面",
                    index: fi,
                    node,
                    node_count: n,
                });
            }
        }

        if let Some(i) = nodes.iter().position(|p| !p.is_finite()) {
            return Err(MeshError::Degenerate(format!("节点 {} 坐标非有限", i)));
        }

        debug!(
            nodes = n,
            elements = elements.len(),
            faces = faces.len(),
            "网格验证通过"
        );
        Ok(Self {
            nodes,
            elements,
            faces,
            valve: None,
        })
    }

    /// 从 JSON 字符串读取
    pub fn from_json_str(content: &str) -> MeshResult<Self> {
        serde_json::from_str(content).map_err(|e| MeshError::Parse(e.to_string()))
    }

    /// 从 JSON 文件读取
    pub fn from_file<P: AsRef<Path>>(path: P) -> MeshResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// 写出为 JSON 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> MeshResult<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| MeshError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // ========================================================================
    // 访问器
    // ========================================================================

    /// 节点坐标
    pub fn nodes(&self) -> &[DVec3] {
        &self.nodes
    }

    /// 单个节点
    pub fn node(&self, i: usize) -> DVec3 {
        self.nodes[i]
    }

    /// 节点数
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// 体单元
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// 单元数
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// 边界面
    pub fn boundary_faces(&self) -> &[BoundaryFace] {
        &self.faces
    }

    /// 指定标记的边界面
    pub fn faces_with_tag(&self, tag: BoundaryTag) -> impl Iterator<Item = (usize, &BoundaryFace)> {
        self.faces
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.tag == tag)
    }

    /// 指定标记边界面上的节点（去重、升序）
    pub fn nodes_with_tag(&self, tag: BoundaryTag) -> Vec<usize> {
        let mut nodes: Vec<usize> = self
            .faces_with_tag(tag)
            .flat_map(|(_, f)| f.nodes.iter().copied())
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// 每个节点的壁面标记（非壁面节点为 None）
    ///
    /// 节点属于多个壁面时优先级为 ValveContact > Calcified > Wall。
    pub fn wall_node_tags(&self) -> Vec<Option<BoundaryTag>> {
        let mut tags: Vec<Option<BoundaryTag>> = vec![None; self.nodes.len()];
        for face in self.faces.iter().filter(|f| f.tag.is_wall_like()) {
            for &v in &face.nodes {
                let replace = match tags[v] {
                    None => true,
                    Some(t) => face.tag.wall_priority() > t.wall_priority(),
                };
                if replace {
                    tags[v] = Some(face.tag);
                }
            }
        }
        tags
    }

    /// 壁面节点（去重、升序）
    pub fn wall_nodes(&self) -> Vec<usize> {
        self.wall_node_tags()
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|_| i))
            .collect()
    }

    /// 面形心
    pub fn face_centroid(&self, face: &BoundaryFace) -> DVec3 {
        let sum: DVec3 = face.nodes.iter().map(|&v| self.nodes[v]).sum();
        sum / face.nodes.len() as f64
    }

    /// 面面积（以首节点为扇心三角化）
    pub fn face_area(&self, face: &BoundaryFace) -> f64 {
        let p0 = self.nodes[face.nodes[0]];
        face.nodes
            .windows(2)
            .skip(1)
            .map(|w| {
                let a = self.nodes[w[0]] - p0;
                let b = self.nodes[w[1]] - p0;
                0.5 * a.cross(b).length()
            })
            .sum()
    }

    /// 单元形心
    pub fn element_centroid(&self, element: usize) -> DVec3 {
        let elem = &self.elements[element];
        let sum: DVec3 = elem.nodes.iter().map(|&v| self.nodes[v]).sum();
        sum / elem.nodes.len() as f64
    }

    /// 已安装的瓣膜边界
    pub fn valve(&self) -> Option<&ValveBoundary> {
        self.valve.as_ref()
    }

    // ========================================================================
    // 植入阶段修改
    // ========================================================================

    /// 移动节点
    pub fn set_node_position(&mut self, i: usize, position: DVec3) -> MeshResult<()> {
        if i >= self.nodes.len() {
            return Err(MeshError::DanglingNode {
                owner: "位移",
                index: i,
                node: i,
                node_count: self.nodes.len(),
            });
        }
        if !position.is_finite() {
            return Err(MeshError::Degenerate(format!("节点 {} 新坐标非有限", i)));
        }
        self.nodes[i] = position;
        Ok(())
    }

    /// 对满足条件的面重新标记，返回被修改的面数
    pub fn retag_faces<F>(&mut self, new_tag: BoundaryTag, mut predicate: F) -> usize
    where
        F: FnMut(usize, &BoundaryFace) -> bool,
    {
        let mut count = 0;
        for (i, face) in self.faces.iter_mut().enumerate() {
            if face.tag != new_tag && predicate(i, face) {
                face.tag = new_tag;
                count += 1;
            }
        }
        count
    }

    /// 安装瓣膜边界
    pub fn install_valve(&mut self, valve: ValveBoundary) -> MeshResult<()> {
        if valve.stented_sections.len() != valve.frame_radius.len() {
            return Err(MeshError::Degenerate(format!(
                "支架截面数 {} 与半径数 {} 不一致",
                valve.stented_sections.len(),
                valve.frame_radius.len()
            )));
        }
        if let Some(&node) = valve.contact_nodes.iter().find(|&&v| v >= self.nodes.len()) {
            return Err(MeshError::DanglingNode {
                owner: "瓣膜接触",
                index: 0,
                node,
                node_count: self.nodes.len(),
            });
        }
        self.valve = Some(valve);
        Ok(())
    }
}
