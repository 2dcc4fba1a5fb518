// crates/tavr_physics/src/deployment.rs

//! 瓣膜植入模型
//!
//! 球囊扩张式支架的准静态植入：
//!
//! 1. 在近端一半中找到瓣环截面（参考半径最小），按植入深度确定支架覆盖的截面
//! 2. 支架半径分 `expansion_increments` 个载荷增量从压握半径扩张到公称半径
//! 3. 每个增量内对支架/壁面接触力平衡做 Gauss-Seidel 松弛，相邻截面之间
//!    通过支架连接杆耦合，直到最大相对半径变化低于收敛残差
//! 4. 扩张完成后在瓣叶截面安装瓣叶，得到瓣口有效半径
//!
//! 全部增量共享 `optimization_iterations × 10` 的迭代预算，超出时返回
//! [`TavrError::DeploymentDivergence`]。
//!
//! 副作用：与支架接触的壁面节点被推到支架半径，完全接触的壁面改标为
//! `ValveContact`，并在网格上安装 [`ValveBoundary`]。

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info, warn};

use tavr_config::{DeploymentMethod, SimulationParameters, ValveCatalogEntry, ValveModel};
use tavr_foundation::error::{TavrError, TavrResult};
use tavr_foundation::float::sanitize_residual;
use tavr_mesh::{BoundaryTag, SectionMap, ValveBoundary, VascularMesh};

use crate::boundary::ElasticWall;

/// 相邻截面支架环之间的连接杆刚度（相对于环刚度）
const STRUT_COUPLING: f64 = 0.25;

/// 节点与支架间隙小于该比例的支架半径时视为接触
const CONTACT_TOLERANCE: f64 = 0.01;

/// 瓣叶开放时的有效瓣口面积系数
const LEAFLET_OPENING_COEFFICIENT: f64 = 0.85;

/// 壁面节点与支架的间隙
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallGap {
    /// 节点索引
    pub node: usize,
    /// 所在截面
    pub section: usize,
    /// 极角 [rad]
    pub angle: f64,
    /// 弧长权重 [m]
    pub arc_length: f64,
    /// 植入前节点半径与支架半径之差（正值为间隙）[m]
    pub gap: f64,
    /// 是否接触
    pub contact: bool,
}

/// 植入结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedValveGeometry {
    /// 已展开的瓣膜模型
    pub valve: ValveModel,
    /// 瓣环截面
    pub annulus_section: usize,
    /// 支架覆盖的截面
    pub stented_sections: Vec<usize>,
    /// 每个覆盖截面的最终支架半径 [m]
    pub frame_radius: Vec<f64>,
    /// 每个覆盖截面的残余接触压力 [Pa]
    pub contact_pressure: Vec<f64>,
    /// 支架轴向范围 (起点, 终点) [m]
    pub frame_span: (f64, f64),
    /// 瓣叶所在截面
    pub leaflet_section: usize,
    /// 瓣叶高度 [m]
    pub leaflet_height: f64,
    /// 瓣口有效半径 [m]
    pub orifice_radius: f64,
    /// 覆盖截面上所有壁面节点的间隙
    pub wall_gaps: Vec<WallGap>,
    /// 接触节点
    pub contact_nodes: Vec<usize>,
    /// 改标为 ValveContact 的边界面数
    pub retagged_faces: usize,
    /// 每次松弛扫描的最大相对半径变化
    pub residuals: Vec<f64>,
}

impl DeployedValveGeometry {
    /// 总松弛迭代次数
    pub fn iterations(&self) -> usize {
        self.residuals.len()
    }

    /// 入流端（密封段）截面
    pub fn sealing_section(&self) -> usize {
        self.stented_sections
            .iter()
            .copied()
            .find(|&s| s >= self.annulus_section)
            .unwrap_or(self.annulus_section)
    }

    /// 作为网格边界的瓣膜表示
    pub fn boundary(&self) -> ValveBoundary {
        ValveBoundary {
            stented_sections: self.stented_sections.clone(),
            frame_radius: self.frame_radius.clone(),
            leaflet_section: self.leaflet_section,
            orifice_radius: self.orifice_radius,
            contact_nodes: self.contact_nodes.clone(),
            contact_pressure: self.contact_pressure.clone(),
        }
    }
}

/// 按参数中选定的尺寸植入
///
/// 尺寸不在目录中时返回 [`TavrError::InvalidSize`]。
pub fn deploy_selected(
    mesh: &mut VascularMesh,
    params: &SimulationParameters,
) -> TavrResult<DeployedValveGeometry> {
    let valve = params.valve();
    let entry = valve.catalog.entry(valve.selected_size)?;
    deploy(mesh, &entry, params, params.deployment().method)
}

/// 植入瓣膜
pub fn deploy(
    mesh: &mut VascularMesh,
    entry: &ValveCatalogEntry,
    params: &SimulationParameters,
    method: DeploymentMethod,
) -> TavrResult<DeployedValveGeometry> {
    match method {
        DeploymentMethod::Balloon => deploy_balloon(mesh, entry, params),
    }
}

fn deploy_balloon(
    mesh: &mut VascularMesh,
    entry: &ValveCatalogEntry,
    params: &SimulationParameters,
) -> TavrResult<DeployedValveGeometry> {
    let settings = params.deployment();
    let material = params.valve().material;
    let wall = ElasticWall::new(*params.wall(), material);
    let sections = SectionMap::build(mesh, params.execution().axial_sections)?;

    let mut valve = ValveModel::crimped(*entry, material, settings.crimping_ratio);
    let crimped_radius = entry.crimped_radius(settings.crimping_ratio);

    // ------------------------------------------------------------------------
    // 支架定位
    // ------------------------------------------------------------------------
    let annulus = sections.annulus_section();
    let z_annulus = sections.section(annulus).axial_position;
    let z_lo = z_annulus - settings.implantation_depth;
    let z_hi = z_lo + entry.frame_height;
    let mut stented: Vec<usize> = (0..sections.section_count())
        .filter(|&s| {
            let z = sections.section(s).axial_position;
            z >= z_lo && z <= z_hi
        })
        .collect();
    if stented.is_empty() {
        stented.push(annulus);
    }

    info!(
        valve = %entry.valve_type,
        size_mm = entry.size_mm,
        annulus,
        sections = stented.len(),
        "开始球囊扩张植入"
    );

    // ------------------------------------------------------------------------
    // 增量扩张 + Gauss-Seidel 力平衡松弛
    // ------------------------------------------------------------------------
    let tolerance = params.convergence().residual;
    let budget = settings.iteration_budget();
    let wall_radius: Vec<f64> = stented
        .iter()
        .map(|&s| sections.section(s).reference_radius)
        .collect();
    let wall_k: Vec<f64> = stented
        .iter()
        .map(|&s| wall.wall_stiffness(sections.section(s)))
        .collect();

    let m = stented.len();
    let mut radius = vec![crimped_radius; m];
    let mut residuals: Vec<f64> = Vec::new();
    let increments = settings.expansion_increments.max(1);

    for inc in 1..=increments {
        let target = crimped_radius
            + (entry.nominal_radius - crimped_radius) * inc as f64 / increments as f64;
        let k_frame = wall.frame_stiffness(target);
        let k_strut = STRUT_COUPLING * k_frame;

        loop {
            if residuals.len() >= budget {
                let residual = residuals.last().copied().unwrap_or(f64::MAX);
                warn!(
                    increment = inc,
                    iterations = residuals.len(),
                    residual,
                    "植入力平衡超出迭代预算"
                );
                return Err(TavrError::DeploymentDivergence {
                    iterations: residuals.len(),
                    residual,
                });
            }

            let mut max_change: f64 = 0.0;
            for j in 0..m {
                let mut neighbour_sum = 0.0;
                let mut neighbours = 0.0;
                if j > 0 {
                    neighbour_sum += radius[j - 1];
                    neighbours += 1.0;
                }
                if j + 1 < m {
                    neighbour_sum += radius[j + 1];
                    neighbours += 1.0;
                }

                let load = k_frame * target + k_strut * neighbour_sum;
                let stiffness = k_frame + k_strut * neighbours;
                let free = load / stiffness;
                let new = if free > wall_radius[j] {
                    (load + wall_k[j] * wall_radius[j]) / (stiffness + wall_k[j])
                } else {
                    free
                };

                let change = (new - radius[j]).abs() / new.abs().max(f64::MIN_POSITIVE);
                max_change = max_change.max(sanitize_residual(change));
                radius[j] = new;
            }
            residuals.push(max_change);

            if max_change < tolerance {
                break;
            }
        }
        debug!(increment = inc, target, iterations = residuals.len(), "载荷增量完成");
    }

    let contact_pressure: Vec<f64> = (0..m)
        .map(|j| wall_k[j] * (radius[j] - wall_radius[j]).max(0.0))
        .collect();

    // ------------------------------------------------------------------------
    // 壁面接触：推移节点并改标
    // ------------------------------------------------------------------------
    let mut wall_gaps = Vec::new();
    let mut contact_nodes = Vec::new();
    for (j, &s) in stented.iter().enumerate() {
        let rf = radius[j];
        let section = sections.section(s);
        let arc_length = if section.wall_nodes.is_empty() {
            0.0
        } else {
            2.0 * PI * rf / section.wall_nodes.len() as f64
        };

        // 每个壁面节点的径向缩放比例，内部节点沿最近的壁面射线缩放
        let mut rays: Vec<(f64, f64)> = Vec::with_capacity(section.wall_nodes.len());
        for &v in &section.wall_nodes {
            let r = sections.radial(v);
            let gap = r - rf;
            let contact = gap <= CONTACT_TOLERANCE * rf;
            wall_gaps.push(WallGap {
                node: v,
                section: s,
                angle: sections.angle(v),
                arc_length,
                gap,
                contact,
            });
            if contact {
                contact_nodes.push(v);
            }
            let scale = if r > 0.0 { (rf / r).max(1.0) } else { 1.0 };
            rays.push((sections.angle(v), scale));
        }

        for &v in &section.nodes {
            let r = sections.radial(v);
            if r <= f64::EPSILON {
                continue;
            }
            let scale = nearest_ray_scale(&rays, sections.angle(v));
            if scale > 1.0 {
                let p = mesh.node(v) + sections.radial_direction(v) * (r * (scale - 1.0));
                mesh.set_node_position(v, p)?;
            }
        }
    }
    contact_nodes.sort_unstable();
    contact_nodes.dedup();

    let retagged_faces = mesh.retag_faces(BoundaryTag::ValveContact, |_, face| {
        matches!(face.tag, BoundaryTag::Wall | BoundaryTag::Calcified)
            && face.nodes.iter().all(|v| contact_nodes.binary_search(v).is_ok())
    });

    // ------------------------------------------------------------------------
    // 瓣叶安装
    // ------------------------------------------------------------------------
    let leaflet_height = valve.leaflet_height();
    let z_leaflet = (z_lo + leaflet_height).min(z_hi);
    let leaflet_section = {
        let s = sections.nearest_section(z_leaflet);
        let first = stented[0];
        let last = stented[m - 1];
        s.clamp(first, last)
    };
    let leaflet_j = stented
        .iter()
        .position(|&s| s == leaflet_section)
        .unwrap_or(0);
    let geometric = (radius[leaflet_j] - material.frame_thickness - material.leaflet_thickness)
        .max(0.0);
    let orifice_radius = geometric * LEAFLET_OPENING_COEFFICIENT.sqrt();
    valve.mark_deployed(orifice_radius);

    let geometry = DeployedValveGeometry {
        valve,
        annulus_section: annulus,
        stented_sections: stented,
        frame_radius: radius,
        contact_pressure,
        frame_span: (z_lo, z_hi),
        leaflet_section,
        leaflet_height,
        orifice_radius,
        wall_gaps,
        contact_nodes,
        retagged_faces,
        residuals,
    };
    mesh.install_valve(geometry.boundary())?;

    info!(
        iterations = geometry.iterations(),
        orifice_mm = orifice_radius * 1e3,
        contact_nodes = geometry.contact_nodes.len(),
        retagged_faces,
        "瓣膜植入完成"
    );
    Ok(geometry)
}

/// 角度上最近的壁面射线的缩放比例
fn nearest_ray_scale(rays: &[(f64, f64)], angle: f64) -> f64 {
    rays.iter()
        .map(|&(a, scale)| {
            let d = (a - angle).rem_euclid(2.0 * PI);
            (d.min(2.0 * PI - d), scale)
        })
        .min_by(|x, y| x.0.total_cmp(&y.0))
        .map_or(1.0, |(_, scale)| scale)
}
