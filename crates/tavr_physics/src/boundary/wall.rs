// crates/tavr_physics/src/boundary/wall.rs

//! 壁面边界：弹性壁或刚性壁
//!
//! 弹性壁用带轴向张力的薄壁环模型：每个截面的径向刚度
//!
//! `k = E_eff·h / R²`，`E_eff = (1 − f_c)·E_wall + f_c·E_calc`
//!
//! 被支架覆盖的截面并联支架环刚度 `E_frame·c·t_frame / R_frame²`。
//! 轴向张力 `T = λ·E_wall·h` 把相邻截面的位移耦合起来。

use tavr_config::{ValveMaterial, WallProperties};
use tavr_mesh::Section;

use super::{BoundaryCondition, BoundaryRole, BoundaryValue};

/// 壁面响应（边界求值结果）
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WallResponse {
    /// 弹性壁
    Elastic {
        /// 壁面弹性模量 [Pa]
        modulus: f64,
        /// 壁厚 [m]
        thickness: f64,
        /// 外部压力 [Pa]
        external_pressure: f64,
    },
    /// 刚性壁，位移恒为零
    Rigid,
}

/// 弹性壁
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElasticWall {
    properties: WallProperties,
    frame: ValveMaterial,
}

impl ElasticWall {
    /// 创建弹性壁
    pub fn new(properties: WallProperties, frame: ValveMaterial) -> Self {
        Self { properties, frame }
    }

    /// 壁面属性
    pub fn properties(&self) -> &WallProperties {
        &self.properties
    }

    /// 钙化比例加权的等效模量 [Pa]
    pub fn effective_modulus(&self, calcified_fraction: f64) -> f64 {
        let f = calcified_fraction.clamp(0.0, 1.0);
        (1.0 - f) * self.properties.wall_modulus + f * self.properties.calcification_modulus
    }

    /// 血管壁径向刚度 [Pa/m]
    pub fn wall_stiffness(&self, section: &Section) -> f64 {
        let r = section.reference_radius;
        self.effective_modulus(section.calcified_fraction) * self.properties.thickness / (r * r)
    }

    /// 支架环径向刚度 [Pa/m]
    pub fn frame_stiffness(&self, frame_radius: f64) -> f64 {
        self.frame.frame_modulus * self.frame.frame_coverage * self.frame.frame_thickness
            / (frame_radius * frame_radius)
    }

    /// 截面总径向刚度，`frame_radius` 为覆盖该截面的支架半径
    pub fn section_stiffness(&self, section: &Section, frame_radius: Option<f64>) -> f64 {
        self.wall_stiffness(section) + frame_radius.map_or(0.0, |rf| self.frame_stiffness(rf))
    }

    /// 轴向张力 [N/m]
    pub fn axial_tension(&self) -> f64 {
        self.properties.axial_prestretch * self.properties.wall_modulus * self.properties.thickness
    }

    /// 支架材料
    pub fn frame_material(&self) -> &ValveMaterial {
        &self.frame
    }
}

/// 壁面边界提供者
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WallProvider {
    /// 弹性壁
    Elastic(ElasticWall),
    /// 刚性壁
    Rigid {
        /// 壁面属性（仍用于应力恢复）
        properties: WallProperties,
    },
}

impl WallProvider {
    /// 壁面属性
    pub fn properties(&self) -> &WallProperties {
        match self {
            Self::Elastic(wall) => wall.properties(),
            Self::Rigid { properties } => properties,
        }
    }

    /// 是否刚性
    pub fn is_rigid(&self) -> bool {
        matches!(self, Self::Rigid { .. })
    }
}

impl BoundaryCondition for WallProvider {
    fn role(&self) -> BoundaryRole {
        BoundaryRole::Wall
    }

    fn evaluate(&self, _time: f64) -> BoundaryValue {
        match self {
            Self::Elastic(wall) => BoundaryValue::Wall(WallResponse::Elastic {
                modulus: wall.properties.wall_modulus,
                thickness: wall.properties.thickness,
                external_pressure: wall.properties.external_pressure,
            }),
            Self::Rigid { .. } => BoundaryValue::Wall(WallResponse::Rigid),
        }
    }
}
