// crates/tavr_config/src/valve.rs

//! 瓣膜目录与瓣膜模型
//!
//! 目录由瓣膜类型和可用尺寸构成。选择尺寸时严格匹配，不在目录中的尺寸
//! 返回 [`TavrError::InvalidSize`]，不做就近取整。
//!
//! # 示例
//!
//! ```
//! use tavr_config::valve::{ValveCatalog, ValveType};
//!
//! let catalog = ValveCatalog::new(ValveType::Sapien3, vec![20, 23, 26, 29]).unwrap();
//! assert!(catalog.entry(26).is_ok());
//! assert!(catalog.entry(25).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use tavr_foundation::error::{TavrError, TavrResult};
use tavr_foundation::units::{size_mm_to_radius_m, MM_PER_M};

/// 所有产品线共用的公称尺寸集合 [mm]
pub const NOMINAL_SIZES: [u32; 4] = [20, 23, 26, 29];

// ============================================================================
// 瓣膜类型
// ============================================================================

/// 瓣膜产品线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveType {
    /// 球囊扩张式（Edwards SAPIEN 3）
    Sapien3,
    /// 自膨式（Medtronic CoreValve）
    CoreValve,
    /// 自膨式（Boston Scientific ACURATE）
    Acurate,
}

impl ValveType {
    /// 配置中使用的类型字符串
    pub const NAMES: [&'static str; 3] = ["sapien3", "corevalve", "acurate"];

    /// 配置字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sapien3 => "sapien3",
            Self::CoreValve => "corevalve",
            Self::Acurate => "acurate",
        }
    }

    /// 产品显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sapien3 => "Edwards SAPIEN 3",
            Self::CoreValve => "Medtronic CoreValve",
            Self::Acurate => "Boston Scientific ACURATE",
        }
    }

    /// 支架高度 [m]
    pub fn frame_height(&self, size_mm: u32) -> f64 {
        let mm = match (self, size_mm) {
            (Self::Sapien3, 20) => 15.5,
            (Self::Sapien3, 23) => 18.0,
            (Self::Sapien3, 26) => 20.0,
            (Self::Sapien3, _) => 22.5,
            (Self::CoreValve, 20) | (Self::CoreValve, 23) => 45.0,
            (Self::CoreValve, _) => 55.0,
            (Self::Acurate, 20) | (Self::Acurate, 23) => 46.0,
            (Self::Acurate, _) => 48.0,
        };
        mm / MM_PER_M
    }

    /// 瓣叶高度占支架高度的比例
    pub fn leaflet_height_fraction(&self) -> f64 {
        match self {
            Self::Sapien3 => 0.75,
            // 自膨式瓣膜瓣叶位于瓣环上方的较短区段
            Self::CoreValve | Self::Acurate => 0.3,
        }
    }
}

impl fmt::Display for ValveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ValveType {
    type Err = TavrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sapien3" => Ok(Self::Sapien3),
            "corevalve" => Ok(Self::CoreValve),
            "acurate" => Ok(Self::Acurate),
            other => Err(TavrError::invalid_configuration(
                "valve.valve_type",
                other,
                format!("支持的类型: {:?}", Self::NAMES),
            )),
        }
    }
}

// ============================================================================
// 材料
// ============================================================================

/// 瓣膜材料参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValveMaterial {
    /// 支架弹性模量 [Pa]
    pub frame_modulus: f64,
    /// 瓣叶弹性模量 [Pa]
    pub leaflet_modulus: f64,
    /// 支架丝径 [m]
    pub frame_thickness: f64,
    /// 瓣叶厚度 [m]
    pub leaflet_thickness: f64,
    /// 支架金属覆盖率
    pub frame_coverage: f64,
}

// ============================================================================
// 目录
// ============================================================================

/// 瓣膜目录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveCatalog {
    valve_type: ValveType,
    sizes: Vec<u32>,
}

/// 目录条目
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValveCatalogEntry {
    /// 瓣膜类型
    pub valve_type: ValveType,
    /// 公称尺寸 [mm]
    pub size_mm: u32,
    /// 公称（展开）半径 [m]
    pub nominal_radius: f64,
    /// 支架高度 [m]
    pub frame_height: f64,
}

impl ValveCatalogEntry {
    /// 按压握比计算的压握半径 [m]
    pub fn crimped_radius(&self, crimping_ratio: f64) -> f64 {
        self.nominal_radius * crimping_ratio
    }
}

impl ValveCatalog {
    /// 创建目录，尺寸必须非空且属于公称尺寸集合
    pub fn new(valve_type: ValveType, mut sizes: Vec<u32>) -> TavrResult<Self> {
        if sizes.is_empty() {
            return Err(TavrError::invalid_configuration(
                "valve.available_sizes",
                "[]",
                "至少需要一个尺寸",
            ));
        }
        if let Some(bad) = sizes.iter().find(|s| !NOMINAL_SIZES.contains(s)) {
            return Err(TavrError::invalid_configuration(
                "valve.available_sizes",
                bad,
                format!("尺寸必须属于 {:?}", NOMINAL_SIZES),
            ));
        }
        sizes.sort_unstable();
        sizes.dedup();
        Ok(Self { valve_type, sizes })
    }

    /// 瓣膜类型
    pub fn valve_type(&self) -> ValveType {
        self.valve_type
    }

    /// 可用尺寸（升序）
    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    /// 查找条目
    pub fn entry(&self, size_mm: u32) -> TavrResult<ValveCatalogEntry> {
        if !self.sizes.contains(&size_mm) {
            return Err(TavrError::InvalidSize {
                requested: size_mm,
                available: self.sizes.clone(),
            });
        }
        Ok(ValveCatalogEntry {
            valve_type: self.valve_type,
            size_mm,
            nominal_radius: size_mm_to_radius_m(size_mm),
            frame_height: self.valve_type.frame_height(size_mm),
        })
    }
}

// ============================================================================
// 瓣膜模型
// ============================================================================

/// 瓣膜状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ValveState {
    /// 压握状态
    Crimped {
        /// 压握半径 [m]
        radius: f64,
    },
    /// 已展开
    Deployed {
        /// 瓣口有效半径 [m]
        orifice_radius: f64,
    },
}

/// 瓣膜模型：目录条目 + 材料 + 状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveModel {
    /// 目录条目
    pub entry: ValveCatalogEntry,
    /// 材料
    pub material: ValveMaterial,
    /// 当前状态
    pub state: ValveState,
}

impl ValveModel {
    /// 以压握状态创建
    pub fn crimped(entry: ValveCatalogEntry, material: ValveMaterial, crimping_ratio: f64) -> Self {
        Self {
            state: ValveState::Crimped {
                radius: entry.crimped_radius(crimping_ratio),
            },
            entry,
            material,
        }
    }

    /// 标记为已展开
    pub fn mark_deployed(&mut self, orifice_radius: f64) {
        self.state = ValveState::Deployed { orifice_radius };
    }

    /// 是否已展开
    pub fn is_deployed(&self) -> bool {
        matches!(self.state, ValveState::Deployed { .. })
    }

    /// 瓣叶高度 [m]
    pub fn leaflet_height(&self) -> f64 {
        self.entry.frame_height * self.entry.valve_type.leaflet_height_fraction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material() -> ValveMaterial {
        ValveMaterial {
            frame_modulus: 2.33e11,
            leaflet_modulus: 5.0e6,
            frame_thickness: 5e-4,
            leaflet_thickness: 3e-4,
            frame_coverage: 0.12,
        }
    }

    #[test]
    fn test_size_not_in_catalog() {
        let catalog = ValveCatalog::new(ValveType::Sapien3, vec![29, 20, 26, 23]).unwrap();
        assert_eq!(catalog.sizes(), &[20, 23, 26, 29]);

        match catalog.entry(25) {
            Err(TavrError::InvalidSize { requested, available }) => {
                assert_eq!(requested, 25);
                assert_eq!(available, vec![20, 23, 26, 29]);
            }
            other => panic!("期望 InvalidSize, 实际 {:?}", other),
        }
    }

    #[test]
    fn test_catalog_rejects_non_nominal_sizes() {
        assert!(ValveCatalog::new(ValveType::Sapien3, vec![]).is_err());
        assert!(ValveCatalog::new(ValveType::Sapien3, vec![23, 25]).is_err());
        // 子集合法，但子集外的尺寸不可选
        let catalog = ValveCatalog::new(ValveType::CoreValve, vec![26]).unwrap();
        assert!(matches!(catalog.entry(23), Err(TavrError::InvalidSize { .. })));
    }

    #[test]
    fn test_entry_geometry() {
        let catalog = ValveCatalog::new(ValveType::Sapien3, NOMINAL_SIZES.to_vec()).unwrap();
        let entry = catalog.entry(26).unwrap();
        assert!((entry.nominal_radius - 0.013).abs() < 1e-12);
        assert!((entry.frame_height - 0.020).abs() < 1e-12);
    }

    #[test]
    fn test_valve_model_state() {
        let catalog = ValveCatalog::new(ValveType::Sapien3, NOMINAL_SIZES.to_vec()).unwrap();
        let mut model = ValveModel::crimped(catalog.entry(23).unwrap(), material(), 0.3);
        match model.state {
            ValveState::Crimped { radius } => assert!((radius - 0.0115 * 0.3).abs() < 1e-12),
            _ => panic!("应为压握状态"),
        }
        assert_eq!(
            model.state,
            ValveState::Crimped {
                radius: model.entry.crimped_radius(0.3)
            }
        );
        model.mark_deployed(0.011);
        assert!(model.is_deployed());
        assert!(model.leaflet_height() > 0.0);
    }

    #[test]
    fn test_valve_type_parse() {
        assert_eq!("SAPIEN3".parse::<ValveType>().unwrap(), ValveType::Sapien3);
        assert_eq!("corevalve".parse::<ValveType>().unwrap(), ValveType::CoreValve);
        assert!("evolut".parse::<ValveType>().is_err());
    }
}
