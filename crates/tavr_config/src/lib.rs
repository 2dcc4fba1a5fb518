// crates/tavr_config/src/lib.rs

//! TAVR-FSI Config Layer
//!
//! 配置层，负责把原始分析配置转换为已验证的不可变参数快照。
//!
//! # 模块概览
//!
//! - [`analysis_config`]: AnalysisConfig 原始配置（serde，JSON / 键值对 / INI）
//! - [`parameters`]: SimulationParameters 已验证参数与边界条件选择
//! - [`valve`]: 瓣膜目录、目录条目与瓣膜模型
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! Layer 5: tavr_cli       ─> AnalysisConfig::from_file
//! Layer 4: tavr_workflow  ─> 远程请求中携带 AnalysisConfig
//! Layer 3: tavr_physics   ─> Arc<SimulationParameters>
//! Layer 2: tavr_config    (本层)
//! Layer 1: tavr_foundation
//! ```
//!
//! # 示例
//!
//! ```
//! use tavr_config::{AnalysisConfig, SimulationParameters};
//!
//! let mut config = AnalysisConfig::default();
//! config.simulation.relaxation_factor = 0.0;
//! assert!(SimulationParameters::from_config(&config).is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis_config;
pub mod error;
pub mod parameters;
pub mod valve;

pub use analysis_config::AnalysisConfig;
pub use error::ConfigError;
pub use parameters::{
    AveragingWindow, BoundarySelection, ConvergenceSettings, DeploymentMethod,
    DeploymentSettings, ExecutionSettings, FluidProperties, InletBoundary, InletWaveform,
    OutletBoundary, PostprocessSettings, SimulationParameters, TimeSettings, ValveSettings,
    ViscosityModel, WallBoundary, WallProperties, WindkesselParameters,
};
pub use valve::{ValveCatalog, ValveCatalogEntry, ValveMaterial, ValveModel, ValveState, ValveType};
