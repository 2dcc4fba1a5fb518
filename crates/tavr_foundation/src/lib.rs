// crates/tavr_foundation/src/lib.rs

//! TAVR-FSI Foundation Layer
//!
//! 基础层，提供整个工作空间共享的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型（配置、尺寸、边界、发散、取消）
//! - [`validation`]: 运行时验证报告
//! - [`float`]: 安全浮点运算与收敛判据辅助函数
//! - [`units`]: 临床单位换算常量
//!
//! # 示例
//!
//! ```
//! use tavr_foundation::error::{TavrError, TavrResult};
//!
//! fn check_relaxation(omega: f64) -> TavrResult<f64> {
//!     if omega <= 0.0 || omega > 1.0 {
//!         return Err(TavrError::invalid_configuration(
//!             "simulation.relaxation_factor",
//!             omega,
//!             "必须在 (0, 1] 范围内",
//!         ));
//!     }
//!     Ok(omega)
//! }
//!
//! assert!(check_relaxation(0.0).is_err());
//! assert!(check_relaxation(0.7).is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod float;
pub mod units;
pub mod validation;

pub use error::{TavrError, TavrResult};
pub use validation::{ValidationError, ValidationReport, ValidationWarning};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{TavrError, TavrResult};
    pub use crate::float::{relative_change, safe_div};
    pub use crate::validation::{ValidationError, ValidationReport, ValidationWarning};
}
