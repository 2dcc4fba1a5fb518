// crates/tavr_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `TavrError` 枚举和 `TavrResult` 类型别名。错误按照发生阶段分为三类：
//!
//! 1. **建立阶段**（致命，不重试）：`InvalidConfiguration`、`InvalidSize`、
//!    `InvalidBoundaryType`、`InvalidMesh`
//! 2. **植入阶段**（致命）：`DeploymentDivergence`
//! 3. **时间步阶段**（可恢复一次）：`FluidSolveDivergence`、`StructuralSolveDivergence`
//!
//! `Cancelled` 不是真正的错误，而是携带部分结果的终止结果。
//!
//! # 示例
//!
//! ```
//! use tavr_foundation::error::TavrError;
//!
//! let err = TavrError::InvalidSize { requested: 25, available: vec![20, 23, 26, 29] };
//! assert!(err.is_setup_error());
//! assert!(!err.is_recoverable());
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::PathBuf;
use thiserror::Error;

/// 统一结果类型
pub type TavrResult<T> = Result<T, TavrError>;

/// TAVR-FSI 错误类型
///
/// 可序列化，远程求解时错误类型原样跨越报文边界（IO 错误的底层源除外）。
#[derive(Error, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TavrError {
    // ========================================================================
    // 建立阶段错误
    // ========================================================================
    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfiguration {
        /// 配置键名（带节名前缀，如 `simulation.relaxation_factor`）
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 请求的瓣膜尺寸不在目录中
    #[error("无效的瓣膜尺寸: {requested} mm (可用尺寸: {available:?})")]
    InvalidSize {
        /// 请求的尺寸 [mm]
        requested: u32,
        /// 目录中可用的尺寸 [mm]
        available: Vec<u32>,
    },

    /// 未知的边界条件类型
    #[error("未知的{role}边界类型 '{value}' (支持: {supported:?})")]
    InvalidBoundaryType {
        /// 边界角色（inlet/outlet/wall）
        role: Cow<'static, str>,
        /// 配置中给出的类型字符串
        value: String,
        /// 支持的类型
        supported: Vec<String>,
    },

    /// 无效网格
    #[error("无效的网格: {message}")]
    InvalidMesh {
        /// 具体错误信息
        message: String,
    },

    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: Cow<'static, str>,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    // ========================================================================
    // 植入阶段错误
    // ========================================================================
    /// 瓣膜植入力平衡不收敛
    #[error("瓣膜植入不收敛: {iterations} 次迭代后残差 {residual:.3e}")]
    DeploymentDivergence {
        /// 已执行的松弛迭代次数
        iterations: usize,
        /// 最终残差
        residual: f64,
    },

    // ========================================================================
    // 时间步阶段错误（可恢复）
    // ========================================================================
    /// 流体求解发散
    #[error("流体求解发散: {iterations} 次迭代后残差 {residual:.3e}")]
    FluidSolveDivergence {
        /// 迭代次数
        iterations: usize,
        /// 最终残差
        residual: f64,
        /// 逐次迭代残差
        residuals: Vec<f64>,
    },

    /// 结构求解发散
    #[error("结构求解发散: {iterations} 次迭代后残差 {residual:.3e}")]
    StructuralSolveDivergence {
        /// 迭代次数
        iterations: usize,
        /// 最终残差
        residual: f64,
        /// 逐次迭代残差
        residuals: Vec<f64>,
    },

    /// 运行被取消
    #[error("运行在第 {step} 步 (t={time:.4} s) 被取消")]
    Cancelled {
        /// 取消时已提交的步数
        step: usize,
        /// 取消时的模拟时间 [s]
        time: f64,
    },

    // ========================================================================
    // 基础设施错误
    // ========================================================================
    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        #[serde(skip)]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 文件不存在
    #[error("文件不存在: {path}")]
    FileNotFound {
        /// 未找到的路径
        path: PathBuf,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 序列化失败原因
        message: String,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl TavrError {
    /// 配置值无效
    pub fn invalid_configuration(
        key: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfiguration {
            key: key.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// 未知边界类型
    pub fn invalid_boundary_type(
        role: &'static str,
        value: impl Into<String>,
        supported: &[&str],
    ) -> Self {
        Self::InvalidBoundaryType {
            role: Cow::Borrowed(role),
            value: value.into(),
            supported: supported.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 无效网格
    pub fn invalid_mesh(message: impl Into<String>) -> Self {
        Self::InvalidMesh {
            message: message.into(),
        }
    }

    /// IO 错误（带源）
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 检查数组大小
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> TavrResult<()> {
        if expected != actual {
            Err(Self::SizeMismatch {
                name: Cow::Borrowed(name),
                expected,
                actual,
            })
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // 分类
    // ========================================================================

    /// 是否为时间步级可恢复错误（松弛回退后可重试一次）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FluidSolveDivergence { .. } | Self::StructuralSolveDivergence { .. }
        )
    }

    /// 是否为建立阶段错误（立即返回给调用方）
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. }
                | Self::InvalidSize { .. }
                | Self::InvalidBoundaryType { .. }
                | Self::InvalidMesh { .. }
                | Self::SizeMismatch { .. }
        )
    }

    /// 是否为取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// 发散错误附带的逐次残差（非发散错误返回空切片）
    pub fn residual_history(&self) -> &[f64] {
        match self {
            Self::FluidSolveDivergence { residuals, .. }
            | Self::StructuralSolveDivergence { residuals, .. } => residuals,
            _ => &[],
        }
    }
}

impl From<std::io::Error> for TavrError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let fluid = TavrError::FluidSolveDivergence {
            iterations: 10,
            residual: 1.0,
            residuals: vec![1.0; 10],
        };
        assert!(fluid.is_recoverable());
        assert!(!fluid.is_setup_error());
        assert_eq!(fluid.residual_history().len(), 10);

        let cfg = TavrError::invalid_configuration("simulation.relaxation_factor", 0.0, "必须为正");
        assert!(cfg.is_setup_error());
        assert!(!cfg.is_recoverable());
        assert!(cfg.residual_history().is_empty());

        let cancelled = TavrError::Cancelled { step: 3, time: 0.003 };
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = TavrError::InvalidSize {
            requested: 25,
            available: vec![20, 23, 26, 29],
        };
        let msg = err.to_string();
        assert!(msg.contains("25"));
        assert!(msg.contains("29"));

        let err = TavrError::invalid_boundary_type("inlet", "pulsatile", &["flow_waveform"]);
        assert!(err.to_string().contains("pulsatile"));
    }

    #[test]
    fn test_setup_error_survives_json() {
        let err = TavrError::InvalidSize {
            requested: 25,
            available: vec![20, 23, 26, 29],
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains(r#""kind":"invalid_size""#), "{}", json);
        let back: TavrError = serde_json::from_str(&json).unwrap();
        assert!(back.is_setup_error());
        assert_eq!(back.to_string(), err.to_string());

        let err = TavrError::invalid_boundary_type("wall", "porous", &["elastic", "rigid"]);
        let back: TavrError = serde_json::from_str(&serde_json::to_string(&err).unwrap()).unwrap();
        assert!(matches!(back, TavrError::InvalidBoundaryType { ref role, .. } if role == "wall"));

        let io = TavrError::from(std::io::Error::new(std::io::ErrorKind::Other, "磁盘已满"));
        let back: TavrError = serde_json::from_str(&serde_json::to_string(&io).unwrap()).unwrap();
        assert!(matches!(back, TavrError::Io { source: None, .. }));
    }

    #[test]
    fn test_check_size() {
        assert!(TavrError::check_size("velocity", 10, 10).is_ok());
        let err = TavrError::check_size("velocity", 10, 9).unwrap_err();
        assert!(matches!(err, TavrError::SizeMismatch { expected: 10, actual: 9, .. }));
    }
}
