// crates/tavr_mesh/src/error.rs

//! 网格错误类型
//!
//! 所有错误可转换为 `TavrError::InvalidMesh` 向上传播

use tavr_foundation::TavrError;
use thiserror::Error;

use crate::mesh::{BoundaryTag, ElementKind};

/// 网格模块结果类型
pub type MeshResult<T> = Result<T, MeshError>;

/// 网格错误枚举
#[derive(Error, Debug)]
pub enum MeshError {
    /// 单元或边界面引用了不存在的节点
    #[error("{owner} {index} 引用了不存在的节点 {node} (节点总数 {node_count})")]
    DanglingNode {
        /// "单元" 或 "边界面"
        owner: &'static str,
        /// 单元/面索引
        index: usize,
        /// 引用的节点
        node: usize,
        /// 节点总数
        node_count: usize,
    },

    /// 单元节点数与类型不符
    #[error("单元 {element} 类型 {kind:?} 需要 {expected} 个节点, 实际 {actual}")]
    WrongNodeCount {
        /// 单元索引
        element: usize,
        /// 单元类型
        kind: ElementKind,
        /// 期望节点数
        expected: usize,
        /// 实际节点数
        actual: usize,
    },

    /// 缺少必需的边界
    #[error("缺少 {0:?} 边界面")]
    MissingBoundary(BoundaryTag),

    /// 几何退化
    #[error("几何退化: {0}")]
    Degenerate(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 解析错误
    #[error("网格文件解析错误: {0}")]
    Parse(String),
}

impl From<MeshError> for TavrError {
    fn from(err: MeshError) -> Self {
        match err {
            MeshError::Io(e) => TavrError::from(e),
            MeshError::Parse(message) => TavrError::Serialization { message },
            other => TavrError::invalid_mesh(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_tavr_error() {
        let err: TavrError = MeshError::MissingBoundary(BoundaryTag::Inlet).into();
        assert!(matches!(err, TavrError::InvalidMesh { .. }));
        assert!(err.to_string().contains("Inlet"));
    }
}
