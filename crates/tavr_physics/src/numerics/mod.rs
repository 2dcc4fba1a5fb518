// crates/tavr_physics/src/numerics/mod.rs

//! 数值线性代数
//!
//! - [`pcg`]: 雅可比预处理共轭梯度法
//! - [`sparse`]: 对称三对角矩阵与 CSR 稀疏矩阵

pub mod pcg;
pub mod sparse;

pub use pcg::{PcgConfig, PcgResult, PcgSolver, PreconditionerType, SparseMvp};
pub use sparse::{CsrBuilder, CsrMatrix, SymmetricTridiagonal};
