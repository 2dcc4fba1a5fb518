// crates/tavr_mesh/src/lib.rs

//! TAVR-FSI Mesh Layer
//!
//! 网格层，提供血管体网格及求解器所需的几何分解。
//!
//! # 模块概览
//!
//! - [`mesh`]: VascularMesh（节点、单元、边界面标记、瓣膜边界）
//! - [`sections`]: SectionMap 中心线截面分解
//! - [`generation`]: 结构化管道/主动脉根部网格生成
//! - [`error`]: 网格错误类型
//!
//! # 示例
//!
//! ```
//! use tavr_mesh::{PipeMeshBuilder, SectionMap};
//!
//! let mesh = PipeMeshBuilder::new(0.002, 0.02).with_resolution(8, 4, 12).build().unwrap();
//! let sections = SectionMap::build(&mesh, None).unwrap();
//! assert_eq!(sections.section_count(), 9);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod generation;
pub mod mesh;
pub mod sections;

pub use error::{MeshError, MeshResult};
pub use generation::{CalcifiedBand, PipeMeshBuilder};
pub use mesh::{BoundaryFace, BoundaryTag, Element, ElementKind, ValveBoundary, VascularMesh};
pub use sections::{CoronaryOstium, Section, SectionMap};
