// marihydro\crates\mh_mesh\src/lib.rs

//! MariHydro 网格模块
//!
//! 提供粒子追踪所需的只读多面体网格及其隐式四面体分解。
//!
//! # 核心类型
//!
//! - [`PolyMesh`]: 面寻址多面体网格，支持运动网格（旧/新两个时间层）
//! - [`TetIndices`]: 四面体标识 (单元, 面, 面内点)
//! - [`MeshRegistry`]: 网格注册表，粒子通过 [`MeshHandle`] 引用网格
//!
//! # 模块结构
//!
//! - [`poly`]: 网格拓扑、几何与运动
//! - [`tet`]: 四面体分解与相邻四面体查询
//! - [`generation`]: 结构化网格生成与 x 方向分区
//! - [`registry`]: 网格注册表
//!
//! # 示例
//!
//! ```rust
//! use mh_mesh::generation::BlockMesh;
//!
//! let mesh = BlockMesh::unit_cube(2).build().unwrap();
//! assert_eq!(mesh.n_cells(), 8);
//! assert_eq!(mesh.cell_tets(0).count(), 24);
//! ```

pub mod error;
pub mod generation;
pub mod poly;
pub mod registry;
pub mod tet;

pub use error::{MeshError, MeshResult};
pub use generation::{BlockMesh, BlockSide};
pub use poly::{Patch, PatchKind, PolyMesh, TimeLevel};
pub use registry::{MeshHandle, MeshRegistry, SharedMesh};
pub use tet::{tet_volume, TetIndices, TetVertexId};
