// crates/mh_lagrangian/src/lib.rs

//! MariHydro 拉格朗日粒子追踪内核
//!
//! 在非结构多面体网格上逐子步推进点状粒子，处理单元/面穿越、
//! 运动网格与跨进程迁移。
//!
//! # 模块结构
//!
//! - [`barycentric`]: 重心坐标与四面体坐标变换（静态/运动网格）
//! - [`particle`]: 粒子状态与网格相关查询
//! - [`id`]: 粒子编号分配器
//! - [`tracking`]: 面穿越追踪器
//! - [`boundary`]: 边界分派与边界交互模型
//! - [`transfer`]: 跨进程迁移与集合通信
//! - [`cloud`]: 粒子云（驱动循环接口）
//! - [`record`]: 检查点记录
//!
//! # 设计原则
//!
//! 1. **网格相对位置**: 粒子只保存四面体标识与重心坐标，物理位置按需计算
//! 2. **确定性**: 同时穿越按固定面片编号决胜，与遍历顺序无关
//! 3. **局部失败**: 单个粒子的迁移或追踪失败只丢弃该粒子
//! 4. **显式依赖**: 编号分配器通过构造参数注入，网格通过句柄引用
//!
//! # 示例
//!
//! ```
//! use std::sync::Arc;
//! use glam::DVec3;
//! use mh_lagrangian::{IdAllocator, ParticleCloud, AdvanceOutcome};
//! use mh_mesh::{BlockMesh, MeshRegistry};
//!
//! let mut registry = MeshRegistry::new();
//! let mesh = registry.register(BlockMesh::unit_cube(1).build().unwrap());
//! let mut cloud = ParticleCloud::new(&registry, mesh, Arc::new(IdAllocator::new()), 0, 1).unwrap();
//!
//! let p = cloud.create_particle(DVec3::splat(0.5)).unwrap();
//! let report = cloud.advance(p, DVec3::new(1.0, 0.0, 0.0)).unwrap();
//! assert_eq!(report.outcome, AdvanceOutcome::Removed);
//! assert!((report.distance - 0.5).abs() < 1e-12);
//! ```

#![warn(clippy::all)]

pub mod barycentric;
pub mod boundary;
pub mod cloud;
pub mod error;
pub mod id;
pub mod particle;
pub mod record;
pub mod tracking;
pub mod transfer;

pub use barycentric::{Barycentric, BarycentricTransform, MovingTransform};
pub use boundary::{
    patch_interaction_registry, BoundaryDispatcher, BoundaryOutcome, Escape, PatchInteraction, PatchOutcome,
    Rebound, Stick, WallHit,
};
pub use cloud::{EvolveReport, ParticleCloud, ParticleHandle, ParticleTag};
pub use error::{TrackingError, TrackingResult, TransferError};
pub use id::IdAllocator;
pub use particle::Particle;
pub use record::{load_records, save_records, ParticleRecord};
pub use tracking::{AdvanceOutcome, AdvanceReport, FaceCrossingTracker, TrackEvent, TrackingTolerance};
pub use transfer::{
    Communicator, LocalCommunicator, ParallelTransferManager, SerialCommunicator, TransferHeader, TransferStats,
};
