// crates/mh_mesh/src/registry.rs

//! 网格注册表
//!
//! 粒子只保存网格句柄，不持有网格引用。网格由注册表持有，
//! 生命周期长于引用它的全部粒子；删除后旧句柄通过代际检测失效。

use crate::error::{MeshError, MeshResult};
use crate::poly::PolyMesh;
use mh_foundation::arena::{Arena, ArenaTag, Idx};
use parking_lot::RwLock;
use std::sync::Arc;

/// 网格句柄标记
#[derive(Debug, Clone, Copy)]
pub struct MeshTag;
impl ArenaTag for MeshTag {}

/// 网格句柄
pub type MeshHandle = Idx<MeshTag>;

/// 共享网格（追踪时读锁，网格运动时写锁）
pub type SharedMesh = Arc<RwLock<PolyMesh>>;

/// 网格注册表
#[derive(Default)]
pub struct MeshRegistry {
    meshes: Arena<SharedMesh, MeshTag>,
}

impl MeshRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册网格并返回句柄
    pub fn register(&mut self, mesh: PolyMesh) -> MeshHandle {
        self.meshes.insert(Arc::new(RwLock::new(mesh)))
    }

    /// 获取共享网格
    pub fn get(&self, handle: MeshHandle) -> MeshResult<SharedMesh> {
        self.meshes
            .get(handle)
            .cloned()
            .ok_or_else(|| MeshError::stale_handle(handle))
    }

    /// 移除网格
    pub fn remove(&mut self, handle: MeshHandle) -> Option<SharedMesh> {
        self.meshes.remove(handle)
    }

    /// 已注册网格数量
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
