// crates/mh_lagrangian/src/particle.rs

//! 粒子状态
//!
//! 粒子以网格相对的方式记录位置：所在四面体 `(cell, tet_face, tet_pt)`
//! 与四面体内的重心坐标。物理位置按需由网格几何计算，不单独保存。
//!
//! 来源 `(origin_process, origin_id)` 在创建时确定，之后任何迁移、
//! 边界交互都不会改变它。

use crate::barycentric::{transform_at, Barycentric};
use glam::DVec3;
use mh_mesh::{MeshHandle, PolyMesh, TetIndices, TimeLevel};

/// 拉格朗日粒子
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// 所属网格（弱引用，仅句柄）
    pub(crate) mesh: MeshHandle,
    /// 当前四面体内的重心坐标
    pub(crate) coordinates: Barycentric,
    /// 当前四面体
    pub(crate) tet: TetIndices,
    /// 正在穿越的网格面
    pub(crate) face: Option<usize>,
    /// 当前子步进度 ∈ [0, 1]
    pub(crate) step_fraction: f64,
    origin_process: usize,
    origin_id: u64,
    /// 速度（由物理模型维护）
    pub velocity: DVec3,
    /// 物理模型附加数据，随迁移一起传输
    pub payload: Vec<f64>,
}

impl Particle {
    /// 在指定四面体内创建粒子
    pub fn new(
        mesh: MeshHandle,
        tet: TetIndices,
        coordinates: Barycentric,
        origin_process: usize,
        origin_id: u64,
    ) -> Self {
        Self {
            mesh,
            coordinates,
            tet,
            face: None,
            step_fraction: 0.0,
            origin_process,
            origin_id,
            velocity: DVec3::ZERO,
            payload: Vec::new(),
        }
    }

    // =========================================================================
    // 状态访问
    // =========================================================================

    /// 所属网格句柄
    #[inline]
    pub fn mesh(&self) -> MeshHandle {
        self.mesh
    }

    /// 重心坐标
    #[inline]
    pub fn coordinates(&self) -> Barycentric {
        self.coordinates
    }

    /// 当前四面体
    #[inline]
    pub fn tet(&self) -> TetIndices {
        self.tet
    }

    /// 所在单元
    #[inline]
    pub fn cell(&self) -> usize {
        self.tet.cell
    }

    /// 四面体所在网格面
    #[inline]
    pub fn tet_face(&self) -> usize {
        self.tet.face
    }

    /// 四面体在面点环中的起始点
    #[inline]
    pub fn tet_pt(&self) -> usize {
        self.tet.tet_pt
    }

    /// 正在穿越的网格面
    #[inline]
    pub fn face(&self) -> Option<usize> {
        self.face
    }

    /// 子步进度
    #[inline]
    pub fn step_fraction(&self) -> f64 {
        self.step_fraction
    }

    /// 设置子步进度（驱动循环在每个积分步开始时置 0）
    #[inline]
    pub fn set_step_fraction(&mut self, fraction: f64) {
        self.step_fraction = fraction.clamp(0.0, 1.0);
    }

    /// 来源进程
    #[inline]
    pub fn origin_process(&self) -> usize {
        self.origin_process
    }

    /// 来源编号
    #[inline]
    pub fn origin_id(&self) -> u64 {
        self.origin_id
    }

    /// 来源对 `(origin_process, origin_id)`
    #[inline]
    pub fn provenance(&self) -> (usize, u64) {
        (self.origin_process, self.origin_id)
    }

    // =========================================================================
    // 网格相关查询
    // =========================================================================

    /// 物理位置（运动网格按子步进度插值）
    pub fn position(&self, mesh: &PolyMesh) -> DVec3 {
        transform_at(mesh, self.tet, self.step_fraction).to_physical(self.coordinates)
    }

    /// 当前时刻 = 时间步起点 + 子步进度 × 步长
    pub fn current_time(&self, mesh: &PolyMesh) -> f64 {
        mesh.time() + self.step_fraction * mesh.delta_t()
    }

    /// 当前四面体网格面三角形的单位外法向（运动网格按子步进度插值）
    pub fn normal(&self, mesh: &PolyMesh) -> DVec3 {
        if !mesh.moving() {
            return mesh.tet_face_normal(self.tet, TimeLevel::Current);
        }
        let t = transform_at(mesh, self.tet, self.step_fraction);
        let (fc, p, q) = (t.vertex(1), t.vertex(2), t.vertex(3));
        (p - fc).cross(q - fc).normalize_or_zero()
    }

    /// 旧时刻的单位外法向
    pub fn old_normal(&self, mesh: &PolyMesh) -> DVec3 {
        mesh.tet_face_normal(self.tet, TimeLevel::Old)
    }

    /// 是否位于网格面上
    #[inline]
    pub fn on_face(&self) -> bool {
        self.face.is_some()
    }

    /// 是否位于内部面上
    pub fn on_internal_face(&self, mesh: &PolyMesh) -> bool {
        self.face.is_some_and(|f| mesh.is_internal_face(f))
    }

    /// 是否位于边界面上
    pub fn on_boundary_face(&self, mesh: &PolyMesh) -> bool {
        self.face.is_some_and(|f| !mesh.is_internal_face(f))
    }

    /// 所在边界面的边界索引
    pub fn patch(&self, mesh: &PolyMesh) -> Option<usize> {
        self.face.and_then(|f| mesh.which_patch(f))
    }

    /// 所在边界面在边界内的局部索引
    pub fn patch_face(&self, mesh: &PolyMesh) -> Option<usize> {
        self.face
            .and_then(|f| mesh.patch_face(f))
            .map(|(_, local)| local)
    }
}
