// crates/mh_lagrangian/src/boundary.rs

//! 边界分派
//!
//! 粒子到达没有相邻单元的网格面时，由 [`BoundaryDispatcher`] 按边界分类处理：
//!
//! - 普通边界（壁面、开边界、对称面）：交给该边界的 [`PatchInteraction`]，
//!   结果为反弹继续、黏附停止或移除
//! - 处理器边界：交给 [`ParallelTransferManager`] 打包迁移
//!
//! 边界交互按名称注册（`rebound` / `stick` / `escape`），由配置字典选择。
//! 任何交互都不会修改粒子的来源对。

use crate::particle::Particle;
use crate::transfer::ParallelTransferManager;
use glam::DVec3;
use mh_foundation::registry::{lookup_f64_or, Dictionary, ModelRegistry};
use mh_foundation::{MhError, MhResult};
use mh_mesh::{MeshError, MeshResult, PatchKind, PolyMesh};
use std::fmt;

// ============================================================================
// 结果类型
// ============================================================================

/// 边界交互结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// 以修改后的剩余位移继续追踪
    Continue,
    /// 停在边界上，本子步结束
    Stop,
    /// 移除粒子
    Remove,
}

/// 边界分派结果（记录在推进报告中）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryOutcome {
    /// 反射后继续
    Reflected,
    /// 黏附在边界上
    Stuck,
    /// 逃逸或被吸收
    Escaped,
    /// 已打包发往其他进程
    Transferred {
        /// 目标进程
        to_process: usize,
    },
    /// 迁移打包失败，粒子被丢弃
    Dropped,
}

/// 撞击信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallHit {
    /// 网格面
    pub face: usize,
    /// 边界索引
    pub patch: usize,
    /// 单位外法向
    pub normal: DVec3,
    /// 撞击时刻
    pub time: f64,
}

// ============================================================================
// 边界交互
// ============================================================================

/// 边界交互模型
pub trait PatchInteraction: Send + Sync + fmt::Debug {
    /// 注册名称
    fn type_name(&self) -> &'static str;

    /// 处理一次撞击
    ///
    /// 可修改粒子速度与剩余位移；返回 [`PatchOutcome::Continue`] 时
    /// 剩余位移必须不再指向边界外侧，否则粒子会立即再次撞击。
    fn interact(&self, particle: &mut Particle, hit: &WallHit, remaining: &mut DVec3) -> PatchOutcome;
}

/// 反弹：法向分量按恢复系数反向，切向分量按摩擦系数衰减
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rebound {
    /// 恢复系数 ∈ [0, 1]
    pub restitution: f64,
    /// 切向摩擦系数 ∈ [0, 1]
    pub friction: f64,
}

impl Default for Rebound {
    fn default() -> Self {
        Self {
            restitution: 1.0,
            friction: 0.0,
        }
    }
}

impl Rebound {
    /// 从字典构造（`restitution` 默认 1，`friction` 默认 0）
    pub fn from_dict(dict: &Dictionary) -> MhResult<Self> {
        let restitution = lookup_f64_or(dict, "restitution", 1.0)?;
        let friction = lookup_f64_or(dict, "friction", 0.0)?;
        MhError::check_range("restitution", restitution, 0.0, 1.0)?;
        MhError::check_range("friction", friction, 0.0, 1.0)?;
        Ok(Self {
            restitution,
            friction,
        })
    }

    /// 对外向运动的矢量做反射
    fn reflect(&self, v: DVec3, n: DVec3) -> DVec3 {
        let vn = v.dot(n);
        if vn <= 0.0 {
            return v;
        }
        let tangential = v - vn * n;
        (1.0 - self.friction) * tangential - self.restitution * vn * n
    }
}

impl PatchInteraction for Rebound {
    fn type_name(&self) -> &'static str {
        "rebound"
    }

    fn interact(&self, particle: &mut Particle, hit: &WallHit, remaining: &mut DVec3) -> PatchOutcome {
        particle.velocity = self.reflect(particle.velocity, hit.normal);
        *remaining = self.reflect(*remaining, hit.normal);
        PatchOutcome::Continue
    }
}

/// 黏附：速度清零，停在边界上
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stick;

impl PatchInteraction for Stick {
    fn type_name(&self) -> &'static str {
        "stick"
    }

    fn interact(&self, particle: &mut Particle, _hit: &WallHit, remaining: &mut DVec3) -> PatchOutcome {
        particle.velocity = DVec3::ZERO;
        *remaining = DVec3::ZERO;
        PatchOutcome::Stop
    }
}

/// 逃逸：粒子离开计算域
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Escape;

impl PatchInteraction for Escape {
    fn type_name(&self) -> &'static str {
        "escape"
    }

    fn interact(&self, _particle: &mut Particle, _hit: &WallHit, _remaining: &mut DVec3) -> PatchOutcome {
        PatchOutcome::Remove
    }
}

/// 已注册全部内置边界交互的注册表
pub fn patch_interaction_registry() -> ModelRegistry<dyn PatchInteraction> {
    let mut registry: ModelRegistry<dyn PatchInteraction> = ModelRegistry::new("patchInteraction");
    registry
        .register("escape", new_escape)
        .register("rebound", new_rebound)
        .register("stick", new_stick);
    registry
}

fn new_escape(_dict: &Dictionary) -> MhResult<Box<dyn PatchInteraction>> {
    Ok(Box::new(Escape))
}

fn new_rebound(dict: &Dictionary) -> MhResult<Box<dyn PatchInteraction>> {
    Ok(Box::new(Rebound::from_dict(dict)?))
}

fn new_stick(_dict: &Dictionary) -> MhResult<Box<dyn PatchInteraction>> {
    Ok(Box::new(Stick))
}

/// 边界类型对应的默认交互
fn default_interaction(kind: &PatchKind) -> Option<Box<dyn PatchInteraction>> {
    match kind {
        PatchKind::Wall | PatchKind::Symmetry => Some(Box::new(Rebound::default())),
        PatchKind::Patch => Some(Box::new(Escape)),
        PatchKind::Processor { .. } => None,
    }
}

// ============================================================================
// 分派器
// ============================================================================

/// 边界分派器
///
/// 每个非处理器边界持有一个交互模型；处理器边界统一交给迁移管理器。
#[derive(Debug)]
pub struct BoundaryDispatcher {
    /// 按边界索引保存的交互（处理器边界为 `None`）
    interactions: Vec<Option<Box<dyn PatchInteraction>>>,
    transfer: ParallelTransferManager,
}

impl BoundaryDispatcher {
    /// 按边界类型设置默认交互：壁面/对称面反弹，开边界逃逸
    pub fn new(mesh: &PolyMesh, transfer: ParallelTransferManager) -> Self {
        Self {
            interactions: mesh.patches().iter().map(|p| default_interaction(&p.kind)).collect(),
            transfer,
        }
    }

    /// 为指定名称的边界设置交互
    pub fn set_interaction(
        &mut self,
        mesh: &PolyMesh,
        name: &str,
        interaction: Box<dyn PatchInteraction>,
    ) -> MeshResult<()> {
        let patch = mesh.find_patch(name)?;
        if mesh.patch(patch).kind.is_processor() {
            return Err(MeshError::invalid_topology(
                "set_interaction",
                format!("处理器边界 {} 不能设置边界交互", name),
            ));
        }
        log::debug!("边界 {} 使用交互模型 {}", name, interaction.type_name());
        self.interactions[patch] = Some(interaction);
        Ok(())
    }

    /// 边界的交互模型
    pub fn interaction(&self, patch: usize) -> Option<&dyn PatchInteraction> {
        self.interactions.get(patch).and_then(|i| i.as_deref())
    }

    /// 迁移管理器
    #[inline]
    pub fn transfer(&self) -> &ParallelTransferManager {
        &self.transfer
    }

    /// 处理到达边界面的粒子
    ///
    /// `remaining` 为尚未消耗的位移，交互模型可以修改它。
    pub fn hit_boundary(
        &self,
        mesh: &PolyMesh,
        particle: &mut Particle,
        patch: usize,
        remaining: &mut DVec3,
    ) -> BoundaryOutcome {
        if let Some(to_process) = mesh.patch(patch).kind.neighbour_process() {
            return match self.transfer.stage(mesh, particle, *remaining, to_process) {
                Ok(()) => BoundaryOutcome::Transferred { to_process },
                Err(err) => {
                    log::warn!("粒子 {:?} 迁移打包失败，已丢弃: {}", particle.provenance(), err);
                    self.transfer.record_drop();
                    BoundaryOutcome::Dropped
                }
            };
        }

        let Some(interaction) = self.interaction(patch) else {
            return BoundaryOutcome::Escaped;
        };
        let hit = WallHit {
            face: particle.tet.face,
            patch,
            normal: particle.normal(mesh),
            time: particle.current_time(mesh),
        };
        match interaction.interact(particle, &hit, remaining) {
            PatchOutcome::Continue => BoundaryOutcome::Reflected,
            PatchOutcome::Stop => BoundaryOutcome::Stuck,
            PatchOutcome::Remove => BoundaryOutcome::Escaped,
        }
    }
}

// ============================================================================
// 测试
// ============================================================================
