// crates/mh_lagrangian/src/cloud.rs

//! 粒子云
//!
//! 驱动循环使用的粒子集合：创建粒子、单粒子推进、整步并行演化、
//! 跨进程交换与检查点。
//!
//! # 整步演化
//!
//! 1. 全部粒子的子步进度置 0
//! 2. 以 rayon 并行追踪每个粒子（粒子之间无交互，顺序不影响轨迹）
//! 3. 全局统计待迁移粒子数；为 0 则结束
//! 4. 全交换迁移缓冲区，接收的粒子以剩余位移继续追踪，回到 3
//!
//! 所有进程必须同时调用 [`ParticleCloud::evolve`]。

use crate::boundary::BoundaryDispatcher;
use crate::error::{TrackingError, TrackingResult};
use crate::id::IdAllocator;
use crate::particle::Particle;
use crate::record::ParticleRecord;
use crate::tracking::{AdvanceOutcome, AdvanceReport, FaceCrossingTracker, TrackingTolerance};
use crate::transfer::{Communicator, ParallelTransferManager};
use glam::DVec3;
use mh_foundation::arena::{Arena, ArenaTag, Idx};
use mh_mesh::{MeshHandle, MeshRegistry, PolyMesh, SharedMesh};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// 粒子标记类型
#[derive(Debug, Clone, Copy)]
pub struct ParticleTag;
impl ArenaTag for ParticleTag {}

/// 粒子句柄
pub type ParticleHandle = Idx<ParticleTag>;

/// 整步演化统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvolveReport {
    /// 完成子步并留在本进程的粒子
    pub completed: usize,
    /// 被边界移除的粒子
    pub removed: usize,
    /// 迁出的粒子
    pub sent: usize,
    /// 迁入的粒子
    pub received: usize,
    /// 追踪出错而被丢弃的粒子
    pub failed: usize,
    /// 网格面穿越总数
    pub face_crossings: usize,
    /// 交换轮数
    pub rounds: usize,
}

/// 粒子云
#[derive(Debug)]
pub struct ParticleCloud {
    mesh_handle: MeshHandle,
    mesh: SharedMesh,
    particles: Arena<Particle, ParticleTag>,
    ids: Arc<IdAllocator>,
    rank: usize,
    tracker: FaceCrossingTracker,
    dispatcher: BoundaryDispatcher,
}

impl ParticleCloud {
    /// 在已注册的网格上创建粒子云
    ///
    /// `ids` 为本进程共享的编号分配器。
    pub fn new(
        registry: &MeshRegistry,
        mesh_handle: MeshHandle,
        ids: Arc<IdAllocator>,
        rank: usize,
        n_procs: usize,
    ) -> TrackingResult<Self> {
        let mesh = registry.get(mesh_handle)?;
        let dispatcher = BoundaryDispatcher::new(&mesh.read(), ParallelTransferManager::new(rank, n_procs));
        Ok(Self {
            mesh_handle,
            mesh,
            particles: Arena::new(),
            ids,
            rank,
            tracker: FaceCrossingTracker::default(),
            dispatcher,
        })
    }

    // =========================================================================
    // 配置
    // =========================================================================

    /// 设置追踪容差
    pub fn set_tolerance(&mut self, tolerance: TrackingTolerance) {
        self.tracker = FaceCrossingTracker::new(tolerance);
    }

    /// 追踪器
    #[inline]
    pub fn tracker(&self) -> &FaceCrossingTracker {
        &self.tracker
    }

    /// 边界分派器
    #[inline]
    pub fn dispatcher(&self) -> &BoundaryDispatcher {
        &self.dispatcher
    }

    /// 可变边界分派器（设置边界交互）
    #[inline]
    pub fn dispatcher_mut(&mut self) -> &mut BoundaryDispatcher {
        &mut self.dispatcher
    }

    /// 共享网格
    #[inline]
    pub fn mesh(&self) -> &SharedMesh {
        &self.mesh
    }

    /// 网格句柄
    #[inline]
    pub fn mesh_handle(&self) -> MeshHandle {
        self.mesh_handle
    }

    /// 本进程编号
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    // =========================================================================
    // 粒子管理
    // =========================================================================

    /// 在物理位置创建粒子
    pub fn create_particle(&mut self, position: DVec3) -> TrackingResult<ParticleHandle> {
        let (tet, coordinates) = {
            let mesh = self.mesh.read();
            self.tracker
                .locate(&mesh, position, 0.0)
                .ok_or(TrackingError::OutsideMesh { position })?
        };
        let id = self.ids.next();
        let particle = Particle::new(self.mesh_handle, tet, coordinates, self.rank, id);
        Ok(self.particles.insert(particle))
    }

    /// 粒子数
    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// 遍历粒子
    pub fn iter(&self) -> impl Iterator<Item = (ParticleHandle, &Particle)> + '_ {
        self.particles.iter()
    }

    /// 获取粒子
    pub fn particle(&self, handle: ParticleHandle) -> TrackingResult<&Particle> {
        self.particles
            .get(handle)
            .ok_or_else(|| TrackingError::stale_particle(handle))
    }

    /// 获取可变粒子（物理模型更新速度与附加数据）
    pub fn particle_mut(&mut self, handle: ParticleHandle) -> TrackingResult<&mut Particle> {
        self.particles
            .get_mut(handle)
            .ok_or_else(|| TrackingError::stale_particle(handle))
    }

    /// 移除粒子
    pub fn remove(&mut self, handle: ParticleHandle) -> Option<Particle> {
        self.particles.remove(handle)
    }

    /// 粒子当前物理位置
    pub fn position(&self, handle: ParticleHandle) -> TrackingResult<DVec3> {
        let particle = self.particle(handle)?;
        Ok(particle.position(&self.mesh.read()))
    }

    /// 粒子所在单元
    pub fn cell(&self, handle: ParticleHandle) -> TrackingResult<usize> {
        Ok(self.particle(handle)?.cell())
    }

    /// 粒子来源对
    pub fn provenance(&self, handle: ParticleHandle) -> TrackingResult<(usize, u64)> {
        Ok(self.particle(handle)?.provenance())
    }

    // =========================================================================
    // 推进
    // =========================================================================

    /// 开始新的积分步：全部粒子子步进度置 0
    pub fn begin_step(&mut self) {
        for (_, particle) in self.particles.iter_mut() {
            particle.set_step_fraction(0.0);
        }
    }

    /// 推进单个粒子，位移对应其剩余子步
    ///
    /// 粒子被移除或迁出时从云中删除；迁出的粒子留在出站缓冲区，
    /// 由下一次 [`exchange`](Self::exchange) 发送。
    pub fn advance(&mut self, handle: ParticleHandle, displacement: DVec3) -> TrackingResult<AdvanceReport> {
        let shared = Arc::clone(&self.mesh);
        let mesh = shared.read();
        let particle = self
            .particles
            .get_mut(handle)
            .ok_or_else(|| TrackingError::stale_particle(handle))?;
        if particle.mesh() != self.mesh_handle {
            return Err(TrackingError::MeshMismatch {
                expected: format!("{:?}", self.mesh_handle),
                actual: format!("{:?}", particle.mesh()),
            });
        }
        let report = self.tracker.track(&mesh, particle, displacement, &self.dispatcher)?;
        if report.is_gone() {
            self.particles.remove(handle);
        }
        Ok(report)
    }

    /// 整步演化
    ///
    /// `displacement_of` 给出每个粒子本步的目标位移。
    pub fn evolve<C, F>(&mut self, comm: &C, displacement_of: F) -> TrackingResult<EvolveReport>
    where
        C: Communicator + ?Sized,
        F: Fn(&Particle, &PolyMesh) -> DVec3 + Sync,
    {
        self.begin_step();
        let shared = Arc::clone(&self.mesh);
        let guard = shared.read();
        let mesh: &PolyMesh = &guard;
        let mut report = EvolveReport::default();

        let all: Vec<ParticleHandle> = self.particles.indices().collect();
        let mut staged = self.track_batch(mesh, &all, |p| displacement_of(p, mesh), &mut report);

        loop {
            let total = comm.all_reduce_sum(staged as u64)?;
            if total == 0 {
                break;
            }
            report.rounds += 1;
            let incoming = comm.all_to_all(self.dispatcher.transfer().take_outgoing())?;

            let mut remaining = HashMap::new();
            for (from, bytes) in incoming.iter().enumerate() {
                if bytes.is_empty() {
                    continue;
                }
                for arrival in self.dispatcher.transfer().receive(mesh, self.mesh_handle, from, bytes) {
                    let handle = self.particles.insert(arrival.particle);
                    remaining.insert(handle, arrival.remaining);
                    report.received += 1;
                }
            }
            let arrived: Vec<ParticleHandle> = remaining.keys().copied().collect();
            staged = self.track_batch_with(mesh, &arrived, |h, _| remaining[&h], &mut report);
        }

        log::debug!(
            "进程 {} 完成整步演化: {} 个粒子, {:?}",
            self.rank,
            self.particles.len(),
            report
        );
        Ok(report)
    }

    /// 交换出站缓冲区并接收粒子（不继续追踪）
    ///
    /// 用于逐个 [`advance`](Self::advance) 的驱动方式；所有进程必须同时调用。
    pub fn exchange<C: Communicator + ?Sized>(&mut self, comm: &C) -> TrackingResult<Vec<(ParticleHandle, DVec3)>> {
        let shared = Arc::clone(&self.mesh);
        let mesh = shared.read();
        let incoming = comm.all_to_all(self.dispatcher.transfer().take_outgoing())?;
        let mut arrived = Vec::new();
        for (from, bytes) in incoming.iter().enumerate() {
            if bytes.is_empty() {
                continue;
            }
            for arrival in self.dispatcher.transfer().receive(&mesh, self.mesh_handle, from, bytes) {
                arrived.push((self.particles.insert(arrival.particle), arrival.remaining));
            }
        }
        Ok(arrived)
    }

    fn track_batch<D>(
        &mut self,
        mesh: &PolyMesh,
        handles: &[ParticleHandle],
        displacement: D,
        report: &mut EvolveReport,
    ) -> usize
    where
        D: Fn(&Particle) -> DVec3 + Sync,
    {
        self.track_batch_with(mesh, handles, |_, p| displacement(p), report)
    }

    /// 并行追踪一批粒子，返回迁出数
    fn track_batch_with<D>(
        &mut self,
        mesh: &PolyMesh,
        handles: &[ParticleHandle],
        displacement: D,
        report: &mut EvolveReport,
    ) -> usize
    where
        D: Fn(ParticleHandle, &Particle) -> DVec3 + Sync,
    {
        let tracker = &self.tracker;
        let dispatcher = &self.dispatcher;
        let wanted: std::collections::HashSet<ParticleHandle> = handles.iter().copied().collect();

        let results: Vec<(ParticleHandle, TrackingResult<AdvanceReport>)> = {
            let work: Vec<(ParticleHandle, &mut Particle)> = self
                .particles
                .iter_mut()
                .filter(|(h, _)| wanted.contains(h))
                .collect();
            work.into_par_iter()
                .map(|(h, particle)| {
                    let d = displacement(h, particle);
                    (h, tracker.track(mesh, particle, d, dispatcher))
                })
                .collect()
        };

        let mut sent = 0;
        for (handle, result) in results {
            match result {
                Ok(advance) => {
                    report.face_crossings += advance.face_crossings();
                    match advance.outcome {
                        AdvanceOutcome::Continues => report.completed += 1,
                        AdvanceOutcome::Removed => report.removed += 1,
                        AdvanceOutcome::Transferred { .. } => sent += 1,
                    }
                    if advance.is_gone() {
                        self.particles.remove(handle);
                    }
                }
                Err(err) => {
                    log::warn!("粒子 {:?} 追踪失败，已丢弃: {}", handle, err);
                    self.particles.remove(handle);
                    report.failed += 1;
                }
            }
        }
        report.sent += sent;
        sent
    }

    // =========================================================================
    // 检查点
    // =========================================================================

    /// 导出全部粒子的检查点记录
    pub fn checkpoint(&self) -> Vec<ParticleRecord> {
        self.particles.iter().map(|(_, p)| ParticleRecord::from_particle(p)).collect()
    }

    /// 从检查点恢复粒子
    ///
    /// 全部记录校验通过后才插入；本进程创建的粒子编号会从分配器中预留。
    pub fn restore(&mut self, records: Vec<ParticleRecord>) -> TrackingResult<Vec<ParticleHandle>> {
        {
            let mesh = self.mesh.read();
            let tol = self.tracker.tolerance().barycentric_tol;
            for (index, record) in records.iter().enumerate() {
                record.validate(&mesh, index, tol)?;
            }
        }
        let mut handles = Vec::with_capacity(records.len());
        for record in records {
            if record.origin_process == self.rank {
                self.ids.reserve_through(record.origin_id);
            }
            handles.push(self.particles.insert(record.into_particle(self.mesh_handle)));
        }
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::SerialCommunicator;
    use mh_mesh::BlockMesh;

    fn unit_cloud(n: usize) -> ParticleCloud {
        let mut registry = MeshRegistry::new();
        let handle = registry.register(BlockMesh::unit_cube(n).build().unwrap());
        ParticleCloud::new(&registry, handle, Arc::new(IdAllocator::new()), 0, 1).unwrap()
    }

    #[test]
    fn test_create_assigns_increasing_ids() {
        let mut cloud = unit_cloud(2);
        let a = cloud.create_particle(DVec3::new(0.2, 0.3, 0.4)).unwrap();
        let b = cloud.create_particle(DVec3::new(0.7, 0.8, 0.1)).unwrap();
        assert_eq!(cloud.provenance(a).unwrap(), (0, 0));
        assert_eq!(cloud.provenance(b).unwrap(), (0, 1));
        assert!((cloud.position(b).unwrap() - DVec3::new(0.7, 0.8, 0.1)).length() < 1e-12);
        assert!(matches!(
            cloud.create_particle(DVec3::new(2.0, 0.0, 0.0)),
            Err(TrackingError::OutsideMesh { .. })
        ));
    }

    #[test]
    fn test_advance_removes_escaped_particle() {
        let mut cloud = unit_cloud(1);
        let h = cloud.create_particle(DVec3::splat(0.5)).unwrap();
        let report = cloud.advance(h, DVec3::new(0.0, 2.0, 0.0)).unwrap();
        assert_eq!(report.outcome, AdvanceOutcome::Removed);
        assert!(cloud.is_empty());
        assert!(matches!(cloud.position(h), Err(TrackingError::StaleParticle { .. })));
    }

    #[test]
    fn test_evolve_serial() {
        let mut cloud = unit_cloud(3);
        for x in [0.1, 0.5, 0.9] {
            cloud.create_particle(DVec3::new(x, 0.45, 0.55)).unwrap();
        }
        let report = cloud
            .evolve(&SerialCommunicator, |_, _| DVec3::new(0.2, 0.0, 0.0))
            .unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(report.rounds, 0);
        assert_eq!(cloud.len(), 2);

        let mut xs: Vec<f64> = cloud
            .iter()
            .map(|(h, _)| cloud.position(h).unwrap().x)
            .collect();
        xs.sort_by(f64::total_cmp);
        assert!((xs[0] - 0.3).abs() < 1e-12);
        assert!((xs[1] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_checkpoint_restore() {
        let mut cloud = unit_cloud(2);
        let h = cloud.create_particle(DVec3::new(0.3, 0.6, 0.2)).unwrap();
        cloud.particle_mut(h).unwrap().payload = vec![1.0];
        let records = cloud.checkpoint();

        let mut restored = unit_cloud(2);
        let handles = restored.restore(records.clone()).unwrap();
        assert_eq!(restored.checkpoint(), records);
        assert!((restored.position(handles[0]).unwrap() - DVec3::new(0.3, 0.6, 0.2)).length() < 1e-12);

        // 恢复后新编号不与恢复的粒子冲突
        let fresh = restored.create_particle(DVec3::splat(0.5)).unwrap();
        assert_eq!(restored.provenance(fresh).unwrap(), (0, 1));

        let mut bad = records;
        bad[0].cell = 99;
        assert!(restored.restore(bad).is_err());
        assert_eq!(restored.len(), 2);
    }
}
