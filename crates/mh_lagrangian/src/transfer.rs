// crates/mh_lagrangian/src/transfer.rs

//! 跨进程迁移
//!
//! 粒子到达处理器边界时，相对共享面表示其位置后打包发送；
//! 接收方按自己的处理器边界重建本地四面体。
//!
//! # 面匹配约定
//!
//! 相邻两个分区在处理器边界上保存同一批面，面顺序一致；
//! 接收方的点环与发送方反向、起点相同。因此发送方四面体 `(fc, p_i, p_{i+1})`
//! 在接收方对应 `tet_pt = (n - i - 1) mod n`，两个面点权重互换。
//!
//! # 记录格式
//!
//! 每条记录为 [`TransferHeader`]（`Pod`，128 字节）后跟 `n_payload` 个 `f64`，
//! 同一目标进程的记录直接拼接在一个字节缓冲区中。
//!
//! # 通信
//!
//! [`Communicator`] 抽象集合通信；[`SerialCommunicator`] 用于单进程，
//! [`LocalCommunicator`] 以线程模拟多进程（共享信箱 + 屏障）。

use crate::barycentric::Barycentric;
use crate::error::{TrackingError, TrackingResult, TransferError};
use crate::particle::Particle;
use bytemuck::{Pod, Zeroable};
use glam::DVec3;
use mh_foundation::metrics::Counter;
use mh_mesh::{MeshHandle, PolyMesh, TetIndices};
use parking_lot::Mutex;
use std::mem::size_of;
use std::sync::{Arc, Barrier};

// ============================================================================
// 记录格式
// ============================================================================

/// 迁移记录头
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransferHeader {
    /// 处理器边界内的局部面索引
    pub patch_face: u64,
    /// 面点数（用于校验分区是否匹配）
    pub face_size: u64,
    /// 发送方四面体的面内点
    pub tet_pt: u64,
    /// 来源进程
    pub origin_process: u64,
    /// 来源编号
    pub origin_id: u64,
    /// 附加数据长度
    pub n_payload: u64,
    /// 面中心与两个面点的权重（面上第 0 个权重恒为 0）
    pub weights: [f64; 3],
    /// 子步进度
    pub step_fraction: f64,
    /// 未消耗的位移
    pub remaining: [f64; 3],
    /// 速度
    pub velocity: [f64; 3],
}

/// 记录头字节数
pub const HEADER_SIZE: usize = size_of::<TransferHeader>();

/// 解码后的迁移记录
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    pub header: TransferHeader,
    pub payload: Vec<f64>,
}

/// 在接收方重建完成的粒子
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    /// 已定位到本地四面体的粒子
    pub particle: Particle,
    /// 本子步尚未消耗的位移
    pub remaining: DVec3,
}

/// 将一个缓冲区解码为记录序列
///
/// 截断的尾部返回错误，之前的记录仍然有效。
pub fn decode_records(bytes: &[u8]) -> (Vec<TransferRecord>, Option<TransferError>) {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let available = bytes.len() - offset;
        if available < HEADER_SIZE {
            return (
                records,
                Some(TransferError::Truncated {
                    needed: HEADER_SIZE,
                    available,
                }),
            );
        }
        let header: TransferHeader = bytemuck::pod_read_unaligned(&bytes[offset..offset + HEADER_SIZE]);
        offset += HEADER_SIZE;

        let needed = usize::try_from(header.n_payload)
            .ok()
            .and_then(|n| n.checked_mul(size_of::<f64>()))
            .unwrap_or(usize::MAX);
        let available = bytes.len() - offset;
        if needed > available {
            return (records, Some(TransferError::Truncated { needed, available }));
        }
        let payload = bytes[offset..offset + needed]
            .chunks_exact(size_of::<f64>())
            .map(bytemuck::pod_read_unaligned::<f64>)
            .collect();
        offset += needed;
        records.push(TransferRecord { header, payload });
    }
    (records, None)
}

// ============================================================================
// 迁移管理器
// ============================================================================

/// 迁移统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub sent: u64,
    pub received: u64,
    pub dropped: u64,
}

/// 并行迁移管理器
///
/// 打包在追踪线程中并发进行，出站缓冲区由互斥锁保护。
#[derive(Debug)]
pub struct ParallelTransferManager {
    rank: usize,
    n_procs: usize,
    /// 按目标进程划分的出站缓冲区
    outbox: Mutex<Vec<Vec<u8>>>,
    sent: Counter,
    received: Counter,
    dropped: Counter,
}

impl ParallelTransferManager {
    /// 创建第 `rank` 个进程（共 `n_procs` 个）的迁移管理器
    pub fn new(rank: usize, n_procs: usize) -> Self {
        let n_procs = n_procs.max(1);
        Self {
            rank,
            n_procs,
            outbox: Mutex::new(vec![Vec::new(); n_procs]),
            sent: Counter::new(),
            received: Counter::new(),
            dropped: Counter::new(),
        }
    }

    /// 本进程编号
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// 进程总数
    #[inline]
    pub fn n_procs(&self) -> usize {
        self.n_procs
    }

    /// 打包到达处理器边界面的粒子
    pub fn stage(
        &self,
        mesh: &PolyMesh,
        particle: &Particle,
        remaining: DVec3,
        to_process: usize,
    ) -> Result<(), TransferError> {
        if to_process >= self.n_procs {
            return Err(TransferError::UnknownProcess {
                to_process,
                n_procs: self.n_procs,
            });
        }
        let face = particle.face().ok_or(TransferError::NotOnProcessorFace)?;
        let (patch, local) = mesh.patch_face(face).ok_or(TransferError::NotOnProcessorFace)?;
        if mesh.patch(patch).kind.neighbour_process() != Some(to_process) {
            return Err(TransferError::NotOnProcessorFace);
        }

        let y = particle.coordinates();
        let header = TransferHeader {
            patch_face: local as u64,
            face_size: mesh.face_points(face).len() as u64,
            tet_pt: particle.tet_pt() as u64,
            origin_process: particle.origin_process() as u64,
            origin_id: particle.origin_id(),
            n_payload: particle.payload.len() as u64,
            weights: [y[1], y[2], y[3]],
            step_fraction: particle.step_fraction(),
            remaining: remaining.to_array(),
            velocity: particle.velocity.to_array(),
        };

        let mut outbox = self.outbox.lock();
        let buffer = &mut outbox[to_process];
        buffer.extend_from_slice(bytemuck::bytes_of(&header));
        buffer.extend_from_slice(bytemuck::cast_slice(&particle.payload));
        self.sent.inc();
        Ok(())
    }

    /// 是否有待发送的记录
    pub fn pending(&self) -> bool {
        self.outbox.lock().iter().any(|b| !b.is_empty())
    }

    /// 取出全部出站缓冲区（按目标进程索引）
    pub fn take_outgoing(&self) -> Vec<Vec<u8>> {
        let mut outbox = self.outbox.lock();
        std::mem::replace(&mut *outbox, vec![Vec::new(); self.n_procs])
    }

    /// 在本地网格上重建一条记录
    pub fn resolve(
        &self,
        mesh: &PolyMesh,
        mesh_handle: MeshHandle,
        from_process: usize,
        record: TransferRecord,
    ) -> Result<Arrival, TransferError> {
        let header = record.header;
        let patch = mesh
            .processor_patch(from_process)
            .ok_or(TransferError::NoProcessorPatch { from_process })?;
        let patch = mesh.patch(patch);

        let local = header.patch_face as usize;
        if local >= patch.size {
            return Err(TransferError::PatchFaceOutOfRange {
                patch_face: local,
                size: patch.size,
            });
        }
        let face = patch.start + local;
        let n = mesh.face_points(face).len();
        if header.face_size != n as u64 {
            return Err(TransferError::FaceSizeMismatch {
                face,
                expected: header.face_size as usize,
                actual: n,
            });
        }
        let sent_pt = header.tet_pt as usize;
        if sent_pt >= n {
            return Err(TransferError::TetPointOutOfRange {
                tet_pt: sent_pt,
                face_size: n,
            });
        }

        let tet = TetIndices::new(mesh.face_owner(face), face, (n - sent_pt - 1) % n);
        let [w_fc, w_a, w_b] = header.weights;
        let coordinates = Barycentric::new(0.0, w_fc, w_b, w_a).snapped();

        let mut particle = Particle::new(
            mesh_handle,
            tet,
            coordinates,
            header.origin_process as usize,
            header.origin_id,
        );
        particle.step_fraction = header.step_fraction.clamp(0.0, 1.0);
        particle.face = Some(face);
        particle.velocity = DVec3::from_array(header.velocity);
        particle.payload = record.payload;

        Ok(Arrival {
            particle,
            remaining: DVec3::from_array(header.remaining),
        })
    }

    /// 解码并重建来自 `from_process` 的全部粒子
    ///
    /// 无法重建的粒子被丢弃并记录警告，不影响其他粒子。
    pub fn receive(
        &self,
        mesh: &PolyMesh,
        mesh_handle: MeshHandle,
        from_process: usize,
        bytes: &[u8],
    ) -> Vec<Arrival> {
        let (records, truncated) = decode_records(bytes);
        if let Some(err) = truncated {
            log::warn!("来自进程 {} 的迁移缓冲区损坏: {}", from_process, err);
            self.dropped.inc();
        }

        let mut arrivals = Vec::with_capacity(records.len());
        for record in records {
            let provenance = (record.header.origin_process, record.header.origin_id);
            match self.resolve(mesh, mesh_handle, from_process, record) {
                Ok(arrival) => {
                    self.received.inc();
                    arrivals.push(arrival);
                }
                Err(err) => {
                    log::warn!(
                        "进程 {} 无法接收来自进程 {} 的粒子 {:?}，已丢弃: {}",
                        self.rank,
                        from_process,
                        provenance,
                        err
                    );
                    self.dropped.inc();
                }
            }
        }
        arrivals
    }

    /// 记录一次丢弃
    pub(crate) fn record_drop(&self) {
        self.dropped.inc();
    }

    /// 累计统计
    pub fn stats(&self) -> TransferStats {
        TransferStats {
            sent: self.sent.get(),
            received: self.received.get(),
            dropped: self.dropped.get(),
        }
    }
}

// ============================================================================
// 集合通信
// ============================================================================

/// 进程间集合通信
///
/// 所有进程必须以相同顺序调用同一组集合操作。
pub trait Communicator: Send + Sync {
    /// 本进程编号
    fn rank(&self) -> usize;

    /// 进程总数
    fn size(&self) -> usize;

    /// 全交换：`outgoing[to]` 发往进程 `to`，返回值 `[from]` 为收到的数据
    fn all_to_all(&self, outgoing: Vec<Vec<u8>>) -> TrackingResult<Vec<Vec<u8>>>;

    /// 全局求和
    fn all_reduce_sum(&self, value: u64) -> TrackingResult<u64>;
}

fn check_outgoing(outgoing: &[Vec<u8>], size: usize) -> TrackingResult<()> {
    if outgoing.len() != size {
        return Err(TrackingError::communication(format!(
            "出站缓冲区数 {} 与进程数 {} 不一致",
            outgoing.len(),
            size
        )));
    }
    Ok(())
}

/// 单进程通信
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_to_all(&self, outgoing: Vec<Vec<u8>>) -> TrackingResult<Vec<Vec<u8>>> {
        check_outgoing(&outgoing, 1)?;
        Ok(outgoing)
    }

    fn all_reduce_sum(&self, value: u64) -> TrackingResult<u64> {
        Ok(value)
    }
}

#[derive(Debug)]
struct SharedMailboxes {
    size: usize,
    /// `mailboxes[to][from]`
    mailboxes: Mutex<Vec<Vec<Vec<u8>>>>,
    sums: Mutex<Vec<u64>>,
    barrier: Barrier,
}

/// 线程间模拟的多进程通信
///
/// 每个线程持有一个成员；每次集合操作以两道屏障分隔写入与读取。
#[derive(Debug, Clone)]
pub struct LocalCommunicator {
    rank: usize,
    shared: Arc<SharedMailboxes>,
}

impl LocalCommunicator {
    /// 创建 `size` 个成员的通信组
    pub fn group(size: usize) -> Vec<Self> {
        let size = size.max(1);
        let shared = Arc::new(SharedMailboxes {
            size,
            mailboxes: Mutex::new(vec![vec![Vec::new(); size]; size]),
            sums: Mutex::new(vec![0; size]),
            barrier: Barrier::new(size),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn all_to_all(&self, outgoing: Vec<Vec<u8>>) -> TrackingResult<Vec<Vec<u8>>> {
        check_outgoing(&outgoing, self.shared.size)?;
        {
            let mut mailboxes = self.shared.mailboxes.lock();
            for (to, buffer) in outgoing.into_iter().enumerate() {
                mailboxes[to][self.rank] = buffer;
            }
        }
        self.shared.barrier.wait();
        let incoming = {
            let mut mailboxes = self.shared.mailboxes.lock();
            std::mem::replace(&mut mailboxes[self.rank], vec![Vec::new(); self.shared.size])
        };
        self.shared.barrier.wait();
        Ok(incoming)
    }

    fn all_reduce_sum(&self, value: u64) -> TrackingResult<u64> {
        self.shared.sums.lock()[self.rank] = value;
        self.shared.barrier.wait();
        let total = self.shared.sums.lock().iter().sum();
        self.shared.barrier.wait();
        Ok(total)
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::FaceCrossingTracker;
    use mh_mesh::BlockMesh;

    #[test]
    fn test_header_layout() {
        assert_eq!(HEADER_SIZE, 128);
    }

    #[test]
    fn test_decode_detects_truncation() {
        let header = TransferHeader {
            n_payload: 2,
            origin_id: 9,
            ..TransferHeader::zeroed()
        };
        let mut bytes = bytemuck::bytes_of(&header).to_vec();
        bytes.extend_from_slice(bytemuck::cast_slice(&[1.5f64, -2.0]));
        let (records, err) = decode_records(&bytes);
        assert!(err.is_none());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, vec![1.5, -2.0]);
        assert_eq!(records[0].header.origin_id, 9);

        let (records, err) = decode_records(&bytes[..bytes.len() - 3]);
        assert!(records.is_empty());
        assert_eq!(
            err,
            Some(TransferError::Truncated {
                needed: 16,
                available: 13
            })
        );
    }

    #[test]
    fn test_stage_and_resolve_across_slabs() {
        let meshes = BlockMesh::new([2, 1, 1], DVec3::ZERO, DVec3::new(2.0, 1.0, 1.0))
            .decompose_x(2)
            .unwrap();
        let tracker = FaceCrossingTracker::default();
        let sender = ParallelTransferManager::new(0, 2);
        let receiver = ParallelTransferManager::new(1, 2);

        // 将粒子放到处理器面上
        let target = DVec3::new(1.0, 0.3, 0.7);
        let patch = meshes[0].processor_patch(1).unwrap();
        let face = meshes[0].patch(patch).start;
        let tet = meshes[0]
            .cell_tets(meshes[0].face_owner(face))
            .filter(|t| t.face == face)
            .find(|&t| {
                crate::barycentric::static_transform(&meshes[0], t)
                    .to_barycentric(target, 1e-12)
                    .is_some_and(|y| y.min_element() >= -1e-12)
            })
            .unwrap();
        let y = crate::barycentric::static_transform(&meshes[0], tet)
            .to_barycentric(target, 1e-12)
            .unwrap()
            .snapped_onto(0);
        let mut p = Particle::new(MeshHandle::default(), tet, y, 0, 5);
        p.face = Some(face);
        p.step_fraction = 0.25;
        p.payload = vec![3.0, 4.0];
        sender.stage(&meshes[0], &p, DVec3::new(0.5, 0.0, 0.0), 1).unwrap();
        assert!(sender.pending());

        let outgoing = sender.take_outgoing();
        assert!(!sender.pending());
        assert!(outgoing[0].is_empty());
        let arrivals = receiver.receive(&meshes[1], MeshHandle::default(), 0, &outgoing[1]);
        assert_eq!(arrivals.len(), 1);

        let arrival = &arrivals[0];
        assert_eq!(arrival.particle.provenance(), (0, 5));
        assert_eq!(arrival.particle.payload, vec![3.0, 4.0]);
        assert_eq!(arrival.particle.step_fraction(), 0.25);
        assert_eq!(arrival.remaining, DVec3::new(0.5, 0.0, 0.0));
        assert!((arrival.particle.position(&meshes[1]) - target).length() < 1e-12);
        assert!(tracker.locate(&meshes[1], target, 0.0).is_some());
        assert_eq!(
            receiver.stats(),
            TransferStats {
                sent: 0,
                received: 1,
                dropped: 0
            }
        );
    }

    #[test]
    fn test_mismatched_record_is_dropped() {
        let meshes = BlockMesh::new([2, 1, 1], DVec3::ZERO, DVec3::new(2.0, 1.0, 1.0))
            .decompose_x(2)
            .unwrap();
        let receiver = ParallelTransferManager::new(1, 2);
        let header = TransferHeader {
            patch_face: 7,
            face_size: 4,
            ..TransferHeader::zeroed()
        };
        let arrivals = receiver.receive(&meshes[1], MeshHandle::default(), 0, bytemuck::bytes_of(&header));
        assert!(arrivals.is_empty());
        assert_eq!(receiver.stats().dropped, 1);

        // 没有与进程 3 相邻的边界
        let record = TransferRecord {
            header: TransferHeader::zeroed(),
            payload: Vec::new(),
        };
        assert_eq!(
            receiver.resolve(&meshes[1], MeshHandle::default(), 3, record),
            Err(TransferError::NoProcessorPatch { from_process: 3 })
        );
    }

    #[test]
    fn test_local_communicator_exchange() {
        let group = LocalCommunicator::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .map(|comm| {
                std::thread::spawn(move || {
                    let rank = comm.rank();
                    let outgoing = (0..comm.size()).map(|to| vec![rank as u8, to as u8]).collect();
                    let incoming = comm.all_to_all(outgoing).unwrap();
                    let total = comm.all_reduce_sum(rank as u64 + 1).unwrap();
                    (rank, incoming, total)
                })
            })
            .collect();
        for h in handles {
            let (rank, incoming, total) = h.join().unwrap();
            assert_eq!(total, 6);
            for (from, bytes) in incoming.iter().enumerate() {
                assert_eq!(bytes, &vec![from as u8, rank as u8]);
            }
        }
    }

    #[test]
    fn test_serial_communicator_rejects_wrong_width() {
        let comm = SerialCommunicator;
        assert!(comm.all_to_all(vec![Vec::new(), Vec::new()]).is_err());
        assert_eq!(comm.all_reduce_sum(4).unwrap(), 4);
    }
}
