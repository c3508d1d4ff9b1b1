//! crates/mh_lagrangian/tests/parallel_transfer.rs
//!
//! 多进程迁移测试：每个线程持有一个分区与一个 LocalCommunicator 成员
//!
//! - 来源对在任意次迁移后不变
//! - 迁移前后物理位置连续
//! - 一个子步内连续穿越多个分区

use glam::DVec3;
use mh_lagrangian::{IdAllocator, LocalCommunicator, ParticleCloud, SerialCommunicator};
use mh_mesh::{BlockMesh, MeshRegistry, PolyMesh};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

const EPS: f64 = 1e-9;
const N_PROCS: usize = 3;

type Snapshot = Vec<((usize, u64), DVec3)>;

fn slab_meshes() -> Vec<PolyMesh> {
    BlockMesh::new([6, 2, 2], DVec3::ZERO, DVec3::new(3.0, 1.0, 1.0))
        .decompose_x(N_PROCS)
        .unwrap()
}

fn snapshot(cloud: &ParticleCloud) -> Snapshot {
    cloud
        .iter()
        .map(|(h, p)| (p.provenance(), cloud.position(h).unwrap()))
        .collect()
}

/// 在每个分区内创建粒子，依次执行若干整步演化，返回每步之后的快照
fn run_ranks(displacements: Vec<DVec3>) -> (Snapshot, Vec<Snapshot>, u64) {
    let meshes = slab_meshes();
    let comms = LocalCommunicator::group(N_PROCS);

    let workers: Vec<_> = meshes
        .into_iter()
        .zip(comms)
        .enumerate()
        .map(|(rank, (mesh, comm))| {
            let displacements = displacements.clone();
            thread::spawn(move || {
                let mut registry = MeshRegistry::new();
                let handle = registry.register(mesh);
                let mut cloud =
                    ParticleCloud::new(&registry, handle, Arc::new(IdAllocator::new()), rank, N_PROCS).unwrap();
                for k in 0..6 {
                    let x = rank as f64 + 0.07 + 0.14 * k as f64;
                    let y = 0.13 + 0.11 * k as f64;
                    let z = 0.71 - 0.09 * k as f64;
                    cloud.create_particle(DVec3::new(x, y, z)).unwrap();
                }
                let initial = snapshot(&cloud);

                let mut after = Vec::new();
                let mut sent = 0;
                for d in displacements {
                    let report = cloud.evolve(&comm, |_, _| d).unwrap();
                    assert_eq!(report.failed, 0);
                    sent += report.sent as u64;
                    after.push(snapshot(&cloud));
                }
                assert_eq!(cloud.dispatcher().transfer().stats().dropped, 0);
                (initial, after, sent)
            })
        })
        .collect();

    let mut initial = Vec::new();
    let mut after: Vec<Snapshot> = Vec::new();
    let mut sent = 0;
    for worker in workers {
        let (i, a, s) = worker.join().unwrap();
        initial.extend(i);
        if after.is_empty() {
            after = a;
        } else {
            for (all, part) in after.iter_mut().zip(a) {
                all.extend(part);
            }
        }
        sent += s;
    }
    (initial, after, sent)
}

#[test]
fn test_provenance_and_position_across_ranks() {
    let d = DVec3::new(0.6, 0.05, -0.03);
    let (initial, after, sent) = run_ranks(vec![d]);

    assert!(sent > 0);
    let starts: HashMap<(usize, u64), DVec3> = initial.iter().copied().collect();
    assert_eq!(starts.len(), 6 * N_PROCS);

    // 最后一个分区中越过 x = 3 的粒子逃逸
    let expected: HashMap<(usize, u64), DVec3> = starts
        .iter()
        .map(|(&k, &x)| (k, x + d))
        .filter(|(_, x)| x.x < 3.0)
        .collect();
    let finals: HashMap<(usize, u64), DVec3> = after[0].iter().copied().collect();
    assert_eq!(finals.len(), after[0].len(), "来源对重复");
    assert_eq!(finals.len(), expected.len());
    for (key, x) in &expected {
        let got = finals.get(key).unwrap_or_else(|| panic!("粒子 {:?} 丢失", key));
        assert!((*got - *x).length() < EPS, "{:?}: {} vs {}", key, got, x);
    }
}

#[test]
fn test_multiple_transfers_within_one_step() {
    // 第一步穿越两个分区，第二步原路返回
    let d = DVec3::new(1.7, 0.02, 0.01);
    let (initial, after, sent) = run_ranks(vec![d, -d]);

    let starts: HashMap<(usize, u64), DVec3> = initial.iter().copied().collect();
    let survivors: Vec<(usize, u64)> = starts
        .iter()
        .filter(|(_, x)| x.x + d.x < 3.0)
        .map(|(&k, _)| k)
        .collect();
    assert!(sent as usize >= survivors.len());

    let back: HashMap<(usize, u64), DVec3> = after[1].iter().copied().collect();
    assert_eq!(back.len(), survivors.len());
    for key in survivors {
        let x = back[&key];
        assert!((x - starts[&key]).length() < EPS, "{:?}: {} vs {}", key, x, starts[&key]);
        // 回到起始分区
        assert_eq!(key.0, (x.x.floor() as usize).min(N_PROCS - 1));
    }
}

#[test]
fn test_serial_cloud_on_undecomposed_mesh_matches() {
    let mut registry = MeshRegistry::new();
    let handle = registry.register(
        BlockMesh::new([6, 2, 2], DVec3::ZERO, DVec3::new(3.0, 1.0, 1.0))
            .build()
            .unwrap(),
    );
    let mut cloud = ParticleCloud::new(&registry, handle, Arc::new(IdAllocator::new()), 0, 1).unwrap();
    let start = DVec3::new(0.35, 0.4, 0.6);
    let h = cloud.create_particle(start).unwrap();
    let d = DVec3::new(2.1, 0.1, -0.2);

    let report = cloud.evolve(&SerialCommunicator, |_, _| d).unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.sent, 0);
    assert!((cloud.position(h).unwrap() - (start + d)).length() < EPS);
}
