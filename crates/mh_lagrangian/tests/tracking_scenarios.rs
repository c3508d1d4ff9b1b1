//! crates/mh_lagrangian/tests/tracking_scenarios.rs
//!
//! 端到端追踪场景与随机不变量测试
//!
//! - 单位立方体逃逸
//! - 零位移
//! - 扰动网格（非平面面）上的随机推进
//! - 变形网格上的随机推进

use glam::DVec3;
use mh_lagrangian::{
    AdvanceOutcome, BoundaryOutcome, IdAllocator, ParticleCloud, ParticleHandle, TrackEvent,
};
use mh_mesh::{BlockMesh, MeshRegistry, Patch, PatchKind, PolyMesh};
use rand::prelude::*;
use std::sync::Arc;

// ============================================================
// 测试辅助设施
// ============================================================

const EPS: f64 = 1e-9;

fn approx_eq(a: DVec3, b: DVec3, tol: f64) -> bool {
    (a - b).length() < tol
}

fn cloud_on(mesh: PolyMesh) -> ParticleCloud {
    let mut registry = MeshRegistry::new();
    let handle = registry.register(mesh);
    ParticleCloud::new(&registry, handle, Arc::new(IdAllocator::new()), 0, 1).unwrap()
}

fn is_boundary_point(p: DVec3) -> bool {
    p.to_array().iter().any(|&c| c.abs() < 1e-12 || (c - 1.0).abs() < 1e-12)
}

/// 扰动内部点的单位立方体网格，全部边界设为壁面
fn perturbed_unit_cube(n: usize, amplitude: f64, rng: &mut StdRng) -> PolyMesh {
    let base = BlockMesh::unit_cube(n).build().unwrap();
    let h = 1.0 / n as f64;
    let points = base
        .points()
        .iter()
        .map(|&p| {
            if is_boundary_point(p) {
                p
            } else {
                p + DVec3::new(
                    rng.gen_range(-amplitude..amplitude),
                    rng.gen_range(-amplitude..amplitude),
                    rng.gen_range(-amplitude..amplitude),
                ) * h
            }
        })
        .collect();
    let faces = (0..base.n_faces()).map(|f| base.face_points(f).to_vec()).collect();
    let owner = (0..base.n_faces()).map(|f| base.face_owner(f)).collect();
    let neighbour = (0..base.n_internal_faces())
        .map(|f| base.face_neighbour(f).unwrap())
        .collect();
    let patches = base
        .patches()
        .iter()
        .map(|p| Patch::new(p.name.clone(), PatchKind::Wall, p.start, p.size))
        .collect();
    PolyMesh::new(points, faces, owner, neighbour, patches).unwrap()
}

fn random_interior_point(rng: &mut StdRng) -> DVec3 {
    DVec3::new(
        rng.gen_range(0.05..0.95),
        rng.gen_range(0.05..0.95),
        rng.gen_range(0.05..0.95),
    )
}

fn random_displacement(rng: &mut StdRng, max: f64) -> DVec3 {
    DVec3::new(
        rng.gen_range(-max..max),
        rng.gen_range(-max..max),
        rng.gen_range(-max..max),
    )
}

fn hit_boundary(events: &[TrackEvent]) -> bool {
    events
        .iter()
        .any(|e| matches!(e, TrackEvent::BoundaryFace { .. }))
}

// ============================================================
// 确定性场景
// ============================================================

#[test]
fn test_unit_cube_escape_through_face() {
    let mut cloud = cloud_on(BlockMesh::unit_cube(1).build().unwrap());
    let p = cloud.create_particle(DVec3::splat(0.5)).unwrap();

    let report = cloud.advance(p, DVec3::new(1.0, 0.0, 0.0)).unwrap();

    assert_eq!(report.face_crossings(), 1);
    let TrackEvent::BoundaryFace { face, patch, outcome } = report.events[0] else {
        panic!("期望边界面事件: {:?}", report.events);
    };
    assert_eq!(outcome, BoundaryOutcome::Escaped);
    {
        let mesh = cloud.mesh().read();
        assert_eq!(mesh.patch(patch).name, "xMax");
        assert!(mesh.patch(patch).contains(face));
    }
    assert!((report.final_position.x - 1.0).abs() < EPS);
    assert!(approx_eq(report.final_position, DVec3::new(1.0, 0.5, 0.5), EPS));
    assert_eq!(report.outcome, AdvanceOutcome::Removed);
    assert!((report.distance - 0.5).abs() < EPS);
    assert!(cloud.is_empty());
}

#[test]
fn test_zero_displacement_at_centroid() {
    let mut cloud = cloud_on(BlockMesh::unit_cube(1).build().unwrap());
    let p = cloud.create_particle(DVec3::splat(0.5)).unwrap();
    let before = cloud.particle(p).unwrap().clone();

    let report = cloud.advance(p, DVec3::ZERO).unwrap();

    let after = cloud.particle(p).unwrap();
    assert_eq!(report.outcome, AdvanceOutcome::Continues);
    assert!(report.events.is_empty());
    assert_eq!(after.tet(), before.tet());
    assert_eq!(after.coordinates(), before.coordinates());
    assert_eq!(report.distance, 0.0);
}

#[test]
fn test_long_path_through_many_cells() {
    let mut cloud = cloud_on(BlockMesh::unit_cube(5).build().unwrap());
    let start = DVec3::new(0.03, 0.11, 0.07);
    let d = DVec3::new(0.91, 0.83, 0.77);
    let p = cloud.create_particle(start).unwrap();

    let report = cloud.advance(p, d).unwrap();

    assert_eq!(report.outcome, AdvanceOutcome::Continues);
    assert!(report.face_crossings() >= 12);
    assert!(approx_eq(cloud.position(p).unwrap(), start + d, EPS));
    assert!((report.distance - d.length()).abs() < EPS);
    assert!(cloud.particle(p).unwrap().coordinates().is_valid(1e-12));

    // 对应单元内的中心位置
    assert_eq!(cloud.cell(p).unwrap(), {
        let mesh = cloud.mesh().read();
        mesh.find_cell(start + d).unwrap()
    });
}

#[test]
fn test_sub_steps_compose() {
    let mut whole = cloud_on(BlockMesh::unit_cube(4).build().unwrap());
    let mut split = cloud_on(BlockMesh::unit_cube(4).build().unwrap());
    let start = DVec3::new(0.21, 0.34, 0.55);
    let d = DVec3::new(0.4, -0.15, 0.2);
    let a = whole.create_particle(start).unwrap();
    let b = split.create_particle(start).unwrap();

    whole.advance(a, d).unwrap();
    for _ in 0..4 {
        split.begin_step();
        split.advance(b, 0.25 * d).unwrap();
    }

    assert!(approx_eq(whole.position(a).unwrap(), split.position(b).unwrap(), EPS));
    assert_eq!(whole.cell(a).unwrap(), split.cell(b).unwrap());
}

// ============================================================
// 随机不变量
// ============================================================

#[test]
fn test_random_walks_on_perturbed_mesh() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mesh = perturbed_unit_cube(3, 0.15, &mut rng);
    let mut cloud = cloud_on(mesh);

    let handles: Vec<ParticleHandle> = (0..40)
        .map(|_| cloud.create_particle(random_interior_point(&mut rng)).unwrap())
        .collect();

    for _ in 0..5 {
        for &h in &handles {
            cloud.begin_step();
            let start = cloud.position(h).unwrap();
            let d = random_displacement(&mut rng, 0.6);
            let report = cloud.advance(h, d).unwrap();

            let particle = cloud.particle(h).unwrap();
            assert_eq!(report.outcome, AdvanceOutcome::Continues);
            assert!(particle.coordinates().is_valid(1e-10), "{:?}", particle.coordinates());
            assert_eq!(particle.step_fraction(), 1.0);

            let end = cloud.position(h).unwrap();
            assert!(end.min_element() > -EPS && end.max_element() < 1.0 + EPS, "{}", end);
            if !hit_boundary(&report.events) {
                assert!(approx_eq(end, start + d, EPS), "{} vs {}", end, start + d);
                assert!((report.distance - d.length()).abs() < EPS);
            }
        }
    }
    assert_eq!(cloud.len(), 40);
}

#[test]
fn test_random_walks_on_deforming_mesh() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut cloud = cloud_on(BlockMesh::unit_cube(3).build().unwrap());
    let starts: Vec<(ParticleHandle, DVec3)> = (0..40)
        .map(|_| {
            let x = random_interior_point(&mut rng);
            (cloud.create_particle(x).unwrap(), x)
        })
        .collect();

    {
        let mut mesh = cloud.mesh().write();
        let moved = mesh
            .points()
            .iter()
            .map(|&p| {
                if is_boundary_point(p) {
                    p
                } else {
                    p + random_displacement(&mut rng, 0.03)
                }
            })
            .collect();
        mesh.move_points(moved).unwrap();
        assert!(mesh.moving());
    }

    cloud.begin_step();
    for (h, start) in starts {
        let d = random_displacement(&mut rng, 0.3);
        let report = cloud.advance(h, d).unwrap();
        if report.outcome != AdvanceOutcome::Continues {
            continue;
        }
        let particle = cloud.particle(h).unwrap();
        assert!(particle.coordinates().is_valid(1e-10));
        assert_eq!(particle.step_fraction(), 1.0);
        if !hit_boundary(&report.events) {
            assert!(approx_eq(cloud.position(h).unwrap(), start + d, EPS));
        }
    }
}
