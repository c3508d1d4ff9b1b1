//! crates/mh_physics/tests/wave_kinematics.rs
//!
//! 波浪叠加的运动学性质（随机采样）
//!
//! - 线性波速度场无散
//! - 静水面处竖直速度与波面运动一致

use glam::DVec3;
use mh_physics::{new_wave_model, Airy, BoundaryValueProvider, ParticleSample, WaveSuperposition};
use rand::prelude::*;

fn superposition() -> WaveSuperposition {
    WaveSuperposition::new(
        DVec3::new(0.0, 25.0, 0.0),
        DVec3::new(1.0, 1.0, 0.0),
        0.8,
        vec![
            Box::new(Airy::new(40.0, 0.5, 0.0).with_depth(12.0)),
            Box::new(Airy::new(20.0, 0.25, 1.5708).with_angle(0.4).with_depth(12.0)),
            Box::new(Airy::new(9.0, 0.1, -0.7).with_angle(-1.1)),
        ],
    )
    .unwrap()
}

fn divergence(s: &WaveSuperposition, t: f64, p: DVec3) -> f64 {
    let h = 1e-4;
    let mut div = 0.0;
    for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
        let plus = s.velocity(t, p + h * axis).dot(axis);
        let minus = s.velocity(t, p - h * axis).dot(axis);
        div += (plus - minus) / (2.0 * h);
    }
    div
}

#[test]
fn test_velocity_field_is_divergence_free() {
    let s = superposition();
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let p = DVec3::new(
            rng.gen_range(-50.0..50.0),
            rng.gen_range(-20.0..60.0),
            rng.gen_range(-10.0..-0.5),
        );
        let t = rng.gen_range(0.0..30.0);
        assert!(divergence(&s, t, p).abs() < 1e-6, "{} at t = {}", p, t);
    }
}

#[test]
fn test_surface_vertical_velocity_follows_elevation() {
    let s = superposition();
    let mean = s.mean_velocity();
    let mut rng = StdRng::seed_from_u64(11);
    let h = 1e-5;
    for _ in 0..100 {
        let p = DVec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(-20.0..60.0), 0.0);
        let t = rng.gen_range(0.0..30.0);
        // 随平均流运动的观察者看到的 dη/dt
        let rate = (s.elevation(t + h, p + h * mean) - s.elevation(t - h, p - h * mean)) / (2.0 * h);
        let w = s.velocity(t, p).z;
        assert!((w - rate).abs() < 1e-6, "{} vs {}", w, rate);
    }
}

#[test]
fn test_boundary_value_and_registry_construction() {
    let dict = serde_json::json!({"type": "Airy", "length": 40.0, "amplitude": 0.5, "phase": 0.0, "depth": 12.0});
    let model = new_wave_model(dict.as_object().unwrap()).unwrap();
    assert_eq!(model.type_name(), "Airy");

    let s = WaveSuperposition::new(DVec3::ZERO, DVec3::X, 1.0, vec![model]).unwrap();
    let sample = ParticleSample::new(DVec3::new(3.0, 0.0, -1.0), DVec3::ZERO, 0);
    let value = s.boundary_value(2.0, &sample);
    assert_eq!(value, s.velocity(2.0, sample.position));
    assert!(value.x > 0.0);
}
