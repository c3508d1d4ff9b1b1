// crates/mh_physics/src/waves/airy.rs

//! 一阶（Airy）波浪
//!
//! Stokes (1847) 展开的首项：
//!
//! ```text
//! θ = φ + k(x - (u + c)t)
//! η = a cos θ
//! u_w = aω ch(z) cos θ,   w_w = aω sh(z) sin θ
//! ```
//!
//! 其中 k = 2π/L，c² = g/k·tanh(kd)，ω = kc。有限水深时
//! ch = cosh(k(z+d))/sinh(kd)、sh = sinh(k(z+d))/sinh(kd)，深水极限下二者均为 e^{kz}。

use super::{WaveModel, G};
use glam::DVec2;
use mh_foundation::registry::{lookup_f64, lookup_f64_or, Dictionary};
use mh_foundation::{MhError, MhResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Airy 波浪参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Airy {
    /// 波长 L [m]
    pub length: f64,
    /// 振幅 a [m]
    pub amplitude: f64,
    /// 初相位 φ [弧度]
    pub phase: f64,
    /// 相对平均流的传播角 [弧度]
    #[serde(default)]
    pub angle: f64,
    /// 水深 d [m]，缺省为深水
    #[serde(default)]
    pub depth: Option<f64>,
}

impl Airy {
    /// 深水波浪
    pub fn new(length: f64, amplitude: f64, phase: f64) -> Self {
        Self {
            length,
            amplitude,
            phase,
            angle: 0.0,
            depth: None,
        }
    }

    /// 设置传播角
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    /// 设置有限水深
    pub fn with_depth(mut self, depth: f64) -> Self {
        self.depth = Some(depth);
        self
    }

    /// 从模型字典读取
    pub fn from_dict(dict: &Dictionary) -> MhResult<Self> {
        let length = lookup_f64(dict, "length")?;
        if !(length > 0.0 && length.is_finite()) {
            return Err(MhError::invalid_config("length", length.to_string(), "波长必须为正"));
        }
        let depth = match dict.get("depth") {
            Some(_) => {
                let d = lookup_f64(dict, "depth")?;
                if !(d > 0.0) {
                    return Err(MhError::invalid_config("depth", d.to_string(), "水深必须为正"));
                }
                Some(d)
            }
            None => None,
        };
        Ok(Self {
            length,
            amplitude: lookup_f64(dict, "amplitude")?,
            phase: lookup_f64(dict, "phase")?,
            angle: lookup_f64_or(dict, "angle", 0.0)?,
            depth,
        })
    }

    /// 波数 k = 2π/L
    #[inline]
    pub fn wavenumber(&self) -> f64 {
        2.0 * PI / self.length
    }

    /// 相速度 c
    pub fn celerity(&self) -> f64 {
        let k = self.wavenumber();
        let deep = G / k;
        match self.depth {
            Some(d) => (deep * (k * d).tanh()).sqrt(),
            None => deep.sqrt(),
        }
    }

    /// 固有角频率 ω = kc
    pub fn angular_frequency(&self) -> f64 {
        self.wavenumber() * self.celerity()
    }

    /// 随平均流输运的相位角
    pub fn phase_angle(&self, t: f64, u: f64, x: f64) -> f64 {
        self.phase + self.wavenumber() * (x - (u + self.celerity()) * t)
    }

    /// 水平与竖直速度的深度衰减因子
    fn decay(&self, z: f64) -> (f64, f64) {
        let k = self.wavenumber();
        match self.depth {
            Some(d) => {
                let below = (-k * (z + 2.0 * d)).exp();
                let denom = 1.0 - (-2.0 * k * d).exp();
                let above = (k * z).exp();
                ((above + below) / denom, (above - below) / denom)
            }
            None => {
                let e = (k * z).exp();
                (e, e)
            }
        }
    }
}

impl WaveModel for Airy {
    fn type_name(&self) -> &'static str {
        "Airy"
    }

    fn angle(&self) -> f64 {
        self.angle
    }

    fn elevation(&self, t: f64, u: f64, x: f64) -> f64 {
        self.amplitude * self.phase_angle(t, u, x).cos()
    }

    fn velocity(&self, t: f64, u: f64, xz: DVec2) -> DVec2 {
        let theta = self.phase_angle(t, u, xz.x);
        let (ch, sh) = self.decay(xz.y);
        let aw = self.amplitude * self.angular_frequency();
        DVec2::new(aw * ch * theta.cos(), aw * sh * theta.sin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_deep_water_dispersion() {
        let wave = Airy::new(40.0, 0.5, 0.0);
        let k = 2.0 * PI / 40.0;
        assert!(approx_eq(wave.celerity(), (G / k).sqrt(), 1e-12));
        // 深水周期 T = sqrt(2πL/g)
        let period = 2.0 * PI / wave.angular_frequency();
        assert!(approx_eq(period, (2.0 * PI * 40.0 / G).sqrt(), 1e-12));
    }

    #[test]
    fn test_shallow_depth_slows_wave() {
        let deep = Airy::new(40.0, 0.5, 0.0);
        let shallow = deep.with_depth(2.0);
        assert!(shallow.celerity() < deep.celerity());
        // 浅水极限 c ≈ sqrt(gd)
        let very_shallow = Airy::new(400.0, 0.1, 0.0).with_depth(1.0);
        assert!((very_shallow.celerity() - G.sqrt()).abs() / G.sqrt() < 1e-3);
        // 很深的有限水深与深水一致
        let deep_finite = deep.with_depth(1e4);
        assert!(approx_eq(deep_finite.celerity(), deep.celerity(), 1e-9));
        let xz = DVec2::new(3.0, -2.0);
        assert!((deep_finite.velocity(1.0, 0.0, xz) - deep.velocity(1.0, 0.0, xz)).length() < 1e-9);
    }

    #[test]
    fn test_surface_kinematics() {
        let wave = Airy::new(20.0, 0.25, 1.5708).with_depth(5.0);
        let (t, u, x) = (2.3, 0.4, 7.0);
        let eta = wave.elevation(t, u, x);
        assert!(eta.abs() <= 0.25);

        // 表面竖直速度等于随平均流运动的观察者看到的 ∂η/∂t + u ∂η/∂x
        let h = 1e-6;
        let deta_dt = (wave.elevation(t + h, u, x) - wave.elevation(t - h, u, x)) / (2.0 * h);
        let deta_dx = (wave.elevation(t, u, x + h) - wave.elevation(t, u, x - h)) / (2.0 * h);
        let w = wave.velocity(t, u, DVec2::new(x, 0.0)).y;
        assert!(approx_eq(w, deta_dt + u * deta_dx, 1e-6));
    }

    #[test]
    fn test_bottom_has_no_vertical_velocity() {
        let wave = Airy::new(30.0, 0.3, 0.0).with_depth(4.0);
        for i in 0..10 {
            let v = wave.velocity(0.1 * i as f64, 0.0, DVec2::new(i as f64, -4.0));
            assert!(v.y.abs() < 1e-12);
        }
    }

    #[test]
    fn test_velocity_decays_with_depth() {
        let wave = Airy::new(10.0, 0.2, 0.0);
        let top = wave.velocity(0.0, 0.0, DVec2::new(0.0, 0.0)).length();
        let below = wave.velocity(0.0, 0.0, DVec2::new(0.0, -5.0)).length();
        assert!(approx_eq(below / top, (-PI).exp(), 1e-12));
    }

    #[test]
    fn test_from_dict() {
        let dict = json!({"type": "Airy", "length": 40.0, "amplitude": 0.5, "phase": 0.0})
            .as_object()
            .cloned()
            .unwrap();
        let wave = Airy::from_dict(&dict).unwrap();
        assert_eq!(wave, Airy::new(40.0, 0.5, 0.0));

        let bad = json!({"length": -1.0, "amplitude": 0.5, "phase": 0.0})
            .as_object()
            .cloned()
            .unwrap();
        assert!(matches!(Airy::from_dict(&bad), Err(MhError::InvalidConfig { .. })));
        let missing = json!({"length": 1.0}).as_object().cloned().unwrap();
        assert!(matches!(Airy::from_dict(&missing), Err(MhError::MissingConfig { .. })));
    }
}
