// crates/mh_physics/src/waves/superposition.rs

//! 波浪叠加与波浪速度边界值
//!
//! 平均流沿 `direction` 以 `speed` 运动，若干波浪分量叠加在平均流上。
//! 每个分量在自己的传播方向上求值，再转回全局坐标系。
//! `scale` / `cross_scale` 沿平均流方向 / 横向对波浪扰动做分段线性缩放，
//! 常用于在出口附近消波。

use super::{new_wave_model, WaveModel};
use crate::sample::ParticleSample;
use glam::{DVec2, DVec3};
use mh_foundation::registry::{lookup_f64, lookup_vec3, Dictionary};
use mh_foundation::{MhError, MhResult};
use serde::{Deserialize, Serialize};

/// 边界值提供者：按粒子采样给出边界上的物理量
pub trait BoundaryValueProvider: Send + Sync {
    /// 在时刻 `t` 的边界值
    fn boundary_value(&self, t: f64, sample: &ParticleSample) -> DVec3;
}

// ============================================================
// 分段线性缩放表
// ============================================================

/// 分段线性缩放表，超出端点时取端点值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleTable {
    points: Vec<(f64, f64)>,
}

impl ScaleTable {
    /// 由 (坐标, 系数) 点构造，坐标必须严格递增
    pub fn new(points: Vec<(f64, f64)>) -> MhResult<Self> {
        if points.is_empty() {
            return Err(MhError::invalid_input("缩放表为空"));
        }
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(MhError::invalid_input("缩放表坐标必须严格递增"));
        }
        Ok(Self { points })
    }

    /// 常数缩放
    pub fn constant(value: f64) -> Self {
        Self {
            points: vec![(0.0, value)],
        }
    }

    /// 插值
    pub fn value(&self, x: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        let i = self.points.partition_point(|p| p.0 <= x);
        let (x0, y0) = self.points[i - 1];
        let (x1, y1) = self.points[i];
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }

    fn from_value(key: &str, value: &serde_json::Value) -> MhResult<Self> {
        if let Some(c) = value.as_f64() {
            return Ok(Self::constant(c));
        }
        let invalid = || MhError::invalid_config(key, value.to_string(), "期望数值或 [[x, s], ...] 表");
        let rows = value.as_array().ok_or_else(invalid)?;
        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let pair = row.as_array().filter(|p| p.len() == 2).ok_or_else(invalid)?;
            let x = pair[0].as_f64().ok_or_else(invalid)?;
            let s = pair[1].as_f64().ok_or_else(invalid)?;
            points.push((x, s));
        }
        Self::new(points).map_err(|_| invalid())
    }
}

// ============================================================
// 波浪叠加
// ============================================================

/// 平均流上的波浪叠加
#[derive(Debug)]
pub struct WaveSuperposition {
    origin: DVec3,
    /// 水平面内的平均流方向（单位向量）
    direction: DVec3,
    /// 水平面内与平均流垂直的方向
    cross: DVec3,
    speed: f64,
    waves: Vec<Box<dyn WaveModel>>,
    scale: Option<ScaleTable>,
    cross_scale: Option<ScaleTable>,
}

impl WaveSuperposition {
    /// 竖直向上（与重力相反）
    pub const UP: DVec3 = DVec3::Z;

    /// 创建叠加
    ///
    /// `direction` 投影到水平面后归一化；竖直方向返回错误。
    pub fn new(origin: DVec3, direction: DVec3, speed: f64, waves: Vec<Box<dyn WaveModel>>) -> MhResult<Self> {
        let horizontal = direction - direction.dot(Self::UP) * Self::UP;
        let direction = horizontal.try_normalize().ok_or_else(|| {
            MhError::invalid_config("direction", format!("{direction}"), "平均流方向不能为竖直方向")
        })?;
        Ok(Self {
            origin,
            direction,
            cross: Self::UP.cross(direction),
            speed,
            waves,
            scale: None,
            cross_scale: None,
        })
    }

    /// 沿平均流方向的缩放
    pub fn with_scale(mut self, scale: ScaleTable) -> Self {
        self.scale = Some(scale);
        self
    }

    /// 横向缩放
    pub fn with_cross_scale(mut self, scale: ScaleTable) -> Self {
        self.cross_scale = Some(scale);
        self
    }

    /// 从字典读取
    ///
    /// 键：`origin`、`direction`、`speed`、`waves`（模型字典列表）、
    /// 可选 `scale` 与 `crossScale`。
    pub fn from_dict(dict: &Dictionary) -> MhResult<Self> {
        let origin = DVec3::from_array(lookup_vec3(dict, "origin")?);
        let direction = DVec3::from_array(lookup_vec3(dict, "direction")?);
        let speed = lookup_f64(dict, "speed")?;

        let list = dict.get("waves").ok_or_else(|| MhError::missing_config("waves"))?;
        let items = list
            .as_array()
            .ok_or_else(|| MhError::invalid_config("waves", list.to_string(), "期望模型字典列表"))?;
        let mut waves = Vec::with_capacity(items.len());
        for item in items {
            let model = item
                .as_object()
                .ok_or_else(|| MhError::invalid_config("waves", item.to_string(), "期望模型字典"))?;
            waves.push(new_wave_model(model)?);
        }

        let mut superposition = Self::new(origin, direction, speed, waves)?;
        if let Some(v) = dict.get("scale") {
            superposition.scale = Some(ScaleTable::from_value("scale", v)?);
        }
        if let Some(v) = dict.get("crossScale") {
            superposition.cross_scale = Some(ScaleTable::from_value("crossScale", v)?);
        }
        Ok(superposition)
    }

    /// 平均流速度
    pub fn mean_velocity(&self) -> DVec3 {
        self.speed * self.direction
    }

    /// 波浪分量
    pub fn waves(&self) -> &[Box<dyn WaveModel>] {
        &self.waves
    }

    /// 全局位置到局部坐标 (沿流, 横向, 竖直)
    pub fn local(&self, position: DVec3) -> DVec3 {
        let r = position - self.origin;
        DVec3::new(r.dot(self.direction), r.dot(self.cross), r.dot(Self::UP))
    }

    fn scale_at(&self, local: DVec3) -> f64 {
        let along = self.scale.as_ref().map_or(1.0, |s| s.value(local.x));
        let across = self.cross_scale.as_ref().map_or(1.0, |s| s.value(local.y));
        along * across
    }

    /// 波面相对静水面的高度
    pub fn elevation(&self, t: f64, position: DVec3) -> f64 {
        let local = self.local(position);
        let sum: f64 = self
            .waves
            .iter()
            .map(|wave| {
                let (sin, cos) = wave.angle().sin_cos();
                wave.elevation(t, self.speed * cos, local.x * cos + local.y * sin)
            })
            .sum();
        self.scale_at(local) * sum
    }

    /// 平均流加波浪扰动速度
    pub fn velocity(&self, t: f64, position: DVec3) -> DVec3 {
        let local = self.local(position);
        let mut perturbation = DVec3::ZERO;
        for wave in &self.waves {
            let (sin, cos) = wave.angle().sin_cos();
            let xz = DVec2::new(local.x * cos + local.y * sin, local.z);
            let v = wave.velocity(t, self.speed * cos, xz);
            perturbation += v.x * (cos * self.direction + sin * self.cross) + v.y * Self::UP;
        }
        self.mean_velocity() + self.scale_at(local) * perturbation
    }
}

impl BoundaryValueProvider for WaveSuperposition {
    fn boundary_value(&self, t: f64, sample: &ParticleSample) -> DVec3 {
        self.velocity(t, sample.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waves::Airy;
    use serde_json::json;

    fn approx_eq(a: DVec3, b: DVec3, tol: f64) -> bool {
        (a - b).length() <= tol
    }

    fn dict(value: serde_json::Value) -> Dictionary {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_scale_table() {
        let table = ScaleTable::new(vec![(100.0, 1.0), (200.0, 0.0)]).unwrap();
        assert_eq!(table.value(50.0), 1.0);
        assert_eq!(table.value(150.0), 0.5);
        assert_eq!(table.value(250.0), 0.0);
        assert!(ScaleTable::new(vec![(1.0, 0.0), (1.0, 1.0)]).is_err());
        assert_eq!(ScaleTable::constant(0.3).value(-7.0), 0.3);
    }

    #[test]
    fn test_no_waves_is_mean_flow() {
        let s = WaveSuperposition::new(DVec3::ZERO, DVec3::new(2.0, 0.0, 1.0), 1.5, Vec::new()).unwrap();
        assert!(approx_eq(s.velocity(3.0, DVec3::new(5.0, 1.0, -2.0)), DVec3::new(1.5, 0.0, 0.0), 1e-15));
        assert_eq!(s.elevation(3.0, DVec3::ZERO), 0.0);
        assert!(WaveSuperposition::new(DVec3::ZERO, DVec3::Z, 1.0, Vec::new()).is_err());
    }

    #[test]
    fn test_single_wave_matches_model() {
        let wave = Airy::new(40.0, 0.5, 0.3);
        let origin = DVec3::new(0.0, 25.0, 0.0);
        let s = WaveSuperposition::new(origin, DVec3::X, 2.0, vec![Box::new(wave)]).unwrap();

        let p = DVec3::new(13.0, 27.0, -1.5);
        let v = wave.velocity(4.0, 2.0, DVec2::new(13.0, -1.5));
        assert!(approx_eq(s.velocity(4.0, p), DVec3::new(2.0 + v.x, 0.0, v.y), 1e-12));
        assert!((s.elevation(4.0, p) - wave.elevation(4.0, 2.0, 13.0)).abs() < 1e-12);
    }

    #[test]
    fn test_oblique_wave_direction() {
        let angle = std::f64::consts::FRAC_PI_2;
        let wave = Airy::new(20.0, 0.2, 0.0).with_angle(angle);
        let s = WaveSuperposition::new(DVec3::ZERO, DVec3::X, 0.0, vec![Box::new(wave)]).unwrap();
        // 垂直于平均流传播：扰动水平分量沿 y，沿 x 不变
        let a = s.velocity(0.0, DVec3::new(0.0, 3.0, -1.0));
        let b = s.velocity(0.0, DVec3::new(10.0, 3.0, -1.0));
        assert!(approx_eq(a, b, 1e-12));
        assert!(a.x.abs() < 1e-12);
    }

    #[test]
    fn test_scale_damps_waves() {
        let s = WaveSuperposition::new(DVec3::ZERO, DVec3::X, 1.0, vec![Box::new(Airy::new(40.0, 0.5, 0.0))])
            .unwrap()
            .with_scale(ScaleTable::new(vec![(100.0, 1.0), (200.0, 0.0)]).unwrap());
        let far = DVec3::new(250.0, 0.0, -1.0);
        assert!(approx_eq(s.velocity(1.0, far), s.mean_velocity(), 1e-15));
        assert_eq!(s.elevation(1.0, far), 0.0);
    }

    #[test]
    fn test_from_dict_and_boundary_value() {
        let s = WaveSuperposition::from_dict(&dict(json!({
            "origin": [0.0, 25.0, 0.0],
            "direction": [1.0, 0.0, 0.0],
            "speed": 2.0,
            "waves": [
                {"type": "Airy", "length": 40.0, "amplitude": 0.5, "phase": 0.0, "angle": 0.0},
                {"type": "Airy", "length": 20.0, "amplitude": 0.25, "phase": 1.5708, "angle": 0.0}
            ],
            "scale": [[100.0, 1.0], [200.0, 0.0]],
            "crossScale": 1.0
        })))
        .unwrap();
        assert_eq!(s.waves().len(), 2);

        let sample = ParticleSample::new(DVec3::new(10.0, 20.0, -0.5), DVec3::ZERO, 0);
        assert_eq!(s.boundary_value(0.5, &sample), s.velocity(0.5, sample.position));
    }

    #[test]
    fn test_unknown_wave_model_is_fatal() {
        let err = WaveSuperposition::from_dict(&dict(json!({
            "origin": [0.0, 0.0, 0.0],
            "direction": [1.0, 0.0, 0.0],
            "speed": 1.0,
            "waves": [{"type": "Stokes5"}]
        })))
        .err()
        .unwrap();
        match err {
            MhError::UnknownModel { name, valid, .. } => {
                assert_eq!(name, "Stokes5");
                assert_eq!(valid, vec!["Airy".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
