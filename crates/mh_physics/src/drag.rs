// crates/mh_physics/src/drag.rs

//! 颗粒拖曳力模型
//!
//! 每个模型给出 Cd·Re 关系，拖曳力统一写成
//!
//! ```text
//! F = 3πμd · (Cd·Re / 24) · (u_f - u_p)
//! ```
//!
//! 低雷诺数极限下 Cd·Re → 24，回到 Stokes 阻力。
//!
//! 模型通过字典的 `type` 键选择，见 [`new_drag_model`]。

use crate::sample::{CarrierState, ParticleSample};
use glam::DVec3;
use mh_foundation::registry::{lookup_f64, lookup_str, Dictionary, ModelRegistry, TYPE_KEY};
use mh_foundation::{MhError, MhResult};
use std::f64::consts::PI;
use std::fmt;

/// 拖曳力模型族名称
pub const DRAG_FAMILY: &str = "dragModel";

/// Schiller-Naumann 关系切换到常数阻力系数的雷诺数
const SCHILLER_NAUMANN_RE_LIMIT: f64 = 1000.0;

/// 拖曳力模型接口
pub trait DragModel: Send + Sync + fmt::Debug {
    /// 注册名
    fn type_name(&self) -> &'static str;

    /// 颗粒直径 [m]
    fn diameter(&self) -> f64;

    /// Cd·Re
    fn cd_re(&self, re: f64) -> f64;

    /// 相对雷诺数 Re = ρ|u_f - u_p|d/μ
    fn reynolds(&self, sample: &ParticleSample, carrier: &CarrierState) -> f64 {
        let slip = (carrier.velocity - sample.velocity).length();
        carrier.density * slip * self.diameter() / carrier.viscosity
    }

    /// 阻力系数 Cd，Re = 0 时返回无穷大
    fn drag_coefficient(&self, re: f64) -> f64 {
        if re > 0.0 {
            self.cd_re(re) / re
        } else {
            f64::INFINITY
        }
    }

    /// 作用在颗粒上的拖曳力 [N]
    fn force(&self, sample: &ParticleSample, carrier: &CarrierState) -> DVec3 {
        let re = self.reynolds(sample, carrier);
        let slip = carrier.velocity - sample.velocity;
        3.0 * PI * carrier.viscosity * self.diameter() * self.cd_re(re) / 24.0 * slip
    }
}

// ============================================================
// 模型
// ============================================================

/// Stokes 阻力：Cd·Re = 24
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stokes {
    pub diameter: f64,
}

impl Stokes {
    pub fn new(diameter: f64) -> Self {
        Self { diameter }
    }

    fn from_dict(dict: &Dictionary) -> MhResult<Self> {
        Ok(Self::new(read_diameter(dict)?))
    }
}

impl DragModel for Stokes {
    fn type_name(&self) -> &'static str {
        "Stokes"
    }

    fn diameter(&self) -> f64 {
        self.diameter
    }

    fn cd_re(&self, _re: f64) -> f64 {
        24.0
    }
}

/// Schiller-Naumann 关系
///
/// Re < 1000 时 Cd = 24/Re·(1 + 0.15Re^0.687)，否则 Cd = 0.44。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchillerNaumann {
    pub diameter: f64,
}

impl SchillerNaumann {
    pub fn new(diameter: f64) -> Self {
        Self { diameter }
    }

    fn from_dict(dict: &Dictionary) -> MhResult<Self> {
        Ok(Self::new(read_diameter(dict)?))
    }
}

impl DragModel for SchillerNaumann {
    fn type_name(&self) -> &'static str {
        "SchillerNaumann"
    }

    fn diameter(&self) -> f64 {
        self.diameter
    }

    fn cd_re(&self, re: f64) -> f64 {
        if re < SCHILLER_NAUMANN_RE_LIMIT {
            24.0 * (1.0 + 0.15 * re.powf(0.687))
        } else {
            0.44 * re
        }
    }
}

fn read_diameter(dict: &Dictionary) -> MhResult<f64> {
    let d = lookup_f64(dict, "diameter")?;
    if !(d > 0.0 && d.is_finite()) {
        return Err(MhError::invalid_config("diameter", d.to_string(), "颗粒直径必须为正"));
    }
    Ok(d)
}

fn new_stokes(dict: &Dictionary) -> MhResult<Box<dyn DragModel>> {
    Ok(Box::new(Stokes::from_dict(dict)?))
}

fn new_schiller_naumann(dict: &Dictionary) -> MhResult<Box<dyn DragModel>> {
    Ok(Box::new(SchillerNaumann::from_dict(dict)?))
}

// ============================================================
// 按名称构造
// ============================================================

/// 已注册的拖曳力模型
pub fn drag_model_registry() -> ModelRegistry<dyn DragModel> {
    let mut registry: ModelRegistry<dyn DragModel> = ModelRegistry::new(DRAG_FAMILY);
    registry
        .register("Stokes", new_stokes)
        .register("SchillerNaumann", new_schiller_naumann);
    registry
}

/// 为指定相选择拖曳力模型
///
/// 未注册的 `type` 返回 [`MhError::UnknownModel`]，列出全部有效名称。
pub fn new_drag_model(dict: &Dictionary, phase: &str) -> MhResult<Box<dyn DragModel>> {
    let name = lookup_str(dict, TYPE_KEY)?;
    log::info!("Selecting {} for phase {}: {}", DRAG_FAMILY, phase, name);
    drag_model_registry().construct(name, dict)
}
