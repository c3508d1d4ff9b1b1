// crates/mh_physics/src/waves/mod.rs

//! 波浪运动学
//!
//! - [`WaveModel`]: 单个波浪分量，在局部坐标系下给出波面高度与速度
//! - [`airy`]: 一阶（线性）波浪
//! - [`superposition`]: 多个分量叠加，作为波浪速度边界值
//!
//! 局部坐标系：x 沿波浪传播方向，z 与重力方向相反，原点位于静水面。

pub mod airy;
pub mod superposition;

pub use airy::Airy;
pub use superposition::{ScaleTable, WaveSuperposition};

use glam::DVec2;
use mh_foundation::registry::{lookup_str, Dictionary, ModelRegistry, TYPE_KEY};
use mh_foundation::MhResult;
use std::fmt;

/// 波浪模型族名称
pub const WAVE_FAMILY: &str = "waveModel";

/// 重力加速度
pub(crate) const G: f64 = 9.81;

/// 波浪分量接口
pub trait WaveModel: Send + Sync + fmt::Debug {
    /// 注册名
    fn type_name(&self) -> &'static str;

    /// 相对平均流的水平传播角 [弧度]
    fn angle(&self) -> f64;

    /// 给定时刻、平均流速与局部 x 处的波面高度
    fn elevation(&self, t: f64, u: f64, x: f64) -> f64;

    /// 给定时刻、平均流速与局部 (x, z) 处的波浪速度 (水平, 竖直)
    fn velocity(&self, t: f64, u: f64, xz: DVec2) -> DVec2;
}

fn new_airy(dict: &Dictionary) -> MhResult<Box<dyn WaveModel>> {
    Ok(Box::new(Airy::from_dict(dict)?))
}

/// 已注册的波浪模型
pub fn wave_model_registry() -> ModelRegistry<dyn WaveModel> {
    let mut registry: ModelRegistry<dyn WaveModel> = ModelRegistry::new(WAVE_FAMILY);
    registry.register("Airy", new_airy);
    registry
}

/// 按字典的 `type` 键构造波浪模型
pub fn new_wave_model(dict: &Dictionary) -> MhResult<Box<dyn WaveModel>> {
    let name = lookup_str(dict, TYPE_KEY)?;
    log::info!("Selecting {}: {}", WAVE_FAMILY, name);
    wave_model_registry().construct(name, dict)
}
