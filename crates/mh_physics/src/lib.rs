// crates/mh_physics/src/lib.rs

//! 粒子物理模型
//!
//! 追踪内核之外的物理协作者，通过窄接口使用粒子状态：
//! 输入位置、速度与单元编号（[`ParticleSample`]），输出力或边界值。
//!
//! - [`drag`]: 拖曳力模型族（Stokes、Schiller-Naumann）
//! - [`waves`]: 波浪模型族（Airy）与波浪叠加边界值
//! - [`sample`]: 粒子采样与载流相状态
//!
//! 每个模型族都有一个按名称构造的注册表，配置中的 `type` 键选择实现；
//! 未注册的名称是致命配置错误。

#![warn(clippy::all)]

pub mod drag;
pub mod sample;
pub mod waves;

pub use drag::{drag_model_registry, new_drag_model, DragModel, SchillerNaumann, Stokes};
pub use sample::{CarrierState, ParticleSample};
pub use waves::superposition::BoundaryValueProvider;
pub use waves::{new_wave_model, wave_model_registry, Airy, ScaleTable, WaveModel, WaveSuperposition};
