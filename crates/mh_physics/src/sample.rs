// crates/mh_physics/src/sample.rs

//! 物理模型的输入采样
//!
//! 物理模型只看到粒子的位置、速度与所在单元，不接触追踪状态。

use glam::DVec3;
use mh_lagrangian::Particle;
use mh_mesh::PolyMesh;
use serde::{Deserialize, Serialize};

/// 粒子采样：位置、速度、所在单元
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleSample {
    /// 物理位置 [m]
    pub position: DVec3,
    /// 粒子速度 [m/s]
    pub velocity: DVec3,
    /// 本地单元编号
    pub cell: usize,
}

impl ParticleSample {
    /// 创建采样
    pub fn new(position: DVec3, velocity: DVec3, cell: usize) -> Self {
        Self {
            position,
            velocity,
            cell,
        }
    }

    /// 在静止状态下对粒子采样
    pub fn of(particle: &Particle, mesh: &PolyMesh) -> Self {
        Self {
            position: particle.position(mesh),
            velocity: particle.velocity,
            cell: particle.cell(),
        }
    }
}

/// 粒子所在位置的载流相状态
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarrierState {
    /// 载流相速度 [m/s]
    pub velocity: DVec3,
    /// 密度 [kg/m³]
    pub density: f64,
    /// 动力黏度 [Pa·s]
    pub viscosity: f64,
}

impl CarrierState {
    /// 创建载流相状态
    pub fn new(velocity: DVec3, density: f64, viscosity: f64) -> Self {
        Self {
            velocity,
            density,
            viscosity,
        }
    }

    /// 运动黏度 ν = μ/ρ
    #[inline]
    pub fn kinematic_viscosity(&self) -> f64 {
        self.viscosity / self.density
    }
}

impl Default for CarrierState {
    /// 20°C 清水，静止
    fn default() -> Self {
        Self {
            velocity: DVec3::ZERO,
            density: 998.2,
            viscosity: 1.002e-3,
        }
    }
}
