// crates/mh_lagrangian/src/record.rs

//! 粒子检查点记录
//!
//! 记录粒子在网格上的相对位置，足以在同一网格拓扑上精确恢复追踪：
//! 四面体标识、四个重心坐标、子步进度与来源对。速度与附加数据可选。

use crate::barycentric::Barycentric;
use crate::error::{TrackingError, TrackingResult};
use crate::particle::Particle;
use glam::DVec3;
use mh_mesh::{MeshHandle, PolyMesh, TetIndices};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 单个粒子的持久化状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub cell: usize,
    pub tet_face: usize,
    pub tet_point: usize,
    pub coordinates: [f64; 4],
    pub step_fraction: f64,
    pub origin_process: usize,
    pub origin_id: u64,
    #[serde(default)]
    pub velocity: [f64; 3],
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<f64>,
}

impl ParticleRecord {
    /// 从粒子生成记录
    pub fn from_particle(particle: &Particle) -> Self {
        let tet = particle.tet();
        Self {
            cell: tet.cell,
            tet_face: tet.face,
            tet_point: tet.tet_pt,
            coordinates: particle.coordinates().to_array(),
            step_fraction: particle.step_fraction(),
            origin_process: particle.origin_process(),
            origin_id: particle.origin_id(),
            velocity: particle.velocity.to_array(),
            payload: particle.payload.clone(),
        }
    }

    /// 检查记录与网格拓扑是否一致
    ///
    /// `index` 仅用于错误信息。
    pub fn validate(&self, mesh: &PolyMesh, index: usize, tol: f64) -> TrackingResult<()> {
        if self.cell >= mesh.n_cells() {
            return Err(TrackingError::invalid_record(
                index,
                format!("单元 {} 超出单元数 {}", self.cell, mesh.n_cells()),
            ));
        }
        if !mesh.cell_faces(self.cell).contains(&self.tet_face) {
            return Err(TrackingError::invalid_record(
                index,
                format!("面 {} 不属于单元 {}", self.tet_face, self.cell),
            ));
        }
        let face_size = mesh.face_points(self.tet_face).len();
        if self.tet_point >= face_size {
            return Err(TrackingError::invalid_record(
                index,
                format!("面内点 {} 超出面点数 {}", self.tet_point, face_size),
            ));
        }
        if !Barycentric::from_array(self.coordinates).is_valid(tol) {
            return Err(TrackingError::invalid_record(
                index,
                format!("重心坐标无效: {:?}", self.coordinates),
            ));
        }
        if !(0.0..=1.0).contains(&self.step_fraction) {
            return Err(TrackingError::invalid_record(
                index,
                format!("子步进度 {} 超出 [0, 1]", self.step_fraction),
            ));
        }
        Ok(())
    }

    /// 恢复为粒子
    pub fn into_particle(self, mesh: MeshHandle) -> Particle {
        let tet = TetIndices::new(self.cell, self.tet_face, self.tet_point);
        let mut particle = Particle::new(
            mesh,
            tet,
            Barycentric::from_array(self.coordinates),
            self.origin_process,
            self.origin_id,
        );
        particle.step_fraction = self.step_fraction;
        particle.velocity = DVec3::from_array(self.velocity);
        particle.payload = self.payload;
        particle
    }
}

/// 将记录保存为 JSON 文件
pub fn save_records<P: AsRef<Path>>(path: P, records: &[ParticleRecord]) -> TrackingResult<()> {
    let content = serde_json::to_string_pretty(records)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// 从 JSON 文件读取记录
pub fn load_records<P: AsRef<Path>>(path: P) -> TrackingResult<Vec<ParticleRecord>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
