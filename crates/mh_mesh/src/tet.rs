// crates/mh_mesh/src/tet.rs

//! 单元的四面体分解
//!
//! 每个单元按 (面, 面内相邻点对) 隐式分解为四面体：
//! 顶点依次为单元中心、面中心、两个相邻面点。分解不修改网格，按需推导。
//!
//! # 顶点与面片约定
//!
//! - owner 侧四面体为 `(cc, fc, p_i, p_{i+1})`，neighbour 侧交换后两个点，
//!   保证两侧体积均为正
//! - 顶点 k 所对的面片记为面片 k：
//!   - 面片 0: 网格面上的三角形
//!   - 面片 1: 与同单元另一面在边 `(p_i, p_{i+1})` 上共享
//!   - 面片 2/3: 与同一面上相邻四面体共享
//! - 内部面两侧使用同一面中心，因此两侧四面体的面片 0 完全重合

use crate::error::{MeshError, MeshResult};
use crate::poly::{PolyMesh, TimeLevel};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// 四面体标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TetIndices {
    /// 所在单元
    pub cell: usize,
    /// 所在网格面
    pub face: usize,
    /// 面点环中的起始点位置
    pub tet_pt: usize,
}

impl TetIndices {
    /// 创建四面体标识
    #[inline]
    pub const fn new(cell: usize, face: usize, tet_pt: usize) -> Self {
        Self { cell, face, tet_pt }
    }
}

/// 四面体顶点身份，用于跨四面体时按顶点重排重心坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TetVertexId {
    /// 单元中心
    CellCentre(usize),
    /// 面中心
    FaceCentre(usize),
    /// 网格点
    Point(usize),
}

/// 四面体有向体积
#[inline]
pub fn tet_volume(v: &[DVec3; 4]) -> f64 {
    (v[1] - v[0]).dot((v[2] - v[0]).cross(v[3] - v[0])) / 6.0
}

impl PolyMesh {
    /// 四面体顶点身份
    pub fn tet_vertex_ids(&self, tet: TetIndices) -> [TetVertexId; 4] {
        let face = self.face_points(tet.face);
        let a = face[tet.tet_pt];
        let b = face[(tet.tet_pt + 1) % face.len()];
        let (p2, p3) = if self.face_owner(tet.face) == tet.cell {
            (a, b)
        } else {
            (b, a)
        };
        [
            TetVertexId::CellCentre(tet.cell),
            TetVertexId::FaceCentre(tet.face),
            TetVertexId::Point(p2),
            TetVertexId::Point(p3),
        ]
    }

    /// 顶点身份对应的坐标
    #[inline]
    pub fn tet_vertex_position(&self, id: TetVertexId, level: TimeLevel) -> DVec3 {
        match id {
            TetVertexId::CellCentre(c) => self.cell_centre(c, level),
            TetVertexId::FaceCentre(f) => self.face_centre(f, level),
            TetVertexId::Point(p) => self.point(p, level),
        }
    }

    /// 四面体顶点坐标
    pub fn tet_vertices(&self, tet: TetIndices, level: TimeLevel) -> [DVec3; 4] {
        self.tet_vertex_ids(tet)
            .map(|id| self.tet_vertex_position(id, level))
    }

    /// 四面体在网格面上的三角形 `(fc, p, p')`
    pub fn tet_face_triangle(&self, tet: TetIndices, level: TimeLevel) -> [DVec3; 3] {
        let v = self.tet_vertices(tet, level);
        [v[1], v[2], v[3]]
    }

    /// 网格面三角形的单位法向，指向四面体所在单元外侧
    pub fn tet_face_normal(&self, tet: TetIndices, level: TimeLevel) -> DVec3 {
        let [fc, p, q] = self.tet_face_triangle(tet, level);
        // owner 与 neighbour 的点序已保证法向朝外
        (p - fc).cross(q - fc).normalize_or_zero()
    }

    /// 遍历单元的全部四面体
    pub fn cell_tets(&self, cell: usize) -> impl Iterator<Item = TetIndices> + '_ {
        self.cell_faces(cell).iter().flat_map(move |&face| {
            (0..self.face_points(face).len()).map(move |tet_pt| TetIndices::new(cell, face, tet_pt))
        })
    }

    /// 穿过面片后所在的四面体
    ///
    /// 面片 0 在边界面上返回 `None`；其余面片总在同一单元或相邻单元内。
    pub fn tet_across_facet(&self, tet: TetIndices, facet: usize) -> MeshResult<Option<TetIndices>> {
        match facet {
            0 => Ok(self
                .other_cell(tet.face, tet.cell)
                .map(|cell| TetIndices::new(cell, tet.face, tet.tet_pt))),
            1 => self.tet_across_edge(tet).map(Some),
            2 | 3 => {
                let n = self.face_points(tet.face).len();
                let remaining = self.tet_vertex_ids(tet)[5 - facet];
                let next = TetVertexId::Point(self.face_points(tet.face)[(tet.tet_pt + 1) % n]);
                let tet_pt = if remaining == next {
                    (tet.tet_pt + 1) % n
                } else {
                    (tet.tet_pt + n - 1) % n
                };
                Ok(Some(TetIndices::new(tet.cell, tet.face, tet_pt)))
            }
            _ => Err(MeshError::invalid_topology(
                "tet_across_facet",
                format!("面片编号 {} 超出 0..4", facet),
            )),
        }
    }

    /// 与同单元另一面共享边 `(p_i, p_{i+1})` 的四面体
    fn tet_across_edge(&self, tet: TetIndices) -> MeshResult<TetIndices> {
        let face = self.face_points(tet.face);
        let a = face[tet.tet_pt];
        let b = face[(tet.tet_pt + 1) % face.len()];

        for &other in self.cell_faces(tet.cell) {
            if other == tet.face {
                continue;
            }
            let pts = self.face_points(other);
            let n = pts.len();
            for j in 0..n {
                let (u, v) = (pts[j], pts[(j + 1) % n]);
                if (u == a && v == b) || (u == b && v == a) {
                    return Ok(TetIndices::new(tet.cell, other, j));
                }
            }
        }
        Err(MeshError::invalid_topology(
            "tet_across_edge",
            format!("单元 {} 中找不到与面 {} 共享边 ({}, {}) 的面", tet.cell, tet.face, a, b),
        ))
    }
}

// ============================================================================
// 测试
// ============================================================================
