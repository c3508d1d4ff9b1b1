// crates/mh_lagrangian/src/barycentric.rs

//! 重心坐标与四面体坐标变换
//!
//! 四面体 `(v0, v1, v2, v3)` 上的重心坐标 `y` 与物理坐标 `x` 满足
//!
//! ```text
//! [x; 1] = M · y,   M = [v0 v1 v2 v3; 1 1 1 1]
//! ```
//!
//! - 静态网格：`M` 由当前时刻顶点构造
//! - 运动网格：`M(f) = M_old·(1-f) + M_new·f`，`f` 为子步进度；
//!   `f = 0` 与 `f = 1` 时分别精确等于旧/新时刻变换
//!
//! # 示例
//!
//! ```
//! use glam::DVec3;
//! use mh_lagrangian::barycentric::{Barycentric, BarycentricTransform};
//!
//! let t = BarycentricTransform::from_vertices([
//!     DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z,
//! ]);
//! let y = Barycentric::new(0.25, 0.25, 0.25, 0.25);
//! let x = t.to_physical(y);
//! assert!((x - DVec3::splat(0.25)).length() < 1e-15);
//!
//! let back = t.to_barycentric(x, 1e-12).unwrap();
//! assert!(back.max_difference(y) < 1e-14);
//! ```

use glam::{DMat4, DVec3, DVec4};
use mh_mesh::{PolyMesh, TetIndices, TimeLevel};
use serde::{Deserialize, Serialize};
use std::ops::Index;

// ============================================================================
// 重心坐标
// ============================================================================

/// 四面体重心坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Barycentric(DVec4);

impl Barycentric {
    /// 位于第 0 个顶点（单元中心）
    pub const CELL_CENTRE: Self = Self(DVec4::new(1.0, 0.0, 0.0, 0.0));

    /// 创建重心坐标
    #[inline]
    pub const fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Self(DVec4::new(a, b, c, d))
    }

    /// 从数组创建
    #[inline]
    pub fn from_array(values: [f64; 4]) -> Self {
        Self(DVec4::from_array(values))
    }

    /// 转为数组
    #[inline]
    pub fn to_array(self) -> [f64; 4] {
        self.0.to_array()
    }

    /// 底层向量
    #[inline]
    pub fn as_dvec4(self) -> DVec4 {
        self.0
    }

    /// 分量和
    #[inline]
    pub fn sum(self) -> f64 {
        self.0.x + self.0.y + self.0.z + self.0.w
    }

    /// 最小分量
    #[inline]
    pub fn min_element(self) -> f64 {
        self.0.min_element()
    }

    /// 与另一组坐标的最大分量差
    #[inline]
    pub fn max_difference(self, other: Self) -> f64 {
        (self.0 - other.0).abs().max_element()
    }

    /// 是否为有效重心坐标：全部非负且和为 1（容差内）
    pub fn is_valid(self, tol: f64) -> bool {
        self.0.is_finite() && self.min_element() >= -tol && (self.sum() - 1.0).abs() <= tol
    }

    /// 负分量截断为 0 后重新归一化
    pub fn snapped(self) -> Self {
        let clamped = self.0.max(DVec4::ZERO);
        let sum = clamped.x + clamped.y + clamped.z + clamped.w;
        if sum > 0.0 && sum.is_finite() {
            Self(clamped / sum)
        } else {
            self
        }
    }

    /// 将第 `i` 个分量精确置零后截断归一化
    pub fn snapped_onto(self, i: usize) -> Self {
        let mut values = self.to_array();
        values[i] = 0.0;
        Self::from_array(values).snapped()
    }

    /// 按重心坐标增量平移
    #[inline]
    pub fn offset(self, delta: DVec4, lambda: f64) -> Self {
        Self(self.0 + lambda * delta)
    }
}

impl Index<usize> for Barycentric {
    type Output = f64;

    #[inline]
    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl From<DVec4> for Barycentric {
    fn from(v: DVec4) -> Self {
        Self(v)
    }
}

// ============================================================================
// 坐标变换
// ============================================================================

/// 重心坐标到物理坐标的齐次变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarycentricTransform {
    matrix: DMat4,
}

impl BarycentricTransform {
    /// 由四个顶点构造
    pub fn from_vertices(v: [DVec3; 4]) -> Self {
        Self {
            matrix: DMat4::from_cols(
                v[0].extend(1.0),
                v[1].extend(1.0),
                v[2].extend(1.0),
                v[3].extend(1.0),
            ),
        }
    }

    /// 直接由矩阵构造
    #[inline]
    pub fn from_matrix(matrix: DMat4) -> Self {
        Self { matrix }
    }

    /// 齐次矩阵
    #[inline]
    pub fn matrix(&self) -> DMat4 {
        self.matrix
    }

    /// 顶点 k 的物理坐标
    #[inline]
    pub fn vertex(&self, k: usize) -> DVec3 {
        self.matrix.col(k).truncate()
    }

    /// 重心坐标 → 物理坐标
    #[inline]
    pub fn to_physical(&self, y: Barycentric) -> DVec3 {
        (self.matrix * y.as_dvec4()).truncate()
    }

    /// 6 倍有向体积
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.matrix.determinant()
    }

    /// 四面体是否退化
    ///
    /// 以最长边长 L 为尺度，`|det| <= tol·L³` 视为退化。
    pub fn is_degenerate(&self, tol: f64) -> bool {
        let v0 = self.vertex(0);
        let scale = (1..4)
            .map(|k| (self.vertex(k) - v0).length())
            .fold(0.0, f64::max);
        let det = self.determinant();
        !det.is_finite() || det.abs() <= tol * scale * scale * scale
    }

    /// 逆变换（退化时返回 `None`）
    pub fn inverse(&self, tol: f64) -> Option<InverseTransform> {
        if self.is_degenerate(tol) {
            return None;
        }
        Some(InverseTransform {
            matrix: self.matrix.inverse(),
        })
    }

    /// 物理坐标 → 重心坐标（仅用于粒子创建时定位）
    pub fn to_barycentric(&self, x: DVec3, tol: f64) -> Option<Barycentric> {
        self.inverse(tol).map(|inv| inv.point(x))
    }
}

/// 物理坐标到重心坐标的逆变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseTransform {
    matrix: DMat4,
}

impl InverseTransform {
    /// 点的重心坐标
    #[inline]
    pub fn point(&self, x: DVec3) -> Barycentric {
        Barycentric(self.matrix * x.extend(1.0))
    }

    /// 位移在重心坐标下的增量（分量和为 0）
    #[inline]
    pub fn displacement(&self, d: DVec3) -> DVec4 {
        self.matrix * d.extend(0.0)
    }
}

/// 运动网格上的插值变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingTransform {
    old: BarycentricTransform,
    new: BarycentricTransform,
}

impl MovingTransform {
    /// 由旧/新时刻变换构造
    pub fn new(old: BarycentricTransform, new: BarycentricTransform) -> Self {
        Self { old, new }
    }

    /// 旧时刻变换
    #[inline]
    pub fn old(&self) -> &BarycentricTransform {
        &self.old
    }

    /// 新时刻变换
    #[inline]
    pub fn new_level(&self) -> &BarycentricTransform {
        &self.new
    }

    /// 子步进度 `fraction` 处的变换
    pub fn at(&self, fraction: f64) -> BarycentricTransform {
        if fraction <= 0.0 {
            self.old
        } else if fraction >= 1.0 {
            self.new
        } else {
            BarycentricTransform::from_matrix(
                self.old.matrix * (1.0 - fraction) + self.new.matrix * fraction,
            )
        }
    }
}

// ============================================================================
// 由网格构造
// ============================================================================

/// 当前时刻的静态变换
pub fn static_transform(mesh: &PolyMesh, tet: TetIndices) -> BarycentricTransform {
    BarycentricTransform::from_vertices(mesh.tet_vertices(tet, TimeLevel::Current))
}

/// 旧/新时刻插值变换
pub fn moving_transform(mesh: &PolyMesh, tet: TetIndices) -> MovingTransform {
    MovingTransform::new(
        BarycentricTransform::from_vertices(mesh.tet_vertices(tet, TimeLevel::Old)),
        static_transform(mesh, tet),
    )
}

/// 子步进度处的变换：静态网格忽略进度
pub fn transform_at(mesh: &PolyMesh, tet: TetIndices, fraction: f64) -> BarycentricTransform {
    if mesh.moving() {
        moving_transform(mesh, tet).at(fraction)
    } else {
        static_transform(mesh, tet)
    }
}

// ============================================================================
// 测试
// ============================================================================
