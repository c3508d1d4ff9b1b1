// crates/mh_mesh/src/poly.rs

//! 多面体网格
//!
//! 只读的面寻址 (face-addressed) 多面体网格，粒子追踪内核的几何与拓扑来源。
//!
//! # 数据约定
//!
//! - 每个面是有序的点环，法向（右手定则）由 owner 指向 neighbour
//! - 内部面在前，边界面按 patch 分组连续存放在后
//! - 面中心为三角扇面积加权形心，单元中心为棱锥体积加权形心；
//!   每个面只有一个面中心，两侧单元共享
//! - 运动网格同时保存旧时刻与当前时刻的点坐标及几何量
//!
//! # 示例
//!
//! ```
//! use mh_mesh::generation::BlockMesh;
//! use mh_mesh::poly::TimeLevel;
//!
//! let mesh = BlockMesh::unit_cube(1).build().unwrap();
//! assert_eq!(mesh.n_cells(), 1);
//! assert_eq!(mesh.n_faces(), 6);
//! assert!((mesh.cell_volume(0, TimeLevel::Current) - 1.0).abs() < 1e-12);
//! ```

use crate::error::{MeshError, MeshResult};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// 极小量，用于判断面积/体积退化
const VSMALL: f64 = 1.0e-300;

// ============================================================================
// 边界定义
// ============================================================================

/// 边界类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PatchKind {
    /// 固壁
    Wall,
    /// 普通开边界
    Patch,
    /// 对称面
    Symmetry,
    /// 并行分区边界
    Processor {
        /// 相邻分区所属进程号
        neighbour_process: usize,
    },
}

impl PatchKind {
    /// 是否为并行分区边界
    #[inline]
    pub fn is_processor(&self) -> bool {
        matches!(self, Self::Processor { .. })
    }

    /// 相邻进程号（仅分区边界）
    #[inline]
    pub fn neighbour_process(&self) -> Option<usize> {
        match self {
            Self::Processor { neighbour_process } => Some(*neighbour_process),
            _ => None,
        }
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wall => write!(f, "wall"),
            Self::Patch => write!(f, "patch"),
            Self::Symmetry => write!(f, "symmetry"),
            Self::Processor { neighbour_process } => write!(f, "processor({})", neighbour_process),
        }
    }
}

/// 边界面分组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// 边界名称
    pub name: String,
    /// 边界类型
    pub kind: PatchKind,
    /// 第一个面的全局索引
    pub start: usize,
    /// 面数量
    pub size: usize,
}

impl Patch {
    /// 创建边界
    pub fn new(name: impl Into<String>, kind: PatchKind, start: usize, size: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            start,
            size,
        }
    }

    /// 全局面索引范围
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.size
    }

    /// 是否包含该面
    #[inline]
    pub fn contains(&self, face: usize) -> bool {
        self.range().contains(&face)
    }
}

/// 几何时间层
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeLevel {
    /// 上一时刻（运动网格的起点）
    Old,
    /// 当前时刻
    Current,
}

// ============================================================================
// 几何量
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Geometry {
    face_centres: Vec<DVec3>,
    face_areas: Vec<DVec3>,
    cell_centres: Vec<DVec3>,
    cell_volumes: Vec<f64>,
}

/// 计算单个面的中心与面积矢量
///
/// 三角形直接取形心；多边形以点平均为公共顶点划分三角扇，
/// 按三角形面积加权求形心。面积矢量为各三角形法向之和的一半。
pub fn face_centre_and_area(points: &[DVec3], face: &[usize]) -> (DVec3, DVec3) {
    let n = face.len();
    if n == 3 {
        let (a, b, c) = (points[face[0]], points[face[1]], points[face[2]]);
        return ((a + b + c) / 3.0, 0.5 * (b - a).cross(c - a));
    }

    let estimate = face.iter().map(|&p| points[p]).sum::<DVec3>() / n as f64;

    let mut sum_n = DVec3::ZERO;
    let mut sum_a = 0.0;
    let mut sum_ac = DVec3::ZERO;
    for i in 0..n {
        let this = points[face[i]];
        let next = points[face[(i + 1) % n]];
        let c = this + next + estimate;
        let tri_n = (next - this).cross(estimate - this);
        let a = tri_n.length();
        sum_n += tri_n;
        sum_a += a;
        sum_ac += a * c;
    }

    if sum_a < VSMALL {
        (estimate, 0.5 * sum_n)
    } else {
        (sum_ac / (3.0 * sum_a), 0.5 * sum_n)
    }
}

// ============================================================================
// 多面体网格
// ============================================================================

/// 只读多面体网格
#[derive(Debug, Clone)]
pub struct PolyMesh {
    // ===== 点 =====
    points: Vec<DVec3>,
    old_points: Vec<DVec3>,

    // ===== 面 (压缩格式: offsets + indices) =====
    face_offsets: Vec<usize>,
    face_indices: Vec<usize>,
    owner: Vec<usize>,
    /// 仅内部面
    neighbour: Vec<usize>,

    // ===== 边界 =====
    patches: Vec<Patch>,

    // ===== 单元 =====
    n_cells: usize,
    cell_face_offsets: Vec<usize>,
    cell_face_indices: Vec<usize>,

    // ===== 几何 =====
    geometry: Geometry,
    old_geometry: Geometry,

    // ===== 运动与时间 =====
    moving: bool,
    time: f64,
    delta_t: f64,
}

impl PolyMesh {
    /// 由点、面、owner/neighbour 与边界构建网格
    ///
    /// # 参数
    ///
    /// - `faces`: 每个面的点环，内部面在前
    /// - `owner`: 每个面的 owner 单元
    /// - `neighbour`: 内部面的 neighbour 单元，长度即内部面数量
    /// - `patches`: 边界面分组，必须依次连续覆盖全部边界面
    pub fn new(
        points: Vec<DVec3>,
        faces: Vec<Vec<usize>>,
        owner: Vec<usize>,
        neighbour: Vec<usize>,
        patches: Vec<Patch>,
    ) -> MeshResult<Self> {
        let n_faces = faces.len();
        if owner.len() != n_faces {
            return Err(MeshError::element_count_mismatch(n_faces, owner.len(), "owner"));
        }
        if neighbour.len() > n_faces {
            return Err(MeshError::invalid_topology(
                "PolyMesh::new",
                format!("内部面数量 {} 超过面总数 {}", neighbour.len(), n_faces),
            ));
        }

        let mut expected_start = neighbour.len();
        for patch in &patches {
            if patch.start != expected_start {
                return Err(MeshError::invalid_topology(
                    "PolyMesh::new",
                    format!("边界 {} 起始面 {} 不连续, 期望 {}", patch.name, patch.start, expected_start),
                ));
            }
            expected_start += patch.size;
        }
        if expected_start != n_faces {
            return Err(MeshError::element_count_mismatch(
                n_faces - neighbour.len(),
                expected_start - neighbour.len(),
                "boundary faces",
            ));
        }

        let mut face_offsets = Vec::with_capacity(n_faces + 1);
        face_offsets.push(0);
        let mut face_indices = Vec::new();
        for (f, face) in faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(MeshError::invalid_topology(
                    "PolyMesh::new",
                    format!("面 {} 只有 {} 个点", f, face.len()),
                ));
            }
            if let Some(&bad) = face.iter().find(|&&p| p >= points.len()) {
                return Err(MeshError::invalid_topology(
                    "PolyMesh::new",
                    format!("面 {} 引用不存在的点 {}", f, bad),
                ));
            }
            face_indices.extend_from_slice(face);
            face_offsets.push(face_indices.len());
        }

        for (f, (&o, &n)) in owner.iter().zip(&neighbour).enumerate() {
            if o == n {
                return Err(MeshError::invalid_topology(
                    "PolyMesh::new",
                    format!("内部面 {} 的 owner 与 neighbour 相同 ({})", f, o),
                ));
            }
        }

        let n_cells = owner
            .iter()
            .chain(&neighbour)
            .max()
            .map(|&c| c + 1)
            .ok_or_else(|| MeshError::invalid_topology("PolyMesh::new", "网格没有单元"))?;

        // 单元 -> 面 (按面索引升序)
        let mut counts = vec![0usize; n_cells];
        for &c in owner.iter().chain(&neighbour) {
            counts[c] += 1;
        }
        let mut cell_face_offsets = Vec::with_capacity(n_cells + 1);
        cell_face_offsets.push(0);
        for &count in &counts {
            cell_face_offsets.push(cell_face_offsets.last().copied().unwrap_or(0) + count);
        }
        let mut fill = cell_face_offsets[..n_cells].to_vec();
        let mut cell_face_indices = vec![0usize; cell_face_offsets[n_cells]];
        for f in 0..n_faces {
            let o = owner[f];
            cell_face_indices[fill[o]] = f;
            fill[o] += 1;
            if let Some(&n) = neighbour.get(f) {
                cell_face_indices[fill[n]] = f;
                fill[n] += 1;
            }
        }
        if let Some((c, &count)) = counts.iter().enumerate().find(|(_, &k)| k < 4) {
            return Err(MeshError::invalid_topology(
                "PolyMesh::new",
                format!("单元 {} 只有 {} 个面", c, count),
            ));
        }

        let mut mesh = Self {
            old_points: points.clone(),
            points,
            face_offsets,
            face_indices,
            owner,
            neighbour,
            patches,
            n_cells,
            cell_face_offsets,
            cell_face_indices,
            geometry: Geometry::default(),
            old_geometry: Geometry::default(),
            moving: false,
            time: 0.0,
            delta_t: 0.0,
        };
        let geometry = mesh.compute_geometry(&mesh.points);
        mesh.check_geometry(&geometry)?;
        mesh.old_geometry = geometry.clone();
        mesh.geometry = geometry;

        log::debug!(
            "PolyMesh: {} 点, {} 面 ({} 内部), {} 单元, {} 边界",
            mesh.n_points(),
            n_faces,
            mesh.n_internal_faces(),
            n_cells,
            mesh.patches.len()
        );
        Ok(mesh)
    }

    fn compute_geometry(&self, points: &[DVec3]) -> Geometry {
        let n_faces = self.n_faces();
        let mut face_centres = Vec::with_capacity(n_faces);
        let mut face_areas = Vec::with_capacity(n_faces);
        for f in 0..n_faces {
            let (c, a) = face_centre_and_area(points, self.face_points(f));
            face_centres.push(c);
            face_areas.push(a);
        }

        // 单元中心估计：面中心平均
        let mut estimate = vec![DVec3::ZERO; self.n_cells];
        for c in 0..self.n_cells {
            let faces = self.cell_faces(c);
            estimate[c] = faces.iter().map(|&f| face_centres[f]).sum::<DVec3>() / faces.len() as f64;
        }

        let mut cell_centres = vec![DVec3::ZERO; self.n_cells];
        let mut cell_volumes = vec![0.0; self.n_cells];
        for f in 0..n_faces {
            let fc = face_centres[f];
            let sf = face_areas[f];

            let o = self.owner[f];
            let pyr3 = sf.dot(fc - estimate[o]);
            cell_centres[o] += pyr3 * (0.75 * fc + 0.25 * estimate[o]);
            cell_volumes[o] += pyr3;

            if let Some(&n) = self.neighbour.get(f) {
                let pyr3 = sf.dot(estimate[n] - fc);
                cell_centres[n] += pyr3 * (0.75 * fc + 0.25 * estimate[n]);
                cell_volumes[n] += pyr3;
            }
        }
        for c in 0..self.n_cells {
            if cell_volumes[c].abs() > VSMALL {
                cell_centres[c] /= cell_volumes[c];
            } else {
                cell_centres[c] = estimate[c];
            }
            cell_volumes[c] /= 3.0;
        }

        Geometry {
            face_centres,
            face_areas,
            cell_centres,
            cell_volumes,
        }
    }

    fn check_geometry(&self, geometry: &Geometry) -> MeshResult<()> {
        if let Some((f, a)) = geometry
            .face_areas
            .iter()
            .enumerate()
            .find(|(_, a)| a.length() <= VSMALL)
        {
            return Err(MeshError::degenerate("face", f, "area", a.length()));
        }
        if let Some((c, &v)) = geometry
            .cell_volumes
            .iter()
            .enumerate()
            .find(|(_, &v)| !(v > VSMALL))
        {
            return Err(MeshError::degenerate("cell", c, "volume", v));
        }
        Ok(())
    }

    // =========================================================================
    // 基本统计
    // =========================================================================

    /// 点数量
    #[inline]
    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    /// 面数量
    #[inline]
    pub fn n_faces(&self) -> usize {
        self.owner.len()
    }

    /// 内部面数量
    #[inline]
    pub fn n_internal_faces(&self) -> usize {
        self.neighbour.len()
    }

    /// 单元数量
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    // =========================================================================
    // 拓扑
    // =========================================================================

    /// 面的点环
    #[inline]
    pub fn face_points(&self, face: usize) -> &[usize] {
        &self.face_indices[self.face_offsets[face]..self.face_offsets[face + 1]]
    }

    /// 面的 owner 单元
    #[inline]
    pub fn face_owner(&self, face: usize) -> usize {
        self.owner[face]
    }

    /// 面的 neighbour 单元（边界面为 `None`）
    #[inline]
    pub fn face_neighbour(&self, face: usize) -> Option<usize> {
        self.neighbour.get(face).copied()
    }

    /// 是否为内部面
    #[inline]
    pub fn is_internal_face(&self, face: usize) -> bool {
        face < self.n_internal_faces()
    }

    /// 面另一侧的单元
    #[inline]
    pub fn other_cell(&self, face: usize, cell: usize) -> Option<usize> {
        let n = self.face_neighbour(face)?;
        if self.owner[face] == cell {
            Some(n)
        } else {
            Some(self.owner[face])
        }
    }

    /// 单元的面
    #[inline]
    pub fn cell_faces(&self, cell: usize) -> &[usize] {
        &self.cell_face_indices[self.cell_face_offsets[cell]..self.cell_face_offsets[cell + 1]]
    }

    /// 全部边界
    #[inline]
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// 按索引获取边界
    #[inline]
    pub fn patch(&self, patch: usize) -> &Patch {
        &self.patches[patch]
    }

    /// 边界面所属的边界索引（内部面为 `None`）
    pub fn which_patch(&self, face: usize) -> Option<usize> {
        if self.is_internal_face(face) || face >= self.n_faces() {
            return None;
        }
        let idx = self.patches.partition_point(|p| p.start + p.size <= face);
        (idx < self.patches.len()).then_some(idx)
    }

    /// 边界面在其边界内的局部索引：`(patch, local_face)`
    pub fn patch_face(&self, face: usize) -> Option<(usize, usize)> {
        let patch = self.which_patch(face)?;
        Some((patch, face - self.patches[patch].start))
    }

    /// 按名称查找边界
    pub fn find_patch(&self, name: &str) -> MeshResult<usize> {
        self.patches
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| MeshError::patch_not_found(name))
    }

    /// 与指定进程相邻的分区边界
    pub fn processor_patch(&self, neighbour_process: usize) -> Option<usize> {
        self.patches
            .iter()
            .position(|p| p.kind.neighbour_process() == Some(neighbour_process))
    }

    // =========================================================================
    // 几何
    // =========================================================================

    #[inline]
    fn geometry_at(&self, level: TimeLevel) -> &Geometry {
        match level {
            TimeLevel::Old => &self.old_geometry,
            TimeLevel::Current => &self.geometry,
        }
    }

    /// 点坐标
    #[inline]
    pub fn point(&self, point: usize, level: TimeLevel) -> DVec3 {
        match level {
            TimeLevel::Old => self.old_points[point],
            TimeLevel::Current => self.points[point],
        }
    }

    /// 当前点坐标
    #[inline]
    pub fn points(&self) -> &[DVec3] {
        &self.points
    }

    /// 面中心
    #[inline]
    pub fn face_centre(&self, face: usize, level: TimeLevel) -> DVec3 {
        self.geometry_at(level).face_centres[face]
    }

    /// 面积矢量（指向 owner 外侧）
    #[inline]
    pub fn face_area(&self, face: usize, level: TimeLevel) -> DVec3 {
        self.geometry_at(level).face_areas[face]
    }

    /// 单元中心
    #[inline]
    pub fn cell_centre(&self, cell: usize, level: TimeLevel) -> DVec3 {
        self.geometry_at(level).cell_centres[cell]
    }

    /// 单元体积
    #[inline]
    pub fn cell_volume(&self, cell: usize, level: TimeLevel) -> f64 {
        self.geometry_at(level).cell_volumes[cell]
    }

    /// 点是否位于单元内（凸单元，面上的点视为在内）
    pub fn point_in_cell(&self, position: DVec3, cell: usize) -> bool {
        self.cell_faces(cell).iter().all(|&f| {
            let outward = if self.owner[f] == cell {
                self.geometry.face_areas[f]
            } else {
                -self.geometry.face_areas[f]
            };
            (position - self.geometry.face_centres[f]).dot(outward) <= 0.0
        })
    }

    /// 查找包含该点的单元（线性搜索）
    pub fn find_cell(&self, position: DVec3) -> Option<usize> {
        (0..self.n_cells).find(|&c| self.point_in_cell(position, c))
    }

    // =========================================================================
    // 运动与时间
    // =========================================================================

    /// 网格是否在本时间步运动
    #[inline]
    pub fn moving(&self) -> bool {
        self.moving
    }

    /// 移动网格点
    ///
    /// 原坐标成为旧时刻几何；新几何退化时拒绝移动，网格保持不变。
    pub fn move_points(&mut self, new_points: Vec<DVec3>) -> MeshResult<()> {
        if new_points.len() != self.points.len() {
            return Err(MeshError::element_count_mismatch(
                self.points.len(),
                new_points.len(),
                "move_points",
            ));
        }
        let geometry = self.compute_geometry(&new_points);
        self.check_geometry(&geometry)?;

        self.old_points = std::mem::replace(&mut self.points, new_points);
        self.old_geometry = std::mem::replace(&mut self.geometry, geometry);
        self.moving = true;
        Ok(())
    }

    /// 结束运动：旧时刻几何与当前几何对齐
    pub fn stop_moving(&mut self) {
        self.old_points.clone_from(&self.points);
        self.old_geometry = self.geometry.clone();
        self.moving = false;
    }

    /// 当前时间步起始时刻
    #[inline]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// 当前时间步长
    #[inline]
    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    /// 设置时间步长
    pub fn set_delta_t(&mut self, delta_t: f64) {
        self.delta_t = delta_t;
    }

    /// 推进到下一个时间步
    pub fn advance_time(&mut self) {
        self.time += self.delta_t;
    }
}

// ============================================================================
// 测试
// ============================================================================
