// crates/mh_lagrangian/src/tracking.rs

//! 面穿越追踪器
//!
//! 追踪内核的状态机：给定当前子步剩余部分的目标位移，
//! 在四面体分解上逐个四面体推进粒子。
//!
//! # 算法
//!
//! 1. 将剩余位移变换到当前四面体的重心坐标系，得到增量 `Δy`
//! 2. 对每个递减的分量求其归零时的行程比例 `λ_i = -y_i / Δy_i`
//! 3. 取最小 `λ`；若小于 1 则穿越对应面片，数值相等（容差内）时取编号最小的面片
//! 4. 未穿越：施加全部位移，截断归一化坐标，子步完成
//! 5. 穿越：消耗 `λ` 部分位移，被穿越分量精确置零，按顶点身份换到相邻四面体；
//!    若面片位于网格面上，内部面进入相邻单元，边界面交给 [`BoundaryDispatcher`]
//! 6. 以剩余位移重复，直到子步完成或粒子被边界移除
//!
//! 运动网格上变换随子步进度线性插值，重心坐标分子是行程比例的三次多项式：
//! 由四个采样点精确拟合，在单调区间上二分求第一个下降零点。
//!
//! # 状态
//!
//! `InCell` → (`OnMeshFace` →) `InCell` / `Done` / 移除。
//! `OnMeshFace` 是瞬态，边界分派后立即转为其他状态。

use crate::barycentric::{moving_transform, static_transform, transform_at, Barycentric, MovingTransform};
use crate::boundary::{BoundaryDispatcher, BoundaryOutcome};
use crate::error::TrackingResult;
use crate::particle::Particle;
use glam::{DMat4, DVec3, DVec4};
use mh_mesh::{MeshError, PolyMesh, TetIndices};
use serde::{Deserialize, Serialize};

// ============================================================================
// 容差
// ============================================================================

/// 追踪容差
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingTolerance {
    /// 重心坐标有效性容差：分量不小于 `-barycentric_tol`，和偏离 1 不超过它
    pub barycentric_tol: f64,

    /// 同时穿越判定容差（相对行程）
    ///
    /// 两个候选行程比例之差小于此值时视为同时穿越，取编号最小的面片。
    pub crossing_tol: f64,

    /// 退化判定容差
    ///
    /// 重心坐标增量大于 `-degenerate_tol` 的分量不参与穿越判定；
    /// 四面体体积相对尺度小于此值时视为退化。
    pub degenerate_tol: f64,

    /// 单次推进中允许的最大面片穿越次数
    pub max_crossings: usize,
}

impl Default for TrackingTolerance {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl TrackingTolerance {
    /// 高精度容差
    pub const HIGH_PRECISION: Self = Self {
        barycentric_tol: 1e-13,
        crossing_tol: 1e-14,
        degenerate_tol: 1e-15,
        max_crossings: 10_000,
    };

    /// 标准容差（默认设置）
    pub const STANDARD: Self = Self {
        barycentric_tol: 1e-10,
        crossing_tol: 1e-12,
        degenerate_tol: 1e-12,
        max_crossings: 1000,
    };

    /// 宽松容差
    pub const RELAXED: Self = Self {
        barycentric_tol: 1e-8,
        crossing_tol: 1e-10,
        degenerate_tol: 1e-10,
        max_crossings: 1000,
    };
}

// ============================================================================
// 结果类型
// ============================================================================

/// 单个四面体内的推进结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriStep {
    /// 消耗的行程比例
    pub lambda: f64,
    /// 穿越的面片（`None` 表示到达目标）
    pub facet: Option<usize>,
    /// 四面体退化，位移被消耗但粒子未移动
    pub degenerate: bool,
}

/// 推进结束后的粒子去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// 仍在本进程继续追踪
    Continues,
    /// 被边界移除（逃逸、吸收或迁移失败）
    Removed,
    /// 已打包迁移到其他进程
    Transferred {
        /// 目标进程
        to_process: usize,
    },
}

/// 网格面事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEvent {
    /// 穿过内部面
    InternalFace {
        face: usize,
        from_cell: usize,
        to_cell: usize,
    },
    /// 到达边界面
    BoundaryFace {
        face: usize,
        patch: usize,
        outcome: BoundaryOutcome,
    },
}

/// 单次推进报告
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceReport {
    /// 粒子去向
    pub outcome: AdvanceOutcome,
    /// 按发生顺序的网格面事件
    pub events: Vec<TrackEvent>,
    /// 同单元内四面体之间的穿越次数
    pub tet_crossings: usize,
    /// 累计物理行程
    pub distance: f64,
    /// 推进结束时的物理位置
    pub final_position: DVec3,
    /// 未消耗的位移（迁移时随粒子发送）
    pub remaining: DVec3,
}

impl AdvanceReport {
    fn new() -> Self {
        Self {
            outcome: AdvanceOutcome::Continues,
            events: Vec::new(),
            tet_crossings: 0,
            distance: 0.0,
            final_position: DVec3::ZERO,
            remaining: DVec3::ZERO,
        }
    }

    /// 网格面事件数
    #[inline]
    pub fn face_crossings(&self) -> usize {
        self.events.len()
    }

    /// 粒子是否离开本进程的追踪
    #[inline]
    pub fn is_gone(&self) -> bool {
        self.outcome != AdvanceOutcome::Continues
    }
}

// ============================================================================
// 追踪器
// ============================================================================

/// 面穿越追踪器（无内部可变状态，可在线程间共享）
#[derive(Debug, Clone, Default)]
pub struct FaceCrossingTracker {
    tolerance: TrackingTolerance,
}

impl FaceCrossingTracker {
    /// 以指定容差创建
    pub fn new(tolerance: TrackingTolerance) -> Self {
        Self { tolerance }
    }

    /// 追踪容差
    #[inline]
    pub fn tolerance(&self) -> &TrackingTolerance {
        &self.tolerance
    }

    /// 定位物理点所在的四面体及其重心坐标
    ///
    /// 先用面平面测试猜测单元，失败时遍历全部单元。
    pub fn locate(
        &self,
        mesh: &PolyMesh,
        position: DVec3,
        fraction: f64,
    ) -> Option<(TetIndices, Barycentric)> {
        let tol = &self.tolerance;
        let hint = mesh.find_cell(position);
        for cell in hint.into_iter().chain(0..mesh.n_cells()) {
            let mut best: Option<(TetIndices, Barycentric)> = None;
            for tet in mesh.cell_tets(cell) {
                let Some(y) = transform_at(mesh, tet, fraction).to_barycentric(position, tol.degenerate_tol)
                else {
                    continue;
                };
                if best.map_or(true, |(_, b)| y.min_element() > b.min_element()) {
                    best = Some((tet, y));
                }
            }
            if let Some((tet, y)) = best {
                if y.min_element() >= -tol.barycentric_tol {
                    return Some((tet, y.snapped()));
                }
            }
        }
        None
    }

    /// 在当前四面体内推进
    ///
    /// `fraction` 为整段 `displacement` 对应的子步比例。
    pub fn track_to_tri(
        &self,
        mesh: &PolyMesh,
        particle: &mut Particle,
        displacement: DVec3,
        fraction: f64,
    ) -> TriStep {
        if mesh.moving() {
            self.track_to_tri_moving(mesh, particle, displacement, fraction)
        } else {
            self.track_to_tri_static(mesh, particle, displacement, fraction)
        }
    }

    fn track_to_tri_static(
        &self,
        mesh: &PolyMesh,
        particle: &mut Particle,
        displacement: DVec3,
        fraction: f64,
    ) -> TriStep {
        let tol = &self.tolerance;
        let Some(inverse) = static_transform(mesh, particle.tet).inverse(tol.degenerate_tol) else {
            return self.consume_in_place(particle, fraction);
        };
        let dy = inverse.displacement(displacement);
        if !dy.is_finite() {
            return self.consume_in_place(particle, fraction);
        }

        let y = particle.coordinates;
        let mut lambdas = [f64::INFINITY; 4];
        for (i, lambda) in lambdas.iter_mut().enumerate() {
            if dy[i] < -tol.degenerate_tol {
                *lambda = (-y[i] / dy[i]).max(0.0);
            }
        }

        match self.select_facet(&lambdas) {
            Some((facet, lambda)) => {
                particle.coordinates = y.offset(dy, lambda).snapped_onto(facet);
                advance_fraction(particle, lambda * fraction);
                TriStep {
                    lambda,
                    facet: Some(facet),
                    degenerate: false,
                }
            }
            None => {
                particle.coordinates = y.offset(dy, 1.0).snapped();
                advance_fraction(particle, fraction);
                TriStep {
                    lambda: 1.0,
                    facet: None,
                    degenerate: false,
                }
            }
        }
    }

    fn track_to_tri_moving(
        &self,
        mesh: &PolyMesh,
        particle: &mut Particle,
        displacement: DVec3,
        fraction: f64,
    ) -> TriStep {
        let tol = &self.tolerance;
        let moving = moving_transform(mesh, particle.tet);
        let f0 = particle.step_fraction;
        let start = moving.at(f0);
        if start.is_degenerate(tol.degenerate_tol) {
            return self.consume_in_place(particle, fraction);
        }
        let x0 = start.to_physical(particle.coordinates);

        let sample = |lambda: f64| {
            cramer_numerators(&moving, f0 + lambda * fraction, x0 + lambda * displacement)
        };
        let samples = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0].map(sample);
        let d0 = samples[0].1;
        if !(d0.is_finite() && d0 != 0.0) {
            return self.consume_in_place(particle, fraction);
        }

        let mut lambdas = [f64::INFINITY; 4];
        for (i, lambda) in lambdas.iter_mut().enumerate() {
            let values = samples.map(|(q, _)| q[i] / d0);
            let coeffs = cubic_through(values);
            if let Some(root) = first_descending_root(coeffs, tol.degenerate_tol) {
                *lambda = root;
            }
        }

        let (lambda, facet) = match self.select_facet(&lambdas) {
            Some((facet, lambda)) => (lambda, Some(facet)),
            None => (1.0, None),
        };
        let (q, d) = sample(lambda);
        let y = if d.is_finite() && d != 0.0 {
            Barycentric::from(q / d)
        } else {
            particle.coordinates
        };
        particle.coordinates = match facet {
            Some(facet) => y.snapped_onto(facet),
            None => y.snapped(),
        };
        advance_fraction(particle, lambda * fraction);
        TriStep {
            lambda,
            facet,
            degenerate: false,
        }
    }

    /// 退化四面体：消耗位移但不移动
    fn consume_in_place(&self, particle: &mut Particle, fraction: f64) -> TriStep {
        log::debug!(
            "粒子 {:?} 所在四面体 {:?} 退化，跳过剩余位移",
            particle.provenance(),
            particle.tet
        );
        advance_fraction(particle, fraction);
        TriStep {
            lambda: 1.0,
            facet: None,
            degenerate: true,
        }
    }

    /// 选出最先穿越的面片：数值相等时取编号最小者
    fn select_facet(&self, lambdas: &[f64; 4]) -> Option<(usize, f64)> {
        let min = lambdas.iter().copied().fold(f64::INFINITY, f64::min);
        if !(min < 1.0) {
            return None;
        }
        let facet = lambdas
            .iter()
            .position(|&l| l <= min + self.tolerance.crossing_tol)?;
        Some((facet, min))
    }

    /// 推进粒子直到子步完成或离开本进程
    ///
    /// `displacement` 对应子步剩余部分 `1 - step_fraction`。
    pub fn track(
        &self,
        mesh: &PolyMesh,
        particle: &mut Particle,
        displacement: DVec3,
        dispatcher: &BoundaryDispatcher,
    ) -> TrackingResult<AdvanceReport> {
        let mut report = AdvanceReport::new();
        let mut remaining = displacement;
        let mut fraction = (1.0 - particle.step_fraction).max(0.0);
        let mut crossings = 0usize;
        particle.face = None;

        loop {
            if crossings >= self.tolerance.max_crossings {
                log::debug!(
                    "粒子 {:?} 在单元 {} 达到最大穿越次数 {}，本子步视为完成",
                    particle.provenance(),
                    particle.cell(),
                    self.tolerance.max_crossings
                );
                particle.step_fraction = 1.0;
                break;
            }

            let step = self.track_to_tri(mesh, particle, remaining, fraction);
            if step.lambda > 0.0 {
                // 已离开上一次穿过的面
                particle.face = None;
            }
            if !step.degenerate {
                report.distance += step.lambda * remaining.length();
            }
            remaining *= 1.0 - step.lambda;
            fraction *= 1.0 - step.lambda;

            let Some(facet) = step.facet else {
                particle.step_fraction = 1.0;
                break;
            };
            crossings += 1;

            if facet != 0 {
                let next = mesh.tet_across_facet(particle.tet, facet)?.ok_or_else(|| {
                    MeshError::invalid_topology("track", format!("面片 {} 没有相邻四面体", facet))
                })?;
                change_tet(mesh, particle, next);
                report.tet_crossings += 1;
                continue;
            }

            let face = particle.tet.face;
            particle.face = Some(face);
            match mesh.tet_across_facet(particle.tet, 0)? {
                Some(next) => {
                    log::trace!(
                        "粒子 {:?} 穿过面 {}: 单元 {} -> {}",
                        particle.provenance(),
                        face,
                        particle.cell(),
                        next.cell
                    );
                    report.events.push(TrackEvent::InternalFace {
                        face,
                        from_cell: particle.cell(),
                        to_cell: next.cell,
                    });
                    change_tet(mesh, particle, next);
                }
                None => {
                    let patch = mesh.which_patch(face).ok_or_else(|| {
                        MeshError::invalid_topology("track", format!("边界面 {} 不属于任何边界", face))
                    })?;
                    let outcome = dispatcher.hit_boundary(mesh, particle, patch, &mut remaining);
                    log::trace!(
                        "粒子 {:?} 到达边界 {} (面 {}): {:?}",
                        particle.provenance(),
                        mesh.patch(patch).name,
                        face,
                        outcome
                    );
                    report.events.push(TrackEvent::BoundaryFace {
                        face,
                        patch,
                        outcome,
                    });
                    match outcome {
                        BoundaryOutcome::Reflected => {}
                        BoundaryOutcome::Stuck => {
                            remaining = DVec3::ZERO;
                            particle.step_fraction = 1.0;
                            break;
                        }
                        BoundaryOutcome::Escaped | BoundaryOutcome::Dropped => {
                            report.outcome = AdvanceOutcome::Removed;
                            break;
                        }
                        BoundaryOutcome::Transferred { to_process } => {
                            report.outcome = AdvanceOutcome::Transferred { to_process };
                            break;
                        }
                    }
                }
            }
        }

        report.remaining = remaining;
        report.final_position = particle.position(mesh);
        Ok(report)
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

#[inline]
fn advance_fraction(particle: &mut Particle, amount: f64) {
    particle.step_fraction = (particle.step_fraction + amount).min(1.0);
}

/// 换到相邻四面体，按顶点身份重排重心坐标
///
/// 新四面体中不属于共享面片的顶点权重为 0。
pub(crate) fn change_tet(mesh: &PolyMesh, particle: &mut Particle, next: TetIndices) {
    let old_ids = mesh.tet_vertex_ids(particle.tet);
    let new_ids = mesh.tet_vertex_ids(next);
    let y = particle.coordinates;
    let mut values = [0.0; 4];
    for (k, id) in new_ids.iter().enumerate() {
        if let Some(j) = old_ids.iter().position(|old| old == id) {
            values[k] = y[j];
        }
    }
    particle.coordinates = Barycentric::from_array(values);
    particle.tet = next;
}

/// 克莱姆法则：返回重心坐标的分子与公共分母
fn cramer_numerators(moving: &MovingTransform, fraction: f64, x: DVec3) -> (DVec4, f64) {
    let m = moving.at(fraction).matrix();
    let rhs = x.extend(1.0);
    let cols = [m.x_axis, m.y_axis, m.z_axis, m.w_axis];
    let mut q = [0.0; 4];
    for (i, qi) in q.iter_mut().enumerate() {
        let mut c = cols;
        c[i] = rhs;
        *qi = DMat4::from_cols(c[0], c[1], c[2], c[3]).determinant();
    }
    (DVec4::from_array(q), m.determinant())
}

/// 过 λ = 0, 1/3, 2/3, 1 四个采样值的三次多项式系数（升幂）
fn cubic_through(v: [f64; 4]) -> [f64; 4] {
    let d1 = v[1] - v[0];
    let d2 = v[2] - 2.0 * v[1] + v[0];
    let d3 = v[3] - 3.0 * v[2] + 3.0 * v[1] - v[0];
    let c1 = d1 - d2 / 2.0 + d3 / 3.0;
    let c2 = d2 / 2.0 - d3 / 2.0;
    let c3 = d3 / 6.0;
    [v[0], 3.0 * c1, 9.0 * c2, 27.0 * c3]
}

#[inline]
fn eval_cubic(a: &[f64; 4], x: f64) -> f64 {
    a[0] + x * (a[1] + x * (a[2] + x * a[3]))
}

/// 实根（数值稳定形式）
fn quadratic_roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    if a == 0.0 {
        return if b != 0.0 { vec![-c / b] } else { Vec::new() };
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    let mut roots = vec![q / a];
    if q != 0.0 {
        roots.push(c / q);
    }
    roots
}

/// `[0, 1)` 上三次多项式第一个由正变非正的位置
fn first_descending_root(a: [f64; 4], tol: f64) -> Option<f64> {
    if a[1].abs().max(a[2].abs()).max(a[3].abs()) < tol {
        return None;
    }
    if a[0] <= 0.0 && a[1] < -tol {
        return Some(0.0);
    }

    let mut breaks = vec![0.0];
    let mut critical: Vec<f64> = quadratic_roots(3.0 * a[3], 2.0 * a[2], a[1])
        .into_iter()
        .filter(|&x| x > 0.0 && x < 1.0)
        .collect();
    critical.sort_by(f64::total_cmp);
    breaks.extend(critical);
    breaks.push(1.0);

    for w in breaks.windows(2) {
        let (mut lo, mut hi) = (w[0], w[1]);
        if eval_cubic(&a, lo) > 0.0 && eval_cubic(&a, hi) <= 0.0 {
            for _ in 0..64 {
                let mid = 0.5 * (lo + hi);
                if mid <= lo || mid >= hi {
                    break;
                }
                if eval_cubic(&a, mid) > 0.0 {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            return Some(0.5 * (lo + hi)).filter(|&x| x < 1.0);
        }
    }
    None
}

// ============================================================================
// 测试
// ============================================================================
