// crates/mh_mesh/src/generation.rs

//! 网格生成模块
//!
//! 提供简单的结构化六面体网格生成工具，用于测试和验证：
//!
//! - [`BlockMesh`]: 长方体域上的 nx×ny×nz 六面体网格，六个命名边界
//! - [`BlockMesh::decompose_x`]: 沿 x 方向切分为若干分区，分区之间生成处理器边界
//!
//! 处理器边界两侧保存同一组面，面顺序一致；接收侧点环反向但起点相同。
//!
//! # 使用示例
//!
//! ```rust
//! use glam::DVec3;
//! use mh_mesh::generation::BlockMesh;
//!
//! let block = BlockMesh::new([4, 2, 2], DVec3::ZERO, DVec3::new(4.0, 1.0, 1.0));
//! let mesh = block.build().unwrap();
//! assert_eq!(mesh.n_cells(), 16);
//!
//! let parts = block.decompose_x(2).unwrap();
//! assert_eq!(parts.len(), 2);
//! assert_eq!(parts[0].n_cells(), 8);
//! ```

use crate::error::{MeshError, MeshResult};
use crate::poly::{Patch, PatchKind, PolyMesh};
use glam::DVec3;

/// 长方体的六个侧面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockSide {
    XMin,
    XMax,
    YMin,
    YMax,
    ZMin,
    ZMax,
}

impl BlockSide {
    /// 全部侧面（即边界的生成顺序）
    pub const ALL: [Self; 6] = [
        Self::XMin,
        Self::XMax,
        Self::YMin,
        Self::YMax,
        Self::ZMin,
        Self::ZMax,
    ];

    /// 边界名称
    pub fn name(self) -> &'static str {
        match self {
            Self::XMin => "xMin",
            Self::XMax => "xMax",
            Self::YMin => "yMin",
            Self::YMax => "yMax",
            Self::ZMin => "zMin",
            Self::ZMax => "zMax",
        }
    }

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }
}

/// 处理器边界名称
pub fn processor_patch_name(rank: usize, neighbour: usize) -> String {
    format!("procBoundary{}to{}", rank, neighbour)
}

/// 结构化六面体网格生成器
#[derive(Debug, Clone)]
pub struct BlockMesh {
    /// 各方向单元数
    cells: [usize; 3],
    /// 最小角点
    origin: DVec3,
    /// 各方向域长度 [m]
    lengths: DVec3,
    /// 各侧面边界类型
    kinds: [PatchKind; 6],
}

impl BlockMesh {
    /// 创建生成器，全部侧面默认为普通开边界
    pub fn new(cells: [usize; 3], origin: DVec3, lengths: DVec3) -> Self {
        Self {
            cells,
            origin,
            lengths,
            kinds: [PatchKind::Patch; 6],
        }
    }

    /// 单位立方体，每个方向 n 个单元
    pub fn unit_cube(n: usize) -> Self {
        Self::new([n, n, n], DVec3::ZERO, DVec3::ONE)
    }

    /// 设置某一侧面的边界类型
    pub fn with_patch_kind(mut self, side: BlockSide, kind: PatchKind) -> Self {
        self.kinds[side.slot()] = kind;
        self
    }

    /// 网格间距
    pub fn spacing(&self) -> DVec3 {
        DVec3::new(
            self.lengths.x / self.cells[0] as f64,
            self.lengths.y / self.cells[1] as f64,
            self.lengths.z / self.cells[2] as f64,
        )
    }

    /// 单元总数
    pub fn n_cells(&self) -> usize {
        self.cells.iter().product()
    }

    fn check(&self) -> MeshResult<()> {
        if self.cells.iter().any(|&n| n == 0) {
            return Err(MeshError::invalid_topology(
                "BlockMesh",
                format!("单元数必须为正: {:?}", self.cells),
            ));
        }
        if !(self.lengths.min_element() > 0.0) {
            return Err(MeshError::invalid_topology(
                "BlockMesh",
                format!("域长度必须为正: {}", self.lengths),
            ));
        }
        if self.kinds.iter().any(PatchKind::is_processor) {
            return Err(MeshError::invalid_topology(
                "BlockMesh",
                "处理器边界只能由 decompose_x 生成",
            ));
        }
        Ok(())
    }

    /// 构建完整网格
    pub fn build(&self) -> MeshResult<PolyMesh> {
        self.check()?;
        self.build_slab(0, self.cells[0], 0, 1)
    }

    /// 沿 x 方向分解为 `n_procs` 个分区，返回第 r 个分区对应进程 r 的网格
    pub fn decompose_x(&self, n_procs: usize) -> MeshResult<Vec<PolyMesh>> {
        self.check()?;
        let nx = self.cells[0];
        if n_procs == 0 || n_procs > nx {
            return Err(MeshError::invalid_topology(
                "decompose_x",
                format!("分区数 {} 必须在 1..={} 之间", n_procs, nx),
            ));
        }
        (0..n_procs)
            .map(|rank| {
                let i0 = rank * nx / n_procs;
                let i1 = (rank + 1) * nx / n_procs;
                self.build_slab(i0, i1, rank, n_procs)
            })
            .collect()
    }

    /// 构建全局 x 索引位于 `[i0, i1)` 的分区
    fn build_slab(&self, i0: usize, i1: usize, rank: usize, n_procs: usize) -> MeshResult<PolyMesh> {
        let [_, ny, nz] = self.cells;
        let lnx = i1 - i0;
        let h = self.spacing();

        let pid = |i: usize, j: usize, k: usize| i + (lnx + 1) * (j + (ny + 1) * k);
        let cid = |i: usize, j: usize, k: usize| i + lnx * (j + ny * k);

        let mut points = Vec::with_capacity((lnx + 1) * (ny + 1) * (nz + 1));
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=lnx {
                    // 全局索引保证相邻分区的共享点坐标逐位相同
                    points.push(
                        self.origin
                            + DVec3::new((i0 + i) as f64 * h.x, j as f64 * h.y, k as f64 * h.z),
                    );
                }
            }
        }

        // 法向分别为 +x / +y / +z 的点环
        let x_loop = |i, j, k| vec![pid(i, j, k), pid(i, j + 1, k), pid(i, j + 1, k + 1), pid(i, j, k + 1)];
        let y_loop = |i, j, k| vec![pid(i, j, k), pid(i, j, k + 1), pid(i + 1, j, k + 1), pid(i + 1, j, k)];
        let z_loop = |i, j, k| vec![pid(i, j, k), pid(i + 1, j, k), pid(i + 1, j + 1, k), pid(i, j + 1, k)];

        let mut faces = Vec::new();
        let mut owner = Vec::new();
        let mut neighbour = Vec::new();

        // 内部面：按 owner 升序，同一 owner 内按 neighbour 升序
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..lnx {
                    let c = cid(i, j, k);
                    if i + 1 < lnx {
                        faces.push(x_loop(i + 1, j, k));
                        owner.push(c);
                        neighbour.push(cid(i + 1, j, k));
                    }
                    if j + 1 < ny {
                        faces.push(y_loop(i, j + 1, k));
                        owner.push(c);
                        neighbour.push(cid(i, j + 1, k));
                    }
                    if k + 1 < nz {
                        faces.push(z_loop(i, j, k + 1));
                        owner.push(c);
                        neighbour.push(cid(i, j, k + 1));
                    }
                }
            }
        }

        let side_faces = |side: BlockSide| -> Vec<(Vec<usize>, usize)> {
            let mut out = Vec::new();
            match side {
                BlockSide::XMin | BlockSide::XMax => {
                    for k in 0..nz {
                        for j in 0..ny {
                            out.push(if side == BlockSide::XMin {
                                (reversed(x_loop(0, j, k)), cid(0, j, k))
                            } else {
                                (x_loop(lnx, j, k), cid(lnx - 1, j, k))
                            });
                        }
                    }
                }
                BlockSide::YMin | BlockSide::YMax => {
                    for k in 0..nz {
                        for i in 0..lnx {
                            out.push(if side == BlockSide::YMin {
                                (reversed(y_loop(i, 0, k)), cid(i, 0, k))
                            } else {
                                (y_loop(i, ny, k), cid(i, ny - 1, k))
                            });
                        }
                    }
                }
                BlockSide::ZMin | BlockSide::ZMax => {
                    for j in 0..ny {
                        for i in 0..lnx {
                            out.push(if side == BlockSide::ZMin {
                                (reversed(z_loop(i, j, 0)), cid(i, j, 0))
                            } else {
                                (z_loop(i, j, nz), cid(i, j, nz - 1))
                            });
                        }
                    }
                }
            }
            out
        };

        let lower = (rank > 0).then(|| rank - 1);
        let upper = (rank + 1 < n_procs).then_some(rank + 1);

        let mut patches = Vec::new();
        let mut push_patch = |name: String, kind: PatchKind, list: Vec<(Vec<usize>, usize)>| {
            patches.push(Patch::new(name, kind, faces.len(), list.len()));
            for (face, cell) in list {
                faces.push(face);
                owner.push(cell);
            }
        };

        for side in BlockSide::ALL {
            let replaced = match side {
                BlockSide::XMin => lower.is_some(),
                BlockSide::XMax => upper.is_some(),
                _ => false,
            };
            if !replaced {
                push_patch(side.name().to_string(), self.kinds[side.slot()], side_faces(side));
            }
        }
        if let Some(nbr) = lower {
            push_patch(
                processor_patch_name(rank, nbr),
                PatchKind::Processor { neighbour_process: nbr },
                side_faces(BlockSide::XMin),
            );
        }
        if let Some(nbr) = upper {
            push_patch(
                processor_patch_name(rank, nbr),
                PatchKind::Processor { neighbour_process: nbr },
                side_faces(BlockSide::XMax),
            );
        }

        log::debug!(
            "BlockMesh 分区 {}/{}: x 索引 [{}, {}), {} 个边界",
            rank,
            n_procs,
            i0,
            i1,
            patches.len()
        );
        PolyMesh::new(points, faces, owner, neighbour, patches)
    }
}

/// 反转点环并保持起点：`[a, b, c, d] -> [a, d, c, b]`
pub fn reversed(mut face: Vec<usize>) -> Vec<usize> {
    face[1..].reverse();
    face
}

// ============================================================================
// 测试
// ============================================================================
