// crates/mh_lagrangian/src/error.rs
//! 粒子追踪错误类型
//!
//! - [`TrackingError`]: 追踪、定位、通信与检查点错误
//! - [`TransferError`]: 单个粒子迁移失败，仅影响该粒子（丢弃并记录诊断）
//!
//! 二者均可转换为 `mh_foundation::MhError` 向上传播。

use glam::DVec3;
use mh_foundation::MhError;
use mh_mesh::MeshError;
use thiserror::Error;

/// 追踪模块结果类型
pub type TrackingResult<T> = Result<T, TrackingError>;

/// 追踪错误枚举
#[derive(Error, Debug)]
pub enum TrackingError {
    /// 网格错误
    #[error("网格错误: {0}")]
    Mesh(#[from] MeshError),

    /// 粒子句柄失效
    #[error("粒子句柄失效: {handle}")]
    StaleParticle { handle: String },

    /// 位置不在网格内
    #[error("位置 {position} 不在网格内")]
    OutsideMesh { position: DVec3 },

    /// 粒子引用的网格与云不一致
    #[error("粒子网格句柄不匹配: 期望 {expected}, 实际 {actual}")]
    MeshMismatch { expected: String, actual: String },

    /// 迁移失败
    #[error("迁移失败: {0}")]
    Transfer(#[from] TransferError),

    /// 进程间通信失败
    #[error("通信失败: {message}")]
    Communication { message: String },

    /// 检查点记录无效
    #[error("检查点记录 {index} 无效: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// 检查点序列化错误
    #[error("检查点序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO 错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackingError {
    pub fn stale_particle(handle: impl std::fmt::Debug) -> Self {
        Self::StaleParticle {
            handle: format!("{:?}", handle),
        }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
        }
    }

    pub fn invalid_record(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            index,
            reason: reason.into(),
        }
    }
}

/// 单个粒子的迁移错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    /// 本地没有与发送方相邻的处理器边界
    #[error("进程 {from_process} 发来的粒子找不到对应的处理器边界")]
    NoProcessorPatch { from_process: usize },

    /// 边界局部面索引越界
    #[error("边界面索引 {patch_face} 超出处理器边界大小 {size}")]
    PatchFaceOutOfRange { patch_face: usize, size: usize },

    /// 面点数不一致（分区不匹配）
    #[error("面 {face} 点数不匹配: 发送方 {expected}, 本地 {actual}")]
    FaceSizeMismatch {
        face: usize,
        expected: usize,
        actual: usize,
    },

    /// 四面体点索引越界
    #[error("四面体点索引 {tet_pt} 超出面点数 {face_size}")]
    TetPointOutOfRange { tet_pt: usize, face_size: usize },

    /// 目标进程不存在
    #[error("目标进程 {to_process} 超出进程数 {n_procs}")]
    UnknownProcess { to_process: usize, n_procs: usize },

    /// 粒子不在处理器边界面上
    #[error("粒子不在处理器边界面上")]
    NotOnProcessorFace,

    /// 缓冲区截断
    #[error("迁移缓冲区截断: 需要 {needed} 字节, 剩余 {available}")]
    Truncated { needed: usize, available: usize },
}

/// 转换到 Foundation 层错误
impl From<TrackingError> for MhError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::Mesh(e) => e.into(),
            TrackingError::StaleParticle { .. } => MhError::stale_handle("particle"),
            TrackingError::Transfer(e) => e.into(),
            TrackingError::Io(e) => e.into(),
            TrackingError::Serialization(e) => e.into(),
            other => MhError::internal(other.to_string()),
        }
    }
}

impl From<TransferError> for MhError {
    fn from(err: TransferError) -> Self {
        let from_process = match err {
            TransferError::NoProcessorPatch { from_process } => from_process,
            _ => usize::MAX,
        };
        MhError::transfer(from_process, err.to_string())
    }
}
