// crates/mh_mesh/src/error.rs
//! 网格处理错误类型
//!
//! 包含网格拓扑、几何退化、边界与句柄错误定义
//! 所有错误可转换为 `mh_foundation::MhError` 向上传播

use mh_foundation::MhError;
use thiserror::Error;

/// 网格模块结果类型
pub type MeshResult<T> = Result<T, MeshError>;

/// 网格错误枚举
#[derive(Error, Debug)]
pub enum MeshError {
    /// 拓扑错误
    #[error("拓扑错误: {operation} 失败, {details}")]
    InvalidTopology {
        operation: &'static str,
        details: String,
    },

    /// 几何退化（面积或体积过小）
    #[error("几何退化: {entity} {index} 的 {metric} = {value:.3e}")]
    DegenerateGeometry {
        entity: &'static str,
        index: usize,
        metric: &'static str,
        value: f64,
    },

    /// 元素不匹配
    #[error("元素不匹配: {context} 需要 {required} 个, 提供 {provided}")]
    ElementCountMismatch {
        required: usize,
        provided: usize,
        context: String,
    },

    /// 边界未找到
    #[error("边界未找到: {name}")]
    PatchNotFound { name: String },

    /// 网格句柄失效
    #[error("网格句柄失效: {handle}")]
    StaleHandle { handle: String },
}

/// 转换到 Foundation 层错误
impl From<MeshError> for MhError {
    fn from(err: MeshError) -> Self {
        match err {
            MeshError::InvalidTopology { operation, details } => {
                MhError::invalid_mesh(format!("网格拓扑错误 [{}]: {}", operation, details))
            }
            MeshError::DegenerateGeometry { entity, index, metric, value } => MhError::invalid_mesh(
                format!("几何退化 [{} {}, {}={:.3e}]", entity, index, metric, value),
            ),
            MeshError::ElementCountMismatch { required, provided, context: _ } => {
                MhError::size_mismatch("mesh_elements", required, provided)
            }
            MeshError::PatchNotFound { name } => MhError::not_found(format!("边界 {}", name)),
            MeshError::StaleHandle { .. } => MhError::stale_handle("mesh"),
        }
    }
}

/// 便捷构造函数
impl MeshError {
    pub fn invalid_topology(operation: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidTopology {
            operation,
            details: details.into(),
        }
    }

    pub fn degenerate(entity: &'static str, index: usize, metric: &'static str, value: f64) -> Self {
        Self::DegenerateGeometry {
            entity,
            index,
            metric,
            value,
        }
    }

    pub fn element_count_mismatch(required: usize, provided: usize, context: impl Into<String>) -> Self {
        Self::ElementCountMismatch {
            required,
            provided,
            context: context.into(),
        }
    }

    pub fn patch_not_found(name: impl Into<String>) -> Self {
        Self::PatchNotFound { name: name.into() }
    }

    pub fn stale_handle(handle: impl std::fmt::Debug) -> Self {
        Self::StaleHandle {
            handle: format!("{:?}", handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_to_foundation() {
        let mesh_err = MeshError::invalid_topology("validate", "non-manifold");
        let foundation_err: MhError = mesh_err.into();
        assert!(foundation_err.to_string().contains("网格拓扑错误"));
    }

    #[test]
    fn test_count_mismatch_maps_to_size_mismatch() {
        let err: MhError = MeshError::element_count_mismatch(8, 7, "points").into();
        assert!(matches!(err, MhError::SizeMismatch { expected: 8, actual: 7, .. }));
    }
}
