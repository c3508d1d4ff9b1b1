// marihydro\crates\mh_foundation\src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `MhError` 枚举和 `MhResult` 类型别名，用于整个项目的错误处理。
//!
//! # 错误分级
//!
//! 1. **配置错误**（`UnknownModel` / `Config` / `InvalidConfig`）：初始化阶段致命，直接中止
//! 2. **拓扑/数据错误**：由上层决定是否局部丢弃（例如单个粒子的迁移失败）
//! 3. **内部错误**：不变量被破坏
//!
//! # 示例
//!
//! ```
//! use mh_foundation::error::{MhError, MhResult};
//!
//! fn select(name: &str) -> MhResult<()> {
//!     Err(MhError::unknown_model("dragModel", name, vec!["Stokes".into()]))
//! }
//!
//! let err = select("Foo").unwrap_err();
//! assert!(err.to_string().contains("Stokes"));
//! ```

use thiserror::Error;

/// 统一结果类型
pub type MhResult<T> = Result<T, MhError>;

/// MariHydro 错误类型
#[derive(Error, Debug)]
pub enum MhError {
    // ========================================================================
    // 输入与数据错误
    // ========================================================================

    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 数据超出范围
    #[error("数据超出范围: {field}={value}, 期望范围=[{min}, {max}]")]
    OutOfRange {
        /// 字段名
        field: &'static str,
        /// 实际值
        value: f64,
        /// 最小允许值
        min: f64,
        /// 最大允许值
        max: f64,
    },

    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 句柄失效（元素已删除或代际不匹配）
    #[error("无效句柄: {kind} 已被删除或句柄过期")]
    StaleHandle {
        /// 句柄类别
        kind: &'static str,
    },

    /// 无效网格拓扑
    #[error("无效的网格拓扑: {message}")]
    InvalidMesh {
        /// 具体错误信息
        message: String,
    },

    // ========================================================================
    // 配置错误
    // ========================================================================

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 缺少配置项
    #[error("缺少必需的配置项: {key}")]
    MissingConfig {
        /// 配置键名
        key: String,
    },

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 未注册的模型类型
    ///
    /// 致命配置错误：列出全部已注册的有效名称，绝不静默回退到默认模型。
    #[error("未知的 {family} 类型 '{name}'\n\n有效的 {family} 类型: {valid:?}")]
    UnknownModel {
        /// 模型族名称（如 dragModel、waveModel）
        family: String,
        /// 请求的类型名
        name: String,
        /// 已注册的类型名（已排序）
        valid: Vec<String>,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 序列化失败原因
        message: String,
    },

    // ========================================================================
    // 运行期错误
    // ========================================================================

    /// 跨进程迁移失败
    #[error("粒子迁移失败 (来自进程 {from_process}): {message}")]
    Transfer {
        /// 发送方进程号
        from_process: usize,
        /// 失败原因
        message: String,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },

    /// 资源未找到
    #[error("资源未找到: {resource}")]
    NotFound {
        /// 资源名称
        resource: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl MhError {
    /// 从IO错误创建
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            source: None,
        }
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 数据超出范围
    pub fn out_of_range(field: &'static str, value: f64, min: f64, max: f64) -> Self {
        Self::OutOfRange {
            field,
            value,
            min,
            max,
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 句柄失效
    pub fn stale_handle(kind: &'static str) -> Self {
        Self::StaleHandle { kind }
    }

    /// 无效网格
    pub fn invalid_mesh(message: impl Into<String>) -> Self {
        Self::InvalidMesh {
            message: message.into(),
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 缺少配置
    pub fn missing_config(key: impl Into<String>) -> Self {
        Self::MissingConfig { key: key.into() }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 未注册的模型类型
    pub fn unknown_model(
        family: impl Into<String>,
        name: impl Into<String>,
        valid: Vec<String>,
    ) -> Self {
        Self::UnknownModel {
            family: family.into(),
            name: name.into(),
            valid,
        }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 迁移失败
    pub fn transfer(from_process: usize, message: impl Into<String>) -> Self {
        Self::Transfer {
            from_process,
            message: message.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 资源未找到
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 是否为致命的配置类错误
    #[inline]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::MissingConfig { .. }
                | Self::InvalidConfig { .. }
                | Self::UnknownModel { .. }
        )
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl MhError {
    /// 检查值是否在范围内
    #[inline]
    pub fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> MhResult<()> {
        if !(min..=max).contains(&value) {
            Err(Self::out_of_range(field, value, min, max))
        } else {
            Ok(())
        }
    }
}

// ========================================================================
// 标准库错误转换
// ========================================================================

impl From<std::io::Error> for MhError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MhError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

// ========================================================================
// 测试
// ========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_lists_valid_names() {
        let err = MhError::unknown_model(
            "dragModel",
            "Foo",
            vec!["SchillerNaumann".into(), "Stokes".into()],
        );
        let msg = err.to_string();
        assert!(msg.contains("dragModel"));
        assert!(msg.contains("'Foo'"));
        assert!(msg.contains("SchillerNaumann"));
        assert!(msg.contains("Stokes"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_transfer_is_not_config_error() {
        let err = MhError::transfer(3, "找不到匹配的处理器边界");
        assert!(err.to_string().contains('3'));
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_check_range() {
        assert!(MhError::check_range("fraction", 0.5, 0.0, 1.0).is_ok());
        assert!(MhError::check_range("fraction", 1.5, 0.0, 1.0).is_err());
        assert!(MhError::check_range("fraction", f64::NAN, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let mh_err: MhError = io_err.into();
        assert!(matches!(mh_err, MhError::Io { .. }));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let mh_err: MhError = json_err.into();
        assert!(matches!(mh_err, MhError::Serialization { .. }));
    }
}
