// crates/mh_config/src/lib.rs

//! MariHydro 粒子追踪配置层
//!
//! 以 JSON 描述追踪容差、边界交互与物理模型，并据此构建追踪器、
//! 边界分派器、拖曳力模型与波浪叠加。
//!
//! # 模块概览
//!
//! - [`tracking_config`]: TrackingConfig 及其子配置
//! - [`error`]: 配置错误类型
//!
//! # 设计原则
//!
//! 1. **全部有默认值**: 空 JSON 对象即是合法配置
//! 2. **名称错误致命**: 未注册的模型名称在验证阶段报告，并列出有效名称
//! 3. **字典透传**: 模型参数以字典形式交给各模型族的注册表解析

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod tracking_config;

// 重导出核心类型
pub use error::ConfigError;
pub use tracking_config::{PatchInteractionConfig, TrackingConfig, TrackingToleranceConfig, WavesConfig};
