// marihydro\crates\mh_foundation\src/lib.rs

//! MariHydro Foundation Layer
//!
//! 基础层，提供整个项目共用的基础抽象。
//!
//! # 模块概览
//!
//! - [`arena`]: 带代际验证的泛型 Arena，粒子句柄基于此实现
//! - [`error`]: 统一错误类型
//! - [`metrics`]: 原子计数器
//! - [`registry`]: 按名称构造的模型注册表
//!
//! # 设计原则
//!
//! 1. **最少外部依赖**: 仅依赖 serde_json、thiserror 与 log
//! 2. **类型安全**: 句柄通过标记类型区分
//! 3. **悬垂检测**: 通过代际机制检测已删除元素的访问
//! 4. **配置错误致命**: 未注册的模型名称直接返回错误，不回退默认值
//!
//! # 示例
//!
//! ```
//! use mh_foundation::arena::{Arena, ArenaTag};
//! use mh_foundation::metrics::Counter;
//!
//! #[derive(Debug, Clone, Copy)]
//! struct ItemTag;
//! impl ArenaTag for ItemTag {}
//!
//! let mut arena: Arena<f64, ItemTag> = Arena::new();
//! let idx = arena.insert(42.0);
//! assert_eq!(arena[idx], 42.0);
//!
//! let counter = Counter::new();
//! assert_eq!(counter.fetch_inc(), 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod error;
pub mod metrics;
pub mod registry;

// 重导出常用类型
pub use arena::{Arena, ArenaTag, Idx};
pub use error::{MhError, MhResult};
pub use metrics::Counter;
pub use registry::{Dictionary, ModelRegistry};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::arena::{Arena, ArenaTag, Idx};
    pub use crate::error::{MhError, MhResult};
    pub use crate::metrics::Counter;
    pub use crate::registry::{Dictionary, ModelRegistry};
}
