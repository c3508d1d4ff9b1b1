// marihydro\crates\mh_foundation\src\registry.rs

//! 按名称构造的模型注册表
//!
//! 物理模型族（拖曳力、波浪、边界交互）通过字典中的 `type` 键选择实现。
//! 注册表在初始化时显式、按顺序填充，不依赖隐式的加载顺序。
//!
//! 查找失败是唯一预期的不可恢复配置错误：返回
//! [`MhError::UnknownModel`]，并列出全部已注册名称（排序后）。
//!
//! # 示例
//!
//! ```
//! use mh_foundation::registry::{Dictionary, ModelRegistry};
//! use mh_foundation::MhResult;
//!
//! trait Shape: Send + Sync {
//!     fn area(&self) -> f64;
//! }
//! struct Square(f64);
//! impl Shape for Square {
//!     fn area(&self) -> f64 { self.0 * self.0 }
//! }
//!
//! fn square(dict: &Dictionary) -> MhResult<Box<dyn Shape>> {
//!     let side = mh_foundation::registry::lookup_f64_or(dict, "side", 1.0)?;
//!     Ok(Box::new(Square(side)))
//! }
//!
//! let mut registry: ModelRegistry<dyn Shape> = ModelRegistry::new("shape");
//! registry.register("square", square);
//!
//! let dict = serde_json::json!({ "type": "square", "side": 2.0 });
//! let shape = registry.new_model(dict.as_object().unwrap()).unwrap();
//! assert_eq!(shape.area(), 4.0);
//!
//! let bad = serde_json::json!({ "type": "circle" });
//! assert!(registry.new_model(bad.as_object().unwrap()).is_err());
//! ```

use crate::error::{MhError, MhResult};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// 模型字典（JSON 对象）
pub type Dictionary = serde_json::Map<String, Value>;

/// 模型构造函数
pub type Constructor<T> = fn(&Dictionary) -> MhResult<Box<T>>;

/// 字典中选择实现的键
pub const TYPE_KEY: &str = "type";

/// 名称到构造函数的注册表
pub struct ModelRegistry<T: ?Sized> {
    /// 模型族名称，用于诊断信息
    family: String,
    /// 按注册顺序保存的构造函数
    entries: Vec<(String, Constructor<T>)>,
    /// 名称到索引的映射
    name_index: HashMap<String, usize>,
}

impl<T: ?Sized> ModelRegistry<T> {
    /// 创建空注册表
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            entries: Vec::new(),
            name_index: HashMap::new(),
        }
    }

    /// 模型族名称
    pub fn family(&self) -> &str {
        &self.family
    }

    /// 注册构造函数
    ///
    /// 同名重复注册时覆盖旧的构造函数，保留原注册位置。
    pub fn register(&mut self, name: impl Into<String>, constructor: Constructor<T>) -> &mut Self {
        let name = name.into();
        match self.name_index.get(&name) {
            Some(&idx) => {
                log::debug!("{} '{}' 重复注册，覆盖旧构造函数", self.family, name);
                self.entries[idx].1 = constructor;
            }
            None => {
                self.name_index.insert(name.clone(), self.entries.len());
                self.entries.push((name, constructor));
            }
        }
        self
    }

    /// 是否已注册
    pub fn contains(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    /// 已注册数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按注册顺序列出名称
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// 排序后的名称列表
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    /// 按名称构造模型
    pub fn construct(&self, name: &str, dict: &Dictionary) -> MhResult<Box<T>> {
        match self.name_index.get(name) {
            Some(&idx) => (self.entries[idx].1)(dict),
            None => {
                let valid = self.sorted_names();
                log::error!(
                    "Unknown {} type {}. Valid {} types are: {:?}",
                    self.family,
                    name,
                    self.family,
                    valid
                );
                Err(MhError::unknown_model(&self.family, name, valid))
            }
        }
    }

    /// 读取字典中的 `type` 键并构造模型
    pub fn new_model(&self, dict: &Dictionary) -> MhResult<Box<T>> {
        let name = lookup_str(dict, TYPE_KEY)?;
        self.construct(name, dict)
    }
}

impl<T: ?Sized> fmt::Debug for ModelRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("family", &self.family)
            .field("names", &self.names())
            .finish()
    }
}

// ============================================================================
// 字典读取辅助
// ============================================================================

/// 读取必需的字符串
pub fn lookup_str<'a>(dict: &'a Dictionary, key: &str) -> MhResult<&'a str> {
    match dict.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(MhError::invalid_config(key, other.to_string(), "期望字符串")),
        None => Err(MhError::missing_config(key)),
    }
}

/// 读取必需的浮点数
pub fn lookup_f64(dict: &Dictionary, key: &str) -> MhResult<f64> {
    match dict.get(key) {
        Some(v) => v
            .as_f64()
            .ok_or_else(|| MhError::invalid_config(key, v.to_string(), "期望数值")),
        None => Err(MhError::missing_config(key)),
    }
}

/// 读取可选浮点数，缺省时返回默认值
pub fn lookup_f64_or(dict: &Dictionary, key: &str, default: f64) -> MhResult<f64> {
    if dict.contains_key(key) {
        lookup_f64(dict, key)
    } else {
        Ok(default)
    }
}

/// 读取必需的三维向量（长度为 3 的数组）
pub fn lookup_vec3(dict: &Dictionary, key: &str) -> MhResult<[f64; 3]> {
    let value = dict.get(key).ok_or_else(|| MhError::missing_config(key))?;
    let invalid = || MhError::invalid_config(key, value.to_string(), "期望长度为 3 的数值数组");
    let items = value.as_array().ok_or_else(invalid)?;
    if items.len() != 3 {
        return Err(invalid());
    }
    let mut out = [0.0; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64().ok_or_else(invalid)?;
    }
    Ok(out)
}

// ============================================================================
// 测试
// ============================================================================
