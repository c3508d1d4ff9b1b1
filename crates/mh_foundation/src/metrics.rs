// marihydro\crates\mh_foundation\src\metrics.rs
//! 基础原子计数器
//!
//! 提供轻量级的原子计数功能：粒子编号分配、迁移统计等均基于此实现。

use std::sync::atomic::{AtomicU64, Ordering};

/// 原子计数器（无锁）
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// 创建零值计数器
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// 以指定初值创建计数器
    pub const fn starting_at(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// 增加计数
    #[inline]
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// 增加指定值
    #[inline]
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// 递增并返回递增前的值
    ///
    /// 到达 `u64::MAX` 后回绕到 0。
    #[inline]
    pub fn fetch_inc(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// 取当前值与 `value` 的较大者，返回更新前的值
    #[inline]
    pub fn fetch_max(&self, value: u64) -> u64 {
        self.0.fetch_max(value, Ordering::Relaxed)
    }

    /// 获取当前值
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// 设置为指定值
    #[inline]
    pub fn store(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }

    /// 重置为零
    #[inline]
    pub fn reset(&self) {
        self.store(0);
    }
}

// ============================================================================
// 测试
// ============================================================================
