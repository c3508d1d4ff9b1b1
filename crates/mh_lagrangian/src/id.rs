// crates/mh_lagrangian/src/id.rs

//! 粒子编号分配器
//!
//! 进程内单调递增的原子计数器，进程启动时从 0 开始。
//! 通过构造参数注入（`Arc<IdAllocator>`），不使用全局单例。
//! 耗尽后回绕并给出警告：重复编号只影响事后轨迹重建，不影响追踪正确性。

use mh_foundation::metrics::Counter;

/// 粒子编号分配器
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: Counter,
}

impl IdAllocator {
    /// 从 0 开始分配
    pub const fn new() -> Self {
        Self {
            counter: Counter::new(),
        }
    }

    /// 从指定编号开始分配
    pub const fn starting_at(first: u64) -> Self {
        Self {
            counter: Counter::starting_at(first),
        }
    }

    /// 分配新编号（线程安全）
    pub fn next(&self) -> u64 {
        let id = self.counter.fetch_inc();
        if id == u64::MAX {
            log::warn!(
                "Particle counter has overflowed. This might cause problems when \
                 reconstructing particle tracks."
            );
        }
        id
    }

    /// 下一个将分配的编号
    pub fn peek(&self) -> u64 {
        self.counter.get()
    }

    /// 保证之后分配的编号大于 `used`（恢复检查点时使用）
    pub fn reserve_through(&self, used: u64) {
        self.counter.fetch_max(used.saturating_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_strictly_increasing() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next(), 0);
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.peek(), 2);
    }

    #[test]
    fn test_wraps_on_exhaustion() {
        let ids = IdAllocator::starting_at(u64::MAX - 1);
        assert_eq!(ids.next(), u64::MAX - 1);
        assert_eq!(ids.next(), u64::MAX);
        assert_eq!(ids.next(), 0);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let ids = Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..1000).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn test_reserve_through() {
        let ids = IdAllocator::new();
        ids.reserve_through(41);
        assert_eq!(ids.next(), 42);
        ids.reserve_through(10);
        assert_eq!(ids.next(), 43);
    }
}
