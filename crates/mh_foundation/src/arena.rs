// marihydro\crates\mh_foundation\src/arena.rs

//! 带代际验证的泛型 Arena
//!
//! 用于存放生命周期不定的对象（例如拉格朗日粒子）：粒子可能在边界处被吸收、
//! 迁出到其他进程，槽位随后被新粒子复用。旧句柄通过代际号失效，
//! 不会误指向新粒子。
//!
//! # 设计要点
//!
//! - **O(1)**: 插入、删除、访问均为常数时间
//! - **类型安全**: `Idx<Tag>` 通过标记类型区分不同 Arena
//! - **悬垂检测**: 删除后槽位代际号递增，旧句柄返回 `None`
//!
//! # 示例
//!
//! ```
//! use mh_foundation::arena::{Arena, ArenaTag};
//!
//! #[derive(Debug, Clone, Copy)]
//! struct ParticleTag;
//! impl ArenaTag for ParticleTag {}
//!
//! let mut arena: Arena<i32, ParticleTag> = Arena::new();
//! let idx = arena.insert(42);
//! assert_eq!(arena.get(idx), Some(&42));
//!
//! assert_eq!(arena.remove(idx), Some(42));
//! assert_eq!(arena.get(idx), None);
//!
//! // 复用槽位，但旧句柄仍然无效
//! let new_idx = arena.insert(100);
//! assert_eq!(new_idx.index(), idx.index());
//! assert_eq!(arena.get(idx), None);
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

// ============================================================================
// 标记类型
// ============================================================================

/// Arena 标记 trait，用于类型安全地区分不同用途的 Arena
pub trait ArenaTag: 'static + Copy + Send + Sync {}

// ============================================================================
// 索引类型
// ============================================================================

/// 带代际号的类型安全句柄（8 字节）
#[repr(C)]
pub struct Idx<Tag> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> Tag>,
}

impl<Tag> Copy for Idx<Tag> {}

impl<Tag> Clone for Idx<Tag> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tag> PartialEq for Idx<Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<Tag> Eq for Idx<Tag> {}

impl<Tag> Hash for Idx<Tag> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<Tag> fmt::Debug for Idx<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Idx({}@{})", self.index, self.generation)
        } else {
            write!(f, "Idx(INVALID)")
        }
    }
}

impl<Tag> Idx<Tag> {
    /// 无效句柄常量
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: 0,
        _marker: PhantomData,
    };

    #[inline]
    const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// 槽位索引
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// 槽位索引（usize）
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }

    /// 代际号
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// 句柄是否可能有效（仍需 Arena 验证代际）
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.index != u32::MAX && self.generation != 0
    }
}

impl<Tag> Default for Idx<Tag> {
    #[inline]
    fn default() -> Self {
        Self::INVALID
    }
}

// ============================================================================
// Slot 定义
// ============================================================================

#[derive(Debug, Clone)]
enum Slot<T> {
    Occupied { value: T, generation: u32 },
    Vacant { next_free: Option<u32>, generation: u32 },
}

// ============================================================================
// Arena 实现
// ============================================================================

/// 带代际验证的内存池
///
/// 空闲槽位组成单链表；删除时代际号加一（跳过 0），使旧句柄失效。
pub struct Arena<T, Tag: ArenaTag> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
    _marker: PhantomData<Tag>,
}

impl<T, Tag: ArenaTag> Default for Arena<T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tag: ArenaTag> Arena<T, Tag> {
    /// 创建空 Arena
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// 创建指定容量的 Arena
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: None,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// 有效元素数量
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 插入元素并返回句柄
    pub fn insert(&mut self, value: T) -> Idx<Tag> {
        if let Some(free_idx) = self.free_head {
            let slot = &mut self.slots[free_idx as usize];
            if let Slot::Vacant { next_free, generation } = *slot {
                self.free_head = next_free;
                *slot = Slot::Occupied { value, generation };
                self.len += 1;
                return Idx::new(free_idx, generation);
            }
            // 空闲链表指向已占用槽位：放弃链表，追加新槽位
            self.free_head = None;
        }

        let idx = self.slots.len() as u32;
        self.slots.push(Slot::Occupied { value, generation: 1 });
        self.len += 1;
        Idx::new(idx, 1)
    }

    /// 获取不可变引用（代际不匹配时返回 `None`）
    #[inline]
    pub fn get(&self, idx: Idx<Tag>) -> Option<&T> {
        match self.slots.get(idx.as_usize())? {
            Slot::Occupied { value, generation } if *generation == idx.generation => Some(value),
            _ => None,
        }
    }

    /// 获取可变引用（代际不匹配时返回 `None`）
    #[inline]
    pub fn get_mut(&mut self, idx: Idx<Tag>) -> Option<&mut T> {
        match self.slots.get_mut(idx.as_usize())? {
            Slot::Occupied { value, generation } if *generation == idx.generation => Some(value),
            _ => None,
        }
    }

    /// 句柄是否仍然有效
    #[inline]
    pub fn contains(&self, idx: Idx<Tag>) -> bool {
        self.get(idx).is_some()
    }

    /// 删除元素并返回其值
    pub fn remove(&mut self, idx: Idx<Tag>) -> Option<T> {
        let slot_idx = idx.as_usize();
        match self.slots.get(slot_idx) {
            Some(Slot::Occupied { generation, .. }) if *generation == idx.generation => {}
            _ => return None,
        }

        let next_generation = match idx.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        let old = std::mem::replace(
            &mut self.slots[slot_idx],
            Slot::Vacant {
                next_free: self.free_head,
                generation: next_generation,
            },
        );
        self.free_head = Some(idx.index);
        self.len -= 1;

        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// 不可变迭代，按槽位顺序
    pub fn iter(&self) -> impl Iterator<Item = (Idx<Tag>, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied { value, generation } => Some((Idx::new(i as u32, *generation), value)),
            Slot::Vacant { .. } => None,
        })
    }

    /// 可变迭代，按槽位顺序
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Idx<Tag>, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied { value, generation } => {
                    Some((Idx::new(i as u32, *generation), value))
                }
                Slot::Vacant { .. } => None,
            })
    }

    /// 句柄迭代
    pub fn indices(&self) -> impl Iterator<Item = Idx<Tag>> + '_ {
        self.iter().map(|(idx, _)| idx)
    }
}

impl<T: fmt::Debug, Tag: ArenaTag> fmt::Debug for Arena<T, Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T, Tag: ArenaTag> std::ops::Index<Idx<Tag>> for Arena<T, Tag> {
    type Output = T;

    /// # Panics
    ///
    /// 句柄已失效时 panic。
    fn index(&self, idx: Idx<Tag>) -> &Self::Output {
        self.get(idx).expect("Invalid arena index")
    }
}

impl<T, Tag: ArenaTag> std::ops::IndexMut<Idx<Tag>> for Arena<T, Tag> {
    fn index_mut(&mut self, idx: Idx<Tag>) -> &mut Self::Output {
        self.get_mut(idx).expect("Invalid arena index")
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct TestTag;
    impl ArenaTag for TestTag {}

    type TestArena = Arena<i32, TestTag>;

    #[test]
    fn test_insert_get() {
        let mut arena = TestArena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena[a], 1);
        assert_eq!(arena[b], 2);
        assert!(a.is_valid());
        assert!(!Idx::<TestTag>::INVALID.is_valid());
        assert_eq!(arena.get(Idx::INVALID), None);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena = TestArena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Some(1));
        assert_eq!(arena.remove(a), None);

        let b = arena.insert(7);
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&7));
    }

    #[test]
    fn test_iter_skips_removed() {
        let mut arena = TestArena::new();
        let handles: Vec<_> = (0..10).map(|v| arena.insert(v)).collect();
        for h in handles.iter().skip(1).step_by(2) {
            arena.remove(*h);
        }
        assert_eq!(arena.len(), 5);

        let values: Vec<i32> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 4, 6, 8]);

        for (_, v) in arena.iter_mut() {
            *v *= 10;
        }
        let live: Vec<_> = arena.indices().collect();
        assert_eq!(arena[live[1]], 20);
    }

    #[test]
    fn test_debug_lists_live_entries() {
        let mut arena = TestArena::with_capacity(4);
        let a = arena.insert(3);
        let b = arena.insert(4);
        arena.remove(a);
        let text = format!("{arena:?}");
        assert_eq!(text, format!("{{{b:?}: 4}}"));
    }
}
