//! 内核查找计数
//!
//! 最后一个目录项删除后，内核可能仍持有该 inode 的引用，
//! 真正的删除要等查找计数归零。

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct LookupCount {
    count: u64,
    to_delete: bool,
    mode: u32,
}

#[derive(Debug, Default)]
pub struct LookupTable {
    counts: Mutex<HashMap<u64, LookupCount>>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内核每次查找到 inode 时调用
    pub fn increase(&self, ino: u64, amount: u64, mode: u32) {
        self.counts
            .lock()
            .entry(ino)
            .and_modify(|lookup| lookup.count += amount)
            .or_insert(LookupCount {
                count: amount,
                to_delete: false,
                mode,
            });
    }

    /// 减少计数；归零且已标记删除时返回其模式，调用者负责实际删除
    pub fn decrease(&self, ino: u64, amount: u64) -> Option<u32> {
        let mut counts = self.counts.lock();
        let lookup = counts.get_mut(&ino)?;
        lookup.count = lookup.count.saturating_sub(amount);
        if lookup.count > 0 {
            return None;
        }
        let lookup = counts.remove(&ino)?;

        lookup.to_delete.then_some(lookup.mode)
    }

    /// 标记待删除，返回该 inode 是否仍被内核引用
    pub fn mark_delete(&self, ino: u64) -> bool {
        match self.counts.lock().get_mut(&ino) {
            Some(lookup) => {
                lookup.to_delete = true;
                true
            }
            None => false,
        }
    }

    pub fn count(&self, ino: u64) -> u64 {
        self.counts.lock().get(&ino).map_or(0, |lookup| lookup.count)
    }
}
