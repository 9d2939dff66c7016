//! # 缓存用量统计
//!
//! 扫描数据块目录，按 inode 汇总干净与脏的缓存字节数，
//! 存入以 `ino % 桶数` 分桶的表，桶内按 [`compare_cache_usage`] 排序，
//! 排在前面的先被替换。
//!
//! 表是显式的上下文对象，由缓存替换方持有并传入 [`build_cache_usage`]。

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;

use crate::config::{parse_block_name, HcfsConfig};
use crate::system::HcfsSystem;
use crate::{xattr, Error, Result, CACHE_USAGE_NUM_ENTRIES, MAX_BLOCK_SIZE, NUMSUBDIR};

/// 访问时间差在此范围内视为相同
const TIME_TOLERANCE: i64 = 60;
/// 替换时首轮跳过最近这段时间内碰过的 inode
const RECENT_INTERVAL: i64 = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsageNode {
    pub ino: u64,
    pub last_access_time: i64,
    pub last_mod_time: i64,
    pub clean_cache_size: i64,
    pub dirty_cache_size: i64,
}

impl CacheUsageNode {
    pub fn new(ino: u64) -> Self {
        Self {
            ino,
            ..Default::default()
        }
    }

    #[inline]
    pub fn last_touch(&self) -> i64 {
        self.last_access_time.max(self.last_mod_time)
    }
}

/// 替换优先级：`Less` 表示 `a` 应先于 `b` 被替换
///
/// 1. 没有干净缓存的排在有干净缓存的后面
/// 2. 最近碰过的时间早的在前，差 60 秒以内视为相同
/// 3. 干净缓存多的在前，差一个最大块以内视为相同
/// 4. 脏缓存少的在前
pub fn compare_cache_usage(a: &CacheUsageNode, b: &CacheUsageNode) -> Ordering {
    match (a.clean_cache_size == 0, b.clean_cache_size == 0) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    let (ta, tb) = (a.last_touch(), b.last_touch());
    if ta > tb + TIME_TOLERANCE {
        return Ordering::Greater;
    }
    if tb > ta + TIME_TOLERANCE {
        return Ordering::Less;
    }

    let band = MAX_BLOCK_SIZE as i64;
    if a.clean_cache_size > b.clean_cache_size + band {
        return Ordering::Less;
    }
    if b.clean_cache_size > a.clean_cache_size + band {
        return Ordering::Greater;
    }

    a.dirty_cache_size.cmp(&b.dirty_cache_size)
}

#[derive(Debug)]
pub struct CacheUsageTable {
    buckets: Vec<Vec<CacheUsageNode>>,
    /// 非空桶个数
    nonempty: usize,
    /// 轮转替换的游标
    cursor: usize,
}

impl Default for CacheUsageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheUsageTable {
    pub fn new() -> Self {
        Self::with_buckets(CACHE_USAGE_NUM_ENTRIES)
    }

    pub fn with_buckets(num: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); num.max(1)],
            nonempty: 0,
            cursor: 0,
        }
    }

    pub fn reset(&mut self) {
        self.buckets.iter_mut().for_each(Vec::clear);
        self.nonempty = 0;
        self.cursor = 0;
    }

    #[inline]
    fn bucket_of(&self, ino: u64) -> usize {
        (ino % self.buckets.len() as u64) as usize
    }

    #[inline]
    pub fn nonempty_buckets(&self) -> usize {
        self.nonempty
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nonempty == 0
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn get(&self, ino: u64) -> Option<&CacheUsageNode> {
        self.buckets[self.bucket_of(ino)]
            .iter()
            .find(|node| node.ino == ino)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheUsageNode> {
        self.buckets.iter().flatten()
    }

    /// 插入到桶内第一个排在它后面的节点之前
    pub fn insert(&mut self, node: CacheUsageNode) -> Result<()> {
        let index = self.bucket_of(node.ino);
        let bucket = &mut self.buckets[index];
        bucket.try_reserve(1).map_err(|_| {
            log::error!("no memory for cache usage of inode {}", node.ino);
            Error::OutOfMemory
        })?;

        let pos = bucket
            .iter()
            .position(|cur| compare_cache_usage(&node, cur).is_lt())
            .unwrap_or(bucket.len());
        bucket.insert(pos, node);
        if bucket.len() == 1 {
            self.nonempty += 1;
        }

        Ok(())
    }

    /// 把 inode 的节点从表中取出
    pub fn return_cache_usage_node(&mut self, ino: u64) -> Option<CacheUsageNode> {
        let index = self.bucket_of(ino);
        let bucket = &mut self.buckets[index];
        let pos = bucket.iter().position(|node| node.ino == ino)?;
        let node = bucket.remove(pos);
        if bucket.is_empty() {
            self.nonempty -= 1;
        }

        Some(node)
    }

    /// 从游标处轮转各桶的首节点，取出下一个替换对象
    ///
    /// 首轮跳过最近碰过的 inode，都不合适时第二轮放宽；
    /// 返回 `None` 时调用者应重建表。
    pub fn next_victim(&mut self, now: i64) -> Option<CacheUsageNode> {
        if self.is_empty() {
            return None;
        }

        let len = self.buckets.len();
        for skip_recent in [true, false] {
            for step in 0..len {
                let index = (self.cursor + step) % len;
                let Some(head) = self.buckets[index].first() else {
                    continue;
                };
                if head.clean_cache_size <= 0 {
                    continue;
                }
                if skip_recent && now - head.last_touch() < RECENT_INTERVAL {
                    continue;
                }
                let ino = head.ino;
                self.cursor = (index + 1) % len;
                return self.return_cache_usage_node(ino);
            }
        }

        None
    }
}

/// 扫描数据块目录重建缓存用量表
///
/// 单个分片或数据块出错时记录后跳过；系统关闭时提前结束。
pub fn build_cache_usage(
    table: &mut CacheUsageTable,
    config: &HcfsConfig,
    system: &HcfsSystem,
) -> Result<()> {
    table.reset();

    for shard in 0..NUMSUBDIR {
        if system.is_going_down() {
            log::info!("cache usage scan stops at shard {shard} for shutdown");
            break;
        }

        let dir = config.block_shard(shard);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                log::warn!("skip block shard {dir:?}: {err}");
                continue;
            }
        };

        for dirent in entries {
            let dirent = match dirent {
                Ok(dirent) => dirent,
                Err(err) => {
                    log::warn!("skip entry in {dir:?}: {err}");
                    continue;
                }
            };
            let name = dirent.file_name();
            let Some((ino, _)) = name.to_str().and_then(parse_block_name) else {
                continue;
            };
            let path = dirent.path();
            let meta = match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(err) => {
                    log::warn!("cannot stat block {path:?}: {err}");
                    continue;
                }
            };

            let mut node = table
                .return_cache_usage_node(ino)
                .unwrap_or_else(|| CacheUsageNode::new(ino));
            node.last_access_time = node.last_access_time.max(meta.atime());
            node.last_mod_time = node.last_mod_time.max(meta.mtime());
            match xattr::get_dirty_status(&path) {
                Ok(Some(true)) => node.dirty_cache_size += meta.len() as i64,
                Ok(Some(false)) => node.clean_cache_size += meta.len() as i64,
                Ok(None) => {}
                Err(err) => log::warn!("cannot read dirty tag of {path:?}: {err}"),
            }
            table.insert(node)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(ino: u64, touch: i64, clean: i64, dirty: i64) -> CacheUsageNode {
        CacheUsageNode {
            ino,
            last_access_time: touch,
            last_mod_time: touch - 5,
            clean_cache_size: clean,
            dirty_cache_size: dirty,
        }
    }

    #[test]
    fn antisymmetry() {
        let mb = MAX_BLOCK_SIZE as i64;
        let nodes = [
            node(1, 1000, 0, 0),
            node(2, 1000, 0, 4096),
            node(3, 1000, mb, 0),
            node(4, 1030, mb, 10),
            node(5, 2000, mb, 0),
            node(6, 1000, 5 * mb, 0),
            node(7, 100, 1, 1),
        ];
        for a in &nodes {
            for b in &nodes {
                assert_eq!(
                    compare_cache_usage(a, b),
                    compare_cache_usage(b, a).reverse(),
                    "{a:?} vs {b:?}"
                );
            }
        }
    }

    #[test]
    fn zero_clean_goes_last() {
        let all_dirty = node(1, 0, 0, 0);
        let fresh = node(2, i64::MAX / 2, 1, i64::MAX / 2);
        assert_eq!(Ordering::Greater, compare_cache_usage(&all_dirty, &fresh));
        assert_eq!(Ordering::Less, compare_cache_usage(&fresh, &all_dirty));
    }

    #[test]
    fn ranking() {
        let mb = MAX_BLOCK_SIZE as i64;
        // 时间差超出容差，早的在前
        assert!(compare_cache_usage(&node(1, 100, mb, 0), &node(2, 200, 9 * mb, 0)).is_lt());
        // 时间相近时干净缓存多的在前
        assert!(compare_cache_usage(&node(1, 100, 4 * mb, 0), &node(2, 130, mb, 0)).is_lt());
        // 干净缓存相近时脏缓存少的在前
        assert!(compare_cache_usage(&node(1, 100, mb, 9), &node(2, 100, mb + 1, 3)).is_gt());
        assert!(compare_cache_usage(&node(1, 100, mb, 3), &node(2, 100, mb, 3)).is_eq());
    }

    #[test]
    fn bucket_order_and_victims() {
        let mb = MAX_BLOCK_SIZE as i64;
        let mut table = CacheUsageTable::with_buckets(4);
        table.insert(node(1, 1000, 0, mb)).unwrap();
        table.insert(node(5, 1000, mb, 0)).unwrap();
        table.insert(node(9, 500, mb, 0)).unwrap();
        table.insert(node(2, 9_900, mb, 0)).unwrap();
        assert_eq!(2, table.nonempty_buckets());
        assert_eq!(4, table.len());

        let order: Vec<_> = table.iter().map(|node| node.ino).collect();
        assert_eq!(vec![9, 5, 1, 2], order);

        // 第一轮跳过最近碰过的 inode 2
        assert_eq!(9, table.next_victim(10_000).unwrap().ino);
        assert_eq!(5, table.next_victim(10_000).unwrap().ino);
        assert_eq!(2, table.next_victim(10_000).unwrap().ino);
        // inode 1 没有干净缓存，不会被选中
        assert!(table.next_victim(10_000).is_none());
        assert_eq!(1, table.nonempty_buckets());
        assert!(table.return_cache_usage_node(1).is_some());
        assert!(table.is_empty());
    }
}
