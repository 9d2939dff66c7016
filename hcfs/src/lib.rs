//! HCFS 元数据与索引核心
//!
//! 每个 inode 对应一个元数据文件，文件内以字节偏移为页号组织各类页：
//! 目录用 B 树存放子项，普通文件用多级间接索引定位块项页。

/* 自上而下 */

// 命名空间操作：建立、删除目录项与 inode
mod ops;

// 文件系统上下文：持有配置、元数据缓存、超级块与全局计数
mod fs;

// inode 生命周期：标记删除、实际删除、崩溃后续删
mod lifecycle;

// 内核查找计数
mod lookup;

// 缓存用量统计，为缓存替换排序
mod cache_usage;

// 目录操作与目录 B 树
mod dir;
mod btree;

// 多级间接块索引
mod indirect;

// 超级块：inode 分配与回收
mod super_block;

// 全局容量计数
mod system;

// 元数据缓存：每 inode 一把锁
mod meta_cache;

// 磁盘数据结构层
pub mod layout;

// 页存储层：元数据文件上的定长页读写
mod page_store;

mod config;
pub mod xattr;

pub use self::{
    cache_usage::{build_cache_usage, compare_cache_usage, CacheUsageNode, CacheUsageTable},
    config::HcfsConfig,
    dir::{
        change_dir_entry_inode, change_parent_inode, dir_add_entry, dir_remove_entry,
        init_dir_page, lookup_dir, read_dir,
    },
    fs::Hcfs,
    indirect::{check_page_level, create_page, seek_page, seek_page2, PageLevel},
    lookup::LookupTable,
    meta_cache::{MetaCache, MetaCacheEntry, MetaCacheGuard},
    page_store::{PageId, PageStore, Pod},
    super_block::SuperBlock,
    system::{HcfsSystem, SystemData},
};
pub use vfs::{DirEntry, DirEntryType, Error, Result};

/// 目录页可容纳的最多目录项
pub const MAX_DIR_ENTRIES_PER_PAGE: usize = 100;
/// 非根目录页至少保留的目录项，低于等于此值时删除路径会重平衡
pub const MIN_DIR_ENTRIES_PER_PAGE: usize = 30;
/// 间接索引页的指针个数
pub const POINTERS_PER_PAGE: u64 = 1024;
/// 块项页的块项个数
pub const MAX_BLOCK_ENTRIES_PER_PAGE: u64 = 100;
pub const MAX_FILENAME_LEN: usize = 255;
/// 单个数据块的最大字节数
pub const MAX_BLOCK_SIZE: u64 = 2 * 1024 * 1024;
/// 元数据与数据块目录的分片数
pub const NUMSUBDIR: u64 = 1000;
/// 缓存用量哈希表的桶数
pub const CACHE_USAGE_NUM_ENTRIES: usize = 65536;
/// 待回收 inode 数量达到此值才批量回收
pub const RECLAIM_TRIGGER: u64 = 10000;
pub const ROOT_INODE: u64 = 1;
