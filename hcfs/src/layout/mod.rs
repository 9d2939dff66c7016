//! # 磁盘数据结构层
//!
//! 元数据文件布局：
//!
//! ```text
//! | HcfsStat | DirMeta / FileMeta / SymlinkMeta | 页 ... |
//! ```
//!
//! 页之间只以 [`PageId`](crate::PageId) 互相引用。

mod block_entry;
mod dir_entry;
mod dir_page;
mod meta;
mod ptr_page;
mod stat;
mod super_block;

pub use self::{
    block_entry::{BlockEntry, BlockEntryPage, BlockStatus},
    dir_entry::DirEntry,
    dir_page::DirEntryPage,
    meta::{DirMeta, FileMeta, SymlinkMeta, MAX_LINK_PATH},
    ptr_page::PtrEntryPage,
    stat::{HcfsStat, TimeFlag, HCFS_MAGIC},
    super_block::{SbStatus, SuperBlockEntry, SuperBlockHead},
};

use std::mem;

use crate::PageId;

pub const STAT_POS: PageId = PageId::NULL;
/// 类型专属头紧跟在 stat 之后
pub const TYPED_META_POS: PageId = PageId::new(mem::size_of::<HcfsStat>() as u64);
