//! 类型专属的元数据头

use std::borrow::Cow;

use crate::page_store::Pod;
use crate::PageId;

pub const MAX_LINK_PATH: usize = 4096;

/// 目录头
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DirMeta {
    /// 子项个数，不含 `.` 与 `..`
    pub total_children: i64,
    /// B 树根页
    pub root_entry_page: PageId,
    /// 回收页链表头，链接字段为 `gc_list_next`
    pub entry_page_gc_list: PageId,
    /// 遍历链表头，串起所有在用的 B 树页
    pub tree_walk_list_head: PageId,
    pub generation: u64,
}

/// 普通文件头
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct FileMeta {
    /// 直接指向第 0 个块项页
    pub direct: PageId,
    pub single_indirect: PageId,
    pub double_indirect: PageId,
    pub triple_indirect: PageId,
    pub quadruple_indirect: PageId,
    pub generation: u64,
}

/// 符号链接头
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SymlinkMeta {
    pub link_len: u64,
    pub generation: u64,
    link_path: [u8; MAX_LINK_PATH],
}

unsafe impl Pod for DirMeta {}
unsafe impl Pod for FileMeta {}
unsafe impl Pod for SymlinkMeta {}

impl SymlinkMeta {
    /// 目标超过 [`MAX_LINK_PATH`] 时返回 `None`
    pub fn new(target: &str) -> Option<Self> {
        let bytes = target.as_bytes();
        if bytes.len() > MAX_LINK_PATH {
            return None;
        }
        let mut link = Self::zeroed();
        link.link_len = bytes.len() as u64;
        link.link_path[..bytes.len()].copy_from_slice(bytes);

        Some(link)
    }

    pub fn target(&self) -> Cow<'_, str> {
        let len = (self.link_len as usize).min(MAX_LINK_PATH);
        String::from_utf8_lossy(&self.link_path[..len])
    }
}
