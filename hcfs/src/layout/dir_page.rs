//! 目录 B 树的节点页
//!
//! 页内目录项按名字有序，`child_page_pos[i]` 指向名字小于第 i 项的子树，
//! 叶子页的所有子指针为空。
//!
//! `tree_walk_prev/next` 与 B 树形状无关，把目录所有在用页串成一条双向链表，
//! 列目录时只需沿链表读页。

use crate::layout::DirEntry;
use crate::page_store::Pod;
use crate::{PageId, MAX_DIR_ENTRIES_PER_PAGE};

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DirEntryPage {
    num_entries: u64,
    pub dir_entries: [DirEntry; MAX_DIR_ENTRIES_PER_PAGE],
    pub child_page_pos: [PageId; MAX_DIR_ENTRIES_PER_PAGE + 1],
    pub this_page_pos: PageId,
    pub parent_page_pos: PageId,
    pub gc_list_next: PageId,
    pub tree_walk_next: PageId,
    pub tree_walk_prev: PageId,
}

unsafe impl Pod for DirEntryPage {}

impl DirEntryPage {
    #[inline]
    pub fn len(&self) -> usize {
        (self.num_entries as usize).min(MAX_DIR_ENTRIES_PER_PAGE)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == MAX_DIR_ENTRIES_PER_PAGE
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.child_page_pos[0].is_null()
    }

    /// 在用的目录项
    #[inline]
    pub fn entries(&self) -> &[DirEntry] {
        &self.dir_entries[..self.len()]
    }

    /// 在用的子指针，比目录项多一个
    #[inline]
    pub fn children(&self) -> &[PageId] {
        &self.child_page_pos[..=self.len()]
    }

    /// 二分查找：命中返回 `Ok(下标)`，否则返回 `Err(应下降的子树/插入位置)`
    pub fn search(&self, name: &[u8]) -> Result<usize, usize> {
        self.entries()
            .binary_search_by(|entry| entry.cmp_name(name))
    }

    /// 用给定内容重写目录项与子指针，其余槽位清零
    ///
    /// `entries.len()` 不得超过页容量，`children` 须比 `entries` 多一个，
    /// 叶子页传入全空的子指针。
    pub fn fill(&mut self, entries: &[DirEntry], children: &[PageId]) {
        debug_assert!(entries.len() <= MAX_DIR_ENTRIES_PER_PAGE);
        debug_assert_eq!(entries.len() + 1, children.len());

        self.dir_entries[..entries.len()].copy_from_slice(entries);
        self.dir_entries[entries.len()..].fill(DirEntry::zeroed());
        self.child_page_pos[..children.len()].copy_from_slice(children);
        self.child_page_pos[children.len()..].fill(PageId::NULL);
        self.num_entries = entries.len() as u64;
    }

    /// 在 `index` 处插入目录项，`right_child` 成为它右侧的子指针
    ///
    /// 调用者保证页未满。
    pub fn insert(&mut self, index: usize, entry: DirEntry, right_child: PageId) {
        let len = self.len();
        debug_assert!(len < MAX_DIR_ENTRIES_PER_PAGE && index <= len);

        self.dir_entries.copy_within(index..len, index + 1);
        self.dir_entries[index] = entry;
        self.child_page_pos.copy_within(index + 1..len + 1, index + 2);
        self.child_page_pos[index + 1] = right_child;
        self.num_entries += 1;
    }

    /// 移除第 `index` 项与其右侧的子指针
    pub fn remove(&mut self, index: usize) -> DirEntry {
        let len = self.len();
        debug_assert!(index < len);

        let entry = self.dir_entries[index];
        self.dir_entries.copy_within(index + 1..len, index);
        self.dir_entries[len - 1] = DirEntry::zeroed();
        self.child_page_pos.copy_within(index + 2..len + 1, index + 1);
        self.child_page_pos[len] = PageId::NULL;
        self.num_entries -= 1;

        entry
    }
}
