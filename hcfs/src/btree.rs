//! # 目录 B 树
//!
//! - 插入：下降到叶子有序插入，页满则与新项合并后对半分裂，中位项上提；
//!   分裂到根时长出新根。
//! - 删除：下降途中先保证要进入的子页多于 [`MIN_DIR_ENTRIES_PER_PAGE`] 项，
//!   不足时与兄弟合并（兄弟少于半页）或重新均分；
//!   内部页命中时用左子树的最大项顶替。
//!
//! 新页优先取自回收链表，并插到遍历链表表头；被合并掉的页归还回收链表，
//! 同时从遍历链表摘除。

use crate::layout::{DirEntry, DirEntryPage, DirMeta};
use crate::page_store::{PageStore, Pod};
use crate::{Error, PageId, Result, MAX_DIR_ENTRIES_PER_PAGE, MIN_DIR_ENTRIES_PER_PAGE};

/// 在以 `root` 为根的树中按名字查找，命中时返回所在页与页内下标
pub(crate) fn search(
    store: &PageStore<'_>,
    root: PageId,
    name: &[u8],
) -> Result<Option<(Box<DirEntryPage>, usize)>> {
    if root.is_null() {
        return Ok(None);
    }
    let mut page = store.read_boxed::<DirEntryPage>(root)?;
    loop {
        match page.search(name) {
            Ok(index) => return Ok(Some((page, index))),
            Err(index) => {
                let child = page.child_page_pos[index];
                if child.is_null() {
                    return Ok(None);
                }
                store.load(child, &mut *page)?;
            }
        }
    }
}

/// 子页重平衡的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rebalance {
    /// 子页足够大，未做任何改动
    Unchanged,
    /// 当前页已被改写，需在当前页上重新查找
    Changed,
    /// 旧根被回收，需从新根重新开始
    NewRoot,
}

/// 一个目录的 B 树，修改后的目录头由调用者写回
pub(crate) struct DirTree<'a> {
    store: PageStore<'a>,
    meta: &'a mut DirMeta,
}

impl<'a> DirTree<'a> {
    #[inline]
    pub fn new(store: PageStore<'a>, meta: &'a mut DirMeta) -> Self {
        Self { store, meta }
    }

    pub fn insert(&mut self, entry: DirEntry) -> Result<()> {
        let old_root = self.meta.root_entry_page;
        let Some((median, sibling)) = self.insert_into(old_root, entry)? else {
            return Ok(());
        };

        let root_id = self.alloc_page()?;
        let mut root = Box::new(DirEntryPage::zeroed());
        root.this_page_pos = root_id;
        root.fill(&[median], &[old_root, sibling]);
        self.push_walk_head(&mut root, &mut [])?;
        self.store.write(root_id, &*root)?;
        self.adopt(&[old_root, sibling], root_id)?;
        self.meta.root_entry_page = root_id;
        log::debug!("dir root grows from {old_root:?} to {root_id:?}");

        Ok(())
    }

    /// 向子树插入，子树根分裂时返回 (上提的中位项, 新的右兄弟)
    fn insert_into(&mut self, page_id: PageId, entry: DirEntry) -> Result<Option<(DirEntry, PageId)>> {
        let mut page = self.store.read_boxed::<DirEntryPage>(page_id)?;
        let index = match page.search(entry.name_bytes()) {
            Ok(_) => return Err(Error::AlreadyExists),
            Err(index) => index,
        };

        let (entry, right_child) = if page.is_leaf() {
            (entry, PageId::NULL)
        } else {
            match self.insert_into(page.child_page_pos[index], entry)? {
                Some(overflow) => {
                    // 子页分裂可能改写了本页的遍历链表指针
                    self.store.load(page_id, &mut *page)?;
                    overflow
                }
                None => return Ok(None),
            }
        };

        if !page.is_full() {
            page.insert(index, entry, right_child);
            self.store.write(page_id, &*page)?;
            return Ok(None);
        }

        self.split(page_id, &mut page, index, entry, right_child)
            .map(Some)
    }

    fn split(
        &mut self,
        page_id: PageId,
        page: &mut DirEntryPage,
        index: usize,
        entry: DirEntry,
        right_child: PageId,
    ) -> Result<(DirEntry, PageId)> {
        let mut entries = page.entries().to_vec();
        entries.insert(index, entry);
        let mut children = page.children().to_vec();
        children.insert(index + 1, right_child);

        let median = entries.len() / 2;
        let separator = entries[median];
        let right_entries = entries.split_off(median + 1);
        let right_children = children.split_off(median + 1);
        entries.truncate(median);

        let sibling_id = self.alloc_page()?;
        let mut sibling = Box::new(DirEntryPage::zeroed());
        sibling.this_page_pos = sibling_id;
        sibling.parent_page_pos = page.parent_page_pos;
        sibling.fill(&right_entries, &right_children);
        self.push_walk_head(&mut sibling, &mut [&mut *page])?;

        page.fill(&entries, &children);
        self.store.write(page_id, &*page)?;
        self.store.write(sibling_id, &*sibling)?;
        self.adopt(&right_children, sibling_id)?;
        log::trace!("dir page {page_id:?} splits off {sibling_id:?}");

        Ok((separator, sibling_id))
    }

    /// 删除名为 `name` 的项并返回它
    pub fn delete(&mut self, name: &[u8]) -> Result<DirEntry> {
        let mut page = self.store.read_boxed::<DirEntryPage>(self.meta.root_entry_page)?;
        loop {
            match page.search(name) {
                Ok(index) if page.is_leaf() => {
                    let removed = page.remove(index);
                    self.store.write(page.this_page_pos, &*page)?;
                    return Ok(removed);
                }
                Ok(index) => {
                    match self.rebalance(&mut page, index)? {
                        Rebalance::NewRoot => {
                            self.store.load(self.meta.root_entry_page, &mut *page)?;
                            continue;
                        }
                        Rebalance::Changed => continue,
                        Rebalance::Unchanged => {}
                    }

                    let largest = self.extract_largest(page.child_page_pos[index])?;
                    // 下层的合并可能改写了本页的遍历链表指针
                    let page_id = page.this_page_pos;
                    self.store.load(page_id, &mut *page)?;
                    let removed = page.dir_entries[index];
                    page.dir_entries[index] = largest;
                    self.store.write(page_id, &*page)?;
                    return Ok(removed);
                }
                Err(_) if page.is_leaf() => return Err(Error::NotFound),
                Err(index) => match self.rebalance(&mut page, index)? {
                    Rebalance::NewRoot => {
                        self.store.load(self.meta.root_entry_page, &mut *page)?;
                    }
                    Rebalance::Changed => {}
                    Rebalance::Unchanged => {
                        let child = page.child_page_pos[index];
                        self.store.load(child, &mut *page)?;
                    }
                },
            }
        }
    }

    /// 取出子树中最大的项，沿途保证下降的页足够大
    fn extract_largest(&mut self, page_id: PageId) -> Result<DirEntry> {
        let mut page = self.store.read_boxed::<DirEntryPage>(page_id)?;
        loop {
            let last = page.len();
            if page.is_leaf() {
                if last == 0 {
                    return Err(Error::Corrupted("empty leaf in directory tree"));
                }
                let largest = page.remove(last - 1);
                self.store.write(page.this_page_pos, &*page)?;
                return Ok(largest);
            }
            match self.rebalance(&mut page, last)? {
                Rebalance::NewRoot => {
                    self.store.load(self.meta.root_entry_page, &mut *page)?;
                }
                Rebalance::Changed => {}
                Rebalance::Unchanged => {
                    let child = page.child_page_pos[last];
                    self.store.load(child, &mut *page)?;
                }
            }
        }
    }

    /// 保证 `tnode` 的第 `selected` 个子页多于下限
    fn rebalance(&mut self, tnode: &mut DirEntryPage, selected: usize) -> Result<Rebalance> {
        let len = tnode.len();
        if len == 0 || selected > len || tnode.is_leaf() {
            return Err(Error::Corrupted("rebalancing a leaf or out of bound child"));
        }

        // 最右的子页与左兄弟配对，其余与右兄弟配对
        let left_index = if selected == len { selected - 1 } else { selected };
        let left_id = tnode.child_page_pos[left_index];
        let right_id = tnode.child_page_pos[left_index + 1];
        let mut left = self.store.read_boxed::<DirEntryPage>(left_id)?;
        let mut right = self.store.read_boxed::<DirEntryPage>(right_id)?;
        let (child_len, sibling_len) = if selected == len {
            (right.len(), left.len())
        } else {
            (left.len(), right.len())
        };
        if child_len > MIN_DIR_ENTRIES_PER_PAGE {
            return Ok(Rebalance::Unchanged);
        }

        let mut entries = Vec::with_capacity(left.len() + right.len() + 1);
        entries.extend_from_slice(left.entries());
        entries.push(tnode.dir_entries[left_index]);
        entries.extend_from_slice(right.entries());
        let mut children = Vec::with_capacity(entries.len() + 1);
        children.extend_from_slice(left.children());
        children.extend_from_slice(right.children());

        let old_left_len = left.len();
        if sibling_len < MAX_DIR_ENTRIES_PER_PAGE / 2 {
            // 合并进左页，右页回收
            left.fill(&entries, &children);
            self.unlink_walk(&right, &mut [&mut *left, &mut *tnode])?;
            self.free_page(right_id)?;
            self.adopt(&children[old_left_len + 1..], left_id)?;

            let ret = if len == 1 {
                // 父页是只剩一项的根：合并后的页成为新根
                self.unlink_walk(tnode, &mut [&mut *left])?;
                self.free_page(tnode.this_page_pos)?;
                left.parent_page_pos = PageId::NULL;
                self.meta.root_entry_page = left_id;
                log::debug!("dir root shrinks from {:?} to {left_id:?}", tnode.this_page_pos);
                Rebalance::NewRoot
            } else {
                tnode.remove(left_index);
                self.store.write(tnode.this_page_pos, &*tnode)?;
                Rebalance::Changed
            };
            self.store.write(left_id, &*left)?;
            log::trace!("dir page {right_id:?} merged into {left_id:?}");

            return Ok(ret);
        }

        // 两页重新均分，中位项替换父页中的分隔项
        let median = entries.len() / 2;
        left.fill(&entries[..median], &children[..=median]);
        right.fill(&entries[median + 1..], &children[median + 1..]);
        tnode.dir_entries[left_index] = entries[median];
        self.store.write(left_id, &*left)?;
        self.store.write(right_id, &*right)?;
        self.store.write(tnode.this_page_pos, &*tnode)?;
        if median > old_left_len {
            self.adopt(&children[old_left_len + 1..=median], left_id)?;
        } else if median < old_left_len {
            self.adopt(&children[median + 1..=old_left_len], right_id)?;
        }

        Ok(Rebalance::Changed)
    }

    /// 优先复用回收链表中的页，否则在文件末尾追加
    fn alloc_page(&mut self) -> Result<PageId> {
        let head = self.meta.entry_page_gc_list;
        if head.is_null() {
            return Ok(self.store.allocate(&DirEntryPage::zeroed())?);
        }
        self.meta.entry_page_gc_list =
            self.store.map(head, |page: &DirEntryPage| page.gc_list_next)?;

        Ok(head)
    }

    fn free_page(&mut self, id: PageId) -> Result<()> {
        let mut page = Box::new(DirEntryPage::zeroed());
        page.this_page_pos = id;
        page.gc_list_next = self.meta.entry_page_gc_list;
        self.store.write(id, &*page)?;
        self.meta.entry_page_gc_list = id;

        Ok(())
    }

    /// 子页改认父页
    fn adopt(&self, children: &[PageId], parent: PageId) -> Result<()> {
        for &child in children.iter().filter(|child| !child.is_null()) {
            self.store
                .map_mut(child, |page: &mut DirEntryPage| page.parent_page_pos = parent)?;
        }

        Ok(())
    }

    /// 修改遍历链表上的某一页，已在内存中的页直接改
    fn relink(
        &self,
        target: PageId,
        cached: &mut [&mut DirEntryPage],
        f: impl FnOnce(&mut DirEntryPage),
    ) -> Result<()> {
        if target.is_null() {
            return Ok(());
        }
        match cached.iter_mut().find(|page| page.this_page_pos == target) {
            Some(page) => f(&mut **page),
            None => self.store.map_mut(target, f)?,
        }

        Ok(())
    }

    fn push_walk_head(
        &mut self,
        page: &mut DirEntryPage,
        cached: &mut [&mut DirEntryPage],
    ) -> Result<()> {
        let head = self.meta.tree_walk_list_head;
        let this = page.this_page_pos;
        page.tree_walk_prev = PageId::NULL;
        page.tree_walk_next = head;
        self.relink(head, cached, |old| old.tree_walk_prev = this)?;
        self.meta.tree_walk_list_head = this;

        Ok(())
    }

    fn unlink_walk(&mut self, page: &DirEntryPage, cached: &mut [&mut DirEntryPage]) -> Result<()> {
        let (prev, next) = (page.tree_walk_prev, page.tree_walk_next);
        if self.meta.tree_walk_list_head == page.this_page_pos {
            self.meta.tree_walk_list_head = next;
        }
        self.relink(next, cached, |page| page.tree_walk_prev = prev)?;
        self.relink(prev, cached, |page| page.tree_walk_next = next)?;

        Ok(())
    }
}
