//! # 目录操作
//!
//! 目录项的增删经由 [`DirTree`]，
//! 改名与 `..` 修正只改单个目录项，不动树形。

use std::mem;

use vfs::DirEntryType;

use crate::btree::DirTree;
use crate::layout::{DirEntry, DirEntryPage, DirMeta, HcfsStat, TimeFlag, TYPED_META_POS};
use crate::meta_cache::MetaCacheEntry;
use crate::page_store::{PageStore, Pod};
use crate::{Error, PageId, Result};

/// 初始化目录的第一个页：只含 `.` 与 `..`
pub fn init_dir_page(
    page: &mut DirEntryPage,
    self_ino: u64,
    parent_ino: u64,
    page_pos: PageId,
) -> Result<()> {
    let dot = DirEntry::new(".", self_ino, DirEntryType::Directory)?;
    let dotdot = DirEntry::new("..", parent_ino, DirEntryType::Directory)?;

    *page = DirEntryPage::zeroed();
    page.this_page_pos = page_pos;
    page.fill(&[dot, dotdot], &[PageId::NULL; 3]);

    Ok(())
}

/// 为新目录写出元数据文件：stat、目录头、根页
pub(crate) fn create_dir_meta(entry: &mut MetaCacheEntry, stat: &HcfsStat, parent: u64) -> Result<()> {
    let file = entry.create_file()?;
    let root_pos = PageId::new(TYPED_META_POS.offset() + mem::size_of::<DirMeta>() as u64);
    let mut root = Box::new(DirEntryPage::zeroed());
    init_dir_page(&mut root, stat.ino, parent, root_pos)?;

    entry.update_stat(stat)?;
    entry.update_dir_data(&DirMeta {
        root_entry_page: root_pos,
        tree_walk_list_head: root_pos,
        generation: 1,
        ..Default::default()
    })?;
    PageStore::new(&file).write(root_pos, &*root)?;

    Ok(())
}

/// 检查名字能否存入目录项
#[inline]
pub(crate) fn check_name(name: &str) -> Result<()> {
    DirEntry::new(name, 0, DirEntryType::Regular).map(drop)
}

/// 在目录 `parent` 中加入 `name -> child`
///
/// 子项为目录时父目录的链接数加一。
pub fn dir_add_entry(
    entry: &mut MetaCacheEntry,
    parent: u64,
    child: u64,
    name: &str,
    mode: u32,
) -> Result<()> {
    entry.ensure_owner(parent)?;
    let ty = DirEntryType::from_mode(mode).unwrap_or_default();
    let new_entry = DirEntry::new(name, child, ty)?;

    let mut stat = entry.lookup_stat()?;
    let mut meta = entry.lookup_dir_data()?;
    let file = entry.open_file()?;
    // B 树变动后缓存的页可能过期，一律从盘上重读
    entry.drop_pages();
    DirTree::new(PageStore::new(&file), &mut meta)
        .insert(new_entry)
        .inspect_err(|err| {
            if !matches!(err, Error::AlreadyExists) {
                log::error!("failed to add {name:?} to dir {parent}: {err}");
            }
        })?;

    meta.total_children += 1;
    if ty == DirEntryType::Directory {
        stat.nlink += 1;
    }
    stat.stamp(TimeFlag::Mtime | TimeFlag::Ctime);
    entry.update_dir_data(&meta)?;
    entry.update_stat(&stat)?;

    Ok(())
}

/// 从目录 `parent` 中删去 `name`，返回被删项
///
/// 被删项为目录时父目录的链接数减一。
pub fn dir_remove_entry(
    entry: &mut MetaCacheEntry,
    parent: u64,
    name: &str,
) -> Result<vfs::DirEntry> {
    entry.ensure_owner(parent)?;
    let mut stat = entry.lookup_stat()?;
    let mut meta = entry.lookup_dir_data()?;
    let file = entry.open_file()?;
    entry.drop_pages();
    let removed = DirTree::new(PageStore::new(&file), &mut meta)
        .delete(name.as_bytes())
        .inspect_err(|err| {
            if !matches!(err, Error::NotFound) {
                log::error!("failed to remove {name:?} from dir {parent}: {err}");
            }
        })?;

    meta.total_children -= 1;
    if removed.ty() == DirEntryType::Directory {
        stat.nlink = stat.nlink.saturating_sub(1);
    }
    stat.stamp(TimeFlag::Mtime | TimeFlag::Ctime);
    entry.update_dir_data(&meta)?;
    entry.update_stat(&stat)?;

    Ok(vfs::DirEntry::from(&removed))
}

/// 把目录 `self_ino` 的 `..` 指向 `parent_ino`
pub fn change_parent_inode(entry: &mut MetaCacheEntry, self_ino: u64, parent_ino: u64) -> Result<()> {
    entry.ensure_owner(self_ino)?;
    rewrite_entry(entry, "..", |dirent| dirent.d_ino = parent_ino)
}

/// 原地把目录项 `name` 改指 `new_ino`，类型随 `new_mode` 更新
pub fn change_dir_entry_inode(
    entry: &mut MetaCacheEntry,
    parent: u64,
    name: &str,
    new_ino: u64,
    new_mode: u32,
) -> Result<()> {
    entry.ensure_owner(parent)?;
    let ty = DirEntryType::from_mode(new_mode).unwrap_or_default();
    rewrite_entry(entry, name, |dirent| {
        dirent.d_ino = new_ino;
        dirent.set_ty(ty);
    })
}

fn rewrite_entry(
    entry: &mut MetaCacheEntry,
    name: &str,
    f: impl FnOnce(&mut DirEntry),
) -> Result<()> {
    entry.drop_pages();
    let (_, index) = entry.seek_dir_entry(name)?.ok_or(Error::NotFound)?;
    if let Some(page) = entry.cached_dir_page_mut() {
        f(&mut page.dir_entries[index]);
    }
    entry.flush_dir_page()?;

    let mut stat = entry.lookup_stat()?;
    stat.stamp(TimeFlag::Mtime | TimeFlag::Ctime);
    entry.update_stat(&stat)
}

/// 查找子项；inode 为 0 的项视为不存在
pub fn lookup_dir(entry: &mut MetaCacheEntry, parent: u64, name: &str) -> Result<vfs::DirEntry> {
    entry.ensure_owner(parent)?;
    let (_, index) = entry.seek_dir_entry(name)?.ok_or(Error::NotFound)?;
    match entry.cached_dir_page() {
        Some(page) if page.dir_entries[index].d_ino != 0 => {
            Ok(vfs::DirEntry::from(&page.dir_entries[index]))
        }
        _ => Err(Error::NotFound),
    }
}

/// 沿遍历链表列出目录的所有项，含 `.` 与 `..`
pub fn read_dir(entry: &mut MetaCacheEntry, ino: u64) -> Result<Vec<vfs::DirEntry>> {
    entry.ensure_owner(ino)?;
    let meta = entry.lookup_dir_data()?;
    let file = entry.open_file()?;
    let store = PageStore::new(&file);
    // 链表长度不可能超过文件能容纳的页数
    let max_pages = file.metadata()?.len() / mem::size_of::<DirEntryPage>() as u64 + 1;

    let mut children = Vec::new();
    let mut page = Box::new(DirEntryPage::zeroed());
    let mut next = meta.tree_walk_list_head;
    let mut visited = 0;
    while !next.is_null() {
        visited += 1;
        if visited > max_pages {
            log::error!("tree walk list of dir {ino} loops");
            return Err(Error::Corrupted("tree walk list loops"));
        }
        store.load(next, &mut *page)?;
        children.extend(
            page.entries()
                .iter()
                .filter(|dirent| dirent.d_ino != 0)
                .map(vfs::DirEntry::from),
        );
        next = page.tree_walk_next;
    }

    Ok(children)
}
