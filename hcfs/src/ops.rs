//! # 命名空间与数据块操作
//!
//! 加锁顺序：先父目录再子项，持有 inode 锁时才碰超级块与全局计数。

use std::fs;
use std::io;

use crate::dir::{check_name, create_dir_meta, dir_add_entry, dir_remove_entry, lookup_dir, read_dir};
use crate::fs::Hcfs;
use crate::indirect::{create_page, seek_page};
use crate::layout::{BlockEntryPage, BlockStatus, FileMeta, HcfsStat, SymlinkMeta, TimeFlag};
use crate::meta_cache::MetaCacheEntry;
use crate::page_store::PageStore;
use crate::{
    xattr, DirEntry, DirEntryType, Error, Result, MAX_BLOCK_ENTRIES_PER_PAGE, MAX_BLOCK_SIZE,
    ROOT_INODE,
};

const PERM_MASK: u32 = 0o7777;

impl Hcfs {
    pub fn stat(&self, ino: u64) -> Result<HcfsStat> {
        self.meta_cache().lock_entry(ino)?.lookup_stat()
    }

    /// 查找子项，内核查找计数加一
    pub fn lookup(&self, parent: u64, name: &str) -> Result<DirEntry> {
        let found = {
            let mut entry = self.meta_cache().lock_entry(parent)?;
            lookup_dir(&mut entry, parent, name)?
        };
        let mode = self.stat(found.inode)?.mode;
        self.lookup_table().increase(found.inode, 1, mode);

        Ok(found)
    }

    pub fn readdir(&self, ino: u64) -> Result<Vec<DirEntry>> {
        let mut entry = self.meta_cache().lock_entry(ino)?;
        read_dir(&mut entry, ino)
    }

    pub fn mkdir(&self, parent: u64, name: &str, mode: u32) -> Result<u64> {
        let mut stat = HcfsStat::new(0, libc::S_IFDIR as u32 | (mode & PERM_MASK));
        stat.nlink = 2;

        self.create_child(parent, name, stat, |child, stat| {
            create_dir_meta(child, stat, parent)
        })
    }

    /// 建立普通文件
    pub fn mknod(&self, parent: u64, name: &str, mode: u32) -> Result<u64> {
        let stat = HcfsStat::new(0, libc::S_IFREG as u32 | (mode & PERM_MASK));

        self.create_child(parent, name, stat, |child, stat| {
            child.create_file()?;
            child.update_stat(stat)?;
            child.update_file_data(&FileMeta {
                generation: 1,
                ..Default::default()
            })
        })
    }

    pub fn symlink(&self, parent: u64, name: &str, target: &str) -> Result<u64> {
        let link = SymlinkMeta::new(target).ok_or(Error::NameTooLong)?;
        let mut stat = HcfsStat::new(0, libc::S_IFLNK as u32 | 0o777);
        stat.size = target.len() as i64;

        self.create_child(parent, name, stat, |child, stat| {
            child.create_file()?;
            child.update_stat(stat)?;
            child.update_symlink_data(&link)
        })
    }

    pub fn readlink(&self, ino: u64) -> Result<String> {
        let mut entry = self.meta_cache().lock_entry(ino)?;
        Ok(entry.lookup_symlink_data()?.target().into_owned())
    }

    /// 分配 inode、写出元数据并挂进父目录
    fn create_child(
        &self,
        parent: u64,
        name: &str,
        mut stat: HcfsStat,
        init: impl FnOnce(&mut MetaCacheEntry, &HcfsStat) -> Result<()>,
    ) -> Result<u64> {
        check_name(name)?;
        let mut parent_entry = self.meta_cache().lock_entry(parent)?;
        match lookup_dir(&mut parent_entry, parent, name) {
            Ok(_) => return Err(Error::AlreadyExists),
            Err(Error::NotFound) => {}
            Err(err) => return Err(err),
        }

        let (ino, _) = self.super_block().new_inode(&stat)?;
        stat.ino = ino;
        let created = self
            .meta_cache()
            .lock_entry(ino)
            .and_then(|mut child| init(&mut child, &stat))
            .and_then(|()| dir_add_entry(&mut parent_entry, parent, ino, name, stat.mode));
        if let Err(err) = created {
            // 已存在的元数据文件不是本次建的，不能删
            self.discard_child(ino, !matches!(err, Error::AlreadyExists));
            return Err(err);
        }
        let parent_stat = parent_entry.lookup_stat()?;
        self.super_block().update_stat(parent, &parent_stat)?;
        log::debug!("created {name:?} as inode {ino} under {parent}");

        Ok(ino)
    }

    /// 撤销没能挂进父目录的 inode：删掉元数据文件，inode 号交还超级块
    fn discard_child(&self, ino: u64, remove_meta: bool) {
        self.meta_cache().remove(ino);
        if remove_meta {
            match self.config().fetch_meta_path(ino).map(fs::remove_file) {
                Ok(Err(err)) if err.kind() != io::ErrorKind::NotFound => {
                    log::error!("cannot remove meta of discarded inode {ino}: {err}");
                }
                Err(err) => log::error!("cannot locate meta of discarded inode {ino}: {err}"),
                _ => {}
            }
        }
        let released = self
            .super_block()
            .to_delete(ino)
            .and_then(|()| self.super_block().delete(ino));
        if let Err(err) = released {
            log::error!("cannot release discarded inode {ino}: {err}");
        }
    }

    /// 删除非目录项，最后一个链接消失时标记删除
    pub fn unlink(&self, parent: u64, name: &str) -> Result<()> {
        let removed = {
            let mut parent_entry = self.meta_cache().lock_entry(parent)?;
            let found = lookup_dir(&mut parent_entry, parent, name)?;
            if found.ty == DirEntryType::Directory {
                return Err(Error::IsADirectory);
            }
            let removed = dir_remove_entry(&mut parent_entry, parent, name)?;
            let parent_stat = parent_entry.lookup_stat()?;
            self.super_block().update_stat(parent, &parent_stat)?;
            removed
        };

        let mut child = self.meta_cache().lock_entry(removed.inode)?;
        self.decrease_nlink_inode_file(&mut child)
    }

    /// 删除空目录
    pub fn rmdir(&self, parent: u64, name: &str) -> Result<()> {
        if name == "." || name == ".." {
            return Err(Error::PermissionDenied);
        }
        let mut parent_entry = self.meta_cache().lock_entry(parent)?;
        let found = lookup_dir(&mut parent_entry, parent, name)?;
        if found.ty != DirEntryType::Directory {
            return Err(Error::NotADirectory);
        }
        if found.inode == ROOT_INODE {
            return Err(Error::PermissionDenied);
        }

        let mut child = self.meta_cache().lock_entry(found.inode)?;
        if child.lookup_dir_data()?.total_children > 0 {
            return Err(Error::DirectoryNotEmpty);
        }
        dir_remove_entry(&mut parent_entry, parent, name)?;
        let parent_stat = parent_entry.lookup_stat()?;
        self.super_block().update_stat(parent, &parent_stat)?;

        self.mark_inode_delete(&mut child)
    }

    /// 写入一个数据块：补齐块项页，落盘块文件并标脏，更新全局计数
    pub fn write_block(&self, ino: u64, blockno: u64, data: &[u8]) -> Result<()> {
        if data.len() as u64 > MAX_BLOCK_SIZE {
            return Err(Error::OutOfRange(blockno));
        }
        // 文件大小须能用 i64 表示，先于任何落盘动作检查
        let end = blockno
            .checked_mul(MAX_BLOCK_SIZE)
            .and_then(|start| start.checked_add(data.len() as u64))
            .and_then(|end| i64::try_from(end).ok())
            .ok_or(Error::OutOfRange(blockno))?;
        let mut entry = self.meta_cache().lock_entry(ino)?;
        let mut stat = entry.lookup_stat()?;
        let page = create_page(&mut entry, blockno / MAX_BLOCK_ENTRIES_PER_PAGE)?;
        let slot = (blockno % MAX_BLOCK_ENTRIES_PER_PAGE) as usize;

        let path = self.config().fetch_block_path(ino, blockno)?;
        let old_len = match fs::metadata(&path) {
            Ok(meta) => Some(meta.len() as i64),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        fs::write(&path, data)?;
        if let Err(err) = xattr::set_dirty_status(&path, true) {
            log::warn!("cannot tag block {path:?} dirty: {err}");
        }

        let file = entry.open_file()?;
        PageStore::new(&file).map_mut(page, |entries: &mut BlockEntryPage| {
            let block = &mut entries.block_entries[slot];
            block.set_status(BlockStatus::Ldisk);
            block.uploaded = 0;
            entries.num_entries = entries.num_entries.max(slot as u32 + 1);
        })?;

        let new_size = stat.size.max(end);
        self.system().update(|sys| {
            sys.cache_size += data.len() as i64 - old_len.unwrap_or(0);
            if old_len.is_none() {
                sys.cache_blocks += 1;
            }
            sys.system_size += new_size - stat.size;
        });

        stat.size = new_size;
        stat.blocks = new_size / 512 + i64::from(new_size % 512 != 0);
        stat.stamp(TimeFlag::Mtime | TimeFlag::Ctime);
        entry.update_stat(&stat)?;
        self.super_block().update_stat(ino, &stat)
    }

    /// 数据块已同步到云端：标记改为干净，状态改为两边都有
    pub fn mark_block_synced(&self, ino: u64, blockno: u64) -> Result<()> {
        let mut entry = self.meta_cache().lock_entry(ino)?;
        let page = seek_page(&mut entry, blockno / MAX_BLOCK_ENTRIES_PER_PAGE)?;
        if page.is_null() {
            return Err(Error::NotFound);
        }
        let slot = (blockno % MAX_BLOCK_ENTRIES_PER_PAGE) as usize;

        let path = self.config().fetch_block_path(ino, blockno)?;
        if !path.is_file() {
            return Err(Error::NotFound);
        }
        if let Err(err) = xattr::set_dirty_status(&path, false) {
            log::warn!("cannot tag block {path:?} clean: {err}");
        }

        let file = entry.open_file()?;
        PageStore::new(&file).map_mut(page, |entries: &mut BlockEntryPage| {
            let block = &mut entries.block_entries[slot];
            block.set_status(BlockStatus::Both);
            block.uploaded = 1;
        })?;

        Ok(())
    }

    /// 查询数据块状态，块项页未分配时为 [`BlockStatus::None`]
    pub fn block_status(&self, ino: u64, blockno: u64) -> Result<BlockStatus> {
        let mut entry = self.meta_cache().lock_entry(ino)?;
        let page = seek_page(&mut entry, blockno / MAX_BLOCK_ENTRIES_PER_PAGE)?;
        if page.is_null() {
            return Ok(BlockStatus::None);
        }
        let slot = (blockno % MAX_BLOCK_ENTRIES_PER_PAGE) as usize;
        let file = entry.open_file()?;

        Ok(PageStore::new(&file).map(page, |entries: &BlockEntryPage| {
            entries.block_entries[slot].status()
        })?)
    }
}
