//! # inode 生命周期
//!
//! 活跃 → 标记删除 → 已删除 → 已回收：
//! - 标记删除：`markdelete` 目录下建立 `inode{ino}` 标记文件，查找计数表记下待删除
//! - 已删除：元数据移入 todelete 暂存区，普通文件的数据块全部删除，清除标记
//! - 已回收：暂存的元数据清除，inode 号交给超级块回收
//!
//! 标记文件存在即表示删除尚未完成，启动时据此续删。

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::config::parse_marker_name;
use crate::fs::Hcfs;
use crate::layout::{HcfsStat, TimeFlag, STAT_POS};
use crate::meta_cache::MetaCacheEntry;
use crate::page_store::PageStore;
use crate::{Error, Result, MAX_BLOCK_SIZE};

impl Hcfs {
    fn marker_path(&self, ino: u64) -> PathBuf {
        self.config().markdelete_path().join(format!("inode{ino}"))
    }

    /// 建立删除标记，重复调用无害
    pub fn disk_markdelete(&self, ino: u64) -> Result<()> {
        fs::create_dir_all(self.config().markdelete_path())?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.marker_path(ino))
            .inspect_err(|err| log::error!("cannot mark inode {ino} for deletion: {err}"))?;

        Ok(())
    }

    /// 清除删除标记；标记目录都不存在时报 `NotFound`
    pub fn disk_cleardelete(&self, ino: u64) -> Result<()> {
        if !self.config().markdelete_path().is_dir() {
            return Err(Error::NotFound);
        }
        match fs::remove_file(self.marker_path(ino)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                log::error!("cannot clear delete marker of inode {ino}: {err}");
                Err(err.into())
            }
            _ => Ok(()),
        }
    }

    #[inline]
    pub fn disk_checkdelete(&self, ino: u64) -> bool {
        self.marker_path(ino).is_file()
    }

    /// 续做上次未完成的删除，返回续删的个数
    pub fn startup_finish_delete(&self) -> Result<usize> {
        let dir = self.config().markdelete_path();
        let markers = match fs::read_dir(&dir) {
            Ok(markers) => markers,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(err) => {
                log::error!("cannot scan {dir:?}: {err}");
                return Err(err.into());
            }
        };

        let mut finished = 0;
        for marker in markers {
            let marker = marker?;
            let Some(ino) = marker.file_name().to_str().and_then(parse_marker_name) else {
                continue;
            };
            match self.read_held_stat(ino) {
                Ok(stat) => {
                    log::info!("resuming deletion of inode {ino}");
                    self.actual_delete_inode(ino, stat.mode)?;
                    finished += 1;
                }
                Err(Error::NotFound) => {
                    log::warn!("inode {ino} marked for deletion has no meta file");
                    self.disk_cleardelete(ino)?;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(finished)
    }

    /// 链接数减一；减到最后一个时改为标记删除
    pub fn decrease_nlink_inode_file(&self, entry: &mut MetaCacheEntry) -> Result<()> {
        let mut stat = entry.lookup_stat()?;
        if stat.nlink <= 1 {
            return self.mark_inode_delete(entry);
        }

        stat.nlink -= 1;
        stat.stamp(TimeFlag::Ctime);
        entry.update_stat(&stat)?;
        self.super_block().update_stat(entry.ino(), &stat)
    }

    /// 标记删除；内核没有引用该 inode 时立刻删除
    pub fn mark_inode_delete(&self, entry: &mut MetaCacheEntry) -> Result<()> {
        let ino = entry.ino();
        let mode = entry.lookup_stat()?.mode;
        self.disk_markdelete(ino)?;

        if self.lookup_table().mark_delete(ino) {
            log::debug!("inode {ino} waits for forget before deletion");
            return Ok(());
        }
        entry.close_file();
        self.actual_delete_inode(ino, mode)
    }

    /// 内核释放引用；标记删除的 inode 引用归零时完成删除
    pub fn forget(&self, ino: u64, amount: u64) -> Result<()> {
        match self.lookup_table().decrease(ino, amount) {
            Some(mode) => self.actual_delete_inode(ino, mode),
            None => Ok(()),
        }
    }

    /// 完成删除：移走元数据，普通文件另删数据块并扣减全局计数，最后清除标记
    ///
    /// 元数据已在暂存区时照常进行，以便崩溃后续删。
    pub fn actual_delete_inode(&self, ino: u64, mode: u32) -> Result<()> {
        let ftype = mode & libc::S_IFMT as u32;
        if ftype == libc::S_IFREG as u32 {
            let stat = self.read_held_stat(ino)?;
            self.delete_inode_meta(ino)?;
            self.delete_blocks(ino, &stat)?;
        } else if ftype == libc::S_IFDIR as u32 || ftype == libc::S_IFLNK as u32 {
            self.delete_inode_meta(ino)?;
        } else {
            log::warn!("inode {ino} of unknown type {ftype:o} only clears its marker");
        }

        match self.disk_cleardelete(ino) {
            Err(err) if err.is_not_found() => Ok(()),
            ret => ret,
        }
    }

    fn delete_blocks(&self, ino: u64, stat: &HcfsStat) -> Result<()> {
        let size = stat.size.max(0) as u64;
        let total_blocks = if size == 0 { 0 } else { (size - 1) / MAX_BLOCK_SIZE + 1 };

        for blockno in 0..total_blocks {
            let path = self.config().fetch_block_path(ino, blockno)?;
            let len = match fs::metadata(&path) {
                Ok(meta) => meta.len() as i64,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    log::error!("cannot stat block {path:?}: {err}");
                    return Err(err.into());
                }
            };
            fs::remove_file(&path)
                .inspect_err(|err| log::error!("cannot remove block {path:?}: {err}"))?;
            self.system().update(|data| {
                data.cache_size -= len;
                data.cache_blocks -= 1;
            });
        }

        self.system()
            .update(|data| data.system_size = (data.system_size - stat.size).max(0));
        self.system().sync()
    }

    /// 把元数据移入 todelete 暂存区并从元数据缓存中剔除
    pub fn delete_inode_meta(&self, ino: u64) -> Result<()> {
        let meta_path = self.config().fetch_meta_path(ino)?;
        let todelete_path = self.config().fetch_todelete_path(ino)?;
        if !meta_path.exists() {
            if todelete_path.exists() {
                log::debug!("meta of inode {ino} was already moved");
                self.meta_cache().remove(ino);
                return Ok(());
            }
            return Err(Error::NotFound);
        }

        self.super_block().to_delete(ino)?;
        if let Err(err) = fs::rename(&meta_path, &todelete_path) {
            log::warn!("rename of meta {meta_path:?} failed ({err}), copying instead");
            copy_locked(&meta_path, &todelete_path)
                .and_then(|()| fs::remove_file(&meta_path))
                .inspect_err(|err| log::error!("cannot move meta of inode {ino}: {err}"))?;
        }
        self.meta_cache().remove(ino);

        Ok(())
    }

    /// 清除暂存的元数据，inode 号进入待回收列表
    ///
    /// 删除标记仍在时不动，返回 `false`：续删还要靠暂存的 stat 找到数据块。
    pub fn purge_todelete(&self, ino: u64) -> Result<bool> {
        if self.disk_checkdelete(ino) {
            log::warn!("inode {ino} is still being deleted, not purged");
            return Ok(false);
        }
        let path = self.config().fetch_todelete_path(ino)?;
        match fs::remove_file(&path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                log::error!("cannot purge {path:?}: {err}");
                return Err(err.into());
            }
            _ => {}
        }

        self.super_block().delete(ino)?;
        Ok(true)
    }

    /// 读取 stat：先找原位置，再找暂存区
    fn read_held_stat(&self, ino: u64) -> Result<HcfsStat> {
        let candidates = [
            self.config().fetch_meta_path(ino)?,
            self.config().fetch_todelete_path(ino)?,
        ];
        for path in &candidates {
            match File::open(path) {
                Ok(file) => return Ok(PageStore::new(&file).read(STAT_POS)?),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    log::error!("cannot open held meta {path:?}: {err}");
                    return Err(err.into());
                }
            }
        }

        Err(Error::NotFound)
    }
}

/// 加锁复制，供跨设备时代替改名
fn copy_locked(from: &Path, to: &Path) -> io::Result<()> {
    let mut src = File::open(from)?;
    let fd = src.as_raw_fd();
    if unsafe { libc::flock(fd, libc::LOCK_EX) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let copied = File::create(to).and_then(|mut dst| io::copy(&mut src, &mut dst));
    unsafe { libc::flock(fd, libc::LOCK_UN) };

    copied.map(drop)
}
