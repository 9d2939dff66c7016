//! # 超级块
//!
//! 超级块文件以 [`SuperBlockHead`] 开头，其后每个 inode 一项 [`SuperBlockEntry`]，
//! inode `n` 的项位于 `头大小 + (n - 1) * 项大小`。
//!
//! 项经 `util_ll_next/prev` 串成几条链表：
//! - 脏链表与待删链表：双向，首尾记在头里
//! - 已回收链表：单向，由 `new_inode` 从头部取用
//!
//! 删除后的 inode 号先追加到待回收列表文件，
//! 攒够 [`HcfsConfig::reclaim_trigger`] 个再批量挂上已回收链表。

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::mem;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::config::HcfsConfig;
use crate::layout::{HcfsStat, SbStatus, SuperBlockEntry, SuperBlockHead};
use crate::page_store::PageStore;
use crate::{Error, PageId, Result, ROOT_INODE};

const HEAD_SIZE: u64 = mem::size_of::<SuperBlockHead>() as u64;
const ENTRY_SIZE: u64 = mem::size_of::<SuperBlockEntry>() as u64;

#[inline]
fn entry_pos(ino: u64) -> PageId {
    PageId::new(HEAD_SIZE + (ino - 1) * ENTRY_SIZE)
}

#[derive(Debug)]
pub struct SuperBlock {
    unclaimed_path: PathBuf,
    reclaim_trigger: u64,
    inner: Mutex<SuperBlockInner>,
}

#[derive(Debug)]
struct SuperBlockInner {
    file: File,
    head: SuperBlockHead,
}

impl SuperBlock {
    /// 打开超级块文件，新文件写入空白的头
    pub fn open(config: &HcfsConfig) -> Result<Self> {
        let path = config.super_block_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .inspect_err(|err| log::error!("cannot open super block {path:?}: {err}"))?;

        let store = PageStore::new(&file);
        let head = if file.metadata()?.len() >= HEAD_SIZE {
            store.read(PageId::NULL)?
        } else {
            let head = SuperBlockHead::default();
            store.write(PageId::NULL, &head)?;
            head
        };
        log::debug!("super block opened: {head:?}");

        Ok(Self {
            unclaimed_path: config.unclaimed_list_path(),
            reclaim_trigger: config.reclaim_trigger(),
            inner: Mutex::new(SuperBlockInner { file, head }),
        })
    }

    #[inline]
    pub fn head(&self) -> SuperBlockHead {
        self.inner.lock().head
    }

    /// 读 inode 的项，超出文件末尾的项视为全零
    pub fn read(&self, ino: u64) -> Result<SuperBlockEntry> {
        self.inner.lock().read_entry(ino)
    }

    pub fn write(&self, ino: u64, entry: &SuperBlockEntry) -> Result<()> {
        self.inner.lock().write_entry(ino, entry)
    }

    /// 为新建文件系统登记根 inode
    pub(crate) fn register_root(&self, stat: &HcfsStat) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = SuperBlockEntry::new(*stat, ROOT_INODE, 1);
        inner.write_entry(ROOT_INODE, &entry)?;
        inner.head.num_active_inodes += 1;
        inner.write_head()
    }

    /// 分配 inode 号：优先取已回收链表的头，否则在末尾追加
    ///
    /// 返回 (inode 号, 世代)。
    pub fn new_inode(&self, stat: &HcfsStat) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock();

        let (ino, generation) = if inner.head.num_inode_reclaimed > 0 {
            let ino = inner.head.first_reclaimed_inode;
            let reused = inner.read_entry(ino)?;
            let head = &mut inner.head;
            head.first_reclaimed_inode = reused.util_ll_next;
            if reused.util_ll_next == 0 {
                head.last_reclaimed_inode = 0;
                head.num_inode_reclaimed = 0;
            } else {
                head.num_inode_reclaimed -= 1;
            }
            (ino, reused.generation + 1)
        } else {
            inner.head.num_total_inodes += 1;
            // 根 inode 不计入总数
            (inner.head.num_total_inodes as u64 + ROOT_INODE, 1)
        };

        let mut inode_stat = *stat;
        inode_stat.ino = ino;
        let entry = SuperBlockEntry::new(inode_stat, ino, generation);
        inner.write_entry(ino, &entry)?;
        inner.head.num_active_inodes += 1;
        inner.write_head()?;
        log::trace!("allocated inode {ino} generation {generation}");

        Ok((ino, generation))
    }

    /// 更新项中的 stat 并挂上脏链表
    pub fn update_stat(&self, ino: u64, stat: &HcfsStat) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut entry = inner.read_entry(ino)?;
        entry.inode_stat = *stat;
        inner.mark_dirty(ino, &mut entry)?;
        inner.write_entry(ino, &entry)?;
        inner.write_head()
    }

    /// 移入待删链表；清空 stat 只留模式，`ino == 0` 即表示正在删除
    pub fn to_delete(&self, ino: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut entry = inner.read_entry(ino)?;
        if matches!(
            entry.status(),
            SbStatus::ToBeDeleted | SbStatus::ToBeReclaimed | SbStatus::Reclaimed
        ) {
            // 崩溃后重做删除时已经移过
            return Ok(());
        }
        inner.enqueue(ino, &mut entry, SbStatus::ToBeDeleted)?;
        inner.head.num_active_inodes -= 1;

        let mode = entry.inode_stat.mode;
        entry.inode_stat = HcfsStat::default();
        entry.inode_stat.mode = mode;
        entry.in_transit = 0;
        inner.write_entry(ino, &entry)?;
        inner.write_head()
    }

    /// 按顺序列出待删链表上的 inode
    pub fn to_delete_queue(&self) -> Result<Vec<u64>> {
        let inner = self.inner.lock();
        let mut queue = Vec::new();
        let mut next = inner.head.first_to_delete_inode;
        while next != 0 {
            if queue.len() as i64 > inner.head.num_to_be_deleted {
                log::error!("to-delete queue is longer than its counter");
                return Err(Error::Corrupted("to-delete queue loops"));
            }
            queue.push(next);
            next = inner.read_entry(next)?.util_ll_next;
        }

        Ok(queue)
    }

    /// 删除完成，inode 号进入待回收列表
    pub fn delete(&self, ino: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut entry = inner.read_entry(ino)?;
        inner.dequeue(ino, &mut entry)?;
        entry.set_status(SbStatus::ToBeReclaimed);
        inner.write_entry(ino, &entry)?;

        let mut list = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.unclaimed_path)?;
        list.write_all(&ino.to_ne_bytes())?;

        inner.head.num_to_be_reclaimed += 1;
        inner.write_head()
    }

    /// 待回收数达到阈值时批量回收，返回回收个数
    ///
    /// 逐个复核仍处于待回收且 stat 已清空，避免回收已被重新分配的 inode。
    pub fn reclaim(&self) -> Result<u64> {
        let mut inner = self.inner.lock();
        if (inner.head.num_to_be_reclaimed.max(0) as u64) < self.reclaim_trigger {
            return Ok(0);
        }

        let bytes = match std::fs::read(&self.unclaimed_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                log::error!("cannot read unclaimed list: {err}");
                return Err(err.into());
            }
        };
        let mut unclaimed = Vec::new();
        unclaimed
            .try_reserve_exact(bytes.len() / mem::size_of::<u64>())
            .map_err(|_| Error::OutOfMemory)?;
        unclaimed.extend(
            bytes
                .chunks_exact(mem::size_of::<u64>())
                .map(|raw| u64::from_ne_bytes(raw.try_into().unwrap_or_default())),
        );
        unclaimed.sort_unstable();

        let limit = inner.head.num_total_inodes.max(0) as u64 + ROOT_INODE;
        let mut reclaimed = 0;
        for &ino in unclaimed.iter().rev() {
            if ino == 0 || ino > limit {
                log::warn!("unclaimed list holds bogus inode {ino}");
                continue;
            }
            let mut entry = inner.read_entry(ino)?;
            if entry.status() != SbStatus::ToBeReclaimed || entry.inode_stat.ino != 0 {
                continue;
            }

            entry.set_status(SbStatus::Reclaimed);
            entry.util_ll_next = inner.head.first_reclaimed_inode;
            inner.write_entry(ino, &entry)?;
            let head = &mut inner.head;
            head.first_reclaimed_inode = ino;
            if head.last_reclaimed_inode == 0 {
                head.last_reclaimed_inode = ino;
            }
            head.num_inode_reclaimed += 1;
            reclaimed += 1;
        }

        inner.head.num_to_be_reclaimed = 0;
        inner.write_head()?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.unclaimed_path)?;
        log::debug!("reclaimed {reclaimed} inodes");

        Ok(reclaimed)
    }
}

impl SuperBlockInner {
    fn read_entry(&self, ino: u64) -> Result<SuperBlockEntry> {
        if ino == 0 {
            return Err(Error::NotFound);
        }
        match PageStore::new(&self.file).read(entry_pos(ino)) {
            Ok(entry) => Ok(entry),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(SuperBlockEntry::default()),
            Err(err) => {
                log::error!("cannot read super block entry {ino}: {err}");
                Err(err.into())
            }
        }
    }

    fn write_entry(&self, ino: u64, entry: &SuperBlockEntry) -> Result<()> {
        if ino == 0 {
            return Err(Error::NotFound);
        }
        PageStore::new(&self.file).write(entry_pos(ino), entry)?;
        Ok(())
    }

    fn write_head(&self) -> Result<()> {
        PageStore::new(&self.file).write(PageId::NULL, &self.head)?;
        Ok(())
    }

    fn mark_dirty(&mut self, ino: u64, entry: &mut SuperBlockEntry) -> Result<()> {
        if entry.in_transit != 0 {
            entry.mod_after_in_transit = 1;
        }
        if entry.status() == SbStatus::NoLl {
            self.enqueue(ino, entry, SbStatus::IsDirty)?;
        }
        Ok(())
    }

    /// 挂到链表尾部，原先在别的链表上时先摘下
    fn enqueue(&mut self, ino: u64, entry: &mut SuperBlockEntry, status: SbStatus) -> Result<()> {
        if entry.status() == status {
            return Ok(());
        }
        self.dequeue(ino, entry)?;
        entry.set_status(status);

        let Self { file, head } = self;
        let Some((first, last, count)) = queue_mut(head, status) else {
            return Ok(());
        };
        entry.util_ll_next = 0;
        entry.util_ll_prev = *last;
        if *last == 0 {
            *first = ino;
        } else {
            PageStore::new(file).map_mut(entry_pos(*last), |tail: &mut SuperBlockEntry| {
                tail.util_ll_next = ino;
            })?;
        }
        *last = ino;
        *count += 1;

        Ok(())
    }

    fn dequeue(&mut self, ino: u64, entry: &mut SuperBlockEntry) -> Result<()> {
        let status = entry.status();
        entry.set_status(SbStatus::NoLl);

        let Self { file, head } = self;
        let Some((first, last, count)) = queue_mut(head, status) else {
            return Ok(());
        };
        let store = PageStore::new(file);
        let (prev, next) = (entry.util_ll_prev, entry.util_ll_next);
        if prev == 0 {
            *first = next;
        } else {
            store.map_mut(entry_pos(prev), |prev: &mut SuperBlockEntry| prev.util_ll_next = next)?;
        }
        if next == 0 {
            *last = prev;
        } else {
            store.map_mut(entry_pos(next), |next: &mut SuperBlockEntry| next.util_ll_prev = prev)?;
        }
        *count -= 1;
        entry.util_ll_prev = 0;
        entry.util_ll_next = 0;
        log::trace!("inode {ino} leaves {status:?} queue");

        Ok(())
    }
}

/// 双向链表的 (首, 尾, 计数)
fn queue_mut(head: &mut SuperBlockHead, status: SbStatus) -> Option<(&mut u64, &mut u64, &mut i64)> {
    match status {
        SbStatus::IsDirty => Some((
            &mut head.first_dirty_inode,
            &mut head.last_dirty_inode,
            &mut head.num_dirty,
        )),
        SbStatus::ToBeDeleted => Some((
            &mut head.first_to_delete_inode,
            &mut head.last_to_delete_inode,
            &mut head.num_to_be_deleted,
        )),
        _ => None,
    }
}
