//! # 元数据缓存
//!
//! 每个 inode 对应一个缓存项，缓存项自带一把互斥锁。
//! 目录 B 树与间接索引的所有入口都要求 `&mut MetaCacheEntry`，
//! 而它只能经由 [`MetaCache::lock_entry`] 返回的守卫取得，
//! 因此“调用者已持有 inode 锁”由类型保证。
//!
//! 缓存项对 stat 与类型专属头采用写穿策略：更新即落盘。

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::btree;
use crate::config::HcfsConfig;
use crate::layout::{
    DirEntryPage, DirMeta, FileMeta, HcfsStat, SymlinkMeta, STAT_POS, TYPED_META_POS,
};
use crate::page_store::PageStore;
use crate::{Error, PageId, Result};

/// 持有即代表持有该 inode 的锁，析构时解锁
pub type MetaCacheGuard = ArcMutexGuard<RawMutex, MetaCacheEntry>;

#[derive(Debug)]
pub struct MetaCache {
    config: HcfsConfig,
    entries: Mutex<HashMap<u64, Arc<Mutex<MetaCacheEntry>>>>,
}

impl MetaCache {
    /// 缓存项个数的上限
    const CAPACITY: usize = 1024;

    pub fn new(config: HcfsConfig) -> Self {
        Self {
            config,
            entries: Mutex::default(),
        }
    }

    /// 锁住 inode 的缓存项，必要时新建
    pub fn lock_entry(&self, ino: u64) -> Result<MetaCacheGuard> {
        let path = self.config.fetch_meta_path(ino)?;
        let entry = {
            let mut entries = self.entries.lock();
            // 缓存策略：满了就踢走闲置项
            if entries.len() >= Self::CAPACITY && !entries.contains_key(&ino) {
                entries.retain(|_, entry| Arc::strong_count(entry) > 1);
            }
            entries
                .entry(ino)
                .or_insert_with(|| Arc::new(Mutex::new(MetaCacheEntry::new(ino, path))))
                .clone()
        };

        Ok(entry.lock_arc())
    }

    #[inline]
    pub fn unlock_entry(&self, guard: MetaCacheGuard) {
        drop(guard);
    }

    /// 元数据文件被移走或删除后调用
    pub fn remove(&self, ino: u64) {
        if let Some(entry) = self.entries.lock().remove(&ino) {
            log::trace!("meta cache drops inode {ino}");
            // 仍被持有的缓存项随最后一个守卫一同释放
            if let Some(mut entry) = entry.try_lock() {
                entry.close_file();
            }
        }
    }
}

#[derive(Debug)]
pub struct MetaCacheEntry {
    ino: u64,
    path: PathBuf,
    file: Option<Arc<File>>,
    stat: Option<HcfsStat>,
    dir_meta: Option<DirMeta>,
    file_meta: Option<FileMeta>,
    /// 最近一次 `seek_dir_entry` 命中的页
    dir_page: Option<Box<DirEntryPage>>,
}

impl MetaCacheEntry {
    fn new(ino: u64, path: PathBuf) -> Self {
        Self {
            ino,
            path,
            file: None,
            stat: None,
            dir_meta: None,
            file_meta: None,
            dir_page: None,
        }
    }

    #[inline]
    pub fn ino(&self) -> u64 {
        self.ino
    }

    /// 要求守卫属于给定 inode
    pub fn ensure_owner(&self, ino: u64) -> Result<()> {
        if self.ino == ino {
            Ok(())
        } else {
            log::error!("inode {ino} operated with the lock of inode {}", self.ino);
            Err(Error::PermissionDenied)
        }
    }

    /// 确保元数据文件已打开并返回其句柄
    pub fn open_file(&mut self) -> Result<Arc<File>> {
        if let Some(file) = &self.file {
            return Ok(file.clone());
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Error::NotFound
                } else {
                    log::error!("cannot open meta file {:?}: {err}", self.path);
                    Error::Io(err)
                }
            })?;
        let file = Arc::new(file);
        self.file = Some(file.clone());

        Ok(file)
    }

    /// 新建元数据文件，已存在时失败
    pub(crate) fn create_file(&mut self) -> Result<Arc<File>> {
        self.close_file();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::AlreadyExists
                } else {
                    log::error!("cannot create meta file {:?}: {err}", self.path);
                    Error::Io(err)
                }
            })?;
        let file = Arc::new(file);
        self.file = Some(file.clone());

        Ok(file)
    }

    /// 关闭文件并清空所有缓存内容
    pub fn close_file(&mut self) {
        self.file = None;
        self.stat = None;
        self.dir_meta = None;
        self.file_meta = None;
        self.dir_page = None;
    }

    pub fn lookup_stat(&mut self) -> Result<HcfsStat> {
        if let Some(stat) = self.stat {
            return Ok(stat);
        }
        let file = self.open_file()?;
        let stat: HcfsStat = PageStore::new(&file).read(STAT_POS)?;
        if !stat.is_valid() {
            log::error!("inode {} has a meta file without magic", self.ino);
            return Err(Error::Corrupted("bad magic in meta file"));
        }
        self.stat = Some(stat);

        Ok(stat)
    }

    pub fn update_stat(&mut self, stat: &HcfsStat) -> Result<()> {
        let file = self.open_file()?;
        PageStore::new(&file).write(STAT_POS, stat)?;
        self.stat = Some(*stat);

        Ok(())
    }

    pub fn lookup_dir_data(&mut self) -> Result<DirMeta> {
        if let Some(meta) = self.dir_meta {
            return Ok(meta);
        }
        if !self.lookup_stat()?.is_dir() {
            return Err(Error::NotADirectory);
        }
        let file = self.open_file()?;
        let meta: DirMeta = PageStore::new(&file).read(TYPED_META_POS)?;
        self.dir_meta = Some(meta);

        Ok(meta)
    }

    pub fn update_dir_data(&mut self, meta: &DirMeta) -> Result<()> {
        let file = self.open_file()?;
        PageStore::new(&file).write(TYPED_META_POS, meta)?;
        self.dir_meta = Some(*meta);

        Ok(())
    }

    pub fn lookup_file_data(&mut self) -> Result<FileMeta> {
        if let Some(meta) = self.file_meta {
            return Ok(meta);
        }
        let stat = self.lookup_stat()?;
        if stat.is_dir() {
            return Err(Error::IsADirectory);
        }
        if !stat.is_reg() {
            return Err(Error::Corrupted("file data requested for a non-regular inode"));
        }
        let file = self.open_file()?;
        let meta: FileMeta = PageStore::new(&file).read(TYPED_META_POS)?;
        self.file_meta = Some(meta);

        Ok(meta)
    }

    pub fn update_file_data(&mut self, meta: &FileMeta) -> Result<()> {
        let file = self.open_file()?;
        PageStore::new(&file).write(TYPED_META_POS, meta)?;
        self.file_meta = Some(*meta);

        Ok(())
    }

    pub fn lookup_symlink_data(&mut self) -> Result<SymlinkMeta> {
        if !self.lookup_stat()?.is_symlink() {
            return Err(Error::Corrupted("symlink data requested for a non-symlink inode"));
        }
        let file = self.open_file()?;
        let meta = PageStore::new(&file).read(TYPED_META_POS)?;

        Ok(meta)
    }

    pub fn update_symlink_data(&mut self, meta: &SymlinkMeta) -> Result<()> {
        let file = self.open_file()?;
        PageStore::new(&file).write(TYPED_META_POS, meta)?;

        Ok(())
    }

    /// 丢弃缓存的目录页
    #[inline]
    pub fn drop_pages(&mut self) {
        self.dir_page = None;
    }

    /// 按名字在目录 B 树中查找，命中时缓存所在页并返回 (页号, 页内下标)
    pub fn seek_dir_entry(&mut self, name: &str) -> Result<Option<(PageId, usize)>> {
        let meta = self.lookup_dir_data()?;
        let file = self.open_file()?;
        let store = PageStore::new(&file);
        let found = btree::search(&store, meta.root_entry_page, name.as_bytes())?;

        Ok(found.map(|(page, index)| {
            let id = page.this_page_pos;
            self.dir_page = Some(page);
            (id, index)
        }))
    }

    #[inline]
    pub fn cached_dir_page(&self) -> Option<&DirEntryPage> {
        self.dir_page.as_deref()
    }

    #[inline]
    pub fn cached_dir_page_mut(&mut self) -> Option<&mut DirEntryPage> {
        self.dir_page.as_deref_mut()
    }

    /// 把缓存的目录页写回
    pub fn flush_dir_page(&mut self) -> Result<()> {
        if self.dir_page.is_none() {
            return Ok(());
        }
        let file = self.open_file()?;
        if let Some(page) = self.dir_page.as_deref() {
            PageStore::new(&file).write(page.this_page_pos, page)?;
        }

        Ok(())
    }
}
