//! # 文件系统上下文
//!
//! [`Hcfs`] 把配置、元数据缓存、超级块、全局计数与查找计数表收在一起，
//! 生命周期与命名空间操作都挂在它上面。

use std::fs;
use std::sync::Arc;

use crate::config::HcfsConfig;
use crate::dir::create_dir_meta;
use crate::layout::HcfsStat;
use crate::lookup::LookupTable;
use crate::meta_cache::MetaCache;
use crate::super_block::SuperBlock;
use crate::system::HcfsSystem;
use crate::{Result, ROOT_INODE};

#[derive(Debug)]
pub struct Hcfs {
    config: HcfsConfig,
    meta_cache: MetaCache,
    super_block: SuperBlock,
    system: HcfsSystem,
    lookup: LookupTable,
}

impl Hcfs {
    /// 打开元数据与数据块目录，首次使用时建立根目录
    pub fn open(config: HcfsConfig) -> Result<Arc<Self>> {
        fs::create_dir_all(config.meta_path())?;
        fs::create_dir_all(config.block_path())?;

        let hcfs = Self {
            meta_cache: MetaCache::new(config.clone()),
            super_block: SuperBlock::open(&config)?,
            system: HcfsSystem::open(config.system_file_path())?,
            lookup: LookupTable::new(),
            config,
        };
        if !hcfs.config.fetch_meta_path(ROOT_INODE)?.exists() {
            hcfs.create_root()?;
        }

        Ok(Arc::new(hcfs))
    }

    fn create_root(&self) -> Result<()> {
        let mut stat = HcfsStat::new(ROOT_INODE, libc::S_IFDIR as u32 | 0o755);
        stat.nlink = 2;

        let mut root = self.meta_cache.lock_entry(ROOT_INODE)?;
        create_dir_meta(&mut root, &stat, ROOT_INODE)?;
        self.super_block.register_root(&stat)?;
        log::info!("created root directory under {:?}", self.config.meta_path());

        Ok(())
    }

    #[inline]
    pub fn config(&self) -> &HcfsConfig {
        &self.config
    }

    #[inline]
    pub fn meta_cache(&self) -> &MetaCache {
        &self.meta_cache
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    #[inline]
    pub fn system(&self) -> &HcfsSystem {
        &self.system
    }

    #[inline]
    pub fn lookup_table(&self) -> &LookupTable {
        &self.lookup
    }

    /// 停止后台扫描并落盘全局计数
    pub fn shutdown(&self) -> Result<()> {
        self.system.shutdown();
        self.system.sync()
    }
}
