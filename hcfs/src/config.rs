//! 运行时配置与路径推导

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{NUMSUBDIR, RECLAIM_TRIGGER};

#[derive(Debug, Clone)]
pub struct HcfsConfig {
    /// 元数据目录
    meta_path: PathBuf,
    /// 数据块目录
    block_path: PathBuf,
    /// 触发批量回收的待回收 inode 数
    reclaim_trigger: u64,
}

impl HcfsConfig {
    pub fn new(meta_path: impl Into<PathBuf>, block_path: impl Into<PathBuf>) -> Self {
        Self {
            meta_path: meta_path.into(),
            block_path: block_path.into(),
            reclaim_trigger: RECLAIM_TRIGGER,
        }
    }

    #[inline]
    pub fn with_reclaim_trigger(mut self, trigger: u64) -> Self {
        self.reclaim_trigger = trigger;
        self
    }

    #[inline]
    pub fn meta_path(&self) -> &Path {
        &self.meta_path
    }

    #[inline]
    pub fn block_path(&self) -> &Path {
        &self.block_path
    }

    #[inline]
    pub fn reclaim_trigger(&self) -> u64 {
        self.reclaim_trigger
    }

    /// `<meta>/sub_{ino % NUMSUBDIR}/meta{ino}`，分片目录不存在时创建
    pub fn fetch_meta_path(&self, ino: u64) -> io::Result<PathBuf> {
        let dir = self.meta_path.join(format!("sub_{}", ino % NUMSUBDIR));
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("meta{ino}")))
    }

    /// 待删除元数据的暂存位置
    pub fn fetch_todelete_path(&self, ino: u64) -> io::Result<PathBuf> {
        let dir = self
            .meta_path
            .join("todelete")
            .join(format!("sub_{}", ino % NUMSUBDIR));
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("meta{ino}")))
    }

    /// `<block>/sub_{(ino + blockno) % NUMSUBDIR}/block{ino}_{blockno}`
    pub fn fetch_block_path(&self, ino: u64, blockno: u64) -> io::Result<PathBuf> {
        let dir = self.block_shard((ino + blockno) % NUMSUBDIR);
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("block{ino}_{blockno}")))
    }

    #[inline]
    pub fn block_shard(&self, shard: u64) -> PathBuf {
        self.block_path.join(format!("sub_{shard}"))
    }

    #[inline]
    pub fn markdelete_path(&self) -> PathBuf {
        self.meta_path.join("markdelete")
    }

    #[inline]
    pub fn super_block_path(&self) -> PathBuf {
        self.meta_path.join("superblock")
    }

    #[inline]
    pub fn unclaimed_list_path(&self) -> PathBuf {
        self.meta_path.join("unclaimedlist")
    }

    #[inline]
    pub fn system_file_path(&self) -> PathBuf {
        self.meta_path.join("hcfssystemfile")
    }
}

/// 解析 `block{ino}_{blockno}`
pub(crate) fn parse_block_name(name: &str) -> Option<(u64, u64)> {
    let (ino, blockno) = name.strip_prefix("block")?.split_once('_')?;
    Some((ino.parse().ok()?, blockno.parse().ok()?))
}

/// 解析 `inode{ino}`
pub(crate) fn parse_marker_name(name: &str) -> Option<u64> {
    name.strip_prefix("inode")?.parse().ok()
}
