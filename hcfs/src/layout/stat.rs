use std::time::{SystemTime, UNIX_EPOCH};

use enumflags2::{bitflags, BitFlags};

use crate::page_store::Pod;

pub const HCFS_MAGIC: [u8; 4] = *b"hcfs";

/// 元数据文件开头的 stat 记录
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct HcfsStat {
    pub magic: [u8; 4],
    pub metaver: u32,
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    _pad: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    pub atime: i64,
    pub atime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub ctime: i64,
    pub ctime_nsec: i64,
}

unsafe impl Pod for HcfsStat {}

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFlag {
    Atime = 1 << 0,
    Mtime = 1 << 1,
    Ctime = 1 << 2,
}

impl HcfsStat {
    pub fn new(ino: u64, mode: u32) -> Self {
        let mut stat = Self {
            magic: HCFS_MAGIC,
            metaver: 1,
            ino,
            mode,
            nlink: 1,
            blksize: crate::MAX_BLOCK_SIZE as i64,
            ..Default::default()
        };
        stat.stamp(TimeFlag::Atime | TimeFlag::Mtime | TimeFlag::Ctime);
        stat
    }

    /// 把选中的时间戳设为当前时间
    pub fn stamp(&mut self, flags: impl Into<BitFlags<TimeFlag>>) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let (sec, nsec) = (now.as_secs() as i64, i64::from(now.subsec_nanos()));
        let flags = flags.into();

        if flags.contains(TimeFlag::Atime) {
            (self.atime, self.atime_nsec) = (sec, nsec);
        }
        if flags.contains(TimeFlag::Mtime) {
            (self.mtime, self.mtime_nsec) = (sec, nsec);
        }
        if flags.contains(TimeFlag::Ctime) {
            (self.ctime, self.ctime_nsec) = (sec, nsec);
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == HCFS_MAGIC
    }

    #[inline]
    pub fn file_type(&self) -> u32 {
        self.mode & libc::S_IFMT as u32
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_type() == libc::S_IFDIR as u32
    }

    #[inline]
    pub fn is_reg(&self) -> bool {
        self.file_type() == libc::S_IFREG as u32
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.file_type() == libc::S_IFLNK as u32
    }
}
