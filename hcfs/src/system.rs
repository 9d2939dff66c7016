//! 全局容量计数与关闭标志

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::page_store::{PageStore, Pod};
use crate::{PageId, Result};

/// 落盘的全局计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SystemData {
    /// 所有文件的逻辑大小之和
    pub system_size: i64,
    /// 本地缓存的数据块字节数
    pub cache_size: i64,
    /// 本地缓存的数据块个数
    pub cache_blocks: i64,
}

unsafe impl Pod for SystemData {}

#[derive(Debug)]
pub struct HcfsSystem {
    path: PathBuf,
    data: Mutex<SystemData>,
    going_down: AtomicBool,
}

impl HcfsSystem {
    /// 读入系统文件，不存在时从零开始
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match File::open(&path) {
            Ok(file) => PageStore::new(&file).read(PageId::NULL)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => SystemData::default(),
            Err(err) => {
                log::error!("cannot open system file {path:?}: {err}");
                return Err(err.into());
            }
        };
        log::debug!("system data loaded: {data:?}");

        Ok(Self {
            path,
            data: Mutex::new(data),
            going_down: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn data(&self) -> SystemData {
        *self.data.lock()
    }

    /// 在计数锁内修改计数
    pub fn update<V>(&self, f: impl FnOnce(&mut SystemData) -> V) -> V {
        f(&mut self.data.lock())
    }

    /// 把计数写回系统文件
    pub fn sync(&self) -> Result<()> {
        let data = self.data();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        PageStore::new(&file).write(PageId::NULL, &data)?;

        Ok(())
    }

    #[inline]
    pub fn shutdown(&self) {
        self.going_down.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_going_down(&self) -> bool {
        self.going_down.load(Ordering::Acquire)
    }
}
