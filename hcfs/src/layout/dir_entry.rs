use std::borrow::Cow;
use std::cmp::Ordering;

use vfs::DirEntryType;

use crate::page_store::Pod;
use crate::{Error, Result, MAX_FILENAME_LEN};

/// 落盘的目录项，固定 272 字节
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DirEntry {
    pub d_ino: u64,
    // 最后一字节留给 \0
    d_name: [u8; MAX_FILENAME_LEN + 1],
    d_type: u8,
    _pad: [u8; 7],
}

unsafe impl Pod for DirEntry {}

impl DirEntry {
    pub const SIZE: usize = 272;

    /// 名字以 `\0` 结尾存放，故不得为空或含 `\0`
    pub fn new(name: &str, ino: u64, ty: DirEntryType) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.len() > MAX_FILENAME_LEN {
            return Err(Error::NameTooLong);
        }
        if bytes.is_empty() || bytes.contains(&0) {
            return Err(Error::InvalidName);
        }
        let mut entry = Self::zeroed();
        entry.d_ino = ino;
        entry.d_name[..bytes.len()].copy_from_slice(bytes);
        entry.d_type = ty as u8;

        Ok(entry)
    }

    #[inline]
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .d_name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_FILENAME_LEN);
        &self.d_name[..len]
    }

    #[inline]
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    /// 逐字节比较，与 strcmp 一致
    #[inline]
    pub fn cmp_name(&self, name: &[u8]) -> Ordering {
        self.name_bytes().cmp(name)
    }

    #[inline]
    pub fn ty(&self) -> DirEntryType {
        DirEntryType::try_from(self.d_type).unwrap_or_default()
    }

    #[inline]
    pub fn set_ty(&mut self, ty: DirEntryType) {
        self.d_type = ty as u8;
    }
}

impl From<&DirEntry> for vfs::DirEntry {
    fn from(entry: &DirEntry) -> Self {
        Self {
            inode: entry.d_ino,
            ty: entry.ty(),
            name: entry.name().into_owned(),
        }
    }
}
