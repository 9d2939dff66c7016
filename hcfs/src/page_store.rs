//! # 页存储层
//!
//! 元数据文件被视为一个以字节偏移编号的页堆：偏移 0 处是 stat 头，
//! 因此页号 0 永远不是合法页，用作空指针。
//!
//! 所有读写都是定位读写，不依赖文件游标。

use std::fs::File;
use std::io;
use std::mem;
use std::os::unix::fs::FileExt;
use std::ptr;
use std::slice;

use derive_more::{From, Into};

/// 页在元数据文件中的字节偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, From, Into)]
#[repr(transparent)]
pub struct PageId(u64);

impl PageId {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn offset(self) -> u64 {
        self.0
    }
}

/// 可按字节原样落盘的定长记录
///
/// # Safety
///
/// 实现者必须是 `#[repr(C)]` 且不含隐式填充，任意字节序列（包括全零）都是合法值。
pub unsafe trait Pod: Sized {
    #[inline]
    fn zeroed() -> Self {
        unsafe { mem::zeroed() }
    }

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), mem::size_of::<Self>()) }
    }

    #[inline]
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), mem::size_of::<Self>()) }
    }
}

unsafe impl Pod for PageId {}
unsafe impl Pod for u64 {}
unsafe impl<T: Pod, const N: usize> Pod for [T; N] {}

#[derive(Debug, Clone, Copy)]
pub struct PageStore<'a> {
    file: &'a File,
}

impl<'a> PageStore<'a> {
    #[inline]
    pub fn new(file: &'a File) -> Self {
        Self { file }
    }

    #[inline]
    pub fn file(&self) -> &'a File {
        self.file
    }

    pub fn read<T: Pod>(&self, id: PageId) -> io::Result<T> {
        let mut value = T::zeroed();
        self.load(id, &mut value)?;
        Ok(value)
    }

    /// 大页放在堆上读
    pub fn read_boxed<T: Pod>(&self, id: PageId) -> io::Result<Box<T>> {
        let mut value = Box::new(T::zeroed());
        self.load(id, &mut *value)?;
        Ok(value)
    }

    #[inline]
    pub fn load<T: Pod>(&self, id: PageId, value: &mut T) -> io::Result<()> {
        self.file.read_exact_at(value.as_bytes_mut(), id.0)
    }

    #[inline]
    pub fn write<T: Pod>(&self, id: PageId, value: &T) -> io::Result<()> {
        self.file.write_all_at(value.as_bytes(), id.0)
    }

    /// 在文件末尾追加一页，返回其页号
    pub fn allocate<T: Pod>(&self, value: &T) -> io::Result<PageId> {
        let id = PageId(self.file.metadata()?.len());
        self.write(id, value)?;
        Ok(id)
    }

    #[inline]
    pub fn map<T: Pod, V>(&self, id: PageId, f: impl FnOnce(&T) -> V) -> io::Result<V> {
        let value = self.read_boxed::<T>(id)?;
        Ok(f(&value))
    }

    /// 读出、修改后写回
    pub fn map_mut<T: Pod, V>(&self, id: PageId, f: impl FnOnce(&mut T) -> V) -> io::Result<V> {
        let mut value = self.read_boxed::<T>(id)?;
        let ret = f(&mut value);
        self.write(id, &*value)?;
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Pair {
        a: u64,
        b: u64,
    }

    unsafe impl Pod for Pair {}

    #[test]
    fn allocate_and_map() {
        let file = tempfile::tempfile().unwrap();
        file.set_len(16).unwrap();
        let store = PageStore::new(&file);

        let id = store.allocate(&Pair { a: 1, b: 2 }).unwrap();
        assert_eq!(16, id.offset());
        store.map_mut(id, |pair: &mut Pair| pair.b = 7).unwrap();
        assert_eq!(8, store.map(id, |pair: &Pair| pair.a + pair.b).unwrap());
        assert!(store.read::<Pair>(PageId::from(64)).is_err());
    }
}
