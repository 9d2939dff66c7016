//! # 多级间接块索引
//!
//! 文件的块项页按页号编址：
//! - 第 0 页：由文件头的 `direct` 直接指向
//! - 一级：`single_indirect` 指向一个间接页，可编号 P 页
//! - 二级：可编号 P² 页，三级 P³ 页，四级 P⁴ 页
//!
//! 其中 P = [`POINTERS_PER_PAGE`]。
//!
//! ## 页号编码
//!
//! 间接层内以 `页号 - 1` 再减去更低层级的总容量得到层内偏移；
//! 自顶向下每一层，层内偏移除以 P^剩余层数 得到槽位，取模后继续下降。

use std::fs::File;

use crate::layout::{BlockEntryPage, FileMeta, PtrEntryPage};
use crate::meta_cache::MetaCacheEntry;
use crate::page_store::{PageStore, Pod};
use crate::{Error, PageId, Result, POINTERS_PER_PAGE};

const P: u64 = POINTERS_PER_PAGE;

/// 一级索引可编号的页数
const INDIRECT1_COUNT: u64 = P;
/// 二级索引可编号的页数
const INDIRECT2_COUNT: u64 = P.pow(2);
/// 三级索引可编号的页数
const INDIRECT3_COUNT: u64 = P.pow(3);
/// 四级索引可编号的页数
const INDIRECT4_COUNT: u64 = P.pow(4);

/// 用上一级索引时的编号容量，第 0 页直接索引
const INDIRECT1_CAP: u64 = 1 + INDIRECT1_COUNT;
const INDIRECT2_CAP: u64 = INDIRECT1_CAP + INDIRECT2_COUNT;
const INDIRECT3_CAP: u64 = INDIRECT2_CAP + INDIRECT3_COUNT;
const INDIRECT4_CAP: u64 = INDIRECT3_CAP + INDIRECT4_COUNT;

/// 页号所在的索引层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PageLevel {
    Direct,
    Single,
    Double,
    Triple,
    Quadruple,
}

impl PageLevel {
    /// 需要经过的间接页个数
    #[inline]
    pub fn depth(self) -> u32 {
        self as u32
    }

    /// 本层之前所有层级的编号容量
    #[inline]
    fn base(self) -> u64 {
        match self {
            Self::Direct => 0,
            Self::Single => 1,
            Self::Double => INDIRECT1_CAP,
            Self::Triple => INDIRECT2_CAP,
            Self::Quadruple => INDIRECT3_CAP,
        }
    }

    fn root(self, meta: &FileMeta) -> PageId {
        match self {
            Self::Direct => meta.direct,
            Self::Single => meta.single_indirect,
            Self::Double => meta.double_indirect,
            Self::Triple => meta.triple_indirect,
            Self::Quadruple => meta.quadruple_indirect,
        }
    }

    fn root_mut(self, meta: &mut FileMeta) -> &mut PageId {
        match self {
            Self::Direct => &mut meta.direct,
            Self::Single => &mut meta.single_indirect,
            Self::Double => &mut meta.double_indirect,
            Self::Triple => &mut meta.triple_indirect,
            Self::Quadruple => &mut meta.quadruple_indirect,
        }
    }
}

/// 判定块项页号所在层级，需要第五层间接时报错
pub fn check_page_level(target_page: u64) -> Result<PageLevel> {
    Ok(match target_page {
        0 => PageLevel::Direct,
        p if p < INDIRECT1_CAP => PageLevel::Single,
        p if p < INDIRECT2_CAP => PageLevel::Double,
        p if p < INDIRECT3_CAP => PageLevel::Triple,
        p if p < INDIRECT4_CAP => PageLevel::Quadruple,
        p => return Err(Error::OutOfRange(p)),
    })
}

/// 自顶向下每一层的槽位
fn slots(level: PageLevel, target_page: u64) -> impl Iterator<Item = usize> {
    let mut rest = target_page - level.base();
    (0..level.depth()).rev().map(move |count| {
        let span = P.pow(count);
        let slot = rest / span;
        rest %= span;
        slot as usize
    })
}

/// 查找块项页，未分配时返回 [`PageId::NULL`]
pub fn seek_page(entry: &mut MetaCacheEntry, target_page: u64) -> Result<PageId> {
    let meta = entry.lookup_file_data()?;
    let file = entry.open_file()?;
    seek_page2(&meta, &file, target_page)
}

/// 不经元数据缓存，直接在给定文件头与元数据文件上查找
///
/// 供不持有 inode 锁的后台线程只读使用。
pub fn seek_page2(meta: &FileMeta, file: &File, target_page: u64) -> Result<PageId> {
    let level = check_page_level(target_page)?;
    let store = PageStore::new(file);

    let mut page = level.root(meta);
    for slot in slots(level, target_page) {
        if page.is_null() {
            break;
        }
        page = store.map(page, |ptrs: &PtrEntryPage| ptrs.ptr[slot])?;
    }

    Ok(page)
}

/// 查找块项页，沿途缺失的间接页与块项页都补齐，返回值必不为空
pub fn create_page(entry: &mut MetaCacheEntry, target_page: u64) -> Result<PageId> {
    let level = check_page_level(target_page)?;
    let mut meta = entry.lookup_file_data()?;
    let file = entry.open_file()?;
    let store = PageStore::new(&file);

    let mut page = level.root(&meta);
    if page.is_null() {
        page = if level == PageLevel::Direct {
            store.allocate(&BlockEntryPage::zeroed())?
        } else {
            store.allocate(&PtrEntryPage::zeroed())?
        };
        *level.root_mut(&mut meta) = page;
        entry.update_file_data(&meta)?;
        log::trace!("inode {} gets {level:?} root {page:?}", entry.ino());
    }

    let depth = level.depth();
    for (hop, slot) in slots(level, target_page).enumerate() {
        let mut ptrs = store.read_boxed::<PtrEntryPage>(page)?;
        if ptrs.ptr[slot].is_null() {
            // 最后一跳指向块项页，其余指向下一级间接页
            ptrs.ptr[slot] = if hop as u32 + 1 == depth {
                store.allocate(&BlockEntryPage::zeroed())?
            } else {
                store.allocate(&PtrEntryPage::zeroed())?
            };
            store.write(page, &*ptrs)?;
        }
        page = ptrs.ptr[slot];
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_boundaries() {
        assert_eq!(PageLevel::Direct, check_page_level(0).unwrap());
        assert_eq!(PageLevel::Single, check_page_level(1).unwrap());
        assert_eq!(PageLevel::Single, check_page_level(P).unwrap());
        assert_eq!(PageLevel::Double, check_page_level(P + 1).unwrap());
        assert_eq!(PageLevel::Double, check_page_level(P + P * P).unwrap());
        assert_eq!(PageLevel::Triple, check_page_level(P + P * P + 1).unwrap());
        assert_eq!(
            PageLevel::Quadruple,
            check_page_level(P + P.pow(2) + P.pow(3) + 1).unwrap()
        );
        assert_eq!(
            PageLevel::Quadruple,
            check_page_level(P + P.pow(2) + P.pow(3) + P.pow(4)).unwrap()
        );
    }

    #[test]
    fn fifth_level_is_rejected() {
        let beyond = P + P.pow(2) + P.pow(3) + P.pow(4) + 1;
        assert!(matches!(check_page_level(beyond), Err(Error::OutOfRange(p)) if p == beyond));
        assert!(check_page_level(u64::MAX).is_err());
    }

    #[test]
    fn slot_walk() {
        assert_eq!(vec![0], slots(PageLevel::Single, 1).collect::<Vec<_>>());
        assert_eq!(vec![1023], slots(PageLevel::Single, P).collect::<Vec<_>>());
        assert_eq!(vec![0, 0], slots(PageLevel::Double, P + 1).collect::<Vec<_>>());
        assert_eq!(vec![1, 0], slots(PageLevel::Double, 2 * P + 1).collect::<Vec<_>>());
        assert_eq!(
            vec![1023, 1023],
            slots(PageLevel::Double, P + P * P).collect::<Vec<_>>()
        );
        assert_eq!(
            vec![0, 0, 0],
            slots(PageLevel::Triple, P + P * P + 1).collect::<Vec<_>>()
        );
        assert!(slots(PageLevel::Direct, 0).next().is_none());
    }
}
