use crate::layout::HcfsStat;
use crate::page_store::Pod;

/// 超级块项所在的链表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SbStatus {
    #[default]
    NoLl = 0,
    IsDirty = 1,
    ToBeDeleted = 2,
    ToBeReclaimed = 3,
    Reclaimed = 4,
}

impl TryFrom<u8> for SbStatus {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => Self::NoLl,
            1 => Self::IsDirty,
            2 => Self::ToBeDeleted,
            3 => Self::ToBeReclaimed,
            4 => Self::Reclaimed,
            _ => return Err(raw),
        })
    }
}

/// 每个 inode 一项，按 inode 号定位
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct SuperBlockEntry {
    pub inode_stat: HcfsStat,
    pub util_ll_next: u64,
    pub util_ll_prev: u64,
    status: u8,
    pub in_transit: u8,
    pub mod_after_in_transit: u8,
    _pad: [u8; 5],
    pub this_index: u64,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct SuperBlockHead {
    pub num_inode_reclaimed: i64,
    pub first_reclaimed_inode: u64,
    pub last_reclaimed_inode: u64,
    pub first_dirty_inode: u64,
    pub last_dirty_inode: u64,
    pub first_to_delete_inode: u64,
    pub last_to_delete_inode: u64,
    pub num_to_be_reclaimed: i64,
    pub num_to_be_deleted: i64,
    pub num_dirty: i64,
    pub num_total_inodes: i64,
    pub num_active_inodes: i64,
}

unsafe impl Pod for SuperBlockEntry {}
unsafe impl Pod for SuperBlockHead {}

impl SuperBlockEntry {
    /// 新分配的项，不在任何链表上
    pub fn new(inode_stat: HcfsStat, this_index: u64, generation: u64) -> Self {
        Self {
            inode_stat,
            this_index,
            generation,
            ..Default::default()
        }
    }

    /// 无法识别的状态按 `NoLl` 处理
    #[inline]
    pub fn status(&self) -> SbStatus {
        SbStatus::try_from(self.status).unwrap_or_default()
    }

    #[inline]
    pub fn set_status(&mut self, status: SbStatus) {
        self.status = status as u8;
    }
}
