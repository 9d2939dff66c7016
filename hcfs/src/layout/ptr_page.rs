use crate::page_store::Pod;
use crate::{PageId, POINTERS_PER_PAGE};

/// 间接索引页，空槽为 [`PageId::NULL`]
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct PtrEntryPage {
    pub ptr: [PageId; POINTERS_PER_PAGE as usize],
}

unsafe impl Pod for PtrEntryPage {}
