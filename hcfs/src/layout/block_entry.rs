use crate::page_store::Pod;
use crate::MAX_BLOCK_ENTRIES_PER_PAGE;

/// 块的存放位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BlockStatus {
    #[default]
    None = 0,
    /// 仅在本地
    Ldisk = 1,
    /// 仅在云端
    Cloud = 2,
    Both = 3,
    /// 本地上传中
    LtoC = 4,
    /// 云端下载中
    CtoL = 5,
    ToDelete = 6,
}

impl TryFrom<u8> for BlockStatus {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => Self::None,
            1 => Self::Ldisk,
            2 => Self::Cloud,
            3 => Self::Both,
            4 => Self::LtoC,
            5 => Self::CtoL,
            6 => Self::ToDelete,
            _ => return Err(raw),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct BlockEntry {
    status: u8,
    pub uploaded: u8,
    _pad: [u8; 2],
    pub paged_out_count: u32,
    pub seqnum: i64,
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct BlockEntryPage {
    pub num_entries: u32,
    _pad: u32,
    pub block_entries: [BlockEntry; MAX_BLOCK_ENTRIES_PER_PAGE as usize],
}

unsafe impl Pod for BlockEntryPage {}

impl BlockEntry {
    /// 无法识别的状态按 `None` 处理
    #[inline]
    pub fn status(&self) -> BlockStatus {
        BlockStatus::try_from(self.status).unwrap_or_default()
    }

    #[inline]
    pub fn set_status(&mut self, status: BlockStatus) {
        self.status = status as u8;
    }
}
