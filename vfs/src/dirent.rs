/// 目录项，供目录遍历返回
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number
    pub inode: u64,
    pub ty: DirEntryType,
    pub name: String,
}

/// 目录项类型，取值即落盘编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DirEntryType {
    Directory = 0,
    #[default]
    Regular = 1,
    SymLink = 2,
    Fifo = 3,
    Socket = 4,
}

impl DirEntryType {
    /// 由 `st_mode` 推断类型，无法识别的类型返回 `None`
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => Some(Self::Directory),
            m if m == libc::S_IFREG as u32 => Some(Self::Regular),
            m if m == libc::S_IFLNK as u32 => Some(Self::SymLink),
            m if m == libc::S_IFIFO as u32 => Some(Self::Fifo),
            m if m == libc::S_IFSOCK as u32 => Some(Self::Socket),
            _ => None,
        }
    }
}

impl TryFrom<u8> for DirEntryType {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            0 => Self::Directory,
            1 => Self::Regular,
            2 => Self::SymLink,
            3 => Self::Fifo,
            4 => Self::Socket,
            _ => return Err(raw),
        })
    }
}
