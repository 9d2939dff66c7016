use std::io;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("no such entry")]
    NotFound,
    /// 调用者未持有对应 inode 的锁
    #[error("inode lock is not held by the caller")]
    PermissionDenied,
    #[error("out of memory")]
    OutOfMemory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("file name too long")]
    NameTooLong,
    /// 空名字或含 `\0`
    #[error("invalid file name")]
    InvalidName,
    #[error("is a directory")]
    IsADirectory,
    #[error("not a directory")]
    NotADirectory,
    /// 块索引超出四级间接索引的容量，或文件大小无法表示
    #[error("block {0} is out of range")]
    OutOfRange(u64),
    #[error("corrupted metadata: {0}")]
    Corrupted(&'static str),
}

impl Error {
    /// 转换为 POSIX 错误码，供 FUSE 层回传内核
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::NotFound => libc::ENOENT,
            Self::PermissionDenied => libc::EPERM,
            Self::OutOfMemory => libc::ENOMEM,
            Self::DirectoryNotEmpty => libc::ENOTEMPTY,
            Self::AlreadyExists => libc::EEXIST,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::InvalidName => libc::EINVAL,
            Self::IsADirectory => libc::EISDIR,
            Self::NotADirectory => libc::ENOTDIR,
            Self::OutOfRange(_) => libc::EFBIG,
            Self::Corrupted(_) => libc::EIO,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound => true,
            Self::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno() {
        assert_eq!(libc::ENOENT, Error::NotFound.errno());
        assert_eq!(libc::EPERM, Error::PermissionDenied.errno());
        assert_eq!(libc::ENOTEMPTY, Error::DirectoryNotEmpty.errno());
        assert_eq!(libc::EINVAL, Error::InvalidName.errno());
        let io = io::Error::from_raw_os_error(libc::ENOSPC);
        assert_eq!(libc::ENOSPC, Error::from(io).errno());
        assert!(Error::from(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
    }
}
