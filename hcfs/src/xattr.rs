//! 数据块文件上的 `user.dirty` 扩展属性

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

const DIRTY_XATTR: &[u8] = b"user.dirty\0";

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
}

/// 读取脏标记：`Some(true)` 为 `T`，`Some(false)` 为 `F`，其余为 `None`
pub fn get_dirty_status(path: &Path) -> io::Result<Option<bool>> {
    let path = c_path(path)?;
    let mut value = [0u8; 1];
    let len = unsafe {
        libc::getxattr(
            path.as_ptr(),
            DIRTY_XATTR.as_ptr().cast(),
            value.as_mut_ptr().cast(),
            value.len(),
        )
    };
    if len < 0 {
        let err = io::Error::last_os_error();
        return match err.raw_os_error() {
            Some(libc::ENODATA) | Some(libc::ERANGE) => Ok(None),
            _ => Err(err),
        };
    }

    Ok(match &value[..len as usize] {
        b"T" => Some(true),
        b"F" => Some(false),
        _ => None,
    })
}

pub fn set_dirty_status(path: &Path, dirty: bool) -> io::Result<()> {
    let path = c_path(path)?;
    let value: &[u8] = if dirty { b"T" } else { b"F" };
    let ret = unsafe {
        libc::setxattr(
            path.as_ptr(),
            DIRTY_XATTR.as_ptr().cast(),
            value.as_ptr().cast(),
            value.len(),
            0,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// 所在文件系统是否支持用户扩展属性
pub fn supported(path: &Path) -> bool {
    set_dirty_status(path, false).is_ok()
}
