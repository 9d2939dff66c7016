mod dirent;
mod error;

pub use self::{
    dirent::{DirEntry, DirEntryType},
    error::{Error, Result},
};
