#![allow(dead_code)]

use std::sync::Arc;

use hcfs::{Hcfs, HcfsConfig};
use tempfile::TempDir;

pub const FILE_MODE: u32 = libc::S_IFREG as u32 | 0o644;

pub fn config(dir: &TempDir) -> HcfsConfig {
    HcfsConfig::new(dir.path().join("meta"), dir.path().join("block"))
}

pub fn open() -> (TempDir, Arc<Hcfs>) {
    let dir = tempfile::tempdir().unwrap();
    let hcfs = Hcfs::open(config(&dir)).unwrap();
    (dir, hcfs)
}

pub fn open_with(f: impl FnOnce(HcfsConfig) -> HcfsConfig) -> (TempDir, Arc<Hcfs>) {
    let dir = tempfile::tempdir().unwrap();
    let hcfs = Hcfs::open(f(config(&dir))).unwrap();
    (dir, hcfs)
}
