mod common;

use std::fs;

use hcfs::layout::SbStatus;
use hcfs::{Error, Hcfs, MAX_BLOCK_SIZE, ROOT_INODE};

use common::FILE_MODE;

#[test]
fn markers_are_idempotent() {
    let (_dir, hcfs) = common::open();
    assert!(matches!(hcfs.disk_cleardelete(9), Err(Error::NotFound)));

    hcfs.disk_markdelete(9).unwrap();
    hcfs.disk_markdelete(9).unwrap();
    assert!(hcfs.disk_checkdelete(9));
    let markers = fs::read_dir(hcfs.config().markdelete_path()).unwrap().count();
    assert_eq!(1, markers);

    hcfs.disk_cleardelete(9).unwrap();
    assert!(!hcfs.disk_checkdelete(9));
    hcfs.disk_cleardelete(9).unwrap();
}

#[test]
fn unlink_removes_blocks_and_meta() {
    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "doomed", FILE_MODE).unwrap();
    hcfs.write_block(ino, 0, &[1; 4096]).unwrap();
    hcfs.write_block(ino, 1, &[2; 100]).unwrap();

    let data = hcfs.system().data();
    assert_eq!(4196, data.cache_size);
    assert_eq!(2, data.cache_blocks);
    assert_eq!(MAX_BLOCK_SIZE as i64 + 100, data.system_size);

    hcfs.unlink(ROOT_INODE, "doomed").unwrap();
    assert!(matches!(hcfs.lookup(ROOT_INODE, "doomed"), Err(Error::NotFound)));
    assert!(!hcfs.config().fetch_meta_path(ino).unwrap().exists());
    assert!(hcfs.config().fetch_todelete_path(ino).unwrap().exists());
    assert!(!hcfs.config().fetch_block_path(ino, 0).unwrap().exists());
    assert!(!hcfs.config().fetch_block_path(ino, 1).unwrap().exists());
    assert!(!hcfs.disk_checkdelete(ino));

    let data = hcfs.system().data();
    assert_eq!((0, 0, 0), (data.cache_size, data.cache_blocks, data.system_size));

    let entry = hcfs.super_block().read(ino).unwrap();
    assert_eq!(SbStatus::ToBeDeleted, entry.status());
    assert_eq!(0, entry.inode_stat.ino);
    assert_eq!(FILE_MODE, entry.inode_stat.mode);
    assert_eq!(1, hcfs.super_block().head().num_active_inodes);
}

#[test]
fn extra_links_only_decrease() {
    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "shared", FILE_MODE).unwrap();
    {
        let mut entry = hcfs.meta_cache().lock_entry(ino).unwrap();
        let mut stat = entry.lookup_stat().unwrap();
        stat.nlink = 2;
        entry.update_stat(&stat).unwrap();
    }

    hcfs.unlink(ROOT_INODE, "shared").unwrap();
    assert_eq!(1, hcfs.stat(ino).unwrap().nlink);
    assert!(!hcfs.disk_checkdelete(ino));
}

#[test]
fn deletion_waits_for_forget() {
    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "open", FILE_MODE).unwrap();
    hcfs.write_block(ino, 0, b"still open").unwrap();
    assert_eq!(ino, hcfs.lookup(ROOT_INODE, "open").unwrap().inode);
    hcfs.lookup(ROOT_INODE, "open").unwrap();
    assert_eq!(2, hcfs.lookup_table().count(ino));

    hcfs.unlink(ROOT_INODE, "open").unwrap();
    assert!(hcfs.disk_checkdelete(ino));
    assert!(hcfs.config().fetch_meta_path(ino).unwrap().exists());
    assert!(hcfs.config().fetch_block_path(ino, 0).unwrap().exists());

    hcfs.forget(ino, 1).unwrap();
    assert!(hcfs.config().fetch_meta_path(ino).unwrap().exists());
    hcfs.forget(ino, 1).unwrap();
    assert!(!hcfs.disk_checkdelete(ino));
    assert!(!hcfs.config().fetch_meta_path(ino).unwrap().exists());
    assert!(!hcfs.config().fetch_block_path(ino, 0).unwrap().exists());
}

#[test]
fn startup_resumes_interrupted_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let ino = {
        let hcfs = Hcfs::open(common::config(&dir)).unwrap();
        let ino = hcfs.mknod(ROOT_INODE, "crashy", FILE_MODE).unwrap();
        hcfs.write_block(ino, 0, &[7; 512]).unwrap();
        hcfs.write_block(ino, 2, &[7; 512]).unwrap();
        hcfs.system().sync().unwrap();

        // 元数据已移走、数据块尚未删除时崩溃
        hcfs.disk_markdelete(ino).unwrap();
        hcfs.delete_inode_meta(ino).unwrap();
        ino
    };

    let hcfs = Hcfs::open(common::config(&dir)).unwrap();
    assert!(hcfs.disk_checkdelete(ino));
    assert!(hcfs.config().fetch_block_path(ino, 2).unwrap().exists());

    assert_eq!(1, hcfs.startup_finish_delete().unwrap());
    assert!(!hcfs.disk_checkdelete(ino));
    assert!(!hcfs.config().fetch_block_path(ino, 0).unwrap().exists());
    assert!(!hcfs.config().fetch_block_path(ino, 2).unwrap().exists());
    let data = hcfs.system().data();
    assert_eq!((0, 0, 0), (data.cache_size, data.cache_blocks, data.system_size));

    assert_eq!(0, hcfs.startup_finish_delete().unwrap());
}

#[test]
fn startup_without_markers() {
    let (_dir, hcfs) = common::open();
    assert_eq!(0, hcfs.startup_finish_delete().unwrap());
}

#[test]
fn rmdir_requires_empty_dir() {
    let (_dir, hcfs) = common::open();
    let sub = hcfs.mkdir(ROOT_INODE, "sub", 0o755).unwrap();
    hcfs.mknod(sub, "inner", FILE_MODE).unwrap();
    hcfs.symlink(sub, "link", "inner").unwrap();
    assert_eq!(3, hcfs.stat(ROOT_INODE).unwrap().nlink);

    assert!(matches!(hcfs.rmdir(ROOT_INODE, "sub"), Err(Error::DirectoryNotEmpty)));
    assert!(matches!(hcfs.unlink(ROOT_INODE, "sub"), Err(Error::IsADirectory)));
    assert!(matches!(hcfs.rmdir(sub, "inner"), Err(Error::NotADirectory)));

    let link = hcfs.lookup(sub, "link").unwrap();
    assert_eq!("inner", hcfs.readlink(link.inode).unwrap());
    hcfs.forget(link.inode, 1).unwrap();

    hcfs.unlink(sub, "inner").unwrap();
    hcfs.unlink(sub, "link").unwrap();
    hcfs.rmdir(ROOT_INODE, "sub").unwrap();
    assert_eq!(2, hcfs.stat(ROOT_INODE).unwrap().nlink);
    assert!(!hcfs.config().fetch_meta_path(sub).unwrap().exists());
    let names: Vec<_> = hcfs
        .readdir(ROOT_INODE)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(vec![".", ".."], names);
}

#[test]
fn failed_create_releases_inode() {
    let (_dir, hcfs) = common::open();
    let sb = hcfs.super_block();

    // 名字不合法时不分配 inode
    assert!(matches!(
        hcfs.mknod(ROOT_INODE, &"x".repeat(300), FILE_MODE),
        Err(Error::NameTooLong)
    ));
    assert!(matches!(hcfs.mkdir(ROOT_INODE, "a\0b", 0o755), Err(Error::InvalidName)));
    let head = sb.head();
    assert_eq!((0, 1), (head.num_total_inodes, head.num_active_inodes));

    // 下一个 inode 的元数据位置被占，建文件失败后 inode 号交还
    let blocker = hcfs.config().fetch_meta_path(2).unwrap();
    fs::create_dir(&blocker).unwrap();
    assert!(matches!(
        hcfs.mknod(ROOT_INODE, "late", FILE_MODE),
        Err(Error::AlreadyExists)
    ));
    assert!(blocker.is_dir());
    assert!(matches!(hcfs.lookup(ROOT_INODE, "late"), Err(Error::NotFound)));
    assert_eq!(2, hcfs.readdir(ROOT_INODE).unwrap().len());

    let head = sb.head();
    assert_eq!(1, head.num_total_inodes);
    assert_eq!(1, head.num_active_inodes);
    assert_eq!(1, head.num_to_be_reclaimed);
    assert_eq!(SbStatus::ToBeReclaimed, sb.read(2).unwrap().status());

    assert_eq!(3, hcfs.mknod(ROOT_INODE, "late", FILE_MODE).unwrap());
}

#[test]
fn purge_waits_for_pending_deletion() {
    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "pending", FILE_MODE).unwrap();
    hcfs.write_block(ino, 0, &[3; 512]).unwrap();

    // 元数据已移走、数据块尚未删除时就去回收
    hcfs.disk_markdelete(ino).unwrap();
    hcfs.delete_inode_meta(ino).unwrap();
    assert!(!hcfs.purge_todelete(ino).unwrap());
    assert!(hcfs.config().fetch_todelete_path(ino).unwrap().exists());
    assert_eq!(vec![ino], hcfs.super_block().to_delete_queue().unwrap());
    assert_eq!(0, hcfs.super_block().head().num_to_be_reclaimed);

    assert_eq!(1, hcfs.startup_finish_delete().unwrap());
    assert!(!hcfs.config().fetch_block_path(ino, 0).unwrap().exists());
    let data = hcfs.system().data();
    assert_eq!((0, 0), (data.cache_size, data.cache_blocks));

    assert!(hcfs.purge_todelete(ino).unwrap());
    assert!(hcfs.super_block().to_delete_queue().unwrap().is_empty());
    assert_eq!(1, hcfs.super_block().head().num_to_be_reclaimed);
}
