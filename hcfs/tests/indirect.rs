mod common;

use hcfs::{
    check_page_level, create_page, seek_page, seek_page2, Error, PageId, PageLevel,
    MAX_BLOCK_ENTRIES_PER_PAGE, MAX_BLOCK_SIZE, POINTERS_PER_PAGE, ROOT_INODE,
};

use common::FILE_MODE;

const P: u64 = POINTERS_PER_PAGE;

#[test]
fn create_then_seek() {
    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "data", FILE_MODE).unwrap();
    let mut entry = hcfs.meta_cache().lock_entry(ino).unwrap();

    let targets = [0, 1, P, P + 1, P + P * P, P + P * P + 1, P + P * P + P.pow(3) + 1];
    let mut created = Vec::new();
    for target in targets {
        let page = create_page(&mut entry, target).unwrap();
        assert!(!page.is_null());
        assert_eq!(page, seek_page(&mut entry, target).unwrap());
        created.push(page);
    }
    // 已存在的页不会重新分配
    for (target, page) in targets.into_iter().zip(&created) {
        assert_eq!(*page, create_page(&mut entry, target).unwrap());
    }

    let meta = entry.lookup_file_data().unwrap();
    assert!(!meta.direct.is_null());
    assert!(!meta.quadruple_indirect.is_null());
    let file = entry.open_file().unwrap();
    for (target, page) in targets.into_iter().zip(&created) {
        assert_eq!(*page, seek_page2(&meta, &file, target).unwrap());
    }
}

#[test]
fn unwritten_block_is_not_found() {
    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "sparse", FILE_MODE).unwrap();
    let mut entry = hcfs.meta_cache().lock_entry(ino).unwrap();

    assert_eq!(PageId::NULL, seek_page(&mut entry, 0).unwrap());
    create_page(&mut entry, 0).unwrap();
    create_page(&mut entry, P + 1).unwrap();

    assert_eq!(PageId::NULL, seek_page(&mut entry, P + 2).unwrap());
    assert_eq!(PageId::NULL, seek_page(&mut entry, 1).unwrap());
    assert_eq!(PageId::NULL, seek_page(&mut entry, P + P * P + 1).unwrap());
    assert_eq!(PageLevel::Double, check_page_level(P + 2).unwrap());
}

#[test]
fn capacity_and_type_errors() {
    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "big", FILE_MODE).unwrap();
    let beyond = P + P.pow(2) + P.pow(3) + P.pow(4) + 1;

    let mut entry = hcfs.meta_cache().lock_entry(ino).unwrap();
    assert!(matches!(create_page(&mut entry, beyond), Err(Error::OutOfRange(_))));
    assert!(matches!(seek_page(&mut entry, beyond), Err(Error::OutOfRange(_))));
    drop(entry);

    let mut root = hcfs.meta_cache().lock_entry(ROOT_INODE).unwrap();
    assert!(matches!(create_page(&mut root, 0), Err(Error::IsADirectory)));
}

#[test]
fn block_status_follows_writes() {
    use hcfs::layout::BlockStatus;

    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "blocks", FILE_MODE).unwrap();

    assert_eq!(BlockStatus::None, hcfs.block_status(ino, 250).unwrap());
    hcfs.write_block(ino, 250, b"hello").unwrap();
    assert_eq!(BlockStatus::Ldisk, hcfs.block_status(ino, 250).unwrap());
    assert_eq!(BlockStatus::None, hcfs.block_status(ino, 251).unwrap());
    hcfs.mark_block_synced(ino, 250).unwrap();
    assert_eq!(BlockStatus::Both, hcfs.block_status(ino, 250).unwrap());
    assert!(matches!(hcfs.mark_block_synced(ino, 9000), Err(Error::NotFound)));

    let stat = hcfs.stat(ino).unwrap();
    assert_eq!((250 * MAX_BLOCK_SIZE + 5) as i64, stat.size);
}

#[test]
fn unrepresentable_size_is_rejected_up_front() {
    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "huge", FILE_MODE).unwrap();

    // 块项页都在四级间接范围内，文件末尾却超出 u64 或 i64
    let wraps_u64 = 10_000_000_000_000;
    let past_i64 = i64::MAX as u64 / MAX_BLOCK_SIZE + 1;
    for blockno in [wraps_u64, past_i64] {
        assert!(check_page_level(blockno / MAX_BLOCK_ENTRIES_PER_PAGE).is_ok());
        assert!(matches!(
            hcfs.write_block(ino, blockno, b"x"),
            Err(Error::OutOfRange(n)) if n == blockno
        ));
        assert!(!hcfs.config().fetch_block_path(ino, blockno).unwrap().exists());
    }

    {
        let mut entry = hcfs.meta_cache().lock_entry(ino).unwrap();
        let meta = entry.lookup_file_data().unwrap();
        assert!(meta.direct.is_null());
        assert!(meta.double_indirect.is_null());
        assert!(meta.quadruple_indirect.is_null());
    }
    assert_eq!(0, hcfs.stat(ino).unwrap().size);
    let data = hcfs.system().data();
    assert_eq!((0, 0, 0), (data.cache_size, data.cache_blocks, data.system_size));
}
