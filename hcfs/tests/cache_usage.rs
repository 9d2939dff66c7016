mod common;

use hcfs::{build_cache_usage, xattr, CacheUsageTable, ROOT_INODE};

use common::FILE_MODE;

#[test]
fn build_from_block_store() {
    let (_dir, hcfs) = common::open();
    let synced = hcfs.mknod(ROOT_INODE, "synced", FILE_MODE).unwrap();
    let dirty = hcfs.mknod(ROOT_INODE, "dirty", FILE_MODE).unwrap();

    hcfs.write_block(synced, 0, &[0; 3000]).unwrap();
    hcfs.write_block(synced, 1, &[0; 1000]).unwrap();
    hcfs.write_block(dirty, 0, &[0; 500]).unwrap();
    let probe = hcfs.config().fetch_block_path(dirty, 0).unwrap();
    if !xattr::supported(&probe) {
        eprintln!("user xattr unsupported here, skipping");
        return;
    }
    xattr::set_dirty_status(&probe, true).unwrap();
    hcfs.mark_block_synced(synced, 0).unwrap();

    let mut table = CacheUsageTable::with_buckets(16);
    build_cache_usage(&mut table, hcfs.config(), hcfs.system()).unwrap();
    assert_eq!(2, table.len());

    let node = table.get(synced).unwrap();
    assert_eq!((3000, 1000), (node.clean_cache_size, node.dirty_cache_size));
    assert!(node.last_touch() > 0);
    let node = table.get(dirty).unwrap();
    assert_eq!((0, 500), (node.clean_cache_size, node.dirty_cache_size));

    // 全脏的 inode 不会被选中
    let far_future = i64::MAX / 4;
    assert_eq!(synced, table.next_victim(far_future).unwrap().ino);
    assert!(table.next_victim(far_future).is_none());
    assert!(!table.is_empty());
}

#[test]
fn rebuild_resets_and_stops_on_shutdown() {
    let (_dir, hcfs) = common::open();
    let ino = hcfs.mknod(ROOT_INODE, "f", FILE_MODE).unwrap();
    hcfs.write_block(ino, 0, b"abc").unwrap();

    let mut table = CacheUsageTable::with_buckets(8);
    build_cache_usage(&mut table, hcfs.config(), hcfs.system()).unwrap();
    assert_eq!(1, table.len());

    hcfs.system().shutdown();
    build_cache_usage(&mut table, hcfs.config(), hcfs.system()).unwrap();
    assert!(table.is_empty());
}
