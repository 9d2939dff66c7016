mod common;

use hcfs::layout::SbStatus;
use hcfs::ROOT_INODE;

use common::FILE_MODE;

fn name(i: u64) -> String {
    format!("f{i}")
}

#[test]
fn inode_numbers_start_after_root() {
    let (_dir, hcfs) = common::open();
    let head = hcfs.super_block().head();
    assert_eq!(0, head.num_total_inodes);
    assert_eq!(1, head.num_active_inodes);
    assert_eq!(ROOT_INODE, hcfs.super_block().read(ROOT_INODE).unwrap().this_index);

    let a = hcfs.mknod(ROOT_INODE, "a", FILE_MODE).unwrap();
    let b = hcfs.mkdir(ROOT_INODE, "b", 0o700).unwrap();
    assert_eq!((2, 3), (a, b));
    let head = hcfs.super_block().head();
    assert_eq!(2, head.num_total_inodes);
    assert_eq!(3, head.num_active_inodes);

    let entry = hcfs.super_block().read(b).unwrap();
    assert_eq!(b, entry.inode_stat.ino);
    assert_eq!(1, entry.generation);
}

#[test]
fn dirty_and_delete_queues() {
    let (_dir, hcfs) = common::open();
    let sb = hcfs.super_block();

    let ino = hcfs.mknod(ROOT_INODE, "q", FILE_MODE).unwrap();
    // 父目录更新后进入脏链表
    assert_eq!(ROOT_INODE, sb.head().first_dirty_inode);
    assert_eq!(1, sb.head().num_dirty);

    hcfs.write_block(ino, 0, b"dirty").unwrap();
    let head = sb.head();
    assert_eq!((ROOT_INODE, ino, 2), (head.first_dirty_inode, head.last_dirty_inode, head.num_dirty));
    assert_eq!(SbStatus::IsDirty, sb.read(ino).unwrap().status());
    assert_eq!(ino, sb.read(ROOT_INODE).unwrap().util_ll_next);

    hcfs.unlink(ROOT_INODE, "q").unwrap();
    let head = sb.head();
    assert_eq!((ROOT_INODE, ROOT_INODE, 1), (head.first_dirty_inode, head.last_dirty_inode, head.num_dirty));
    assert_eq!(0, sb.read(ROOT_INODE).unwrap().util_ll_next);
    assert_eq!(vec![ino], sb.to_delete_queue().unwrap());

    assert!(hcfs.purge_todelete(ino).unwrap());
    assert!(sb.to_delete_queue().unwrap().is_empty());
    assert!(!hcfs.config().fetch_todelete_path(ino).unwrap().exists());
    assert_eq!(SbStatus::ToBeReclaimed, sb.read(ino).unwrap().status());
    assert_eq!(1, sb.head().num_to_be_reclaimed);
}

#[test]
fn reclaim_waits_for_trigger() {
    let (_dir, hcfs) = common::open_with(|config| config.with_reclaim_trigger(3));
    let ino = hcfs.mknod(ROOT_INODE, "x", FILE_MODE).unwrap();
    hcfs.unlink(ROOT_INODE, "x").unwrap();
    assert!(hcfs.purge_todelete(ino).unwrap());

    assert_eq!(0, hcfs.super_block().reclaim().unwrap());
    assert_eq!(1, hcfs.super_block().head().num_to_be_reclaimed);
    assert_eq!(3, hcfs.mknod(ROOT_INODE, "y", FILE_MODE).unwrap());
}

#[test]
fn reclaim_skips_reused_inodes() {
    let (_dir, hcfs) = common::open_with(|config| config.with_reclaim_trigger(4));
    let sb = hcfs.super_block();

    let inos: Vec<u64> = (0..5)
        .map(|i| hcfs.mknod(ROOT_INODE, &name(i), FILE_MODE).unwrap())
        .collect();
    assert_eq!(vec![2, 3, 4, 5, 6], inos);
    for (i, &ino) in inos.iter().enumerate() {
        hcfs.unlink(ROOT_INODE, &name(i as u64)).unwrap();
        assert!(hcfs.purge_todelete(ino).unwrap());
    }

    // inode 4 已被别处重新占用，不得回收
    let mut taken = sb.read(4).unwrap();
    taken.inode_stat.ino = 4;
    sb.write(4, &taken).unwrap();

    assert_eq!(4, sb.reclaim().unwrap());
    let head = sb.head();
    assert_eq!(4, head.num_inode_reclaimed);
    assert_eq!(0, head.num_to_be_reclaimed);
    assert_eq!((2, 6), (head.first_reclaimed_inode, head.last_reclaimed_inode));
    assert_eq!(SbStatus::ToBeReclaimed, sb.read(4).unwrap().status());
    assert_eq!(0, std::fs::metadata(hcfs.config().unclaimed_list_path()).unwrap().len());

    // 按从小到大复用，世代加一
    for (i, expected) in [2, 3, 5, 6].into_iter().enumerate() {
        let ino = hcfs.mknod(ROOT_INODE, &name(100 + i as u64), FILE_MODE).unwrap();
        assert_eq!(expected, ino);
        let entry = sb.read(ino).unwrap();
        assert_eq!(2, entry.generation);
        assert_eq!(ino, entry.inode_stat.ino);
    }
    let head = sb.head();
    assert_eq!((0, 0, 0), (head.num_inode_reclaimed, head.first_reclaimed_inode, head.last_reclaimed_inode));
    assert_eq!(7, hcfs.mknod(ROOT_INODE, "fresh", FILE_MODE).unwrap());
}
