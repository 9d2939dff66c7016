mod cli;

use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use cli::{Cli, Command};
use hcfs::{build_cache_usage, lookup_dir, CacheUsageTable, Hcfs, HcfsConfig, ROOT_INODE};
use vfs::{DirEntryType, Error, Result};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("meta={:?} block={:?}", cli.meta, cli.block);

    let config = HcfsConfig::new(cli.meta, cli.block).with_reclaim_trigger(cli.reclaim_trigger);
    let hcfs = Hcfs::open(config)?;

    match cli.command {
        Command::Init => println!("root inode {ROOT_INODE} ready"),
        Command::Mkdir { path, mode } => {
            let (parent, name) = resolve_parent(&hcfs, &path)?;
            let ino = hcfs.mkdir(parent, name, mode)?;
            println!("{path}: inode {ino}");
        }
        Command::Touch { path, mode } => {
            let (parent, name) = resolve_parent(&hcfs, &path)?;
            let ino = hcfs.mknod(parent, name, mode)?;
            println!("{path}: inode {ino}");
        }
        Command::Ls { path } => {
            let ino = resolve(&hcfs, &path)?;
            for dirent in hcfs.readdir(ino)? {
                let ty = match dirent.ty {
                    DirEntryType::Directory => 'd',
                    DirEntryType::Regular => '-',
                    DirEntryType::SymLink => 'l',
                    DirEntryType::Fifo => 'p',
                    DirEntryType::Socket => 's',
                };
                println!("{ty} {:>8} {}", dirent.inode, dirent.name);
            }
        }
        Command::Rm { path } => {
            let (parent, name) = resolve_parent(&hcfs, &path)?;
            hcfs.unlink(parent, name)?;
        }
        Command::Rmdir { path } => {
            let (parent, name) = resolve_parent(&hcfs, &path)?;
            hcfs.rmdir(parent, name)?;
        }
        Command::CacheUsage => {
            let mut table = CacheUsageTable::new();
            build_cache_usage(&mut table, hcfs.config(), hcfs.system())?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |now| now.as_secs() as i64);
            println!("{:>8} {:>12} {:>12} {:>12}", "inode", "clean", "dirty", "idle(s)");
            while let Some(node) = table.next_victim(now) {
                println!(
                    "{:>8} {:>12} {:>12} {:>12}",
                    node.ino,
                    node.clean_cache_size,
                    node.dirty_cache_size,
                    now - node.last_touch()
                );
            }
            for node in table.iter() {
                println!("{:>8} {:>12} {:>12} {:>12}", node.ino, 0, node.dirty_cache_size, "-");
            }
        }
        Command::FinishDelete => {
            let finished = hcfs.startup_finish_delete()?;
            println!("resumed {finished} deletions");
        }
        Command::Reclaim => {
            let mut purged = 0;
            for ino in hcfs.super_block().to_delete_queue()? {
                if hcfs.purge_todelete(ino)? {
                    purged += 1;
                }
            }
            let reclaimed = hcfs.super_block().reclaim()?;
            println!("purged {purged}, reclaimed {reclaimed}");
        }
    }

    hcfs.shutdown()
}

/// 从根目录逐级查找路径
fn resolve(hcfs: &Hcfs, path: &str) -> Result<u64> {
    let mut ino = ROOT_INODE;
    for name in path.split('/').filter(|name| !name.is_empty()) {
        let mut entry = hcfs.meta_cache().lock_entry(ino)?;
        ino = lookup_dir(&mut entry, ino, name)?.inode;
    }

    Ok(ino)
}

/// 拆出父目录的 inode 与最后一级名字
fn resolve_parent<'p>(hcfs: &Hcfs, path: &'p str) -> Result<(u64, &'p str)> {
    let path = path.trim_end_matches('/');
    let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
    if name.is_empty() {
        return Err(Error::PermissionDenied);
    }

    Ok((resolve(hcfs, dir)?, name))
}
