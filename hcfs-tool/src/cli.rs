use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Metadata directory
    #[arg(long, short)]
    pub meta: PathBuf,

    /// Block directory
    #[arg(long, short)]
    pub block: PathBuf,

    /// Unclaimed inodes needed before a reclaim batch runs
    #[arg(long, default_value_t = hcfs::RECLAIM_TRIGGER)]
    pub reclaim_trigger: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the root directory if missing
    Init,

    /// Create a directory
    Mkdir {
        path: String,
        #[arg(long, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },

    /// Create an empty regular file
    Touch {
        path: String,
        #[arg(long, default_value = "644", value_parser = parse_mode)]
        mode: u32,
    },

    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Remove a non-directory entry
    Rm { path: String },

    /// Remove an empty directory
    Rmdir { path: String },

    /// Rebuild and print cache usage in eviction order
    CacheUsage,

    /// Resume deletions interrupted by a crash
    FinishDelete,

    /// Purge held metadata and reclaim inode numbers
    Reclaim,
}

/// 权限位按八进制解析
fn parse_mode(raw: &str) -> Result<u32, String> {
    u32::from_str_radix(raw, 8).map_err(|err| format!("invalid octal mode {raw:?}: {err}"))
}
