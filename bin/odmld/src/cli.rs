use std::path::PathBuf;

use clap::Parser;

use crate::paths::DEFAULT_CACHE_ROOT;

#[derive(Debug, Parser)]
#[command(name = "odmld", about = "on-device model runtime daemon")]
pub struct Args {
    /// Directory containing the shim dynamic library (`libodml_shim.so`).
    #[arg(long)]
    pub shim_root: PathBuf,

    /// Directory of already-unpacked `<uuid>/` model packages.
    #[arg(long)]
    pub model_root: PathBuf,

    /// Daemon-store base directory for per-user caches.
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    /// Embedding cache TTL, in seconds. 0 disables expiry.
    #[arg(long, default_value_t = 30 * 24 * 60 * 60)]
    pub cache_ttl_secs: u64,
}
