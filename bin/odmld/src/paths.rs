use std::path::PathBuf;

/// Daemon-store layout: `<base>/<user_hash>/<subdir>/<filename>` (§6). `base`
/// defaults to `/run/daemon-store-cache/odmld` but is overridable so tests
/// (and this daemon's own `--cache-root` flag) don't touch the real path.
pub fn daemon_store_path(base: &std::path::Path, user_hash: &str, subdir: &str, filename: &str) -> PathBuf {
    base.join(user_hash).join(subdir).join(filename)
}

pub const DEFAULT_CACHE_ROOT: &str = "/run/daemon-store-cache/odmld";

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_the_expected_layout() {
        let path = daemon_store_path(
            std::path::Path::new("/run/daemon-store-cache/odmld"),
            "abc123",
            "embeddings",
            "store.json",
        );
        assert_eq!(
            path,
            PathBuf::from("/run/daemon-store-cache/odmld/abc123/embeddings/store.json")
        );
    }
}
