use std::path::{Path, PathBuf};

use crate::persist::CACHE_SCHEMA_VERSION;

/// Overrides the package cache file location.
pub const PKG_CACHE_ENV: &str = "ASMREF_PKG_CACHE";

/// Directories searched for `.pc` files, in priority order:
/// `configured`, then `PKG_CONFIG_PATH`, then `PKG_CONFIG_LIBDIR` (or the
/// default `lib/pkgconfig` and `share/pkgconfig` under `MONO_PREFIX` and `/usr`).
pub fn default_search_dirs(configured: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = configured.to_vec();

    if let Some(raw) = std::env::var_os("PKG_CONFIG_PATH") {
        dirs.extend(std::env::split_paths(&raw));
    }

    match std::env::var_os("PKG_CONFIG_LIBDIR") {
        Some(raw) => dirs.extend(std::env::split_paths(&raw)),
        None => {
            let mut prefixes = Vec::new();
            if let Some(prefix) = std::env::var_os("MONO_PREFIX").filter(|p| !p.is_empty()) {
                prefixes.push(PathBuf::from(prefix));
            }
            prefixes.push(PathBuf::from("/usr"));
            for prefix in prefixes {
                dirs.push(prefix.join("lib").join("pkgconfig"));
                dirs.push(prefix.join("share").join("pkgconfig"));
            }
        }
    }

    let mut unique: Vec<PathBuf> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if dir.as_os_str().is_empty() || unique.contains(&dir) {
            continue;
        }
        unique.push(dir);
    }
    unique
}

/// Per-user cache file: `ASMREF_PKG_CACHE`, else
/// `<config dir>/asmref/pkgconfig-cache-<schema>.xml` where the config dir is
/// `XDG_CONFIG_HOME`, `APPDATA`, or `~/.config`.
pub fn default_cache_file() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(PKG_CACHE_ENV).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }

    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("APPDATA").map(PathBuf::from))
        .or_else(|| {
            std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(|home| PathBuf::from(home).join(".config"))
        })?;
    Some(cache_file_in(&base.join("asmref")))
}

pub fn cache_file_in(dir: &Path) -> PathBuf {
    dir.join(format!("pkgconfig-cache-{CACHE_SCHEMA_VERSION}.xml"))
}

#[cfg(test)]
mod tests {
    use asmref_test_utils::{env_lock, EnvVarGuard};

    use super::*;

    #[test]
    fn configured_dirs_come_first_and_duplicates_are_dropped() {
        let _lock = env_lock();
        let _path = EnvVarGuard::set_str("PKG_CONFIG_PATH", Some("/a/pkgconfig"));
        let _libdir = EnvVarGuard::set_str("PKG_CONFIG_LIBDIR", Some("/b/pkgconfig"));

        let dirs = default_search_dirs(&[PathBuf::from("/a/pkgconfig"), PathBuf::from("/c")]);
        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/a/pkgconfig"),
                PathBuf::from("/c"),
                PathBuf::from("/b/pkgconfig"),
            ]
        );
    }

    #[test]
    fn mono_prefix_contributes_default_dirs() {
        let _lock = env_lock();
        let _path = EnvVarGuard::set_str("PKG_CONFIG_PATH", None);
        let _libdir = EnvVarGuard::set_str("PKG_CONFIG_LIBDIR", None);
        let _prefix = EnvVarGuard::set_str("MONO_PREFIX", Some("/opt/mono"));

        let dirs = default_search_dirs(&[]);
        assert_eq!(dirs[0], PathBuf::from("/opt/mono/lib/pkgconfig"));
        assert!(dirs.contains(&PathBuf::from("/usr/share/pkgconfig")));
    }

    #[test]
    fn cache_file_name_carries_schema_version() {
        let _lock = env_lock();
        let _cache = EnvVarGuard::set_str(PKG_CACHE_ENV, None);
        let _xdg = EnvVarGuard::set_str("XDG_CONFIG_HOME", Some("/home/u/.cfg"));

        assert_eq!(
            default_cache_file(),
            Some(PathBuf::from(format!(
                "/home/u/.cfg/asmref/pkgconfig-cache-{CACHE_SCHEMA_VERSION}.xml"
            )))
        );

        let _cache = EnvVarGuard::set_str(PKG_CACHE_ENV, Some("/tmp/custom.xml"));
        assert_eq!(default_cache_file(), Some(PathBuf::from("/tmp/custom.xml")));
    }
}
