use std::path::{Path, PathBuf};

use crate::error::ResolveError;

/// Overrides the global assembly cache root.
pub const GAC_ROOT_ENV: &str = "ASMREF_GAC_ROOT";

const WELL_KNOWN_GAC_ROOTS: &[&str] = &[
    "/usr/lib/mono/gac",
    "/usr/local/lib/mono/gac",
    "/Library/Frameworks/Mono.framework/Versions/Current/lib/mono/gac",
];

/// Determine the global assembly cache root.
///
/// Sources are tried in this order:
/// 1. `configured` (explicit configuration)
/// 2. `ASMREF_GAC_ROOT`
/// 3. `$MONO_PREFIX/lib/mono/gac`
/// 4. the first existing well-known Mono install location
///
/// Sources 1-3 win even when the directory does not exist; scanning such a
/// root yields an empty index.
pub fn discover_gac_root(configured: Option<&Path>) -> Result<PathBuf, ResolveError> {
    let env_root = std::env::var_os(GAC_ROOT_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let mono_prefix = std::env::var_os("MONO_PREFIX")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let well_known: Vec<&Path> = WELL_KNOWN_GAC_ROOTS.iter().map(Path::new).collect();

    discover_from(configured, env_root, mono_prefix, &well_known)
}

fn discover_from(
    configured: Option<&Path>,
    env_root: Option<PathBuf>,
    mono_prefix: Option<PathBuf>,
    well_known: &[&Path],
) -> Result<PathBuf, ResolveError> {
    if let Some(root) = configured {
        return Ok(root.to_path_buf());
    }
    if let Some(root) = env_root {
        return Ok(root);
    }
    if let Some(prefix) = mono_prefix {
        return Ok(prefix.join("lib").join("mono").join("gac"));
    }
    if let Some(root) = well_known.iter().find(|p| p.is_dir()) {
        return Ok(root.to_path_buf());
    }

    Err(ResolveError::EnvironmentMissing {
        tried: format!(
            "configuration, {GAC_ROOT_ENV}, MONO_PREFIX, {}",
            well_known
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    })
}

#[cfg(test)]
mod tests {
    use asmref_test_utils::{env_lock, EnvVarGuard};

    use super::*;

    #[test]
    fn configuration_wins_over_environment() {
        let _lock = env_lock();
        let _root = EnvVarGuard::set_str(GAC_ROOT_ENV, Some("/from/env"));

        let root = discover_gac_root(Some(Path::new("/from/config"))).unwrap();
        assert_eq!(root, PathBuf::from("/from/config"));
        assert_eq!(discover_gac_root(None).unwrap(), PathBuf::from("/from/env"));
    }

    #[test]
    fn mono_prefix_is_used_before_well_known_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let root = discover_from(
            None,
            None,
            Some(PathBuf::from("/opt/mono")),
            &[tmp.path()],
        )
        .unwrap();
        assert_eq!(root, PathBuf::from("/opt/mono/lib/mono/gac"));
    }

    #[test]
    fn first_existing_well_known_root() {
        let tmp = tempfile::tempdir().unwrap();
        let absent = tmp.path().join("absent");
        let root = discover_from(None, None, None, &[absent.as_path(), tmp.path()]).unwrap();
        assert_eq!(root, tmp.path());
    }

    #[test]
    fn nothing_determinable_is_environment_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let absent = tmp.path().join("absent");
        let err = discover_from(None, None, None, &[absent.as_path()]).unwrap_err();
        assert!(matches!(err, ResolveError::EnvironmentMissing { .. }));
    }
}
