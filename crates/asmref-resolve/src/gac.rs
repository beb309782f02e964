use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use asmref_identity::{AssemblyIdentity, AssemblyVersion};

/// One-shot index of a global assembly cache laid out as
/// `<root>/<SimpleName>/<version>_<culture>_<publicKeyToken>/*.dll`.
///
/// Built once per process and never invalidated. A root that does not exist
/// yields an empty index.
#[derive(Debug, Clone, Default)]
pub struct GlobalCacheIndex {
    root: PathBuf,
    assemblies: BTreeMap<String, BTreeMap<AssemblyVersion, PathBuf>>,
}

impl GlobalCacheIndex {
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            assemblies: BTreeMap::new(),
        }
    }

    pub fn scan(root: impl Into<PathBuf>) -> Self {
        let mut index = Self::empty(root);
        for name_dir in sorted_entries(&index.root) {
            if !name_dir.is_dir() {
                continue;
            }
            let Some(name) = name_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let name = name.to_string();

            for version_dir in sorted_entries(&name_dir) {
                if !version_dir.is_dir() {
                    continue;
                }
                let Some(token) = version_dir.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let raw_version = token.split('_').next().unwrap_or_default();
                let version = match AssemblyVersion::parse(raw_version) {
                    Ok(version) => version,
                    Err(err) => {
                        tracing::debug!(
                            target = "asmref.resolve",
                            path = %version_dir.display(),
                            error = %err,
                            "ignoring GAC directory with unparseable version"
                        );
                        continue;
                    }
                };
                let Some(dll) = pick_dll(&version_dir, &name) else {
                    continue;
                };
                index
                    .assemblies
                    .entry(name.clone())
                    .or_default()
                    .entry(version)
                    .or_insert(dll);
            }
        }

        tracing::debug!(
            target = "asmref.resolve",
            root = %index.root.display(),
            names = index.assemblies.len(),
            "indexed global assembly cache"
        );
        index
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.assemblies.is_empty()
    }

    /// Exact version when one is requested, otherwise the highest version.
    pub fn resolve(&self, identity: &AssemblyIdentity) -> Option<(AssemblyVersion, &Path)> {
        let versions = self.assemblies.get(&identity.name)?;
        match identity.version {
            Some(wanted) => versions.get(&wanted).map(|p| (wanted, p.as_path())),
            None => versions
                .iter()
                .next_back()
                .map(|(version, path)| (*version, path.as_path())),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.assemblies.keys().map(String::as_str)
    }

    pub fn versions(&self, name: &str) -> Option<&BTreeMap<AssemblyVersion, PathBuf>> {
        self.assemblies.get(name)
    }
}

fn sorted_entries(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "asmref.resolve",
                    path = %dir.display(),
                    error = %err,
                    "failed to list GAC directory"
                );
            }
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();
    paths
}

/// `<name>.dll` when present, otherwise the first `*.dll` by name.
fn pick_dll(dir: &Path, name: &str) -> Option<PathBuf> {
    let preferred = dir.join(format!("{name}.dll"));
    if preferred.is_file() {
        return Some(preferred);
    }
    sorted_entries(dir).into_iter().find(|p| {
        p.is_file()
            && p
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("dll"))
    })
}
