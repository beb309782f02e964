use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asmref_identity::{is_compatible, AssemblyIdentity};
use asmref_metadata::MetadataReader;
use parking_lot::Mutex;

/// Identities of the `*.dll` files in one target-framework directory, keyed
/// by simple name. When two files share a simple name the first by file
/// name wins.
#[derive(Debug, Clone)]
pub struct TargetFrameworkIndex {
    dir: PathBuf,
    by_name: HashMap<String, (AssemblyIdentity, PathBuf)>,
}

impl TargetFrameworkIndex {
    pub fn build(dir: impl Into<PathBuf>, reader: &dyn MetadataReader) -> Self {
        let dir = dir.into();
        let mut by_name = HashMap::new();

        let mut files: Vec<PathBuf> = match std::fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("dll"))
                })
                .collect(),
            Err(err) => {
                tracing::debug!(
                    target = "asmref.resolve",
                    path = %dir.display(),
                    error = %err,
                    "target framework directory is not readable"
                );
                Vec::new()
            }
        };
        files.sort();

        for path in files {
            match reader.read_identity(&path) {
                Ok(identity) => {
                    by_name
                        .entry(identity.name.clone())
                        .or_insert((identity, path));
                }
                Err(err) => tracing::debug!(
                    target = "asmref.resolve",
                    path = %path.display(),
                    error = %err,
                    "skipping unreadable framework assembly"
                ),
            }
        }

        tracing::debug!(
            target = "asmref.resolve",
            path = %dir.display(),
            assemblies = by_name.len(),
            "indexed target framework directory"
        );
        Self { dir, by_name }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn resolve(
        &self,
        requested: &AssemblyIdentity,
        specific_version: bool,
    ) -> Option<(&AssemblyIdentity, &Path)> {
        let (identity, path) = self.by_name.get(&requested.name)?;
        is_compatible(requested, identity, specific_version).then_some((identity, path.as_path()))
    }
}

/// Process-lifetime memo of [`TargetFrameworkIndex`] by directory.
pub struct FrameworkRegistry {
    reader: Arc<dyn MetadataReader>,
    indexes: Mutex<HashMap<PathBuf, Arc<TargetFrameworkIndex>>>,
}

impl FrameworkRegistry {
    pub fn new(reader: Arc<dyn MetadataReader>) -> Self {
        Self {
            reader,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    /// Index for `dir`, built on first use.
    pub fn get(&self, dir: &Path) -> Arc<TargetFrameworkIndex> {
        let mut indexes = self.indexes.lock();
        if let Some(index) = indexes.get(dir) {
            return Arc::clone(index);
        }
        let index = Arc::new(TargetFrameworkIndex::build(dir, self.reader.as_ref()));
        indexes.insert(dir.to_path_buf(), Arc::clone(&index));
        index
    }

    pub fn len(&self) -> usize {
        self.indexes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.lock().is_empty()
    }
}

impl std::fmt::Debug for FrameworkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameworkRegistry")
            .field("indexes", &self.indexes.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use asmref_identity::AssemblyVersion;
    use asmref_metadata::EcmaMetadataReader;
    use asmref_test_utils::AssemblyBuilder;

    use super::*;

    #[test]
    fn resolves_by_simple_name_then_matches() {
        let tmp = tempfile::tempdir().unwrap();
        AssemblyBuilder::new("System.Xml")
            .version("4.0.0.0")
            .write_in(tmp.path(), "System.Xml.dll")
            .unwrap();
        std::fs::write(tmp.path().join("garbage.dll"), b"nope").unwrap();

        let index = TargetFrameworkIndex::build(tmp.path(), &EcmaMetadataReader);
        assert_eq!(index.len(), 1);

        let (identity, path) = index
            .resolve(&AssemblyIdentity::new("System.Xml"), false)
            .unwrap();
        assert_eq!(identity.version, Some(AssemblyVersion::new(4, 0, 0, 0)));
        assert_eq!(path, tmp.path().join("System.Xml.dll"));

        let french = AssemblyIdentity::new("System.Xml").with_culture("fr-FR");
        assert!(index.resolve(&french, false).is_none());
    }

    #[test]
    fn registry_memoizes_by_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = FrameworkRegistry::new(Arc::new(EcmaMetadataReader));
        let first = registry.get(tmp.path());
        assert!(first.is_empty());

        AssemblyBuilder::new("Late")
            .version("1.0")
            .write_in(tmp.path(), "Late.dll")
            .unwrap();
        let second = registry.get(tmp.path());
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.is_empty());
        assert_eq!(registry.len(), 1);
    }
}
