use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use asmref_identity::{
    normalize_full_name, AssemblyIdentity, AssemblyVersion, PublicKeyToken,
};
use asmref_metadata::MetadataReader;
use serde::Serialize;

use crate::pc::{self, PcFile};

/// One assembly shipped by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyDescriptor {
    pub name: String,
    pub version: Option<AssemblyVersion>,
    pub culture: Option<String>,
    pub public_key_token: Option<PublicKeyToken>,
    pub file: PathBuf,
}

impl AssemblyDescriptor {
    pub fn from_identity(identity: &AssemblyIdentity, file: impl Into<PathBuf>) -> Self {
        Self {
            name: identity.name.clone(),
            version: identity.version,
            culture: identity.culture.clone(),
            public_key_token: identity.public_key_token.clone(),
            file: file.into(),
        }
    }

    pub fn identity(&self) -> AssemblyIdentity {
        AssemblyIdentity {
            name: self.name.clone(),
            version: self.version,
            culture: self.culture.clone(),
            public_key_token: self.public_key_token.clone(),
        }
    }

    /// Normalized full name; the reverse-index key.
    pub fn full_name(&self) -> String {
        normalize_full_name(&self.identity().full_name())
    }
}

/// Parsed contents of one `.pc` file.
///
/// A descriptor with no assemblies is invalid; it is still cached so the
/// file is not re-parsed until it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDescriptor {
    /// Absolute path of the `.pc` file.
    pub path: PathBuf,
    pub name: String,
    pub version: String,
    pub description: String,
    pub is_gac_package: bool,
    pub assemblies: Vec<AssemblyDescriptor>,
    pub requires: Vec<String>,
    pub variables: BTreeMap<String, String>,
    #[serde(skip)]
    pub last_write_time: SystemTime,
}

impl PackageDescriptor {
    pub fn is_valid(&self) -> bool {
        !self.assemblies.is_empty()
    }

    /// Package name as used for lookups: the `.pc` file stem.
    pub fn package_id(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(self.name.as_str())
    }

    pub(crate) fn parse(
        path: &Path,
        text: &str,
        last_write_time: SystemTime,
        reader: &dyn MetadataReader,
    ) -> Self {
        let pc = PcFile::parse(text);
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let is_gac_package = !pc
            .field_or_variable("GacPackage")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("false"));

        let candidates = pc::library_candidates(&pc);
        let mut assemblies: Vec<AssemblyDescriptor> = Vec::new();
        for file in &candidates.files {
            let Some(file) = locate_candidate(file, &candidates.lib_dirs, base_dir) else {
                tracing::debug!(
                    target = "asmref.pkgconfig",
                    package = %path.display(),
                    candidate = %file,
                    "referenced assembly does not exist; skipping"
                );
                continue;
            };
            if assemblies.iter().any(|a| a.file == file) {
                continue;
            }
            match reader.read_identity(&file) {
                Ok(identity) => assemblies.push(AssemblyDescriptor::from_identity(&identity, file)),
                Err(err) => {
                    tracing::debug!(
                        target = "asmref.pkgconfig",
                        package = %path.display(),
                        path = %file.display(),
                        error = %err,
                        "failed to read assembly identity; skipping"
                    );
                }
            }
        }

        Self {
            path: path.to_path_buf(),
            name: pc.field("Name").unwrap_or_default(),
            version: pc.field("Version").unwrap_or_default(),
            description: pc.field("Description").unwrap_or_default(),
            is_gac_package,
            assemblies,
            requires: pc::requires(&pc),
            variables: pc.expanded_variables(),
            last_write_time,
        }
    }
}

fn locate_candidate(file: &str, lib_dirs: &[String], base_dir: &Path) -> Option<PathBuf> {
    let candidate = Path::new(file);
    if candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    lib_dirs
        .iter()
        .map(|dir| {
            let dir = Path::new(dir);
            if dir.is_absolute() {
                dir.join(candidate)
            } else {
                base_dir.join(dir).join(candidate)
            }
        })
        .chain(std::iter::once(base_dir.join(candidate)))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use asmref_metadata::EcmaMetadataReader;
    use asmref_test_utils::AssemblyBuilder;

    use super::*;

    #[test]
    fn full_name_is_normalized() {
        let descriptor = AssemblyDescriptor {
            name: "Bar".into(),
            version: Some(AssemblyVersion::new(1, 2, 0, 0)),
            culture: None,
            public_key_token: None,
            file: PathBuf::from("/x/Bar.dll"),
        };
        assert_eq!(descriptor.full_name(), "Bar, Version=1.2.0.0");
        assert_eq!(
            descriptor.full_name(),
            normalize_full_name("Bar, Version=1.2.0.0, PublicKeyToken=null")
        );
    }

    #[test]
    fn parse_reads_existing_assemblies_relative_to_pc_file() {
        let tmp = tempfile::tempdir().unwrap();
        let lib = tmp.path().join("lib");
        AssemblyBuilder::new("Foo")
            .version("1.0.0.0")
            .write_in(&lib, "Foo.dll")
            .unwrap();
        std::fs::write(lib.join("Broken.dll"), b"not an assembly").unwrap();

        let pc_path = tmp.path().join("foo.pc");
        let text = "Name: Foo\nVersion: 1.0\nGacPackage=false\n\
                    Libs: -lib:lib -r:Foo.dll -r:Broken.dll -r:Missing.dll\n";
        let descriptor =
            PackageDescriptor::parse(&pc_path, text, SystemTime::UNIX_EPOCH, &EcmaMetadataReader);

        assert!(descriptor.is_valid());
        assert!(!descriptor.is_gac_package);
        assert_eq!(descriptor.package_id(), "foo");
        assert_eq!(descriptor.assemblies.len(), 1);
        assert_eq!(descriptor.assemblies[0].file, lib.join("Foo.dll"));
        assert_eq!(
            descriptor.assemblies[0].full_name(),
            "Foo, Version=1.0.0.0, Culture=neutral"
        );
    }

    #[test]
    fn package_without_assemblies_is_invalid() {
        let descriptor = PackageDescriptor::parse(
            Path::new("/nonexistent/empty.pc"),
            "Name: Empty\n",
            SystemTime::UNIX_EPOCH,
            &EcmaMetadataReader,
        );
        assert!(!descriptor.is_valid());
        assert!(descriptor.is_gac_package);
    }
}
