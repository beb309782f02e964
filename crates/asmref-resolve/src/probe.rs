use std::path::{Path, PathBuf};

use asmref_identity::{is_compatible, AssemblyIdentity};
use asmref_metadata::{MetadataError, MetadataReader};

/// A file whose identity satisfied a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub identity: AssemblyIdentity,
    pub path: PathBuf,
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Found(Candidate),
    /// Human-readable reason, suitable for a search trace line.
    NotFound(String),
    /// The probed file exists but is not a readable managed assembly.
    Malformed { path: PathBuf, error: MetadataError },
}

impl ProbeOutcome {
    pub fn found(self) -> Option<Candidate> {
        match self {
            ProbeOutcome::Found(candidate) => Some(candidate),
            _ => None,
        }
    }
}

pub const DEFAULT_ASSEMBLY_EXTENSIONS: &[&str] = &[".dll", ".exe"];

/// Scans one directory for a file compatible with the requested identity.
///
/// Files named after the simple name are tried first (in extension order),
/// then every other file with an allowed extension, sorted by name.
#[derive(Debug, Clone)]
pub struct DirectoryProbe {
    extensions: Vec<String>,
}

impl Default for DirectoryProbe {
    fn default() -> Self {
        Self::new(DEFAULT_ASSEMBLY_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }
}

impl DirectoryProbe {
    pub fn new(extensions: Vec<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(&e))
            .filter(|e| e.len() > 1)
            .collect();
        Self { extensions }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn has_allowed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed[1..].eq_ignore_ascii_case(ext))
            })
    }

    pub fn probe(
        &self,
        dir: &Path,
        requested: &AssemblyIdentity,
        specific_version: bool,
        reader: &dyn MetadataReader,
    ) -> ProbeOutcome {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                return ProbeOutcome::NotFound(format!(
                    "directory {} is not readable: {err}",
                    dir.display()
                ))
            }
        };

        let mut others: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && self.has_allowed_extension(p))
            .collect();
        others.sort();

        let mut ordered = Vec::with_capacity(others.len());
        for ext in &self.extensions {
            let named = format!("{}{ext}", requested.name);
            if let Some(pos) = others.iter().position(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case(&named))
            }) {
                ordered.push(others.remove(pos));
            }
        }
        ordered.extend(others);

        for path in ordered {
            match reader.read_identity(&path) {
                Ok(identity) if is_compatible(requested, &identity, specific_version) => {
                    return ProbeOutcome::Found(Candidate { identity, path });
                }
                Ok(_) => {}
                Err(err) => tracing::debug!(
                    target = "asmref.resolve",
                    path = %path.display(),
                    error = %err,
                    "skipping unreadable file while probing directory"
                ),
            }
        }

        ProbeOutcome::NotFound(format!(
            "no compatible assembly in {}",
            dir.display()
        ))
    }
}

/// Checks a single explicit file.
#[derive(Debug, Clone, Copy, Default)]
pub struct HintPathProbe;

impl HintPathProbe {
    pub fn probe(
        &self,
        path: &Path,
        requested: &AssemblyIdentity,
        specific_version: bool,
        reader: &dyn MetadataReader,
    ) -> ProbeOutcome {
        if !path.is_file() {
            return ProbeOutcome::NotFound(format!("{} does not exist", path.display()));
        }
        match reader.read_identity(path) {
            Ok(identity) if is_compatible(requested, &identity, specific_version) => {
                ProbeOutcome::Found(Candidate {
                    identity,
                    path: path.to_path_buf(),
                })
            }
            Ok(identity) => ProbeOutcome::NotFound(format!(
                "{} has incompatible identity '{identity}'",
                path.display()
            )),
            Err(error) => ProbeOutcome::Malformed {
                path: path.to_path_buf(),
                error,
            },
        }
    }
}

pub(crate) fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim();
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}
