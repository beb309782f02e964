use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use asmref_identity::{normalize_full_name, AssemblyIdentity};
use serde::Serialize;

use crate::culture::CultureTable;
use crate::error::Result;
use crate::probe::normalize_extension;
use crate::resolver::{Reference, ResolvedReference, SearchPathResolver};
use crate::token::SearchToken;

pub const DEFAULT_RELATED_EXTENSIONS: &[&str] = &[".pdb", ".xml", ".mdb"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    pub find_dependencies: bool,
    pub find_related_files: bool,
    pub find_satellites: bool,
    pub related_extensions: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            find_dependencies: true,
            find_related_files: true,
            find_satellites: true,
            related_extensions: DEFAULT_RELATED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

/// Culture-specific resource assembly next to a resolved file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SatelliteFile {
    pub path: PathBuf,
    /// Subdirectory the satellite must be copied into.
    pub culture: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFile {
    #[serde(flatten)]
    pub reference: ResolvedReference,
    pub is_primary: bool,
    /// Full name of the assembly that referenced this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_of: Option<String>,
    pub related_files: Vec<PathBuf>,
    pub satellites: Vec<SatelliteFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedDependency {
    pub identity: AssemblyIdentity,
    pub referenced_by: String,
    pub trace: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkResult {
    /// Every distinct assembly, in discovery order.
    pub files: Vec<ResolvedFile>,
    pub unresolved: Vec<UnresolvedDependency>,
}

impl WalkResult {
    pub fn primary(&self) -> impl Iterator<Item = &ResolvedFile> {
        self.files.iter().filter(|f| f.is_primary)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &ResolvedFile> {
        self.files.iter().filter(|f| !f.is_primary)
    }
}

/// Transitively resolves the references of already-resolved assemblies.
///
/// Processing is breadth-first and sequential. Each distinct full name is
/// walked once; when two paths carry the same full name the first one seen
/// wins. Hits in shared locations (GAC, target framework, packages) end
/// their branch.
pub struct DependencyWalker<'a> {
    resolver: &'a SearchPathResolver,
    cultures: &'a CultureTable,
    options: WalkOptions,
}

impl<'a> DependencyWalker<'a> {
    pub fn new(resolver: &'a SearchPathResolver, cultures: &'a CultureTable) -> Self {
        Self {
            resolver,
            cultures,
            options: WalkOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn walk(&self, roots: Vec<ResolvedReference>) -> Result<WalkResult> {
        let mut result = WalkResult::default();
        let mut queue: VecDeque<(ResolvedReference, Option<String>)> =
            roots.into_iter().map(|r| (r, None)).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut requested: HashSet<String> = HashSet::new();

        while let Some((reference, parent)) = queue.pop_front() {
            let key = normalize_full_name(&reference.identity.full_name());
            if !seen.insert(key.clone()) {
                tracing::debug!(
                    target = "asmref.resolve",
                    assembly = %key,
                    path = %reference.path.display(),
                    "already walked; skipping"
                );
                continue;
            }

            let mut file = ResolvedFile {
                is_primary: parent.is_none(),
                dependency_of: parent,
                related_files: Vec::new(),
                satellites: Vec::new(),
                reference,
            };

            if !file.reference.found_via.is_shared_location() {
                if self.options.find_related_files {
                    file.related_files = self.related_files(&file.reference.path);
                }
                if self.options.find_satellites {
                    file.satellites = self.satellites(&file.reference.path);
                }
                if self.options.find_dependencies {
                    self.enqueue_dependencies(
                        &file.reference,
                        &key,
                        &seen,
                        &mut requested,
                        &mut queue,
                        &mut result.unresolved,
                    )?;
                }
            }

            result.files.push(file);
        }

        Ok(result)
    }

    fn enqueue_dependencies(
        &self,
        parent: &ResolvedReference,
        parent_key: &str,
        seen: &HashSet<String>,
        requested: &mut HashSet<String>,
        queue: &mut VecDeque<(ResolvedReference, Option<String>)>,
        unresolved: &mut Vec<UnresolvedDependency>,
    ) -> Result<()> {
        let metadata = match self.resolver.reader().read(&parent.path) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::debug!(
                    target = "asmref.resolve",
                    path = %parent.path.display(),
                    error = %err,
                    "cannot read references; dependencies not walked"
                );
                return Ok(());
            }
        };

        let tokens = self.dependency_tokens(&parent.path);
        for dependency in metadata.references {
            let dep_key = normalize_full_name(&dependency.full_name());
            if seen.contains(&dep_key) || !requested.insert(dep_key) {
                continue;
            }

            let outcome = self
                .resolver
                .resolve_with(&Reference::from_identity(dependency.clone()), &tokens)?;
            match outcome.resolved {
                Some(mut resolved) => {
                    if matches!(resolved.found_via, SearchToken::Directory(_)) {
                        resolved.copy_local = parent.copy_local;
                    }
                    queue.push_back((resolved, Some(parent_key.to_string())));
                }
                None => unresolved.push(UnresolvedDependency {
                    identity: dependency,
                    referenced_by: parent_key.to_string(),
                    trace: outcome.trace,
                }),
            }
        }
        Ok(())
    }

    /// The parent's directory first, then the configured tokens minus the
    /// item-specific ones.
    fn dependency_tokens(&self, parent_path: &Path) -> Vec<SearchToken> {
        let mut tokens = Vec::with_capacity(self.resolver.tokens().len() + 1);
        if let Some(dir) = parent_path.parent() {
            tokens.push(SearchToken::Directory(dir.to_path_buf()));
        }
        for token in self.resolver.tokens() {
            if token.is_item_specific() || tokens.contains(token) {
                continue;
            }
            tokens.push(token.clone());
        }
        tokens
    }

    /// `<dir>/<base><ext>` for each related extension, plus
    /// `<dir>/<file name>.mdb` for Mono debug symbols.
    fn related_files(&self, path: &Path) -> Vec<PathBuf> {
        let (Some(dir), Some(stem), Some(file_name)) = (
            path.parent(),
            path.file_stem().and_then(|s| s.to_str()),
            path.file_name().and_then(|s| s.to_str()),
        ) else {
            return Vec::new();
        };

        let mut out: Vec<PathBuf> = Vec::new();
        for ext in &self.options.related_extensions {
            let ext = normalize_extension(ext);
            let mut candidates = vec![dir.join(format!("{stem}{ext}"))];
            if ext.eq_ignore_ascii_case(".mdb") {
                candidates.push(dir.join(format!("{file_name}{ext}")));
            }
            for candidate in candidates {
                if candidate.is_file() && !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// `<dir>/<culture>/<base>.resources<ext>` for every subdirectory named
    /// after a known culture.
    fn satellites(&self, path: &Path) -> Vec<SatelliteFile> {
        let (Some(dir), Some(stem)) = (path.parent(), path.file_stem().and_then(|s| s.to_str()))
        else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut culture_dirs: Vec<(String, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter_map(|p| {
                let name = p.file_name()?.to_str()?.to_string();
                self.cultures.contains(&name).then_some((name, p))
            })
            .collect();
        culture_dirs.sort();

        let mut out = Vec::new();
        for (culture, culture_dir) in culture_dirs {
            for ext in self.resolver.assembly_extensions() {
                let candidate = culture_dir.join(format!("{stem}.resources{ext}"));
                if candidate.is_file() {
                    out.push(SatelliteFile {
                        path: candidate,
                        culture: culture.clone(),
                    });
                }
            }
        }
        out
    }
}
