use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use asmref_identity::{default_specific_version, AssemblyIdentity};
use asmref_metadata::MetadataReader;
use asmref_pkgconfig::PackageCache;
use serde::Serialize;

use crate::error::{ResolveError, Result};
use crate::framework::FrameworkRegistry;
use crate::gac::GlobalCacheIndex;
use crate::probe::{DirectoryProbe, HintPathProbe, ProbeOutcome};
use crate::token::SearchToken;

/// A reference to resolve: the parsed identity plus the item-level inputs
/// (`HintPath`, `SpecificVersion`, the raw reference string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub identity: AssemblyIdentity,
    /// The reference as written; `{RawFileName}` treats it as a path.
    pub raw: String,
    pub hint_path: Option<PathBuf>,
    pub specific_version: Option<bool>,
}

impl Reference {
    /// Parse a display name or a file path. For a path the simple name is
    /// the file stem.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let identity = if looks_like_path(trimmed) {
            let stem = Path::new(trimmed)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(trimmed);
            AssemblyIdentity::new(stem)
        } else {
            AssemblyIdentity::parse(trimmed).map_err(|source| ResolveError::InvalidReference {
                reference: raw.to_string(),
                source,
            })?
        };
        Ok(Self {
            identity,
            raw: trimmed.to_string(),
            hint_path: None,
            specific_version: None,
        })
    }

    pub fn from_identity(identity: AssemblyIdentity) -> Self {
        Self {
            raw: identity.full_name(),
            identity,
            hint_path: None,
            specific_version: None,
        }
    }

    pub fn with_hint_path(mut self, hint_path: Option<PathBuf>) -> Self {
        self.hint_path = hint_path;
        self
    }

    pub fn with_specific_version(mut self, specific_version: Option<bool>) -> Self {
        self.specific_version = specific_version;
        self
    }

    /// Explicit setting, else strict matching for strong-named references.
    pub fn specific_version(&self) -> bool {
        self.specific_version
            .unwrap_or_else(|| default_specific_version(&self.identity))
    }
}

fn looks_like_path(raw: &str) -> bool {
    if raw.contains(',') {
        return false;
    }
    raw.contains('/')
        || raw.contains('\\')
        || Path::new(raw)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("dll") || e.eq_ignore_ascii_case("exe"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedReference {
    pub identity: AssemblyIdentity,
    pub path: PathBuf,
    pub found_via: SearchToken,
    pub copy_local: bool,
    /// Owning package for `{PkgConfig}` hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

/// Result of one resolution: the first match, if any, and one trace line per
/// attempt.
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    pub resolved: Option<ResolvedReference>,
    pub trace: Vec<String>,
}

/// Tries search tokens in order and stops at the first match.
pub struct SearchPathResolver {
    tokens: Vec<SearchToken>,
    framework_dirs: Vec<PathBuf>,
    gac: Option<Arc<GlobalCacheIndex>>,
    frameworks: Arc<FrameworkRegistry>,
    packages: Option<Arc<PackageCache>>,
    directory_probe: DirectoryProbe,
    reader: Arc<dyn MetadataReader>,
}

impl std::fmt::Debug for SearchPathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchPathResolver")
            .field("tokens", &self.tokens)
            .field("framework_dirs", &self.framework_dirs)
            .field("gac_root", &self.gac.as_ref().map(|g| g.root().to_path_buf()))
            .field("packages", &self.packages.is_some())
            .finish()
    }
}

impl SearchPathResolver {
    pub fn new(reader: Arc<dyn MetadataReader>) -> Self {
        Self {
            tokens: crate::token::default_search_paths(),
            framework_dirs: Vec::new(),
            gac: None,
            frameworks: Arc::new(FrameworkRegistry::new(Arc::clone(&reader))),
            packages: None,
            directory_probe: DirectoryProbe::default(),
            reader,
        }
    }

    pub fn with_search_paths(mut self, tokens: Vec<SearchToken>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_framework_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.framework_dirs = dirs;
        self
    }

    pub fn with_gac(mut self, gac: Arc<GlobalCacheIndex>) -> Self {
        self.gac = Some(gac);
        self
    }

    /// Share framework indexes with other resolvers in the same process.
    pub fn with_framework_registry(mut self, registry: Arc<FrameworkRegistry>) -> Self {
        self.frameworks = registry;
        self
    }

    pub fn with_package_cache(mut self, packages: Arc<PackageCache>) -> Self {
        self.packages = Some(packages);
        self
    }

    pub fn with_assembly_extensions(mut self, extensions: Vec<String>) -> Self {
        self.directory_probe = DirectoryProbe::new(extensions);
        self
    }

    pub fn tokens(&self) -> &[SearchToken] {
        &self.tokens
    }

    pub fn reader(&self) -> &dyn MetadataReader {
        self.reader.as_ref()
    }

    pub fn assembly_extensions(&self) -> &[String] {
        self.directory_probe.extensions()
    }

    pub fn resolve(&self, reference: &Reference) -> Result<ResolveOutcome> {
        self.resolve_with(reference, &self.tokens)
    }

    /// Resolve against an explicit token list instead of the configured one.
    pub fn resolve_with(
        &self,
        reference: &Reference,
        tokens: &[SearchToken],
    ) -> Result<ResolveOutcome> {
        let specific_version = reference.specific_version();
        let mut outcome = ResolveOutcome::default();

        for token in tokens {
            if let Some(resolved) =
                self.try_token(token, reference, specific_version, &mut outcome.trace)?
            {
                tracing::debug!(
                    target = "asmref.resolve",
                    reference = %reference.identity,
                    path = %resolved.path.display(),
                    found_via = %resolved.found_via,
                    "resolved reference"
                );
                outcome.resolved = Some(resolved);
                return Ok(outcome);
            }
        }

        tracing::debug!(
            target = "asmref.resolve",
            reference = %reference.identity,
            attempts = outcome.trace.len(),
            "reference not found"
        );
        Ok(outcome)
    }

    fn try_token(
        &self,
        token: &SearchToken,
        reference: &Reference,
        specific_version: bool,
        trace: &mut Vec<String>,
    ) -> Result<Option<ResolvedReference>> {
        let requested = &reference.identity;
        let found = |identity: AssemblyIdentity, path: PathBuf| ResolvedReference {
            identity,
            path,
            found_via: token.clone(),
            copy_local: token.copy_local(),
            package: None,
        };

        match token {
            SearchToken::HintPathFromItem => {
                let Some(hint) = reference.hint_path.as_deref() else {
                    note(trace, format!("{token}: no hint path"));
                    return Ok(None);
                };
                let outcome =
                    HintPathProbe.probe(hint, requested, specific_version, self.reader.as_ref());
                Ok(self
                    .record_probe(token, outcome, trace)
                    .map(|c| found(c.identity, c.path)))
            }
            SearchToken::TargetFrameworkDirectory => {
                if self.framework_dirs.is_empty() {
                    note(trace, format!("{token}: no target framework directories"));
                    return Ok(None);
                }
                for dir in &self.framework_dirs {
                    let index = self.frameworks.get(dir);
                    match index.resolve(requested, specific_version) {
                        Some((identity, path)) => {
                            note(trace, format!("{token}: found {}", path.display()));
                            return Ok(Some(found(identity.clone(), path.to_path_buf())));
                        }
                        None => note(
                            trace,
                            format!("{token}: no match in {}", dir.display()),
                        ),
                    }
                }
                Ok(None)
            }
            SearchToken::Gac => {
                let Some(gac) = self.gac.as_deref() else {
                    return Err(ResolveError::EnvironmentMissing {
                        tried: "no global assembly cache index was configured".to_string(),
                    });
                };
                match gac.resolve(requested) {
                    Some((version, path)) => {
                        note(trace, format!("{token}: found {}", path.display()));
                        let identity = self.reader.read_identity(path).unwrap_or_else(|err| {
                            tracing::debug!(
                                target = "asmref.resolve",
                                path = %path.display(),
                                error = %err,
                                "GAC assembly identity unreadable; using requested identity"
                            );
                            requested.clone().with_version(version)
                        });
                        Ok(Some(found(identity, path.to_path_buf())))
                    }
                    None => {
                        note(
                            trace,
                            format!("{token}: '{requested}' not in {}", gac.root().display()),
                        );
                        Ok(None)
                    }
                }
            }
            SearchToken::RawFileName => {
                let path = PathBuf::from(&reference.raw);
                if !path.is_file() {
                    note(trace, format!("{token}: {} is not a file", path.display()));
                    return Ok(None);
                }
                match self.reader.read_identity(&path) {
                    Ok(identity) => {
                        note(trace, format!("{token}: found {}", path.display()));
                        Ok(Some(found(identity, path)))
                    }
                    Err(err) => {
                        tracing::debug!(
                            target = "asmref.resolve",
                            path = %path.display(),
                            error = %err,
                            "raw file is not a readable assembly"
                        );
                        note(trace, format!("{token}: {} is malformed: {err}", path.display()));
                        Ok(None)
                    }
                }
            }
            SearchToken::PkgConfig => {
                let Some(packages) = self.packages.as_deref() else {
                    note(trace, format!("{token}: no package cache"));
                    return Ok(None);
                };
                match packages.find_assembly(requested, specific_version) {
                    Some(hit) => {
                        note(
                            trace,
                            format!(
                                "{token}: found {} in package {}",
                                hit.assembly.file.display(),
                                hit.package
                            ),
                        );
                        let mut resolved = found(hit.assembly.identity(), hit.assembly.file);
                        resolved.package = Some(hit.package);
                        Ok(Some(resolved))
                    }
                    None => {
                        note(trace, format!("{token}: no package provides '{requested}'"));
                        Ok(None)
                    }
                }
            }
            SearchToken::CandidateAssemblyFiles
            | SearchToken::AssemblyFolders
            | SearchToken::Registry(_) => {
                static UNSUPPORTED_TOKEN_LOGGED: OnceLock<()> = OnceLock::new();
                if UNSUPPORTED_TOKEN_LOGGED.set(()).is_ok() {
                    tracing::info!(
                        target = "asmref.resolve",
                        token = %token,
                        "search path contains tokens that are not supported; they are skipped"
                    );
                }
                note(trace, format!("{token}: not supported; skipped"));
                Ok(None)
            }
            SearchToken::Directory(dir) => {
                let outcome = self.directory_probe.probe(
                    dir,
                    requested,
                    specific_version,
                    self.reader.as_ref(),
                );
                Ok(self
                    .record_probe(token, outcome, trace)
                    .map(|c| found(c.identity, c.path)))
            }
        }
    }

    fn record_probe(
        &self,
        token: &SearchToken,
        outcome: ProbeOutcome,
        trace: &mut Vec<String>,
    ) -> Option<crate::probe::Candidate> {
        match outcome {
            ProbeOutcome::Found(candidate) => {
                note(trace, format!("{token}: found {}", candidate.path.display()));
                Some(candidate)
            }
            ProbeOutcome::NotFound(reason) => {
                note(trace, format!("{token}: {reason}"));
                None
            }
            ProbeOutcome::Malformed { path, error } => {
                tracing::debug!(
                    target = "asmref.resolve",
                    path = %path.display(),
                    error = %error,
                    "candidate is not a readable assembly"
                );
                note(trace, format!("{token}: {} is malformed: {error}", path.display()));
                None
            }
        }
    }
}

fn note(trace: &mut Vec<String>, line: String) {
    tracing::trace!(target = "asmref.resolve", "{line}");
    trace.push(line);
}
