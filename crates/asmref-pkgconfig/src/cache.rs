use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use asmref_identity::{assembly_lookup_key, is_compatible, AssemblyIdentity};
use asmref_metadata::MetadataReader;
use parking_lot::Mutex;

use crate::descriptor::{AssemblyDescriptor, PackageDescriptor};
use crate::error::{PkgConfigError, Result};
use crate::lock::LockPolicy;
use crate::persist::{self, PersistOutcome};

/// An assembly found through the package cache, with its owning package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAssembly {
    pub assembly: AssemblyDescriptor,
    pub package: String,
    pub pc_file: PathBuf,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: BTreeMap<PathBuf, Arc<PackageDescriptor>>,
    /// Entries checked against the file's current mtime by this process.
    confirmed: BTreeSet<PathBuf>,
    index: Option<Arc<ReverseIndex>>,
    dirty: bool,
}

impl CacheState {
    fn remove(&mut self, path: &Path) -> bool {
        self.confirmed.remove(path);
        if self.entries.remove(path).is_none() {
            return false;
        }
        self.index = None;
        self.dirty = true;
        true
    }
}

/// Lookup key (see [`assembly_lookup_key`]) -> assembly, plus a by-simple-name view used when a
/// request carries no version.
#[derive(Debug, Default)]
struct ReverseIndex {
    by_full_name: HashMap<String, PackageAssembly>,
    by_name: HashMap<String, Vec<PackageAssembly>>,
}

/// mtime-invalidated cache of `.pc` package descriptors.
///
/// Entries are keyed by absolute `.pc` path. Entries merged from the cache
/// file stay unconfirmed until [`PackageCache::get`] checks them against the
/// file on disk; only confirmed entries are listed or indexed. The reverse
/// full-name index is built on first query and dropped whenever an entry is
/// added, changed or removed, or by [`PackageCache::invalidate_index`].
pub struct PackageCache {
    reader: Arc<dyn MetadataReader>,
    cache_file: Option<PathBuf>,
    search_dirs: Vec<PathBuf>,
    lock_policy: LockPolicy,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for PackageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageCache")
            .field("cache_file", &self.cache_file)
            .field("search_dirs", &self.search_dirs)
            .field("entries", &self.state.lock().entries.len())
            .finish()
    }
}

impl PackageCache {
    pub fn new(reader: Arc<dyn MetadataReader>) -> Self {
        Self {
            reader,
            cache_file: None,
            search_dirs: Vec::new(),
            lock_policy: LockPolicy::default(),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_cache_file(mut self, path: Option<PathBuf>) -> Self {
        self.cache_file = path;
        self
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn cache_file(&self) -> Option<&Path> {
        self.cache_file.as_deref()
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Descriptor for the `.pc` file at `path`, re-parsed only when the
    /// file's mtime differs from the cached `last_write_time`. A file that no
    /// longer exists loses its entry.
    pub fn get(&self, path: &Path) -> Result<Arc<PackageDescriptor>> {
        let path = absolute(path);
        let mtime = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound && self.state.lock().remove(&path) {
                    tracing::debug!(
                        target = "asmref.pkgconfig",
                        path = %path.display(),
                        "package file removed; dropping cached entry"
                    );
                }
                return Err(PkgConfigError::io(&path, err));
            }
        };

        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get(&path) {
            if entry.last_write_time == mtime {
                let entry = Arc::clone(entry);
                if state.confirmed.insert(path) {
                    state.index = None;
                }
                return Ok(entry);
            }
        }

        let text = std::fs::read_to_string(&path).map_err(|err| PkgConfigError::io(&path, err))?;
        let descriptor = Arc::new(PackageDescriptor::parse(
            &path,
            &text,
            mtime,
            self.reader.as_ref(),
        ));
        if !descriptor.is_valid() {
            tracing::debug!(
                target = "asmref.pkgconfig",
                path = %path.display(),
                "package lists no readable assemblies; caching empty entry"
            );
        }
        state.confirmed.insert(path.clone());
        state.entries.insert(path, Arc::clone(&descriptor));
        state.index = None;
        state.dirty = true;
        Ok(descriptor)
    }

    /// All loaded descriptors, valid or not, ordered by path.
    pub fn entries(&self) -> Vec<Arc<PackageDescriptor>> {
        self.state.lock().entries.values().cloned().collect()
    }

    /// Valid descriptors confirmed against disk.
    pub fn packages(&self) -> Vec<Arc<PackageDescriptor>> {
        let state = self.state.lock();
        confirmed_valid(&state).cloned().collect()
    }

    /// Calls [`PackageCache::get`] for every `*.pc` file in the search
    /// directories, after dropping entries whose file is gone. Unreadable
    /// files are skipped.
    pub fn scan_search_dirs(&self) -> Vec<Arc<PackageDescriptor>> {
        self.prune_missing();
        let mut out = Vec::new();
        for dir in &self.search_dirs {
            for path in pc_files_in(dir) {
                match self.get(&path) {
                    Ok(descriptor) => out.push(descriptor),
                    Err(err) => tracing::debug!(
                        target = "asmref.pkgconfig",
                        path = %path.display(),
                        error = %err,
                        "failed to read package file; skipping"
                    ),
                }
            }
        }
        out
    }

    /// First package named `name` (the `.pc` file stem) in search order.
    pub fn find_package(&self, name: &str) -> Option<Arc<PackageDescriptor>> {
        for dir in &self.search_dirs {
            let path = dir.join(format!("{name}.pc"));
            if !path.is_file() {
                continue;
            }
            match self.get(&path) {
                Ok(descriptor) => return Some(descriptor),
                Err(err) => tracing::debug!(
                    target = "asmref.pkgconfig",
                    path = %path.display(),
                    error = %err,
                    "failed to read package file; skipping"
                ),
            }
        }
        None
    }

    /// Drops entries whose `.pc` file no longer exists.
    pub fn prune_missing(&self) -> usize {
        let mut state = self.state.lock();
        let missing: Vec<PathBuf> = state
            .entries
            .keys()
            .filter(|path| !path.exists())
            .cloned()
            .collect();
        for path in &missing {
            state.remove(path);
        }
        if !missing.is_empty() {
            tracing::debug!(
                target = "asmref.pkgconfig",
                removed = missing.len(),
                "dropped cached entries for deleted package files"
            );
        }
        missing.len()
    }

    /// File of the assembly whose full name matches `full_name`. A neutral
    /// or omitted culture, a null or omitted token and token hex case are
    /// all equivalent.
    pub fn get_assembly_location(&self, full_name: &str) -> Option<PathBuf> {
        self.reverse_index()
            .by_full_name
            .get(&assembly_lookup_key(full_name))
            .map(|hit| hit.assembly.file.clone())
    }

    /// Best package assembly for `requested`.
    ///
    /// An exact full-name hit wins. Otherwise candidates with the same simple
    /// name are filtered with [`is_compatible`]; a requested version must be
    /// matched exactly, and without one the highest version wins.
    pub fn find_assembly(
        &self,
        requested: &AssemblyIdentity,
        specific_version: bool,
    ) -> Option<PackageAssembly> {
        let index = self.reverse_index();
        if let Some(hit) = index
            .by_full_name
            .get(&assembly_lookup_key(&requested.full_name()))
        {
            return Some(hit.clone());
        }

        let best = index
            .by_name
            .get(&requested.name)?
            .iter()
            .filter(|hit| {
                requested
                    .version
                    .map_or(true, |wanted| hit.assembly.version == Some(wanted))
            })
            .filter(|hit| is_compatible(requested, &hit.assembly.identity(), specific_version))
            .max_by_key(|hit| hit.assembly.version)
            .cloned();
        best
    }

    /// Forces the reverse index to be rebuilt on the next lookup.
    pub fn invalidate_index(&self) {
        self.state.lock().index = None;
    }

    fn reverse_index(&self) -> Arc<ReverseIndex> {
        let mut state = self.state.lock();
        if let Some(index) = &state.index {
            return Arc::clone(index);
        }

        let mut index = ReverseIndex::default();
        for descriptor in confirmed_valid(&state) {
            for assembly in &descriptor.assemblies {
                let hit = PackageAssembly {
                    assembly: assembly.clone(),
                    package: descriptor.package_id().to_string(),
                    pc_file: descriptor.path.clone(),
                };
                index
                    .by_full_name
                    .entry(assembly_lookup_key(&assembly.full_name()))
                    .or_insert_with(|| hit.clone());
                index
                    .by_name
                    .entry(assembly.name.clone())
                    .or_default()
                    .push(hit);
            }
        }
        tracing::debug!(
            target = "asmref.pkgconfig",
            assemblies = index.by_full_name.len(),
            "built package assembly index"
        );
        let index = Arc::new(index);
        state.index = Some(Arc::clone(&index));
        index
    }

    /// Merge entries from the cache file. In-memory entries win; loaded
    /// entries stay unconfirmed until [`PackageCache::get`] checks their mtime.
    pub fn load(&self) -> PersistOutcome {
        let Some(path) = self.cache_file.as_deref() else {
            return PersistOutcome::Disabled;
        };
        match persist::load(path, self.lock_policy) {
            Ok(None) => PersistOutcome::Absent,
            Ok(Some(entries)) => {
                let mut state = self.state.lock();
                let mut loaded = 0;
                for entry in entries {
                    state.entries.entry(entry.path.clone()).or_insert_with(|| {
                        loaded += 1;
                        Arc::new(entry)
                    });
                }
                PersistOutcome::Loaded { entries: loaded }
            }
            Err(err) => self.persist_failure(path, err, "load"),
        }
    }

    /// Write all entries when anything changed since the last load/save.
    pub fn save(&self) -> PersistOutcome {
        let Some(path) = self.cache_file.as_deref() else {
            return PersistOutcome::Disabled;
        };

        let mut state = self.state.lock();
        if !state.dirty {
            return PersistOutcome::Clean;
        }
        let entries: Vec<_> = state.entries.values().cloned().collect();
        match persist::store(path, &entries, self.lock_policy) {
            Ok(()) => {
                state.dirty = false;
                PersistOutcome::Saved {
                    entries: entries.len(),
                }
            }
            Err(err) => self.persist_failure(path, err, "save"),
        }
    }

    fn persist_failure(&self, path: &Path, err: PkgConfigError, op: &str) -> PersistOutcome {
        match err {
            PkgConfigError::LockContended { .. } => {
                tracing::warn!(
                    target = "asmref.pkgconfig",
                    path = %path.display(),
                    op,
                    "package cache file is locked; continuing with in-memory cache"
                );
                PersistOutcome::Contended
            }
            err => {
                tracing::debug!(
                    target = "asmref.pkgconfig",
                    path = %path.display(),
                    op,
                    error = %err,
                    "package cache persistence failed (best effort)"
                );
                PersistOutcome::Failed(err.to_string())
            }
        }
    }
}

fn confirmed_valid(state: &CacheState) -> impl Iterator<Item = &Arc<PackageDescriptor>> {
    state
        .entries
        .iter()
        .filter(move |(path, d)| d.is_valid() && state.confirmed.contains(*path))
        .map(|(_, d)| d)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

fn pc_files_in(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(
                    target = "asmref.pkgconfig",
                    path = %dir.display(),
                    error = %err,
                    "failed to list package directory"
                );
            }
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "pc") && p.is_file())
        .collect();
    files.sort();
    files
}
