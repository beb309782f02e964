//! Reference resolution: turn an assembly reference into a file on disk.
//!
//! [`SearchPathResolver`] walks an ordered list of [`SearchToken`]s (hint
//! path, target-framework directories, packages, the global assembly cache,
//! the raw file name, literal directories) and stops at the first match.
//! [`DependencyWalker`] reuses it to resolve the transitive references of
//! the resolved files and to collect their related and satellite files.

mod culture;
mod discovery;
mod error;
mod framework;
mod gac;
mod probe;
mod resolver;
mod token;
mod walker;

pub use crate::culture::CultureTable;
pub use crate::discovery::{discover_gac_root, GAC_ROOT_ENV};
pub use crate::error::{ResolveError, Result};
pub use crate::framework::{FrameworkRegistry, TargetFrameworkIndex};
pub use crate::gac::GlobalCacheIndex;
pub use crate::probe::{
    Candidate, DirectoryProbe, HintPathProbe, ProbeOutcome, DEFAULT_ASSEMBLY_EXTENSIONS,
};
pub use crate::resolver::{Reference, ResolveOutcome, ResolvedReference, SearchPathResolver};
pub use crate::token::{default_search_paths, SearchToken};
pub use crate::walker::{
    DependencyWalker, ResolvedFile, SatelliteFile, UnresolvedDependency, WalkOptions, WalkResult,
    DEFAULT_RELATED_EXTENSIONS,
};
