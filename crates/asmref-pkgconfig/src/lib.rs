//! pkg-config style package descriptors for managed assemblies.
//!
//! A `.pc` file names the assemblies a package ships (`Libs: -r:...` or a
//! `Libraries` variable). [`PackageCache`] parses those files on demand,
//! re-parses them only when their mtime changes, answers full-name lookups
//! through a lazily built reverse index, and persists itself as a single XML
//! document guarded by an advisory lock file.

mod cache;
mod descriptor;
mod error;
mod lock;
mod pc;
mod persist;
mod search;

pub use crate::cache::{PackageAssembly, PackageCache};
pub use crate::descriptor::{AssemblyDescriptor, PackageDescriptor};
pub use crate::error::{PkgConfigError, Result};
pub use crate::lock::LockPolicy;
pub use crate::persist::{PersistOutcome, CACHE_SCHEMA_VERSION};
pub use crate::search::{cache_file_in, default_cache_file, default_search_dirs, PKG_CACHE_ENV};
