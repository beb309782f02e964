use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// One entry of an ordered search path. Order defines priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SearchToken {
    /// `{HintPathFromItem}`: the reference's explicit hint path.
    HintPathFromItem,
    /// `{TargetFrameworkDirectory}`: each configured framework directory in order.
    TargetFrameworkDirectory,
    /// `{GAC}`.
    Gac,
    /// `{RawFileName}`: the reference string taken as a file path.
    RawFileName,
    /// `{PkgConfig}`: assemblies listed by loaded `.pc` packages.
    PkgConfig,
    /// `{CandidateAssemblyFiles}`; recognized but not searched.
    CandidateAssemblyFiles,
    /// `{AssemblyFolders}`; recognized but not searched.
    AssemblyFolders,
    /// `{Registry:...}`; recognized but not searched.
    Registry(String),
    /// A literal directory.
    Directory(PathBuf),
}

impl SearchToken {
    /// Total: anything that is not a recognized `{...}` token is a directory.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let Some(inner) = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        else {
            return SearchToken::Directory(PathBuf::from(trimmed));
        };

        let is = |name: &str| inner.eq_ignore_ascii_case(name);
        if is("HintPathFromItem") {
            SearchToken::HintPathFromItem
        } else if is("TargetFrameworkDirectory") {
            SearchToken::TargetFrameworkDirectory
        } else if is("GAC") {
            SearchToken::Gac
        } else if is("RawFileName") {
            SearchToken::RawFileName
        } else if is("PkgConfig") {
            SearchToken::PkgConfig
        } else if is("CandidateAssemblyFiles") {
            SearchToken::CandidateAssemblyFiles
        } else if is("AssemblyFolders") {
            SearchToken::AssemblyFolders
        } else if inner
            .get(..9)
            .is_some_and(|head| head.eq_ignore_ascii_case("Registry:"))
        {
            SearchToken::Registry(inner[9..].to_string())
        } else {
            SearchToken::Directory(PathBuf::from(trimmed))
        }
    }

    /// Shared install locations: hits are never copied locally and their
    /// dependencies are not walked.
    pub fn is_shared_location(&self) -> bool {
        matches!(
            self,
            SearchToken::Gac | SearchToken::TargetFrameworkDirectory | SearchToken::PkgConfig
        )
    }

    /// CopyLocal for a reference found through this token.
    pub fn copy_local(&self) -> bool {
        matches!(self, SearchToken::Directory(_) | SearchToken::RawFileName)
    }

    /// Tokens that depend on the original item rather than on the identity.
    pub(crate) fn is_item_specific(&self) -> bool {
        matches!(self, SearchToken::HintPathFromItem | SearchToken::RawFileName)
    }
}

impl FromStr for SearchToken {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for SearchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchToken::HintPathFromItem => f.write_str("{HintPathFromItem}"),
            SearchToken::TargetFrameworkDirectory => f.write_str("{TargetFrameworkDirectory}"),
            SearchToken::Gac => f.write_str("{GAC}"),
            SearchToken::RawFileName => f.write_str("{RawFileName}"),
            SearchToken::PkgConfig => f.write_str("{PkgConfig}"),
            SearchToken::CandidateAssemblyFiles => f.write_str("{CandidateAssemblyFiles}"),
            SearchToken::AssemblyFolders => f.write_str("{AssemblyFolders}"),
            SearchToken::Registry(key) => write!(f, "{{Registry:{key}}}"),
            SearchToken::Directory(dir) => write!(f, "{}", dir.display()),
        }
    }
}

impl Serialize for SearchToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Search order used when none is configured.
pub fn default_search_paths() -> Vec<SearchToken> {
    vec![
        SearchToken::HintPathFromItem,
        SearchToken::TargetFrameworkDirectory,
        SearchToken::PkgConfig,
        SearchToken::Gac,
        SearchToken::RawFileName,
    ]
}
