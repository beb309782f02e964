//! Metadata-only reader for ECMA-335 (CLI) assemblies.
//!
//! Only what reference resolution needs is decoded: the assembly's own
//! identity (`Assembly` table) and the identities it references
//! (`AssemblyRef` table). No code is loaded or executed.
#![forbid(unsafe_code)]

mod error;
mod heaps;
mod pe;
mod reader;
mod tables;
mod token;

use std::path::Path;

use asmref_identity::{AssemblyIdentity, AssemblyVersion, PublicKeyToken};

pub use crate::error::{MetadataError, Result};
pub use crate::token::public_key_token;

use crate::heaps::{BlobHeap, StringHeap};
use crate::pe::PeImage;
use crate::tables::TablesStream;

/// `AssemblyFlags.PublicKey`: the blob holds a full public key, not a token.
const AFL_PUBLIC_KEY: u32 = 0x0001;

/// Identity and references read from an assembly manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyMetadata {
    pub identity: AssemblyIdentity,
    pub references: Vec<AssemblyIdentity>,
    /// Runtime version string from the metadata root (e.g. `v4.0.30319`).
    pub runtime_version: String,
}

impl AssemblyMetadata {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let image = PeImage::parse(bytes)?;
        let root = image.metadata_root()?;

        let tables_bytes = root
            .stream("#~")
            .or_else(|| root.stream("#-"))
            .ok_or(MetadataError::MissingStream("#~"))?;
        let strings = StringHeap::new(
            root.stream("#Strings")
                .ok_or(MetadataError::MissingStream("#Strings"))?,
        );
        let blobs = BlobHeap::new(root.stream("#Blob").unwrap_or_default());

        let tables = TablesStream::parse(tables_bytes)?;

        let row = tables
            .assembly()?
            .ok_or(MetadataError::NoAssemblyManifest)?;
        let public_key = blobs.get(row.public_key)?;
        let identity = build_identity(
            strings.get(row.name)?,
            row.version,
            strings.get(row.culture)?,
            (!public_key.is_empty()).then(|| public_key_token(public_key)),
        )?;

        let mut references = Vec::new();
        for row in tables.assembly_refs()? {
            let blob = blobs.get(row.public_key_or_token)?;
            let token = if blob.is_empty() {
                None
            } else if row.flags & AFL_PUBLIC_KEY != 0 {
                Some(public_key_token(blob))
            } else {
                Some(PublicKeyToken::new(blob))
            };
            references.push(build_identity(
                strings.get(row.name)?,
                row.version,
                strings.get(row.culture)?,
                token,
            )?);
        }

        Ok(Self {
            identity,
            references,
            runtime_version: root.version.to_string(),
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }
}

fn build_identity(
    name: &str,
    version: [u16; 4],
    culture: &str,
    token: Option<PublicKeyToken>,
) -> Result<AssemblyIdentity> {
    if name.is_empty() {
        return Err(MetadataError::Malformed("assembly name is empty"));
    }
    let mut identity = AssemblyIdentity::new(name)
        .with_version(AssemblyVersion::new(
            version[0], version[1], version[2], version[3],
        ))
        .with_culture(culture);
    if let Some(token) = token {
        identity = identity.with_public_key_token(token);
    }
    Ok(identity)
}

/// Narrow seam over "read the CLI metadata header of a file".
///
/// Resolvers depend on this trait rather than on the parser so hosts can
/// substitute a caching or instrumented implementation.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<AssemblyMetadata>;

    fn read_identity(&self, path: &Path) -> Result<AssemblyIdentity> {
        self.read(path).map(|metadata| metadata.identity)
    }
}

/// [`MetadataReader`] backed by the in-crate ECMA-335 parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct EcmaMetadataReader;

impl MetadataReader for EcmaMetadataReader {
    fn read(&self, path: &Path) -> Result<AssemblyMetadata> {
        AssemblyMetadata::read(path)
    }
}
