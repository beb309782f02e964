//! XML persistence of the package cache.
//!
//! ```xml
//! <PcFileCache>
//!   <File path=".." lastWriteTime=".." name=".." version=".." description=".." gacPackage="false">
//!     <Assembly name=".." version=".." culture=".." publicKeyToken=".." file=".."/>
//!   </File>
//! </PcFileCache>
//! ```
//!
//! A missing `gacPackage` attribute means the package installs into the GAC.
//! `requires` attributes and `Variable` children are optional additions that
//! older readers ignore.

use std::collections::HashMap;
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use asmref_identity::{AssemblyVersion, PublicKeyToken};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::descriptor::{AssemblyDescriptor, PackageDescriptor};
use crate::error::{PkgConfigError, Result};
use crate::lock::{CacheFileLock, LockPolicy};

/// Bumped whenever the document layout changes; part of the file name.
pub const CACHE_SCHEMA_VERSION: u32 = 2;

/// Result of a best-effort load or save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Loaded { entries: usize },
    Saved { entries: usize },
    /// Nothing changed since the last load or save.
    Clean,
    /// No cache file exists yet.
    Absent,
    /// No cache file is configured.
    Disabled,
    /// The cache file stayed locked by another process; in-memory state is
    /// still authoritative for this process.
    Contended,
    Failed(String),
}

impl fmt::Display for PersistOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistOutcome::Loaded { entries } => write!(f, "loaded {entries} entries"),
            PersistOutcome::Saved { entries } => write!(f, "saved {entries} entries"),
            PersistOutcome::Clean => f.write_str("unchanged"),
            PersistOutcome::Absent => f.write_str("no cache file"),
            PersistOutcome::Disabled => f.write_str("persistence disabled"),
            PersistOutcome::Contended => f.write_str("cache file locked by another process"),
            PersistOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

pub(crate) fn load(path: &Path, policy: LockPolicy) -> Result<Option<Vec<PackageDescriptor>>> {
    if !path.exists() {
        return Ok(None);
    }
    let _lock = CacheFileLock::acquire(path, false, policy)?;
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(PkgConfigError::io(path, err)),
    };
    read_document(&text).map(Some)
}

pub(crate) fn store(path: &Path, entries: &[Arc<PackageDescriptor>], policy: LockPolicy) -> Result<()> {
    let bytes = write_document(entries)?;

    let _lock = CacheFileLock::acquire(path, true, policy)?;
    let mut file = std::fs::File::create(path).map_err(|err| PkgConfigError::io(path, err))?;
    file.write_all(&bytes)
        .and_then(|()| file.flush())
        .map_err(|err| PkgConfigError::io(path, err))
}

fn xml_err(err: impl fmt::Display) -> PkgConfigError {
    PkgConfigError::Xml(err.to_string())
}

pub(crate) fn format_timestamp(time: SystemTime) -> Result<String> {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .map_err(|err| PkgConfigError::Timestamp {
            value: format!("{time:?}"),
            message: err.to_string(),
        })
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<SystemTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map(SystemTime::from)
        .map_err(|err| PkgConfigError::Timestamp {
            value: raw.to_string(),
            message: err.to_string(),
        })
}

pub(crate) fn write_document(entries: &[Arc<PackageDescriptor>]) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("PcFileCache")))
        .map_err(xml_err)?;

    for entry in entries {
        let path = entry.path.to_string_lossy();
        let last_write_time = format_timestamp(entry.last_write_time)?;
        let mut file = BytesStart::new("File");
        file.push_attribute(("path", path.as_ref()));
        file.push_attribute(("lastWriteTime", last_write_time.as_str()));
        file.push_attribute(("name", entry.name.as_str()));
        file.push_attribute(("version", entry.version.as_str()));
        file.push_attribute(("description", entry.description.as_str()));
        if !entry.is_gac_package {
            file.push_attribute(("gacPackage", "false"));
        }
        let requires = entry.requires.join(" ");
        if !requires.is_empty() {
            file.push_attribute(("requires", requires.as_str()));
        }

        if entry.assemblies.is_empty() && entry.variables.is_empty() {
            writer.write_event(Event::Empty(file)).map_err(xml_err)?;
            continue;
        }

        writer.write_event(Event::Start(file)).map_err(xml_err)?;
        for assembly in &entry.assemblies {
            let version = assembly.version.map(|v| v.to_string()).unwrap_or_default();
            let token = assembly
                .public_key_token
                .as_ref()
                .map_or_else(|| "null".to_string(), ToString::to_string);
            let file_path = assembly.file.to_string_lossy();

            let mut element = BytesStart::new("Assembly");
            element.push_attribute(("name", assembly.name.as_str()));
            element.push_attribute(("version", version.as_str()));
            element.push_attribute(("culture", assembly.culture.as_deref().unwrap_or("")));
            element.push_attribute(("publicKeyToken", token.as_str()));
            element.push_attribute(("file", file_path.as_ref()));
            writer.write_event(Event::Empty(element)).map_err(xml_err)?;
        }
        for (name, value) in &entry.variables {
            let mut element = BytesStart::new("Variable");
            element.push_attribute(("name", name.as_str()));
            element.push_attribute(("value", value.as_str()));
            writer.write_event(Event::Empty(element)).map_err(xml_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("File")))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("PcFileCache")))
        .map_err(xml_err)?;
    Ok(writer.into_inner())
}

pub(crate) fn read_document(xml: &str) -> Result<Vec<PackageDescriptor>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PackageDescriptor> = None;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) if e.name().as_ref() == b"File" => {
                current = file_from_attributes(&attributes(&e)?);
            }
            Event::Empty(e) if e.name().as_ref() == b"File" => {
                if let Some(entry) = file_from_attributes(&attributes(&e)?) {
                    entries.push(entry);
                }
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Assembly" => {
                let attrs = attributes(&e)?;
                if let Some(entry) = current.as_mut() {
                    if let Some(assembly) = assembly_from_attributes(&attrs) {
                        entry.assemblies.push(assembly);
                    }
                }
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Variable" => {
                let mut attrs = attributes(&e)?;
                if let (Some(entry), Some(name), Some(value)) = (
                    current.as_mut(),
                    attrs.remove("name"),
                    attrs.remove("value"),
                ) {
                    entry.variables.insert(name, value);
                }
            }
            Event::End(e) if e.name().as_ref() == b"File" => {
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

fn attributes(element: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

fn file_from_attributes(attrs: &HashMap<String, String>) -> Option<PackageDescriptor> {
    let path = attrs.get("path").filter(|p| !p.is_empty())?;
    let raw_time = attrs.get("lastWriteTime")?;
    let last_write_time = match parse_timestamp(raw_time) {
        Ok(time) => time,
        Err(err) => {
            tracing::debug!(
                target = "asmref.pkgconfig",
                path = %path,
                error = %err,
                "ignoring cached package entry with invalid timestamp"
            );
            return None;
        }
    };
    let text = |key: &str| attrs.get(key).cloned().unwrap_or_default();

    Some(PackageDescriptor {
        path: PathBuf::from(path),
        name: text("name"),
        version: text("version"),
        description: text("description"),
        is_gac_package: !attrs
            .get("gacPackage")
            .is_some_and(|v| v.eq_ignore_ascii_case("false")),
        assemblies: Vec::new(),
        requires: attrs
            .get("requires")
            .map(|r| r.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
        variables: Default::default(),
        last_write_time,
    })
}

fn assembly_from_attributes(attrs: &HashMap<String, String>) -> Option<AssemblyDescriptor> {
    let name = attrs.get("name").filter(|n| !n.is_empty())?.clone();
    let file = attrs.get("file").filter(|f| !f.is_empty())?;

    let version = match attrs.get("version").map(|v| v.trim()) {
        None | Some("") => None,
        Some(raw) => Some(AssemblyVersion::parse(raw).ok()?),
    };
    let culture = attrs
        .get("culture")
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let public_key_token = match attrs.get("publicKeyToken").map(|t| t.trim()) {
        None | Some("") => None,
        Some(raw) if raw.eq_ignore_ascii_case("null") => None,
        Some(raw) => Some(PublicKeyToken::parse_hex(raw).ok()?),
    };

    Some(AssemblyDescriptor {
        name,
        version,
        culture,
        public_key_token,
        file: PathBuf::from(file),
    })
}
