use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_RVA: u32 = 0x2000;
const PE_OFFSET: usize = 0x80;
const OPTIONAL_HEADER_SIZE: usize = 224;
const CLI_HEADER_SIZE: usize = 72;
const CLI_HEADER_DIRECTORY: usize = 14;
const RUNTIME_VERSION: &str = "v4.0.30319";

/// `AssemblyFlags.PublicKey`.
const AFL_PUBLIC_KEY: u32 = 0x0001;
/// `CALG_SHA1`.
const HASH_ALGORITHM_SHA1: u32 = 0x8004;

#[derive(Debug, Clone)]
struct Reference {
    name: String,
    version: [u16; 4],
    culture: String,
    /// Public key token, or the full key when `full_key` is set.
    key: Vec<u8>,
    full_key: bool,
}

/// Builder for a minimal managed PE32 image.
///
/// The image holds a single `.text` section with a CLI header, a metadata
/// root and the `#~`, `#Strings`, `#Blob` and `#GUID` streams. Only the
/// `Module`, `Assembly` and `AssemblyRef` tables are populated.
#[derive(Debug, Clone)]
pub struct AssemblyBuilder {
    name: String,
    version: [u16; 4],
    culture: String,
    public_key: Vec<u8>,
    references: Vec<Reference>,
}

impl AssemblyBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: [0; 4],
            culture: String::new(),
            public_key: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Dotted version; missing components are zero.
    pub fn version(mut self, version: &str) -> Self {
        self.version = parse_version(version);
        self
    }

    pub fn culture(mut self, culture: &str) -> Self {
        self.culture = culture.to_string();
        self
    }

    /// Full public key stored in the `Assembly` row.
    pub fn public_key(mut self, key: &[u8]) -> Self {
        self.public_key = key.to_vec();
        self
    }

    /// Reference by simple name and version, without a public key token.
    pub fn reference(self, name: &str, version: &str) -> Self {
        self.push_reference(name, version, "", Vec::new(), false)
    }

    /// Reference carrying an 8-byte public key token given as hex.
    pub fn strong_reference(self, name: &str, version: &str, token_hex: &str) -> Self {
        self.push_reference(name, version, "", decode_hex(token_hex), false)
    }

    /// Reference carrying a full public key (`AssemblyFlags.PublicKey` set).
    pub fn reference_with_full_key(self, name: &str, version: &str, key: &[u8]) -> Self {
        self.push_reference(name, version, "", key.to_vec(), true)
    }

    pub fn culture_reference(self, name: &str, version: &str, culture: &str) -> Self {
        self.push_reference(name, version, culture, Vec::new(), false)
    }

    fn push_reference(
        mut self,
        name: &str,
        version: &str,
        culture: &str,
        key: Vec<u8>,
        full_key: bool,
    ) -> Self {
        self.references.push(Reference {
            name: name.to_string(),
            version: parse_version(version),
            culture: culture.to_string(),
            key,
            full_key,
        });
        self
    }

    /// Write the image to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.build())
    }

    /// Write the image as `<dir>/<file_name>` and return the path.
    pub fn write_in(&self, dir: &Path, file_name: &str) -> io::Result<PathBuf> {
        let path = dir.join(file_name);
        self.write_to(&path)?;
        Ok(path)
    }

    pub fn build(&self) -> Vec<u8> {
        let metadata = self.metadata();
        let metadata_rva = SECTION_RVA + CLI_HEADER_SIZE as u32;

        let mut section = Vec::new();
        // CLI header.
        put_u32(&mut section, CLI_HEADER_SIZE as u32);
        put_u16(&mut section, 2);
        put_u16(&mut section, 5);
        put_u32(&mut section, metadata_rva);
        put_u32(&mut section, metadata.len() as u32);
        put_u32(&mut section, 1); // COMIMAGE_FLAGS_ILONLY
        section.resize(CLI_HEADER_SIZE, 0);
        section.extend_from_slice(&metadata);

        let raw_size = align(section.len(), FILE_ALIGNMENT);

        let mut image = vec![0u8; PE_OFFSET];
        image[0] = b'M';
        image[1] = b'Z';
        image[0x3c..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());

        image.extend_from_slice(b"PE\0\0");
        // COFF header.
        put_u16(&mut image, 0x14c);
        put_u16(&mut image, 1);
        put_u32(&mut image, 0);
        put_u32(&mut image, 0);
        put_u32(&mut image, 0);
        put_u16(&mut image, OPTIONAL_HEADER_SIZE as u16);
        put_u16(&mut image, 0x2102);

        // PE32 optional header; only the fields the reader needs are set.
        let optional = image.len();
        image.resize(optional + OPTIONAL_HEADER_SIZE, 0);
        image[optional..optional + 2].copy_from_slice(&0x10bu16.to_le_bytes());
        image[optional + 92..optional + 96].copy_from_slice(&16u32.to_le_bytes());
        let dir = optional + 96 + CLI_HEADER_DIRECTORY * 8;
        image[dir..dir + 4].copy_from_slice(&SECTION_RVA.to_le_bytes());
        image[dir + 4..dir + 8].copy_from_slice(&(CLI_HEADER_SIZE as u32).to_le_bytes());

        // Section table.
        image.extend_from_slice(b".text\0\0\0");
        put_u32(&mut image, section.len() as u32);
        put_u32(&mut image, SECTION_RVA);
        put_u32(&mut image, raw_size as u32);
        put_u32(&mut image, FILE_ALIGNMENT as u32);
        image.extend_from_slice(&[0u8; 12]);
        put_u32(&mut image, 0x6000_0020);

        image.resize(FILE_ALIGNMENT, 0);
        image.extend_from_slice(&section);
        image.resize(FILE_ALIGNMENT + raw_size, 0);
        image
    }

    fn metadata(&self) -> Vec<u8> {
        let mut strings = StringHeapBuilder::default();
        let mut blobs = BlobHeapBuilder::default();

        let module_name = strings.add(&format!("{}.dll", self.name));
        let name = strings.add(&self.name);
        let culture = strings.add(&self.culture);
        let public_key = blobs.add(&self.public_key);

        let references: Vec<_> = self
            .references
            .iter()
            .map(|r| {
                (
                    r,
                    strings.add(&r.name),
                    strings.add(&r.culture),
                    blobs.add(&r.key),
                )
            })
            .collect();

        let mut tables = Vec::new();
        put_u32(&mut tables, 0);
        tables.push(2);
        tables.push(0);
        tables.push(0); // all heap indexes are 2 bytes
        tables.push(1);
        let mut valid: u64 = (1 << 0x00) | (1 << 0x20);
        if !references.is_empty() {
            valid |= 1 << 0x23;
        }
        tables.extend_from_slice(&valid.to_le_bytes());
        tables.extend_from_slice(&0u64.to_le_bytes());
        put_u32(&mut tables, 1);
        put_u32(&mut tables, 1);
        if !references.is_empty() {
            put_u32(&mut tables, references.len() as u32);
        }

        // Module.
        put_u16(&mut tables, 0);
        put_u16(&mut tables, module_name);
        put_u16(&mut tables, 1);
        put_u16(&mut tables, 0);
        put_u16(&mut tables, 0);

        // Assembly.
        put_u32(&mut tables, HASH_ALGORITHM_SHA1);
        for part in self.version {
            put_u16(&mut tables, part);
        }
        let flags = if self.public_key.is_empty() {
            0
        } else {
            AFL_PUBLIC_KEY
        };
        put_u32(&mut tables, flags);
        put_u16(&mut tables, public_key);
        put_u16(&mut tables, name);
        put_u16(&mut tables, culture);

        // AssemblyRef.
        for (reference, name, culture, key) in references {
            for part in reference.version {
                put_u16(&mut tables, part);
            }
            put_u32(&mut tables, if reference.full_key { AFL_PUBLIC_KEY } else { 0 });
            put_u16(&mut tables, key);
            put_u16(&mut tables, name);
            put_u16(&mut tables, culture);
            put_u16(&mut tables, 0);
        }

        let guid = [0x11u8; 16];
        let streams: [(&str, Vec<u8>); 4] = [
            ("#~", tables),
            ("#Strings", strings.finish()),
            ("#Blob", blobs.finish()),
            ("#GUID", guid.to_vec()),
        ];

        let mut version = RUNTIME_VERSION.as_bytes().to_vec();
        version.resize(align(version.len() + 1, 4), 0);

        let headers_len: usize = streams
            .iter()
            .map(|(name, _)| 8 + align(name.len() + 1, 4))
            .sum();
        let mut offset = 16 + version.len() + 4 + headers_len;

        let mut root = Vec::new();
        put_u32(&mut root, 0x424A_5342);
        put_u16(&mut root, 1);
        put_u16(&mut root, 1);
        put_u32(&mut root, 0);
        put_u32(&mut root, version.len() as u32);
        root.extend_from_slice(&version);
        put_u16(&mut root, 0);
        put_u16(&mut root, streams.len() as u16);

        let mut data = Vec::new();
        for (name, bytes) in &streams {
            let padded = align(bytes.len(), 4);
            put_u32(&mut root, offset as u32);
            put_u32(&mut root, padded as u32);
            let mut raw_name = name.as_bytes().to_vec();
            raw_name.resize(align(name.len() + 1, 4), 0);
            root.extend_from_slice(&raw_name);

            data.extend_from_slice(bytes);
            data.resize(data.len() + padded - bytes.len(), 0);
            offset += padded;
        }
        root.extend_from_slice(&data);
        root
    }
}

#[derive(Default)]
struct StringHeapBuilder {
    bytes: Vec<u8>,
    offsets: HashMap<String, u16>,
}

impl StringHeapBuilder {
    fn add(&mut self, value: &str) -> u16 {
        if self.bytes.is_empty() {
            self.bytes.push(0);
        }
        if value.is_empty() {
            return 0;
        }
        if let Some(offset) = self.offsets.get(value) {
            return *offset;
        }
        let offset = self.bytes.len() as u16;
        self.bytes.extend_from_slice(value.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(value.to_string(), offset);
        offset
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bytes.is_empty() {
            self.bytes.push(0);
        }
        self.bytes
    }
}

#[derive(Default)]
struct BlobHeapBuilder {
    bytes: Vec<u8>,
}

impl BlobHeapBuilder {
    fn add(&mut self, value: &[u8]) -> u16 {
        if self.bytes.is_empty() {
            self.bytes.push(0);
        }
        if value.is_empty() {
            return 0;
        }
        let offset = self.bytes.len() as u16;
        let len = value.len();
        if len < 0x80 {
            self.bytes.push(len as u8);
        } else {
            self.bytes.push(0x80 | (len >> 8) as u8);
            self.bytes.push((len & 0xff) as u8);
        }
        self.bytes.extend_from_slice(value);
        offset
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bytes.is_empty() {
            self.bytes.push(0);
        }
        self.bytes
    }
}

fn parse_version(raw: &str) -> [u16; 4] {
    let mut out = [0u16; 4];
    for (slot, part) in out.iter_mut().zip(raw.split('.')) {
        *slot = part.trim().parse().unwrap_or(0);
    }
    out
}

fn decode_hex(raw: &str) -> Vec<u8> {
    raw.as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect()
}

fn align(value: usize, to: usize) -> usize {
    value.div_ceil(to) * to
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}
