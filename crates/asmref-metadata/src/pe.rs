use crate::error::{MetadataError, Result};
use crate::reader::Reader;

const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;
const METADATA_SIGNATURE: u32 = 0x424A_5342;
/// Index of the CLI runtime header in the optional header's data directories.
const CLI_HEADER_DIRECTORY: u32 = 14;

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_size: u32,
    raw_pointer: u32,
}

pub(crate) struct PeImage<'a> {
    bytes: &'a [u8],
    sections: Vec<Section>,
    cli_header_rva: u32,
}

impl<'a> PeImage<'a> {
    pub(crate) fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.get(..2) != Some(b"MZ".as_slice()) {
            return Err(MetadataError::NotPortableExecutable);
        }
        let pe_offset = Reader::at(bytes, 0x3c)?.read_u32()? as usize;

        let mut r = Reader::at(bytes, pe_offset)?;
        if r.read_bytes(4)? != b"PE\0\0" {
            return Err(MetadataError::NotPortableExecutable);
        }

        // COFF file header.
        r.skip(2)?; // machine
        let section_count = r.read_u16()? as usize;
        r.skip(12)?; // timestamp, symbol table pointer, symbol count
        let optional_header_size = r.read_u16()? as usize;
        r.skip(2)?; // characteristics

        let optional_header = r.position();
        let magic = r.read_u16()?;
        let (rva_count_offset, directories_offset) = match magic {
            PE32_MAGIC => (92, 96),
            PE32_PLUS_MAGIC => (108, 112),
            _ => return Err(MetadataError::NotPortableExecutable),
        };

        let rva_count = Reader::at(bytes, optional_header + rva_count_offset)?.read_u32()?;
        if rva_count <= CLI_HEADER_DIRECTORY {
            return Err(MetadataError::NotManaged);
        }
        let mut dir = Reader::at(
            bytes,
            optional_header + directories_offset + CLI_HEADER_DIRECTORY as usize * 8,
        )?;
        let cli_header_rva = dir.read_u32()?;
        let cli_header_size = dir.read_u32()?;
        if cli_header_rva == 0 || cli_header_size == 0 {
            return Err(MetadataError::NotManaged);
        }

        let mut r = Reader::at(bytes, optional_header + optional_header_size)?;
        let mut sections = Vec::with_capacity(section_count);
        for _ in 0..section_count {
            r.skip(8)?; // name
            let virtual_size = r.read_u32()?;
            let virtual_address = r.read_u32()?;
            let raw_size = r.read_u32()?;
            let raw_pointer = r.read_u32()?;
            r.skip(16)?; // relocations, line numbers, characteristics
            sections.push(Section {
                virtual_address,
                virtual_size,
                raw_size,
                raw_pointer,
            });
        }

        Ok(Self {
            bytes,
            sections,
            cli_header_rva,
        })
    }

    fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.sections
            .iter()
            .find_map(|s| {
                let extent = s.virtual_size.max(s.raw_size);
                let delta = rva.checked_sub(s.virtual_address)?;
                (delta < extent).then(|| s.raw_pointer as usize + delta as usize)
            })
            .ok_or(MetadataError::UnmappedRva(rva))
    }

    pub(crate) fn metadata_root(&self) -> Result<MetadataRoot<'a>> {
        let mut cli = Reader::at(self.bytes, self.rva_to_offset(self.cli_header_rva)?)?;
        cli.skip(8)?; // cb, major/minor runtime version
        let metadata_rva = cli.read_u32()?;
        let metadata_size = cli.read_u32()? as usize;

        let start = self.rva_to_offset(metadata_rva)?;
        let metadata = self
            .bytes
            .get(start..start.saturating_add(metadata_size))
            .ok_or(MetadataError::UnexpectedEof)?;
        MetadataRoot::parse(metadata)
    }
}

/// Metadata root (`BSJB` header) and its stream directory.
pub(crate) struct MetadataRoot<'a> {
    pub(crate) version: &'a str,
    streams: Vec<(&'a str, &'a [u8])>,
}

impl<'a> MetadataRoot<'a> {
    fn parse(metadata: &'a [u8]) -> Result<Self> {
        let mut r = Reader::new(metadata);
        let signature = r.read_u32()?;
        if signature != METADATA_SIGNATURE {
            return Err(MetadataError::InvalidSignature(signature));
        }
        r.skip(8)?; // major, minor, reserved
        let version_len = r.read_u32()? as usize;
        let version_bytes = r.read_bytes(version_len)?;
        let version = std::str::from_utf8(version_bytes)
            .map_err(|_| MetadataError::Malformed("metadata version string is not UTF-8"))?
            .trim_end_matches('\0');
        r.skip(2)?; // flags
        let stream_count = r.read_u16()? as usize;

        let mut streams = Vec::with_capacity(stream_count);
        for _ in 0..stream_count {
            let offset = r.read_u32()? as usize;
            let size = r.read_u32()? as usize;
            let name = read_stream_name(&mut r)?;
            let data = metadata
                .get(offset..offset.saturating_add(size))
                .ok_or(MetadataError::UnexpectedEof)?;
            streams.push((name, data));
        }

        Ok(Self { version, streams })
    }

    pub(crate) fn stream(&self, name: &str) -> Option<&'a [u8]> {
        self.streams
            .iter()
            .find(|(stream, _)| *stream == name)
            .map(|(_, data)| *data)
    }
}

/// Stream names are NUL-terminated and padded to a 4-byte boundary.
fn read_stream_name<'a>(r: &mut Reader<'a>) -> Result<&'a str> {
    let start = r.position();
    let mut len = 0usize;
    while r.read_u8()? != 0 {
        len += 1;
        if len > 32 {
            return Err(MetadataError::Malformed("stream name too long"));
        }
    }
    let consumed = r.position() - start;
    r.skip((4 - consumed % 4) % 4)?;

    let bytes = Reader::at(r.source(), start)?.read_bytes(len)?;
    std::str::from_utf8(bytes).map_err(|_| MetadataError::Malformed("stream name is not UTF-8"))
}
