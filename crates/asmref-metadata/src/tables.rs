//! `#~` (compressed) table stream decoding.
//!
//! Row widths depend on heap sizes and on the row counts of referenced
//! tables, so every table preceding `AssemblyRef` must have its width
//! computed before the `Assembly`/`AssemblyRef` rows can be located.

use crate::error::{MetadataError, Result};
use crate::reader::Reader;

pub(crate) const TABLE_ASSEMBLY: u8 = 0x20;
pub(crate) const TABLE_ASSEMBLY_REF: u8 = 0x23;

const HEAP_STRINGS_WIDE: u8 = 0x01;
const HEAP_GUID_WIDE: u8 = 0x02;
const HEAP_BLOB_WIDE: u8 = 0x04;
const HEAP_EXTRA_DATA: u8 = 0x40;

#[derive(Clone, Copy)]
enum Coded {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    CustomAttributeType,
    ResolutionScope,
}

impl Coded {
    fn tag_bits_and_tables(self) -> (u32, &'static [u8]) {
        match self {
            Coded::TypeDefOrRef => (2, &[0x02, 0x01, 0x1B]),
            Coded::HasConstant => (2, &[0x04, 0x08, 0x17]),
            Coded::HasCustomAttribute => (
                5,
                &[
                    0x06, 0x04, 0x01, 0x02, 0x08, 0x09, 0x0A, 0x00, 0x0E, 0x17, 0x14, 0x11, 0x1A,
                    0x1B, 0x20, 0x23, 0x26, 0x27, 0x28, 0x2A, 0x2C, 0x2B,
                ],
            ),
            Coded::HasFieldMarshal => (1, &[0x04, 0x08]),
            Coded::HasDeclSecurity => (2, &[0x02, 0x06, 0x20]),
            Coded::MemberRefParent => (3, &[0x02, 0x01, 0x1A, 0x06, 0x1B]),
            Coded::HasSemantics => (1, &[0x14, 0x17]),
            Coded::MethodDefOrRef => (1, &[0x06, 0x0A]),
            Coded::MemberForwarded => (1, &[0x04, 0x06]),
            Coded::CustomAttributeType => (3, &[0x06, 0x0A]),
            Coded::ResolutionScope => (2, &[0x00, 0x1A, 0x23, 0x01]),
        }
    }
}

#[derive(Clone, Copy)]
enum Col {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Table(u8),
    Coded(Coded),
}

use Col::{Blob, Guid, Str, Table, U16, U32};

fn columns(table: u8) -> Result<&'static [Col]> {
    const TYPE_DEF_OR_REF: Col = Col::Coded(Coded::TypeDefOrRef);
    Ok(match table {
        0x00 => &[U16, Str, Guid, Guid, Guid],
        0x01 => &[Col::Coded(Coded::ResolutionScope), Str, Str],
        0x02 => &[U32, Str, Str, TYPE_DEF_OR_REF, Table(0x04), Table(0x06)],
        0x03 => &[Table(0x04)],
        0x04 => &[U16, Str, Blob],
        0x05 => &[Table(0x06)],
        0x06 => &[U32, U16, U16, Str, Blob, Table(0x08)],
        0x07 => &[Table(0x08)],
        0x08 => &[U16, U16, Str],
        0x09 => &[Table(0x02), TYPE_DEF_OR_REF],
        0x0A => &[Col::Coded(Coded::MemberRefParent), Str, Blob],
        // Constant: a one-byte type plus a padding byte.
        0x0B => &[U16, Col::Coded(Coded::HasConstant), Blob],
        0x0C => &[
            Col::Coded(Coded::HasCustomAttribute),
            Col::Coded(Coded::CustomAttributeType),
            Blob,
        ],
        0x0D => &[Col::Coded(Coded::HasFieldMarshal), Blob],
        0x0E => &[U16, Col::Coded(Coded::HasDeclSecurity), Blob],
        0x0F => &[U16, U32, Table(0x02)],
        0x10 => &[U32, Table(0x04)],
        0x11 => &[Blob],
        0x12 => &[Table(0x02), Table(0x14)],
        0x13 => &[Table(0x14)],
        0x14 => &[U16, Str, TYPE_DEF_OR_REF],
        0x15 => &[Table(0x02), Table(0x17)],
        0x16 => &[Table(0x17)],
        0x17 => &[U16, Str, Blob],
        0x18 => &[U16, Table(0x06), Col::Coded(Coded::HasSemantics)],
        0x19 => &[
            Table(0x02),
            Col::Coded(Coded::MethodDefOrRef),
            Col::Coded(Coded::MethodDefOrRef),
        ],
        0x1A => &[Str],
        0x1B => &[Blob],
        0x1C => &[U16, Col::Coded(Coded::MemberForwarded), Str, Table(0x1A)],
        0x1D => &[U32, Table(0x04)],
        0x1E => &[U32, U32],
        0x1F => &[U32],
        0x20 => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        0x21 => &[U32],
        0x22 => &[U32, U32, U32],
        0x23 => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        other => return Err(MetadataError::UnsupportedTable(other)),
    })
}

pub(crate) struct AssemblyRow {
    pub(crate) version: [u16; 4],
    pub(crate) public_key: u32,
    pub(crate) name: u32,
    pub(crate) culture: u32,
}

pub(crate) struct AssemblyRefRow {
    pub(crate) version: [u16; 4],
    pub(crate) flags: u32,
    pub(crate) public_key_or_token: u32,
    pub(crate) name: u32,
    pub(crate) culture: u32,
}

pub(crate) struct TablesStream<'a> {
    bytes: &'a [u8],
    rows: [u32; 64],
    string_width: usize,
    guid_width: usize,
    blob_width: usize,
    /// Byte offset of the first row of the first present table.
    data_start: usize,
}

impl<'a> TablesStream<'a> {
    pub(crate) fn parse(bytes: &'a [u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        r.skip(4)?; // reserved
        r.skip(2)?; // major, minor
        let heap_sizes = r.read_u8()?;
        r.skip(1)?; // reserved
        let valid = r.read_u64()?;
        r.skip(8)?; // sorted

        let mut rows = [0u32; 64];
        for (table, count) in rows.iter_mut().enumerate() {
            if valid & (1u64 << table) != 0 {
                *count = r.read_u32()?;
            }
        }
        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            r.skip(4)?;
        }

        let width = |flag: u8| if heap_sizes & flag != 0 { 4 } else { 2 };
        Ok(Self {
            bytes,
            rows,
            string_width: width(HEAP_STRINGS_WIDE),
            guid_width: width(HEAP_GUID_WIDE),
            blob_width: width(HEAP_BLOB_WIDE),
            data_start: r.position(),
        })
    }

    fn table_index_width(&self, table: u8) -> usize {
        if self.rows[usize::from(table)] < 0x1_0000 {
            2
        } else {
            4
        }
    }

    fn coded_width(&self, coded: Coded) -> usize {
        let (bits, tables) = coded.tag_bits_and_tables();
        let max_rows = tables
            .iter()
            .map(|t| self.rows[usize::from(*t)])
            .max()
            .unwrap_or(0);
        if max_rows < (1u32 << (16 - bits)) {
            2
        } else {
            4
        }
    }

    fn column_width(&self, col: Col) -> usize {
        match col {
            Col::U16 => 2,
            Col::U32 => 4,
            Col::Str => self.string_width,
            Col::Guid => self.guid_width,
            Col::Blob => self.blob_width,
            Col::Table(t) => self.table_index_width(t),
            Col::Coded(c) => self.coded_width(c),
        }
    }

    fn row_width(&self, table: u8) -> Result<usize> {
        Ok(columns(table)?
            .iter()
            .map(|col| self.column_width(*col))
            .sum())
    }

    /// Reader positioned at the first row of `table`.
    fn table_reader(&self, table: u8) -> Result<Reader<'a>> {
        let mut offset = self.data_start;
        for earlier in 0..table {
            let count = self.rows[usize::from(earlier)];
            if count == 0 {
                continue;
            }
            offset = self.table_len(earlier, count)?
                .checked_add(offset)
                .ok_or(MetadataError::UnexpectedEof)?;
        }
        Reader::at(self.bytes, offset)
    }

    /// Byte length of `count` rows of `table`; fails when the rows cannot
    /// fit in the image, so row counts read from the file are never trusted.
    fn table_len(&self, table: u8, count: u32) -> Result<usize> {
        let len = self
            .row_width(table)?
            .checked_mul(count as usize)
            .ok_or(MetadataError::UnexpectedEof)?;
        if len > self.bytes.len().saturating_sub(self.data_start) {
            return Err(MetadataError::UnexpectedEof);
        }
        Ok(len)
    }

    pub(crate) fn assembly(&self) -> Result<Option<AssemblyRow>> {
        if self.rows[usize::from(TABLE_ASSEMBLY)] == 0 {
            return Ok(None);
        }
        let mut r = self.table_reader(TABLE_ASSEMBLY)?;
        r.skip(4)?; // hash algorithm
        let version = read_version(&mut r)?;
        r.skip(4)?; // flags
        let public_key = r.read_index(self.blob_width)?;
        let name = r.read_index(self.string_width)?;
        let culture = r.read_index(self.string_width)?;
        Ok(Some(AssemblyRow {
            version,
            public_key,
            name,
            culture,
        }))
    }

    pub(crate) fn assembly_refs(&self) -> Result<Vec<AssemblyRefRow>> {
        let count = self.rows[usize::from(TABLE_ASSEMBLY_REF)];
        let mut out = Vec::new();
        if count == 0 {
            return Ok(out);
        }
        self.table_len(TABLE_ASSEMBLY_REF, count)?;
        let mut r = self.table_reader(TABLE_ASSEMBLY_REF)?;
        for _ in 0..count {
            let version = read_version(&mut r)?;
            let flags = r.read_u32()?;
            let public_key_or_token = r.read_index(self.blob_width)?;
            let name = r.read_index(self.string_width)?;
            let culture = r.read_index(self.string_width)?;
            r.skip(self.blob_width)?; // hash value
            out.push(AssemblyRefRow {
                version,
                flags,
                public_key_or_token,
                name,
                culture,
            });
        }
        Ok(out)
    }
}

fn read_version(r: &mut Reader<'_>) -> Result<[u16; 4]> {
    Ok([r.read_u16()?, r.read_u16()?, r.read_u16()?, r.read_u16()?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_widths_follow_heap_and_row_counts() {
        let mut header = vec![0u8; 4];
        header.extend_from_slice(&[2, 0]);
        header.push(HEAP_STRINGS_WIDE);
        header.push(1);
        let valid: u64 = (1 << 0x00) | (1 << 0x20);
        header.extend_from_slice(&valid.to_le_bytes());
        header.extend_from_slice(&0u64.to_le_bytes());
        header.extend_from_slice(&1u32.to_le_bytes());
        header.extend_from_slice(&1u32.to_le_bytes());

        let tables = TablesStream::parse(&header).unwrap();
        // Module: u16 + wide string + 3 narrow guids.
        assert_eq!(tables.row_width(0x00).unwrap(), 2 + 4 + 2 * 3);
        // Assembly: 4 + 4*2 + 4 + blob(2) + 2 wide strings.
        assert_eq!(tables.row_width(TABLE_ASSEMBLY).unwrap(), 4 + 8 + 4 + 2 + 4 + 4);
        assert!(matches!(
            tables.row_width(0x30),
            Err(MetadataError::UnsupportedTable(0x30))
        ));
    }
}
