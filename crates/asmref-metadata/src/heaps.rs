use crate::error::{MetadataError, Result};

/// `#Strings` heap: NUL-terminated UTF-8 strings addressed by byte offset.
pub(crate) struct StringHeap<'a> {
    bytes: &'a [u8],
}

impl<'a> StringHeap<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub(crate) fn get(&self, index: u32) -> Result<&'a str> {
        let invalid = || MetadataError::InvalidHeapIndex {
            heap: "#Strings",
            index,
        };
        let rest = self.bytes.get(index as usize..).ok_or_else(invalid)?;
        let len = rest.iter().position(|b| *b == 0).ok_or_else(invalid)?;
        std::str::from_utf8(&rest[..len]).map_err(|_| MetadataError::InvalidUtf8(index))
    }
}

/// `#Blob` heap: length-prefixed byte runs using the ECMA-335 compressed
/// unsigned integer encoding for the length.
pub(crate) struct BlobHeap<'a> {
    bytes: &'a [u8],
}

impl<'a> BlobHeap<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub(crate) fn get(&self, index: u32) -> Result<&'a [u8]> {
        if index == 0 {
            return Ok(&[]);
        }
        let invalid = || MetadataError::InvalidHeapIndex {
            heap: "#Blob",
            index,
        };
        let rest = self.bytes.get(index as usize..).ok_or_else(invalid)?;
        let (len, header) = decode_compressed_len(rest).ok_or_else(invalid)?;
        rest.get(header..header + len).ok_or_else(invalid)
    }
}

/// Returns `(value, encoded_width)`.
fn decode_compressed_len(bytes: &[u8]) -> Option<(usize, usize)> {
    let first = *bytes.first()?;
    if first & 0x80 == 0 {
        Some((usize::from(first), 1))
    } else if first & 0xC0 == 0x80 {
        let second = *bytes.get(1)?;
        Some(((usize::from(first & 0x3F) << 8) | usize::from(second), 2))
    } else if first & 0xE0 == 0xC0 {
        let rest = bytes.get(1..4)?;
        let value = (usize::from(first & 0x1F) << 24)
            | (usize::from(rest[0]) << 16)
            | (usize::from(rest[1]) << 8)
            | usize::from(rest[2]);
        Some((value, 4))
    } else {
        None
    }
}
