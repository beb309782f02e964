use crate::error::{MetadataError, Result};

/// Little-endian cursor over a byte slice.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn at(bytes: &'a [u8], pos: usize) -> Result<Self> {
        if pos > bytes.len() {
            return Err(MetadataError::UnexpectedEof);
        }
        Ok(Self { bytes, pos })
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn source(&self) -> &'a [u8] {
        self.bytes
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(MetadataError::UnexpectedEof)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(MetadataError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        let lo = u64::from(self.read_u32()?);
        let hi = u64::from(self.read_u32()?);
        Ok(lo | (hi << 32))
    }

    /// Reads a 2- or 4-byte table/heap index.
    pub(crate) fn read_index(&mut self, size: usize) -> Result<u32> {
        match size {
            2 => self.read_u16().map(u32::from),
            4 => self.read_u32(),
            _ => Err(MetadataError::Malformed("index size must be 2 or 4")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_values() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09];
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u16().unwrap(), 0x0302);
        assert_eq!(r.read_u32().unwrap(), 0x0706_0504);
        assert_eq!(r.position(), 7);
        assert!(matches!(r.read_u32(), Err(MetadataError::UnexpectedEof)));
    }

    #[test]
    fn index_width_follows_size() {
        let bytes = [0xff, 0x00, 0x01, 0x00, 0x00, 0x00];
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_index(2).unwrap(), 0xff);
        assert_eq!(r.read_index(4).unwrap(), 1);
    }
}
