use crate::error::{PeError, PeResult};

/// Bounds-checked random-access view over a fully loaded byte buffer.
///
/// Every structure read in this crate goes through this type; there is no
/// pointer casting onto untrusted bytes. A read that would step past the end
/// of the buffer fails with [`PeError::OutOfBounds`] carrying the offending
/// offset and length.
#[derive(Debug)]
pub struct ByteSource {
    data: Vec<u8>,
}

impl ByteSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Total size of the underlying buffer in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn read_at(&self, offset: u64, len: u64) -> PeResult<&[u8]> {
        let end = offset.checked_add(len).ok_or(PeError::OutOfBounds {
            offset,
            len,
            size: self.len(),
        })?;
        if end > self.len() {
            return Err(PeError::OutOfBounds { offset, len, size: self.len() });
        }
        Ok(&self.data[offset as usize..end as usize])
    }

    pub fn read_u8(&self, offset: u64) -> PeResult<u8> {
        Ok(self.read_at(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: u64) -> PeResult<u16> {
        let b = self.read_at(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&self, offset: u64) -> PeResult<u32> {
        let b = self.read_at(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&self, offset: u64) -> PeResult<u64> {
        let b = self.read_at(offset, 8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Read a NUL-terminated ASCII string starting at `offset`, up to
    /// `max_len` bytes. Fails if no terminator is found within the bound or
    /// before the end of the buffer.
    pub fn read_cstr(&self, offset: u64, max_len: u64) -> PeResult<String> {
        let avail = self.len().saturating_sub(offset);
        if avail == 0 {
            return Err(PeError::OutOfBounds { offset, len: 1, size: self.len() });
        }
        let window = self.read_at(offset, avail.min(max_len))?;
        match window.iter().position(|&b| b == 0) {
            Some(end) => Ok(String::from_utf8_lossy(&window[..end]).into_owned()),
            None => Err(PeError::malformed("unterminated string", offset)),
        }
    }

    /// Read `units` UTF-16LE code units starting at `offset` and decode them
    /// (lossy on unpaired surrogates).
    pub fn read_utf16(&self, offset: u64, units: u64) -> PeResult<String> {
        let raw = self.read_at(offset, units.checked_mul(2).ok_or(PeError::OutOfBounds {
            offset,
            len: u64::MAX,
            size: self.len(),
        })?)?;
        let code_units: Vec<u16> =
            raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        Ok(String::from_utf16_lossy(&code_units))
    }

    /// Read a NUL-terminated UTF-16LE string starting at `offset`, up to
    /// `max_units` code units. Returns the decoded text and the number of
    /// code units consumed including the terminator.
    pub fn read_utf16z(&self, offset: u64, max_units: u64) -> PeResult<(String, u64)> {
        let mut units = Vec::new();
        let mut pos = offset;
        while (units.len() as u64) < max_units {
            let unit = self.read_u16(pos)?;
            pos += 2;
            if unit == 0 {
                return Ok((String::from_utf16_lossy(&units), units.len() as u64 + 1));
            }
            units.push(unit);
        }
        Err(PeError::malformed("unterminated UTF-16 string", offset))
    }
}

/// Bounds-checked little-endian u16 read from a borrowed slice.
pub fn read_u16_le(data: &[u8], offset: usize) -> PeResult<u16> {
    let end = offset.checked_add(2).filter(|&e| e <= data.len()).ok_or(PeError::OutOfBounds {
        offset: offset as u64,
        len: 2,
        size: data.len() as u64,
    })?;
    Ok(u16::from_le_bytes([data[end - 2], data[end - 1]]))
}

/// Bounds-checked little-endian u32 read from a borrowed slice.
pub fn read_u32_le(data: &[u8], offset: usize) -> PeResult<u32> {
    let end = offset.checked_add(4).filter(|&e| e <= data.len()).ok_or(PeError::OutOfBounds {
        offset: offset as u64,
        len: 4,
        size: data.len() as u64,
    })?;
    let b = &data[end - 4..end];
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_at_rejects_reads_past_the_end() {
        let src = ByteSource::new(vec![1, 2, 3, 4]);
        assert!(src.read_at(0, 4).is_ok());
        assert!(matches!(src.read_at(1, 4), Err(PeError::OutOfBounds { .. })));
        assert!(matches!(src.read_at(u64::MAX, 2), Err(PeError::OutOfBounds { .. })));
    }

    #[test]
    fn typed_readers_are_little_endian() {
        let src = ByteSource::new(vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!(src.read_u16(0).unwrap(), 0x5678);
        assert_eq!(src.read_u32(0).unwrap(), 0x1234_5678);
    }

    #[test]
    fn cstr_requires_a_terminator() {
        let src = ByteSource::new(b"hello\0world".to_vec());
        assert_eq!(src.read_cstr(0, 64).unwrap(), "hello");
        assert!(src.read_cstr(6, 5).is_err());
    }

    #[test]
    fn utf16z_consumes_terminator() {
        let src = ByteSource::new(vec![b'H', 0, b'i', 0, 0, 0]);
        let (text, consumed) = src.read_utf16z(0, 16).unwrap();
        assert_eq!(text, "Hi");
        assert_eq!(consumed, 3);
    }
}
