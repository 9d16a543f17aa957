//! Bounds-checked little-endian decoding for the on-destination binary
//! formats (blob index and snapshot manifests).

use crate::error::{HoldfastError, Result};

pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or_else(|| HoldfastError::InvalidFormat(format!("truncated record: {what}")))?;
        self.pos += n;
        Ok(bytes)
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4, what)?.try_into().unwrap()))
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8, what)?.try_into().unwrap()))
    }

    pub(crate) fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        Ok(self.take(N, what)?.try_into().unwrap())
    }

    /// Bytes until the first NUL, decoded as UTF-8. The terminator is consumed.
    pub(crate) fn cstring(&mut self, what: &str) -> Result<String> {
        let rest = &self.data[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| HoldfastError::InvalidFormat(format!("unterminated string: {what}")))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| HoldfastError::InvalidFormat(format!("invalid UTF-8: {what}")))?;
        self.pos += nul + 1;
        Ok(s.to_string())
    }
}

/// Append a NUL-terminated UTF-8 string. Strings containing NUL cannot be
/// represented in this encoding and are rejected.
pub(crate) fn write_cstring(out: &mut Vec<u8>, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(HoldfastError::InvalidFormat(format!(
            "string contains a NUL byte: {s:?}"
        )));
    }
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}
