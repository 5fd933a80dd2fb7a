use crate::error::SerializationError;

/// Bounds-checked cursor over a record buffer.
///
/// Tracks how many bytes have been consumed so callers can split signature
/// suffixes or nested payloads out of a shared buffer.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn read_u8(&mut self, field: &'static str) -> Result<u8, SerializationError> {
        let bytes = self.read_bytes(1, field)?;
        Ok(bytes[0])
    }

    pub(crate) fn read_u16_be(&mut self, field: &'static str) -> Result<u16, SerializationError> {
        let bytes = self.read_bytes(2, field)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_bytes(
        &mut self,
        len: usize,
        field: &'static str,
    ) -> Result<&'a [u8], SerializationError> {
        if self.remaining() < len {
            return Err(SerializationError::Truncated {
                field,
                needed: len - self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Consume everything up to the end of the buffer.
    pub(crate) fn read_rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }

    /// A length-prefixed field: big-endian u16 length, then that many bytes.
    pub(crate) fn read_prefixed(
        &mut self,
        field: &'static str,
    ) -> Result<&'a [u8], SerializationError> {
        let len = self.read_u16_be(field)? as usize;
        self.read_bytes(len, field)
    }
}

/// Append a length-prefixed field (big-endian u16 length, then the bytes).
///
/// Record fields are bounded well below `u16::MAX` by the protocol
/// (origins, ISO-8601 timestamps, payloads capped by `token-max-size`).
pub(crate) fn write_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}
