//! Bounds-checked little-endian reads against a borrowed buffer.

use crate::DecodeError;

#[derive(Clone, Copy)]
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
    record: &'static str,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(buf: &'a [u8], record: &'static str) -> Self {
        Self { buf, record }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    /// Borrow `len` bytes at `offset`, failing instead of reading past the end.
    pub(crate) fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.buf.get(offset..end))
            .ok_or(DecodeError::Truncated {
                record: self.record,
                offset,
                needed: len,
                available: self.buf.len(),
            })
    }

    /// Ensure a whole record of `len` bytes is present at `offset`.
    pub(crate) fn require(&self, offset: usize, len: usize) -> Result<(), DecodeError> {
        self.bytes(offset, len).map(|_| ())
    }

    fn array<const N: usize>(&self, offset: usize) -> Result<[u8; N], DecodeError> {
        let slice = self.bytes(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub(crate) fn i32(&self, offset: usize) -> Result<i32, DecodeError> {
        self.array::<4>(offset).map(i32::from_le_bytes)
    }

    pub(crate) fn i64(&self, offset: usize) -> Result<i64, DecodeError> {
        self.array::<8>(offset).map(i64::from_le_bytes)
    }

    pub(crate) fn u64(&self, offset: usize) -> Result<u64, DecodeError> {
        self.array::<8>(offset).map(u64::from_le_bytes)
    }

    pub(crate) fn f32(&self, offset: usize) -> Result<f32, DecodeError> {
        self.array::<4>(offset).map(f32::from_le_bytes)
    }

    pub(crate) fn f32s<const N: usize>(&self, offset: usize) -> Result<[f32; N], DecodeError> {
        let slice = self.bytes(offset, N * 4)?;
        let mut out = [0f32; N];
        for (value, chunk) in out.iter_mut().zip(slice.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(out)
    }

    pub(crate) fn vec3(&self, offset: usize) -> Result<[f32; 3], DecodeError> {
        self.f32s::<3>(offset)
    }

    /// Fixed-width, NUL-terminated name field. Stops at the first NUL and never
    /// looks beyond `width`.
    pub(crate) fn fixed_str(&self, offset: usize, width: usize) -> Result<String, DecodeError> {
        let raw = self.bytes(offset, width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(width);
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Interpret a native pointer field as a byte offset into this buffer.
    pub(crate) fn offset_field(&self, offset: usize) -> Result<usize, DecodeError> {
        let raw = self.u64(offset)?;
        usize::try_from(raw).map_err(|_| DecodeError::Truncated {
            record: self.record,
            offset,
            needed: usize::MAX,
            available: self.buf.len(),
        })
    }
}
