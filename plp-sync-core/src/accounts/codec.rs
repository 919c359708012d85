//! Little-endian cursor reader and writer for account buffers.

use super::DecodeError;
use super::address::Address;

pub(crate) struct AccountReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> AccountReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEnd {
                offset: self.offset,
                needed: n,
                len: self.data.len(),
            })?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        let offset = self.offset;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::InvalidBool { offset, value }),
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_address(&mut self) -> Result<Address, DecodeError> {
        Ok(Address::new(self.read_array()?))
    }

    /// u32 length prefix followed by utf-8 bytes.
    pub fn read_string(&mut self, max: usize) -> Result<String, DecodeError> {
        let offset = self.offset;
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(DecodeError::StringTooLong { offset, len, max });
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    /// One flag byte, then the address when the flag is 1.
    pub fn read_option_address(&mut self) -> Result<Option<Address>, DecodeError> {
        let offset = self.offset;
        match self.read_u8()? {
            0 => Ok(None),
            1 => self.read_address().map(Some),
            value => Err(DecodeError::InvalidOption { offset, value }),
        }
    }
}

#[derive(Default)]
pub(crate) struct AccountWriter {
    buf: Vec<u8>,
}

impl AccountWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn address(&mut self, v: &Address) -> &mut Self {
        self.bytes(v.as_bytes())
    }

    pub fn string(&mut self, v: &str) -> &mut Self {
        let len = u32::try_from(v.len()).unwrap_or(u32::MAX);
        self.bytes(&len.to_le_bytes()).bytes(v.as_bytes())
    }

    pub fn option_address(&mut self, v: Option<&Address>) -> &mut Self {
        match v {
            Some(address) => self.u8(1).address(address),
            None => self.u8(0),
        }
    }

    /// Zero-pads up to `size`; longer buffers are returned unchanged.
    pub fn finish_padded(mut self, size: usize) -> Vec<u8> {
        if self.buf.len() < size {
            self.buf.resize(size, 0);
        }
        self.buf
    }
}
