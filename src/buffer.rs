// SPDX-License-Identifier: Apache-2.0

use std::net::Ipv4Addr;

use crate::{DhcpError, ErrorKind};

#[derive(Debug)]
pub(crate) struct Buffer<'a> {
    index: usize,
    data: &'a [u8],
}

impl<'a> Buffer<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { index: 0, data }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remain_len() == 0
    }

    pub(crate) fn remain_len(&self) -> usize {
        self.data.len().saturating_sub(self.index)
    }

    fn not_enough(&self, wanted: usize, what: &str) -> DhcpError {
        DhcpError::new(
            ErrorKind::InvalidDhcpMessage,
            format!(
                "Remain buffer({} bytes) not enough for getting {wanted} \
                 bytes {what}",
                self.remain_len()
            ),
        )
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8, DhcpError> {
        if self.is_empty() {
            return Err(self.not_enough(1, "u8"));
        }
        let ret = self.data[self.index];
        self.index += 1;
        Ok(ret)
    }

    pub(crate) fn get_u16_be(&mut self) -> Result<u16, DhcpError> {
        let raw = self.get_array::<2>().map_err(|_| self.not_enough(2, "u16"))?;
        Ok(u16::from_be_bytes(raw))
    }

    pub(crate) fn get_u32_be(&mut self) -> Result<u32, DhcpError> {
        let raw = self.get_array::<4>().map_err(|_| self.not_enough(4, "u32"))?;
        Ok(u32::from_be_bytes(raw))
    }

    pub(crate) fn get_ipv4(&mut self) -> Result<Ipv4Addr, DhcpError> {
        let raw = self
            .get_array::<4>()
            .map_err(|_| self.not_enough(4, "IPv4 address"))?;
        Ok(Ipv4Addr::from(raw))
    }

    fn get_array<const N: usize>(&mut self) -> Result<[u8; N], DhcpError> {
        let mut ret = [0u8; N];
        ret.copy_from_slice(self.get_bytes(N)?);
        Ok(ret)
    }

    pub(crate) fn get_bytes(
        &mut self,
        len: usize,
    ) -> Result<&'a [u8], DhcpError> {
        if self.remain_len() < len {
            return Err(self.not_enough(len, "array"));
        }
        let ret = &self.data[self.index..self.index + len];
        self.index += len;
        Ok(ret)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), DhcpError> {
        self.get_bytes(len).map(|_| ())
    }

    pub(crate) fn get_remains(&mut self) -> &'a [u8] {
        let ret = self.data.get(self.index..).unwrap_or(&[]);
        self.index = self.data.len();
        ret
    }
}

#[derive(Debug, Default)]
pub(crate) struct BufferMut {
    pub(crate) data: Vec<u8>,
}

impl BufferMut {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub(crate) fn write_u16_be(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_u32_be(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub(crate) fn write_ipv4(&mut self, addr: Ipv4Addr) {
        self.data.extend_from_slice(&addr.octets());
    }

    /// Write `value` and pad with zero up to `fix_size` bytes.
    /// The caller must make sure `value` is not longer than `fix_size`.
    pub(crate) fn write_bytes_padded(&mut self, value: &[u8], fix_size: usize) {
        self.data.extend_from_slice(value);
        self.data
            .resize(self.data.len() + fix_size.saturating_sub(value.len()), 0);
    }
}
