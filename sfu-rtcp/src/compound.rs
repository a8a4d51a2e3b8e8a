//! Iteration over the elements of an RFC 3550 compound RTCP packet.

use crate::header::{Header, HEADER_LEN};
use shared::error::{Error, Result};

/// Yields `(header, element_bytes)` for each element of a compound packet.
/// The element slice includes the header. Iteration stops at the first
/// malformed element, yielding the error.
pub struct CompoundIter<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> CompoundIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for CompoundIter<'a> {
    type Item = Result<(Header, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.offset..];
        if rest.len() < HEADER_LEN {
            self.failed = true;
            return Some(Err(Error::ErrPacketTooShort(rest.len())));
        }
        let header = match Header::parse(rest) {
            Ok(h) => h,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        let len = header.packet_len();
        if rest.len() < len {
            self.failed = true;
            return Some(Err(Error::ErrBadRtcpLength));
        }
        self.offset += len;
        Some(Ok((header, &rest[..len])))
    }
}
