//! An RTP packet backed by its wire buffer.

use crate::extension::{OneByteIter, ONE_BYTE_PROFILE};
use crate::header::Header;
use bytes::BytesMut;
use shared::error::{Error, Result};
use std::fmt;

/// An RTP packet that owns its wire bytes. The header is parsed once; all
/// accessors index into the buffer, and mutators rewrite it in place so the
/// packet can be forwarded without re-serialization.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    buf: BytesMut,
    pub header: Header,
}

impl Packet {
    pub fn parse(buf: BytesMut) -> Result<Self> {
        let header = Header::parse(&buf)?;
        Ok(Self { buf, header })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> BytesMut {
        self.buf
    }

    /// Payload bytes, including any trailing padding.
    pub fn payload(&self) -> &[u8] {
        &self.buf[self.header.header_len..]
    }

    /// Number of trailing padding bytes, per the P bit and the final octet.
    pub fn padding_len(&self) -> usize {
        if !self.header.padding {
            return 0;
        }
        self.payload().last().map(|&b| b as usize).unwrap_or(0)
    }

    /// Payload bytes with padding removed. Returns an error when the
    /// padding count exceeds the payload.
    pub fn payload_without_padding(&self) -> Result<&[u8]> {
        let payload = self.payload();
        let padding = self.padding_len();
        if padding > payload.len() {
            return Err(Error::ErrBadPadding);
        }
        Ok(&payload[..payload.len() - padding])
    }

    /// True when the packet carries nothing but padding, the shape used for
    /// bandwidth probing.
    pub fn is_padding_only(&self) -> bool {
        match self.payload_without_padding() {
            Ok(p) => self.header.padding && p.is_empty(),
            Err(_) => false,
        }
    }

    /// Rewrites the SSRC field in the buffer.
    pub fn set_ssrc(&mut self, ssrc: u32) {
        self.buf[8..12].copy_from_slice(&ssrc.to_be_bytes());
        self.header.ssrc = ssrc;
    }

    /// Rewrites the sequence-number field in the buffer.
    pub fn set_sequence_number(&mut self, seq: u16) {
        self.buf[2..4].copy_from_slice(&seq.to_be_bytes());
        self.header.sequence_number = seq;
    }

    /// Rewrites the payload-type field in the buffer.
    pub fn set_payload_type(&mut self, pt: u8) {
        self.buf[1] = (self.buf[1] & 0x80) | (pt & 0x7F);
        self.header.payload_type = pt;
    }

    /// Looks up a one-byte header-extension element by id.
    pub fn extension(&self, id: u8) -> Option<&[u8]> {
        if !self.header.extension || self.header.extension_profile != ONE_BYTE_PROFILE {
            return None;
        }
        let data = &self.buf[self.header.extension_start
            ..self.header.extension_start + self.header.extension_len];
        OneByteIter::new(data)
            .find(|&(eid, _)| eid == id)
            .map(|(_, value)| value)
    }

    /// Reads the original sequence number an RTX payload starts with,
    /// without modifying the packet.
    pub fn rtx_original_sequence_number(&self) -> Result<u16> {
        let payload = self.payload_without_padding()?;
        if payload.len() < 2 {
            return Err(Error::ErrRtxPayloadTooShort);
        }
        Ok(u16::from_be_bytes([payload[0], payload[1]]))
    }

    /// Removes the two-byte original-sequence-number prefix from an RTX
    /// payload, shifting the remaining payload left in place. Returns the
    /// original sequence number.
    pub fn strip_rtx_osn(&mut self) -> Result<u16> {
        let osn = self.rtx_original_sequence_number()?;
        let start = self.header.header_len;
        self.buf.copy_within(start + 2.., start);
        let new_len = self.buf.len() - 2;
        self.buf.truncate(new_len);
        Ok(osn)
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("ssrc", &self.header.ssrc)
            .field("pt", &self.header.payload_type)
            .field("seq", &self.header.sequence_number)
            .field("ts", &self.header.timestamp)
            .field("len", &self.buf.len())
            .finish()
    }
}
