//! RTP fixed-header parsing, RFC 3550 section 5.1.

use shared::error::{Error, Result};

/// Size of the fixed RTP header, before CSRCs and extensions.
pub const FIXED_HEADER_LEN: usize = 12;

/// The only RTP version in use.
pub const VERSION: u8 = 2;

const VERSION_SHIFT: u8 = 6;
const PADDING_MASK: u8 = 0x20;
const EXTENSION_MASK: u8 = 0x10;
const CSRC_COUNT_MASK: u8 = 0x0F;
const MARKER_MASK: u8 = 0x80;
const PAYLOAD_TYPE_MASK: u8 = 0x7F;

/// Parsed view of an RTP header. Offsets refer into the buffer the header
/// was parsed from so payload and extension bytes can be located without
/// copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc_count: u8,
    /// Extension profile word, 0 when no extension block is present.
    pub extension_profile: u16,
    /// Offset of the first extension data byte (past the 4-byte extension
    /// header), 0 when no extension block is present.
    pub(crate) extension_start: usize,
    /// Length in bytes of the extension data, excluding the 4-byte header.
    pub(crate) extension_len: usize,
    /// Total header length in bytes, including CSRCs and extension block.
    pub header_len: usize,
}

impl Header {
    /// Parses the header in place. The buffer is not copied; the returned
    /// header records offsets into it.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(Error::ErrPacketTooShort(buf.len()));
        }
        if buf[0] >> VERSION_SHIFT != VERSION {
            return Err(Error::ErrBadVersion);
        }

        let padding = buf[0] & PADDING_MASK != 0;
        let extension = buf[0] & EXTENSION_MASK != 0;
        let csrc_count = buf[0] & CSRC_COUNT_MASK;
        let marker = buf[1] & MARKER_MASK != 0;
        let payload_type = buf[1] & PAYLOAD_TYPE_MASK;
        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let mut header_len = FIXED_HEADER_LEN + 4 * csrc_count as usize;
        if buf.len() < header_len {
            return Err(Error::ErrPacketTooShort(buf.len()));
        }

        let mut extension_profile = 0u16;
        let mut extension_start = 0usize;
        let mut extension_len = 0usize;
        if extension {
            if buf.len() < header_len + 4 {
                return Err(Error::ErrBadHeaderExtension);
            }
            extension_profile = u16::from_be_bytes([buf[header_len], buf[header_len + 1]]);
            extension_len =
                4 * u16::from_be_bytes([buf[header_len + 2], buf[header_len + 3]]) as usize;
            extension_start = header_len + 4;
            header_len = extension_start + extension_len;
            if buf.len() < header_len {
                return Err(Error::ErrBadHeaderExtension);
            }
        }

        Ok(Self {
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc_count,
            extension_profile,
            extension_start,
            extension_len,
            header_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let buf = [
            0x80, 0x6F, 0x12, 0x34, // v=2, PT=111, seq=0x1234
            0x00, 0x00, 0x30, 0x39, // ts=12345
            0x00, 0x00, 0x00, 0x0A, // ssrc=10
        ];
        let h = Header::parse(&buf).unwrap();
        assert!(!h.padding);
        assert!(!h.extension);
        assert_eq!(h.payload_type, 111);
        assert_eq!(h.sequence_number, 0x1234);
        assert_eq!(h.timestamp, 12345);
        assert_eq!(h.ssrc, 10);
        assert_eq!(h.header_len, FIXED_HEADER_LEN);
    }

    #[test]
    fn test_parse_with_extension() {
        let buf = [
            0x90, 0x60, 0x00, 0x01, // v=2, X=1, PT=96
            0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x0B, //
            0xBE, 0xDE, 0x00, 0x01, // one-byte profile, 1 word
            0x10, 0xAA, 0x00, 0x00, // id=1 len=1, value 0xAA, padding
        ];
        let h = Header::parse(&buf).unwrap();
        assert!(h.extension);
        assert_eq!(h.extension_profile, 0xBEDE);
        assert_eq!(h.extension_start, 16);
        assert_eq!(h.extension_len, 4);
        assert_eq!(h.header_len, 20);
    }

    #[test]
    fn test_reject_bad_version() {
        let buf = [0x40u8; 12];
        assert_eq!(Header::parse(&buf), Err(Error::ErrBadVersion));
    }

    #[test]
    fn test_reject_short() {
        let buf = [0x80u8; 8];
        assert_eq!(Header::parse(&buf), Err(Error::ErrPacketTooShort(8)));
    }

    #[test]
    fn test_reject_truncated_extension() {
        let buf = [
            0x90, 0x60, 0x00, 0x01, //
            0x00, 0x00, 0x00, 0x00, //
            0x00, 0x00, 0x00, 0x0B, //
            0xBE, 0xDE, 0x00, 0x04, // claims 4 words, none present
        ];
        assert_eq!(Header::parse(&buf), Err(Error::ErrBadHeaderExtension));
    }
}
