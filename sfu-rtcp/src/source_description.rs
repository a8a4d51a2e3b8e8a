//! RTCP Source Description (SDES), RFC 3550 section 6.5.
//!
//! The engine does not originate SDES; it parses enough to classify chunks
//! and forward the element downstream.

use shared::error::{Error, Result};

pub const SDES_TYPE_END: u8 = 0;
pub const SDES_TYPE_CNAME: u8 = 1;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SdesItem {
    pub item_type: u8,
    pub text: Vec<u8>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SdesChunk {
    pub source: u32,
    pub items: Vec<SdesItem>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceDescription {
    pub chunks: Vec<SdesChunk>,
}

impl SourceDescription {
    pub fn parse(count: u8, body: &[u8]) -> Result<Self> {
        let mut chunks = Vec::with_capacity(count as usize);
        let mut offset = 0usize;
        for _ in 0..count {
            if body.len() < offset + 4 {
                return Err(Error::ErrBadRtcpLength);
            }
            let source = u32::from_be_bytes([
                body[offset],
                body[offset + 1],
                body[offset + 2],
                body[offset + 3],
            ]);
            offset += 4;

            let mut items = Vec::new();
            loop {
                let Some(&item_type) = body.get(offset) else {
                    return Err(Error::ErrBadRtcpLength);
                };
                offset += 1;
                if item_type == SDES_TYPE_END {
                    break;
                }
                let Some(&len) = body.get(offset) else {
                    return Err(Error::ErrBadRtcpLength);
                };
                offset += 1;
                let end = offset + len as usize;
                if body.len() < end {
                    return Err(Error::ErrBadRtcpLength);
                }
                items.push(SdesItem {
                    item_type,
                    text: body[offset..end].to_vec(),
                });
                offset = end;
            }
            // Chunks are padded to a 32-bit boundary
            offset = (offset + 3) & !3;

            chunks.push(SdesChunk { source, items });
        }
        Ok(Self { chunks })
    }
}
