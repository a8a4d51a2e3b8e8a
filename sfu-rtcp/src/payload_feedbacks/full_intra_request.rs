//! Full Intra Request, RFC 5104 section 4.3.1.

use shared::error::{Error, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FirEntry {
    pub ssrc: u32,
    pub sequence_number: u8,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FullIntraRequest {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub fir: Vec<FirEntry>,
}

impl FullIntraRequest {
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 8 || (body.len() - 8) % 8 != 0 {
            return Err(Error::ErrBadRtcpLength);
        }
        let sender_ssrc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let media_ssrc = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
        let fir = body[8..]
            .chunks_exact(8)
            .map(|c| FirEntry {
                ssrc: u32::from_be_bytes([c[0], c[1], c[2], c[3]]),
                sequence_number: c[4],
            })
            .collect();
        Ok(Self {
            sender_ssrc,
            media_ssrc,
            fir,
        })
    }
}
