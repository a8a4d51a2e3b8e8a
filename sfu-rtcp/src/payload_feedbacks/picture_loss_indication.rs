//! Picture Loss Indication, RFC 4585 section 6.3.1.

use shared::error::{Error, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PictureLossIndication {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
}

impl PictureLossIndication {
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 8 {
            return Err(Error::ErrBadRtcpLength);
        }
        Ok(Self {
            sender_ssrc: u32::from_be_bytes([body[0], body[1], body[2], body[3]]),
            media_ssrc: u32::from_be_bytes([body[4], body[5], body[6], body[7]]),
        })
    }
}
