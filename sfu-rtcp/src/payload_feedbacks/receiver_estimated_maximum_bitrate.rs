//! Receiver Estimated Maximum Bitrate,
//! draft-alvestrand-rmcat-remb-03.

use shared::error::{Error, Result};

const UNIQUE_IDENTIFIER: &[u8; 4] = b"REMB";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiverEstimatedMaximumBitrate {
    pub sender_ssrc: u32,
    /// Estimated maximum bitrate in bits per second.
    pub bitrate_bps: u64,
    pub ssrcs: Vec<u32>,
}

impl ReceiverEstimatedMaximumBitrate {
    pub fn parse(body: &[u8]) -> Result<Self> {
        // sender ssrc, media ssrc (always 0), "REMB", num ssrcs + exp/mantissa
        if body.len() < 16 {
            return Err(Error::ErrBadRtcpLength);
        }
        if &body[8..12] != UNIQUE_IDENTIFIER {
            return Err(Error::ErrBadRtcpLength);
        }
        let sender_ssrc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let num_ssrcs = body[12] as usize;
        let exponent = body[13] >> 2;
        let mantissa =
            ((body[13] as u64 & 0b11) << 16) | ((body[14] as u64) << 8) | body[15] as u64;
        let bitrate_bps = mantissa << exponent;

        if body.len() < 16 + num_ssrcs * 4 {
            return Err(Error::ErrBadRtcpLength);
        }
        let ssrcs = body[16..16 + num_ssrcs * 4]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self {
            sender_ssrc,
            bitrate_bps,
            ssrcs,
        })
    }
}
