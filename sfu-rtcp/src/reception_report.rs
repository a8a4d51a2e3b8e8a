//! The per-source reception report block shared by SR and RR.

use shared::error::{Error, Result};

pub const RECEPTION_REPORT_LEN: usize = 24;

/// One reception report block, RFC 3550 section 6.4.1.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReceptionReport {
    /// Source this report describes.
    pub ssrc: u32,
    /// Fraction of packets lost since the previous report, in 1/256 units.
    pub fraction_lost: u8,
    /// Cumulative packets lost, clamped to 24 bits.
    pub total_lost: u32,
    /// Extended highest sequence number received (cycles << 16 | seq).
    pub last_sequence_number: u32,
    /// Interarrival jitter in timestamp units.
    pub jitter: u32,
    /// Middle 32 bits of the last SR's NTP timestamp.
    pub last_sender_report: u32,
    /// Delay since that SR, in 1/65536 seconds.
    pub delay: u32,
}

impl ReceptionReport {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < RECEPTION_REPORT_LEN {
            return Err(Error::ErrPacketTooShort(buf.len()));
        }
        Ok(Self {
            ssrc: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            fraction_lost: buf[4],
            total_lost: u32::from_be_bytes([0, buf[5], buf[6], buf[7]]),
            last_sequence_number: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            jitter: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            last_sender_report: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
            delay: u32::from_be_bytes([buf[20], buf[21], buf[22], buf[23]]),
        })
    }

    pub fn marshal_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        out.push(self.fraction_lost);
        out.extend_from_slice(&self.total_lost.to_be_bytes()[1..]);
        out.extend_from_slice(&self.last_sequence_number.to_be_bytes());
        out.extend_from_slice(&self.jitter.to_be_bytes());
        out.extend_from_slice(&self.last_sender_report.to_be_bytes());
        out.extend_from_slice(&self.delay.to_be_bytes());
    }
}
