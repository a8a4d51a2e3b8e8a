//! RTCP Sender Report, RFC 3550 section 6.4.1.

use crate::header::Header;
use crate::reception_report::{ReceptionReport, RECEPTION_REPORT_LEN};
use shared::error::{Error, Result};

const SENDER_INFO_LEN: usize = 24;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    /// 64-bit NTP timestamp of this report.
    pub ntp_time: u64,
    /// RTP timestamp corresponding to the NTP timestamp.
    pub rtp_time: u32,
    pub packet_count: u32,
    pub octet_count: u32,
    pub reports: Vec<ReceptionReport>,
}

impl SenderReport {
    /// Parses the body of an SR element (everything past the common header).
    pub fn parse(header: &Header, body: &[u8]) -> Result<Self> {
        if body.len() < SENDER_INFO_LEN {
            return Err(Error::ErrPacketTooShort(body.len()));
        }
        let ssrc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let ntp_time = u64::from_be_bytes([
            body[4], body[5], body[6], body[7], body[8], body[9], body[10], body[11],
        ]);
        let rtp_time = u32::from_be_bytes([body[12], body[13], body[14], body[15]]);
        let packet_count = u32::from_be_bytes([body[16], body[17], body[18], body[19]]);
        let octet_count = u32::from_be_bytes([body[20], body[21], body[22], body[23]]);

        let mut reports = Vec::with_capacity(header.count as usize);
        let mut offset = SENDER_INFO_LEN;
        for _ in 0..header.count {
            if body.len() < offset + RECEPTION_REPORT_LEN {
                return Err(Error::ErrBadRtcpLength);
            }
            reports.push(ReceptionReport::parse(&body[offset..])?);
            offset += RECEPTION_REPORT_LEN;
        }

        Ok(Self {
            ssrc,
            ntp_time,
            rtp_time,
            packet_count,
            octet_count,
            reports,
        })
    }
}
