//! RTCP Receiver Report, RFC 3550 section 6.4.2.

use crate::header::{Header, TYPE_RECEIVER_REPORT};
use crate::reception_report::{ReceptionReport, RECEPTION_REPORT_LEN};
use shared::error::{Error, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReceiverReport {
    /// SSRC of the party sending this report.
    pub ssrc: u32,
    pub reports: Vec<ReceptionReport>,
}

impl ReceiverReport {
    pub fn parse(header: &Header, body: &[u8]) -> Result<Self> {
        if body.len() < 4 {
            return Err(Error::ErrPacketTooShort(body.len()));
        }
        let ssrc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let mut reports = Vec::with_capacity(header.count as usize);
        let mut offset = 4;
        for _ in 0..header.count {
            if body.len() < offset + RECEPTION_REPORT_LEN {
                return Err(Error::ErrBadRtcpLength);
            }
            reports.push(ReceptionReport::parse(&body[offset..])?);
            offset += RECEPTION_REPORT_LEN;
        }
        Ok(Self { ssrc, reports })
    }

    pub fn marshal(&self) -> Vec<u8> {
        let body_len = 4 + self.reports.len() * RECEPTION_REPORT_LEN;
        let header = Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: TYPE_RECEIVER_REPORT,
            length: ((4 + body_len) / 4 - 1) as u16,
        };
        let mut out = Vec::with_capacity(4 + body_len);
        header.marshal_into(&mut out);
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        for report in &self.reports {
            report.marshal_into(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshal_parse_round_trip() {
        let rr = ReceiverReport {
            ssrc: 0xDEAD_BEEF,
            reports: vec![ReceptionReport {
                ssrc: 0xB,
                fraction_lost: 0,
                total_lost: 0,
                last_sequence_number: 109,
                jitter: 3,
                last_sender_report: 0,
                delay: 0,
            }],
        };
        let buf = rr.marshal();
        let header = Header::parse(&buf).unwrap();
        assert_eq!(header.packet_type, TYPE_RECEIVER_REPORT);
        assert_eq!(header.packet_len(), buf.len());
        let parsed = ReceiverReport::parse(&header, &buf[4..]).unwrap();
        assert_eq!(parsed, rr);
    }
}
