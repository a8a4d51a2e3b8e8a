//! Ingress parsers: protocol classification and zero-copy header parsing
//! for the SRTP and SRTCP arms.

use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::{Packet, PacketInfo};
use log::debug;
use shared::util::match_srtp_or_srtcp;

/// Root of the receive pipeline: admits only buffers whose first byte
/// sits in the RFC 7983 RTP/RTCP range.
#[derive(Default)]
pub(crate) struct SrtpProtocolParser {
    num_parse_failures: u64,
}

impl PacketProcessor for SrtpProtocolParser {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        match packet.packet {
            Packet::Raw(buf) if match_srtp_or_srtcp(&buf) => {
                packet.packet = Packet::SrtpProtocol(buf);
                out.push(packet);
            }
            other => {
                self.num_parse_failures += 1;
                debug!(
                    "dropping non-SRTP ingress packet ({}, {} bytes)",
                    other.kind(),
                    other.size()
                );
            }
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("parse failures", self.num_parse_failures);
    }
}

/// Parses the cleartext RTP header of an SRTP packet in place. The payload
/// stays protected until the decrypt node.
#[derive(Default)]
pub(crate) struct SrtpParser {
    num_parse_failures: u64,
}

impl PacketProcessor for SrtpParser {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let buf = match packet.packet {
            Packet::SrtpProtocol(buf) => buf,
            _ => {
                self.num_parse_failures += 1;
                return;
            }
        };
        match rtp::Packet::parse(buf) {
            Ok(parsed) => {
                packet.packet = Packet::Srtp(parsed);
                out.push(packet);
            }
            Err(e) => {
                self.num_parse_failures += 1;
                debug!("SRTP header parse failed: {e}");
            }
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("parse failures", self.num_parse_failures);
    }
}

/// Validates the leading RTCP header of an SRTCP packet.
#[derive(Default)]
pub(crate) struct SrtcpParser {
    num_parse_failures: u64,
}

impl PacketProcessor for SrtcpParser {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let buf = match packet.packet {
            Packet::SrtpProtocol(buf) => buf,
            _ => {
                self.num_parse_failures += 1;
                return;
            }
        };
        match rtcp::Header::parse(&buf) {
            Ok(_) => {
                packet.packet = Packet::Srtcp(buf);
                out.push(packet);
            }
            Err(e) => {
                self.num_parse_failures += 1;
                debug!("SRTCP header parse failed: {e}");
            }
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("parse failures", self.num_parse_failures);
    }
}
