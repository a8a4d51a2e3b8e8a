//! Decrypt nodes wrapping externally supplied SRTP/SRTCP transformers.

use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::{Packet, PacketInfo};
use crate::srtp::{TransformOutcome, TransformerSlot};
use log::debug;

/// Authenticates and decrypts SRTP, reparsing the plaintext RTP in place.
/// Packets arriving before keys are installed are an expected transient
/// during the DTLS handshake; they are dropped under a dedicated counter.
pub(crate) struct SrtpDecrypt {
    slot: TransformerSlot,
    num_auth_failures: u64,
    num_dropped_no_transformer: u64,
    num_parse_failures: u64,
}

impl SrtpDecrypt {
    pub(crate) fn new(slot: TransformerSlot) -> Self {
        Self {
            slot,
            num_auth_failures: 0,
            num_dropped_no_transformer: 0,
            num_parse_failures: 0,
        }
    }
}

impl PacketProcessor for SrtpDecrypt {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let protected = match packet.packet {
            Packet::Srtp(p) => p.into_bytes(),
            _ => {
                self.num_parse_failures += 1;
                return;
            }
        };
        match self.slot.reverse(protected) {
            TransformOutcome::Transformed(plain) => match rtp::Packet::parse(plain) {
                Ok(parsed) => {
                    packet.packet = Packet::Rtp(parsed);
                    out.push(packet);
                }
                Err(e) => {
                    self.num_parse_failures += 1;
                    debug!("decrypted RTP failed to reparse: {e}");
                }
            },
            TransformOutcome::Failed => self.num_auth_failures += 1,
            TransformOutcome::NotInstalled => self.num_dropped_no_transformer += 1,
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("auth failures", self.num_auth_failures);
        block.add_stat(
            "packets dropped (no transformer)",
            self.num_dropped_no_transformer,
        );
        block.add_stat("parse failures", self.num_parse_failures);
    }
}

/// Authenticates and decrypts SRTCP into a plaintext compound buffer.
pub(crate) struct SrtcpDecrypt {
    slot: TransformerSlot,
    num_auth_failures: u64,
    num_dropped_no_transformer: u64,
}

impl SrtcpDecrypt {
    pub(crate) fn new(slot: TransformerSlot) -> Self {
        Self {
            slot,
            num_auth_failures: 0,
            num_dropped_no_transformer: 0,
        }
    }
}

impl PacketProcessor for SrtcpDecrypt {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let protected = match packet.packet {
            Packet::Srtcp(buf) => buf,
            _ => return,
        };
        match self.slot.reverse(protected) {
            TransformOutcome::Transformed(plain) => {
                packet.packet = Packet::RtcpCompound(plain);
                out.push(packet);
            }
            TransformOutcome::Failed => self.num_auth_failures += 1,
            TransformOutcome::NotInstalled => self.num_dropped_no_transformer += 1,
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("auth failures", self.num_auth_failures);
        block.add_stat(
            "packets dropped (no transformer)",
            self.num_dropped_no_transformer,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srtp::IdentityTransformer;
    use bytes::BytesMut;

    fn srtp_info() -> PacketInfo {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x80, 96, 0, 1]);
        buf.extend_from_slice(&[0; 8]);
        buf.extend_from_slice(b"payload");
        PacketInfo::new(Packet::Srtp(rtp::Packet::parse(buf).unwrap()))
    }

    #[test]
    fn test_drop_before_keys_installed() {
        let slot = TransformerSlot::new();
        let mut node = SrtpDecrypt::new(slot.clone());
        let mut out = Vec::new();

        node.process_packet(srtp_info(), &mut out);
        assert!(out.is_empty());
        assert_eq!(node.num_dropped_no_transformer, 1);
        assert_eq!(node.num_auth_failures, 0);

        slot.install(Box::new(IdentityTransformer));
        node.process_packet(srtp_info(), &mut out);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].packet, Packet::Rtp(_)));
    }
}
