//! Egress protection nodes. Output is wire-ready raw bytes.

use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::{Packet, PacketInfo};
use crate::srtp::{TransformOutcome, TransformerSlot};

pub(crate) struct SrtpEncrypt {
    slot: TransformerSlot,
    num_transform_failures: u64,
    num_dropped_no_transformer: u64,
}

impl SrtpEncrypt {
    pub(crate) fn new(slot: TransformerSlot) -> Self {
        Self {
            slot,
            num_transform_failures: 0,
            num_dropped_no_transformer: 0,
        }
    }
}

impl PacketProcessor for SrtpEncrypt {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let plain = match packet.packet {
            Packet::Rtp(p) => p.into_bytes(),
            Packet::Audio(a) => a.rtp.into_bytes(),
            Packet::Video(v) => v.rtp.into_bytes(),
            _ => return,
        };
        match self.slot.forward(plain) {
            TransformOutcome::Transformed(protected) => {
                packet.packet = Packet::Raw(protected);
                out.push(packet);
            }
            TransformOutcome::Failed => self.num_transform_failures += 1,
            TransformOutcome::NotInstalled => self.num_dropped_no_transformer += 1,
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("transform failures", self.num_transform_failures);
        block.add_stat(
            "packets dropped (no transformer)",
            self.num_dropped_no_transformer,
        );
    }
}

pub(crate) struct SrtcpEncrypt {
    slot: TransformerSlot,
    num_transform_failures: u64,
    num_dropped_no_transformer: u64,
}

impl SrtcpEncrypt {
    pub(crate) fn new(slot: TransformerSlot) -> Self {
        Self {
            slot,
            num_transform_failures: 0,
            num_dropped_no_transformer: 0,
        }
    }
}

impl PacketProcessor for SrtcpEncrypt {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let plain = match packet.packet {
            Packet::RtcpCompound(buf) => buf,
            _ => return,
        };
        match self.slot.forward(plain) {
            TransformOutcome::Transformed(protected) => {
                packet.packet = Packet::Raw(protected);
                out.push(packet);
            }
            TransformOutcome::Failed => self.num_transform_failures += 1,
            TransformOutcome::NotInstalled => self.num_dropped_no_transformer += 1,
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("transform failures", self.num_transform_failures);
        block.add_stat(
            "packets dropped (no transformer)",
            self.num_dropped_no_transformer,
        );
    }
}
