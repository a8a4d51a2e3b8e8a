//! Terminates padding-only packets, which exist purely to probe
//! bandwidth and carry no media.

use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::PacketInfo;

#[derive(Default)]
pub(crate) struct PaddingTermination {
    num_terminated: u64,
}

impl PacketProcessor for PaddingTermination {
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let padding_only = packet
            .packet
            .rtp()
            .map(|rtp| rtp.is_padding_only())
            .unwrap_or(false);
        if padding_only {
            self.num_terminated += 1;
        } else {
            out.push(packet);
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("padding packets terminated", self.num_terminated);
    }
}
