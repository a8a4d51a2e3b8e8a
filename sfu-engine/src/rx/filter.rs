//! Payload-type gate: only negotiated payload types go further.

use crate::event::TransceiverEvent;
use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::{Packet, PacketInfo};
use log::trace;
use std::collections::HashSet;

#[derive(Default)]
pub(crate) struct PayloadTypeFilter {
    known: HashSet<u8>,
    num_dropped_unknown_pt: u64,
}

impl PacketProcessor for PayloadTypeFilter {
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let pt = match packet.packet.rtp() {
            Some(rtp) => rtp.header.payload_type,
            None => {
                self.num_dropped_unknown_pt += 1;
                return;
            }
        };
        if self.known.contains(&pt) {
            out.push(packet);
        } else {
            self.num_dropped_unknown_pt += 1;
            trace!("dropping packet with unknown payload type {pt}");
        }
    }

    fn handle_event(&mut self, event: &TransceiverEvent) {
        match event {
            TransceiverEvent::RtpPayloadTypeAdded { payload_type, .. } => {
                self.known.insert(*payload_type);
            }
            TransceiverEvent::RtpPayloadTypesCleared => self.known.clear(),
            _ => {}
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("packets dropped (unknown PT)", self.num_dropped_unknown_pt);
    }
}
