//! Restores retransmitted packets to their primary stream: an RTX packet
//! carries the original sequence number in its first two payload bytes
//! and travels on a secondary SSRC bound by an FID association.

use crate::event::{SsrcAssociationKind, TransceiverEvent};
use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::{Packet, PacketInfo};
use log::{debug, trace};
use std::collections::HashMap;

#[derive(Default)]
pub(crate) struct RtxHandler {
    /// secondary (RTX) SSRC -> primary SSRC
    rtx_to_primary: HashMap<u32, u32>,
    num_rewritten: u64,
    num_dropped_probes: u64,
}

impl PacketProcessor for RtxHandler {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let rtp = match packet.packet.rtp_mut() {
            Some(rtp) => rtp,
            None => {
                out.push(packet);
                return;
            }
        };
        let primary = match self.rtx_to_primary.get(&rtp.header.ssrc) {
            Some(&primary) => primary,
            None => {
                out.push(packet);
                return;
            }
        };

        match rtp.strip_rtx_osn() {
            Ok(osn) => {
                let rtx_ssrc = rtp.header.ssrc;
                rtp.set_ssrc(primary);
                rtp.set_sequence_number(osn);
                self.num_rewritten += 1;
                trace!("rtx {rtx_ssrc:#x} -> primary {primary:#x} seq {osn}");
                out.push(packet);
            }
            Err(_) => {
                // RTX packets too short for an OSN are probing filler
                self.num_dropped_probes += 1;
                debug!("dropping OSN-less rtx packet on {:#x}", rtp.header.ssrc);
            }
        }
    }

    fn handle_event(&mut self, event: &TransceiverEvent) {
        match event {
            TransceiverEvent::SsrcAssociationAdded(assoc)
                if assoc.kind == SsrcAssociationKind::Fid =>
            {
                self.rtx_to_primary.insert(assoc.secondary, assoc.primary);
            }
            TransceiverEvent::RtpEncodingsUpdated { encodings } => {
                for encoding in encodings {
                    if let Some(rtx_ssrc) = encoding.rtx_ssrc {
                        self.rtx_to_primary.insert(rtx_ssrc, encoding.ssrc);
                    }
                }
            }
            _ => {}
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("rtx packets rewritten", self.num_rewritten);
        block.add_stat("rtx probes dropped", self.num_dropped_probes);
    }
}
