//! Classifies decrypted RTP into audio or video using the negotiated
//! payload-type table.

use crate::event::{MediaType, TransceiverEvent};
use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::{AudioPacket, Packet, PacketInfo, VideoPacket};
use log::trace;
use std::collections::HashMap;

#[derive(Default)]
pub(crate) struct MediaTypeParser {
    media_types: HashMap<u8, MediaType>,
    num_dropped_unknown_pt: u64,
}

impl PacketProcessor for MediaTypeParser {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let rtp = match packet.packet {
            Packet::Rtp(p) => p,
            _ => {
                self.num_dropped_unknown_pt += 1;
                return;
            }
        };
        match self.media_types.get(&rtp.header.payload_type) {
            Some(MediaType::Audio) => {
                packet.packet = Packet::Audio(AudioPacket { rtp, level: None });
                out.push(packet);
            }
            Some(MediaType::Video) => {
                packet.packet = Packet::Video(VideoPacket {
                    rtp,
                    is_keyframe: false,
                    is_start_of_frame: false,
                    temporal_layer: None,
                    spatial_layer: None,
                });
                out.push(packet);
            }
            None => {
                self.num_dropped_unknown_pt += 1;
                trace!(
                    "dropping packet with unmapped payload type {}",
                    rtp.header.payload_type
                );
            }
        }
    }

    fn handle_event(&mut self, event: &TransceiverEvent) {
        match event {
            TransceiverEvent::RtpPayloadTypeAdded {
                payload_type,
                format,
            } => {
                self.media_types.insert(*payload_type, format.media_type);
            }
            TransceiverEvent::RtpPayloadTypesCleared => self.media_types.clear(),
            _ => {}
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("packets dropped (unmapped PT)", self.num_dropped_unknown_pt);
    }
}
