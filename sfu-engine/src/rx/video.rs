//! Attaches codec metadata to video packets using externally supplied
//! payload parsers (the VP8 depacketizer lives outside the engine).

use crate::event::TransceiverEvent;
use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::{Packet, PacketInfo};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Codec-specific payload inspection, implemented outside the engine
/// (e.g. by a VP8 depacketizer).
pub trait VideoPayloadParser: Send + Sync {
    fn is_keyframe(&self, payload: &[u8]) -> bool;
    fn is_start_of_frame(&self, payload: &[u8]) -> bool;
    fn payload_descriptor_size(&self, payload: &[u8]) -> usize;
    fn temporal_layer(&self, _payload: &[u8]) -> Option<u8> {
        None
    }
    fn spatial_layer(&self, _payload: &[u8]) -> Option<u8> {
        None
    }
}

pub(crate) struct VideoParser {
    /// Lower-cased encoding name -> parser.
    parsers: HashMap<String, Arc<dyn VideoPayloadParser>>,
    /// payload type -> lower-cased encoding name, from events.
    encodings: HashMap<u8, String>,
    num_parse_failures: u64,
}

impl VideoParser {
    pub(crate) fn new(parsers: HashMap<String, Arc<dyn VideoPayloadParser>>) -> Self {
        Self {
            parsers: parsers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            encodings: HashMap::new(),
            num_parse_failures: 0,
        }
    }
}

impl PacketProcessor for VideoParser {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        if let Packet::Video(video) = &mut packet.packet {
            let parser = self
                .encodings
                .get(&video.rtp.header.payload_type)
                .and_then(|encoding| self.parsers.get(encoding))
                .cloned();
            if let Some(parser) = parser {
                let payload = match video.rtp.payload_without_padding() {
                    Ok(payload) => payload,
                    Err(e) => {
                        self.num_parse_failures += 1;
                        debug!("video payload unreadable: {e}");
                        return;
                    }
                };
                video.is_keyframe = parser.is_keyframe(payload);
                video.is_start_of_frame = parser.is_start_of_frame(payload);
                video.temporal_layer = parser.temporal_layer(payload);
                video.spatial_layer = parser.spatial_layer(payload);
            }
        }
        out.push(packet);
    }

    fn handle_event(&mut self, event: &TransceiverEvent) {
        match event {
            TransceiverEvent::RtpPayloadTypeAdded {
                payload_type,
                format,
            } => {
                self.encodings
                    .insert(*payload_type, format.encoding.to_ascii_lowercase());
            }
            TransceiverEvent::RtpPayloadTypesCleared => self.encodings.clear(),
            _ => {}
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("parse failures", self.num_parse_failures);
    }
}
