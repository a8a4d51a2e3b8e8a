//! Feeds the transport-CC engine with arrival times read from the
//! cleartext transport-wide sequence-number extension, before decryption.

use crate::event::{RtpExtensionKind, TransceiverEvent};
use crate::node::PacketProcessor;
use crate::packet::{Packet, PacketInfo};
use crate::tcc::TransportCcEngine;
use std::sync::Arc;

pub(crate) struct TccGenerator {
    engine: Arc<TransportCcEngine>,
    extension_id: Option<u8>,
}

impl TccGenerator {
    pub(crate) fn new(engine: Arc<TransportCcEngine>) -> Self {
        Self {
            engine,
            extension_id: None,
        }
    }
}

impl PacketProcessor for TccGenerator {
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        if let (Some(id), Packet::Srtp(rtp)) = (self.extension_id, &packet.packet) {
            let seq = rtp
                .extension(id)
                .and_then(rtp::extension::parse_transport_cc);
            if let Some(seq) = seq {
                self.engine
                    .record_arrival(seq, rtp.header.ssrc, packet.received);
            }
        }
        out.push(packet);
    }

    fn handle_event(&mut self, event: &TransceiverEvent) {
        match event {
            TransceiverEvent::RtpExtensionAdded {
                id,
                kind: RtpExtensionKind::TransportCc,
            } => self.extension_id = Some(*id),
            TransceiverEvent::RtpExtensionsCleared => self.extension_id = None,
            _ => {}
        }
    }
}
