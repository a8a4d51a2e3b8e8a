//! Serializes outgoing RTCP elements and announces them on the notifier.

use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::{Packet, PacketInfo};
use crate::rtcp_bus::RtcpEventNotifier;
use bytes::BytesMut;
use log::debug;
use std::sync::Arc;

/// Turns a parsed RTCP element into wire bytes. Elements relayed off the
/// network keep their original bytes; generated elements are marshaled.
pub(crate) struct RtcpSerializer {
    notifier: Arc<RtcpEventNotifier>,
    num_marshal_failures: u64,
}

impl RtcpSerializer {
    pub(crate) fn new(notifier: Arc<RtcpEventNotifier>) -> Self {
        Self {
            notifier,
            num_marshal_failures: 0,
        }
    }
}

impl PacketProcessor for RtcpSerializer {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let element = match &packet.packet {
            Packet::Rtcp(element) => element,
            _ => return,
        };

        let bytes = match &element.raw {
            Some(raw) => raw.clone(),
            None => match element.packet.marshal() {
                Ok(bytes) => BytesMut::from(bytes.as_slice()),
                Err(e) => {
                    self.num_marshal_failures += 1;
                    debug!("cannot serialize outgoing {}: {e}", element.packet.name());
                    return;
                }
            },
        };

        self.notifier.publish_sent(&element.packet);
        packet.packet = Packet::RtcpCompound(bytes);
        out.push(packet);
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("marshal failures", self.num_marshal_failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::RtcpElement;
    use rtcp::receiver_report::ReceiverReport;

    #[test]
    fn test_generated_rr_is_marshaled() {
        let mut node = RtcpSerializer::new(Arc::new(RtcpEventNotifier::new()));
        let rr = ReceiverReport {
            ssrc: 7,
            reports: vec![],
        };
        let expected = rr.marshal();

        let mut out = Vec::new();
        node.process_packet(
            PacketInfo::new(Packet::Rtcp(RtcpElement::generated(
                rtcp::Packet::ReceiverReport(rr),
            ))),
            &mut out,
        );

        match &out[0].packet {
            Packet::RtcpCompound(bytes) => assert_eq!(&bytes[..], expected.as_slice()),
            _ => panic!("expected compound bytes"),
        }
    }

    #[test]
    fn test_relayed_element_keeps_wire_bytes() {
        let mut node = RtcpSerializer::new(Arc::new(RtcpEventNotifier::new()));
        let raw = BytesMut::from(&[0x80u8, 204, 0x00, 0x01, 1, 2, 3, 4][..]);
        let element = RtcpElement {
            packet: rtcp::Packet::parse(&raw).unwrap(),
            raw: Some(raw.clone()),
        };

        let mut out = Vec::new();
        node.process_packet(PacketInfo::new(Packet::Rtcp(element)), &mut out);

        match &out[0].packet {
            Packet::RtcpCompound(bytes) => assert_eq!(bytes, &raw),
            _ => panic!("expected compound bytes"),
        }
    }
}
