//! The RTCP arm past decryption: snapshot ring, compound splitting and
//! local termination.

use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::{Packet, PacketInfo, RtcpElement};
use crate::rtcp_bus::RtcpEventNotifier;
use bytes::BytesMut;
use log::{debug, error};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Ring of recently decrypted compound buffers, dumped when compound
/// iteration fails so the wire bytes that caused it are recoverable.
#[derive(Clone)]
pub(crate) struct DiagnosticRing {
    buffers: Arc<Mutex<VecDeque<BytesMut>>>,
    capacity: usize,
}

impl DiagnosticRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buffers: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn push(&self, buf: BytesMut) {
        let mut buffers = self.buffers.lock().unwrap();
        if buffers.len() == self.capacity {
            buffers.pop_front();
        }
        buffers.push_back(buf);
    }

    fn dump(&self) -> String {
        let buffers = self.buffers.lock().unwrap();
        buffers
            .iter()
            .map(|buf| {
                buf.iter()
                    .take(32)
                    .map(|b| format!("{b:02x}"))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Clones each decrypted compound buffer into the ring and onto the
/// packet itself before parsing ever runs.
pub(crate) struct PreParseSnapshot {
    ring: DiagnosticRing,
}

impl PreParseSnapshot {
    pub(crate) fn new(ring: DiagnosticRing) -> Self {
        Self { ring }
    }
}

impl PacketProcessor for PreParseSnapshot {
    fn process_packet(&mut self, mut packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        if let Packet::RtcpCompound(buf) = &packet.packet {
            let clone = buf.clone();
            packet.pre_parse_snapshot = Some(clone.clone());
            self.ring.push(clone);
        }
        out.push(packet);
    }
}

/// Splits a compound buffer into one `PacketInfo` per RTCP element. Each
/// sibling inherits the receive time and the timeline up to the split;
/// a failed iteration emits nothing and dumps the snapshot ring.
pub(crate) struct RtcpParser {
    ring: DiagnosticRing,
    num_compound_failures: u64,
}

impl RtcpParser {
    pub(crate) fn new(ring: DiagnosticRing) -> Self {
        Self {
            ring,
            num_compound_failures: 0,
        }
    }
}

impl PacketProcessor for RtcpParser {
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let buf = match &packet.packet {
            Packet::RtcpCompound(buf) => buf,
            _ => return,
        };

        let mut siblings = Vec::new();
        for element in rtcp::compound::CompoundIter::new(buf) {
            let (_, element_bytes) = match element {
                Ok(parts) => parts,
                Err(e) => {
                    self.num_compound_failures += 1;
                    error!(
                        "compound RTCP iteration failed: {e}; recent buffers:\n{}",
                        self.ring.dump()
                    );
                    return;
                }
            };
            match rtcp::Packet::parse(element_bytes) {
                Ok(parsed) => {
                    siblings.push(packet.split_sibling(Packet::Rtcp(RtcpElement {
                        packet: parsed,
                        raw: Some(BytesMut::from(element_bytes)),
                    })));
                }
                Err(e) => {
                    self.num_compound_failures += 1;
                    error!(
                        "RTCP element parse failed: {e}; recent buffers:\n{}",
                        self.ring.dump()
                    );
                    return;
                }
            }
        }

        out.extend(siblings);
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("compound failures", self.num_compound_failures);
    }
}

/// Consumes locally relevant RTCP (reports and feedback), publishing each
/// on the notifier; everything else flows on to the host handler.
pub(crate) struct RtcpTermination {
    notifier: Arc<RtcpEventNotifier>,
    num_terminated: u64,
    num_forwarded: u64,
}

impl RtcpTermination {
    pub(crate) fn new(notifier: Arc<RtcpEventNotifier>) -> Self {
        Self {
            notifier,
            num_terminated: 0,
            num_forwarded: 0,
        }
    }
}

impl PacketProcessor for RtcpTermination {
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        let element = match &packet.packet {
            Packet::Rtcp(element) => element,
            _ => return,
        };

        use rtcp::Packet::*;
        match &element.packet {
            SenderReport(_) | ReceiverReport(_) | TransportLayerNack(_) | TransportLayerCc(_)
            | ReceiverEstimatedMaximumBitrate(_) | PictureLossIndication(_)
            | FullIntraRequest(_) => {
                self.notifier
                    .publish_received(&element.packet, packet.received);
                self.num_terminated += 1;
                debug!("terminated {} from peer", element.packet.name());
            }
            SourceDescription(_) | Goodbye(_) | Unknown { .. } => {
                self.num_forwarded += 1;
                out.push(packet);
            }
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("elements terminated", self.num_terminated);
        block.add_stat("elements forwarded", self.num_forwarded);
    }
}
