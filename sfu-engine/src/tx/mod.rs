//! The outgoing pipeline, symmetric to the receive side: classify into
//! audio/video/RTCP, protect, and land in the bounded outgoing queue.
//! Locally generated RTCP (RR, NACK, TCC feedback) enters through the
//! same RTCP branch as relayed RTCP.

mod encrypt;
mod queue;
mod serialize;

use crate::node::{ConditionalPacketPath, Node};
use crate::packet::{Packet, PacketInfo};
use crate::pipeline::PipelineBuilder;
use crate::rtcp_bus::RtcpEventNotifier;
use crate::srtp::TransformerSlot;
use crossbeam_channel::Sender;
use shared::error::Result;
use std::sync::Arc;

pub(crate) struct SendPipelineParts {
    pub rtp_encrypt: TransformerSlot,
    pub rtcp_encrypt: TransformerSlot,
    pub notifier: Arc<RtcpEventNotifier>,
    pub outgoing: Sender<PacketInfo>,
}

pub(crate) fn build_send_pipeline(parts: SendPipelineParts) -> Result<Node> {
    // The media branches fan in on one encrypt node, and both encrypt
    // nodes fan in on the queue terminal; `inputs` back-edges let reverse
    // visitors see the whole tree from the terminal.
    let srtp_encrypt = Node::new(
        "srtp encrypt",
        encrypt::SrtpEncrypt::new(parts.rtp_encrypt),
    );
    let srtcp_encrypt = Node::new(
        "srtcp encrypt",
        encrypt::SrtcpEncrypt::new(parts.rtcp_encrypt),
    );
    let out_queue = Node::new("outgoing queue", queue::OutgoingQueue::new(parts.outgoing));
    srtp_encrypt.attach(&out_queue)?;
    srtcp_encrypt.attach(&out_queue)?;

    let audio_path = PipelineBuilder::new()
        .simple_node("audio egress", Some)?
        .node_ref(srtp_encrypt.clone())?
        .build()?;

    let video_path = PipelineBuilder::new()
        .simple_node("video egress", Some)?
        .node_ref(srtp_encrypt)?
        .build()?;

    let rtcp_path = PipelineBuilder::new()
        .node(
            "rtcp serializer",
            serialize::RtcpSerializer::new(parts.notifier),
        )?
        .node_ref(srtcp_encrypt)?
        .build()?;

    PipelineBuilder::new()
        .demux(
            "send classify",
            vec![
                ConditionalPacketPath::new(
                    "audio",
                    |p: &PacketInfo| matches!(p.packet, Packet::Audio(_)),
                    audio_path,
                ),
                ConditionalPacketPath::new(
                    "video",
                    |p: &PacketInfo| {
                        matches!(p.packet, Packet::Video(_) | Packet::Rtp(_))
                    },
                    video_path,
                ),
                ConditionalPacketPath::new(
                    "rtcp",
                    |p: &PacketInfo| matches!(p.packet, Packet::Rtcp(_)),
                    rtcp_path,
                ),
            ],
        )?
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{AudioPacket, RtcpElement};
    use crate::srtp::IdentityTransformer;
    use bytes::BytesMut;

    fn parts() -> (SendPipelineParts, crossbeam_channel::Receiver<PacketInfo>) {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let rtp_slot = TransformerSlot::new();
        let rtcp_slot = TransformerSlot::new();
        rtp_slot.install(Box::new(IdentityTransformer));
        rtcp_slot.install(Box::new(IdentityTransformer));
        (
            SendPipelineParts {
                rtp_encrypt: rtp_slot,
                rtcp_encrypt: rtcp_slot,
                notifier: Arc::new(RtcpEventNotifier::new()),
                outgoing: tx,
            },
            rx,
        )
    }

    fn audio_info() -> PacketInfo {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x80, 111, 0, 1]);
        buf.extend_from_slice(&[0; 8]);
        buf.extend_from_slice(b"opus");
        PacketInfo::new(Packet::Audio(AudioPacket {
            rtp: rtp::Packet::parse(buf).unwrap(),
            level: None,
        }))
    }

    #[test]
    fn test_audio_reaches_queue_as_wire_bytes() {
        let (parts, rx) = parts();
        let root = build_send_pipeline(parts).unwrap();

        root.process_packets(vec![audio_info()]);

        let sent = rx.try_recv().unwrap();
        match &sent.packet {
            Packet::Raw(bytes) => assert_eq!(&bytes[12..], b"opus"),
            other => panic!("expected raw wire bytes, got {}", other.kind()),
        }
    }

    #[test]
    fn test_rtcp_branch_serializes_then_encrypts() {
        let (parts, rx) = parts();
        let root = build_send_pipeline(parts).unwrap();

        let rr = rtcp::receiver_report::ReceiverReport {
            ssrc: 9,
            reports: vec![],
        };
        let expected = rr.marshal();
        root.process_packets(vec![PacketInfo::new(Packet::Rtcp(
            RtcpElement::generated(rtcp::Packet::ReceiverReport(rr)),
        ))]);

        let sent = rx.try_recv().unwrap();
        match &sent.packet {
            Packet::Raw(bytes) => assert_eq!(&bytes[..], expected.as_slice()),
            other => panic!("expected raw wire bytes, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unclassifiable_packet_dropped_by_demux() {
        let (parts, rx) = parts();
        let root = build_send_pipeline(parts).unwrap();

        root.process_packets(vec![PacketInfo::new(Packet::Raw(BytesMut::from(
            &b"junk"[..],
        )))]);
        assert!(rx.try_recv().is_err());
    }
}
