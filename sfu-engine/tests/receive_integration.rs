//! End-to-end receive-pipeline tests: SRTP in, parsed media out.
//!
//! Identity transformers stand in for SRTP so the wire bytes are the
//! plaintext; every scenario drives a full transceiver through its public
//! surface and observes the installed handlers.

use bytes::BytesMut;
use crossbeam_channel::{unbounded, Receiver};
use sfu_engine::{
    MediaFormat, MediaType, Packet, PacketInfo, RtpExtensionKind, SrtpTransformers,
    SsrcAssociation, SsrcAssociationKind, Transceiver, TransceiverConfig,
};
use std::sync::Arc;
use std::time::Duration;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

fn rtp_bytes(pt: u8, seq: u16, ssrc: u32, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0x80, pt & 0x7F]);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&ssrc.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn rtp_bytes_with_audio_level(pt: u8, seq: u16, ssrc: u32, ext_id: u8, level: u8) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0x90, pt & 0x7F]); // X=1
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&ssrc.to_be_bytes());
    buf.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01]);
    buf.extend_from_slice(&[(ext_id << 4), 0x80 | level, 0x00, 0x00]);
    buf.extend_from_slice(b"opus");
    buf
}

/// A transceiver with identity SRTP and a capture channel on the RTP and
/// RTCP handlers.
fn transceiver_with_capture() -> (Transceiver, Receiver<PacketInfo>, Receiver<PacketInfo>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let transceiver = Transceiver::new(TransceiverConfig::default()).unwrap();
    transceiver.install_srtp_transformers(SrtpTransformers::identity());

    let (rtp_tx, rtp_rx) = unbounded();
    transceiver.set_incoming_rtp_handler(Arc::new(move |batch| {
        for packet in batch {
            let _ = rtp_tx.send(packet);
        }
    }));

    let (rtcp_tx, rtcp_rx) = unbounded();
    transceiver.set_incoming_rtcp_handler(Arc::new(move |batch| {
        for packet in batch {
            let _ = rtcp_tx.send(packet);
        }
    }));

    (transceiver, rtp_rx, rtcp_rx)
}

#[test]
fn test_audio_path_happy_case() {
    let (transceiver, rtp_rx, _) = transceiver_with_capture();
    transceiver
        .add_dynamic_rtp_payload_type(111, MediaFormat::new("opus", MediaType::Audio, 48_000));

    let wire = rtp_bytes(111, 100, 0xA, b"opus-frame");
    transceiver.handle_incoming_packet(wire.clone()).unwrap();

    let delivered = rtp_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    let audio = match &delivered.packet {
        Packet::Audio(audio) => audio,
        other => panic!("expected audio packet, got {}", other.kind()),
    };
    assert_eq!(audio.rtp.header.payload_type, 111);
    assert_eq!(audio.rtp.header.ssrc, 0xA);
    assert_eq!(audio.rtp.header.sequence_number, 100);
    // Identity transformers: bytes unchanged end to end
    assert_eq!(audio.rtp.bytes(), &wire[..]);

    // The stat tracker saw the stream
    let snapshots = transceiver.stream_snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].ssrc, 0xA);
    assert_eq!(snapshots[0].packets_received, 1);

    // The timeline walked the expected stages
    let labels: Vec<String> = delivered
        .timeline()
        .iter()
        .map(|(label, _)| label.to_string())
        .collect();
    for stage in [
        "entered srtp parser",
        "entered payload type filter",
        "entered srtp decrypt",
        "entered media type parser",
        "entered audio level reader",
    ] {
        assert!(
            labels.iter().any(|l| l == stage),
            "timeline missing {stage:?}: {labels:?}"
        );
    }
}

#[test]
fn test_unknown_payload_type_dropped() {
    let (transceiver, rtp_rx, _) = transceiver_with_capture();
    transceiver
        .add_dynamic_rtp_payload_type(111, MediaFormat::new("opus", MediaType::Audio, 48_000));

    transceiver
        .handle_incoming_packet(rtp_bytes(77, 1, 0xA, b"x"))
        .unwrap();

    assert!(rtp_rx.recv_timeout(Duration::from_millis(300)).is_err());

    let stats = transceiver.stats();
    assert_eq!(
        find_stat(&stats.receive_pipeline, "packets dropped (unknown PT)"),
        Some("1".to_string())
    );
}

#[test]
fn test_rtcp_routed_to_rtcp_path() {
    let (transceiver, _, rtcp_rx) = transceiver_with_capture();

    // A BYE is not terminated locally, so it proves arrival at the RTCP
    // handler wrapper
    let mut compound = BytesMut::new();
    compound.extend_from_slice(&[0x81, 203, 0x00, 0x01]); // BYE, one source
    compound.extend_from_slice(&0xAAu32.to_be_bytes());
    transceiver.handle_incoming_packet(compound).unwrap();

    let delivered = rtcp_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    match &delivered.packet {
        Packet::Rtcp(element) => match &element.packet {
            rtcp::Packet::Goodbye(bye) => assert_eq!(bye.sources, vec![0xAA]),
            other => panic!("expected BYE, got {}", other.name()),
        },
        other => panic!("expected rtcp element, got {}", other.kind()),
    }
}

#[test]
fn test_compound_rtcp_splits_into_siblings() {
    let (transceiver, _, rtcp_rx) = transceiver_with_capture();

    // BYE + APP: both forwarded kinds, so both reach the handler
    let mut compound = BytesMut::new();
    compound.extend_from_slice(&[0x81, 203, 0x00, 0x01]);
    compound.extend_from_slice(&0xAAu32.to_be_bytes());
    compound.extend_from_slice(&[0x80, 204, 0x00, 0x02]);
    compound.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
    transceiver.handle_incoming_packet(compound).unwrap();

    let first = rtcp_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    let second = rtcp_rx.recv_timeout(RECV_TIMEOUT).unwrap();

    // Both siblings carry the source receive time
    assert_eq!(first.received, second.received);
    assert!(matches!(
        &first.packet,
        Packet::Rtcp(element) if element.packet.name() == "BYE"
    ));
    assert!(matches!(
        &second.packet,
        Packet::Rtcp(element) if element.packet.name() == "UNKNOWN"
    ));
}

#[test]
fn test_rtx_rewrite_restores_primary_stream() {
    let (transceiver, rtp_rx, _) = transceiver_with_capture();
    transceiver.add_dynamic_rtp_payload_type(96, MediaFormat::new("VP8", MediaType::Video, 90_000));
    transceiver.add_dynamic_rtp_payload_type(97, MediaFormat::new("rtx", MediaType::Video, 90_000));
    transceiver.add_ssrc_association(SsrcAssociation {
        primary: 0xAAAA,
        secondary: 0xBBBB,
        kind: SsrcAssociationKind::Fid,
    });

    let mut payload = 12345u16.to_be_bytes().to_vec();
    payload.extend_from_slice(b"frame");
    transceiver
        .handle_incoming_packet(rtp_bytes(97, 700, 0xBBBB, &payload))
        .unwrap();

    let delivered = rtp_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    let rtp = delivered.packet.rtp().expect("rtp view");
    assert_eq!(rtp.header.ssrc, 0xAAAA);
    assert_eq!(rtp.header.sequence_number, 12345);
    assert_eq!(rtp.payload(), b"frame");
}

#[test]
fn test_audio_level_listener_receives_levels() {
    let (transceiver, rtp_rx, _) = transceiver_with_capture();
    transceiver
        .add_dynamic_rtp_payload_type(111, MediaFormat::new("opus", MediaType::Audio, 48_000));
    transceiver.add_rtp_extension(1, RtpExtensionKind::AudioLevel);

    let (level_tx, level_rx) = unbounded();
    transceiver.set_audio_level_listener(Arc::new(move |ssrc, level| {
        let _ = level_tx.send((ssrc, level));
    }));

    transceiver
        .handle_incoming_packet(rtp_bytes_with_audio_level(111, 5, 0xA, 1, 42))
        .unwrap();

    let (ssrc, level) = level_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(ssrc, 0xA);
    assert_eq!(level.level, 42);
    assert!(level.voice_activity);

    let delivered = rtp_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    match &delivered.packet {
        Packet::Audio(audio) => assert_eq!(audio.level.map(|l| l.level), Some(42)),
        other => panic!("expected audio, got {}", other.kind()),
    }
}

#[test]
fn test_demux_totality_accounting() {
    let (transceiver, rtp_rx, _) = transceiver_with_capture();
    transceiver
        .add_dynamic_rtp_payload_type(111, MediaFormat::new("opus", MediaType::Audio, 48_000));

    // Two routable packets and one RTP packet that reaches the media-type
    // demux but matches nothing is impossible by construction; instead
    // check the SRTP/SRTCP demux conserves counts.
    transceiver
        .handle_incoming_packet(rtp_bytes(111, 1, 0xA, b"a"))
        .unwrap();
    transceiver
        .handle_incoming_packet(rtp_bytes(111, 2, 0xA, b"b"))
        .unwrap();
    rtp_rx.recv_timeout(RECV_TIMEOUT).unwrap();
    rtp_rx.recv_timeout(RECV_TIMEOUT).unwrap();

    let stats = transceiver.stats();
    let demux = find_block(&stats.receive_pipeline, "srtp/srtcp").expect("demux block");
    let branch_inputs: u64 = demux
        .children
        .iter()
        .map(|child| child.stats.num_input_packets)
        .sum();
    let dropped: u64 = find_stat(&stats.receive_pipeline, "packets dropped (no path)")
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(branch_inputs + dropped, demux.stats.num_input_packets);
}

fn find_block<'a>(
    block: &'a sfu_engine::NodeStatsBlock,
    name: &str,
) -> Option<&'a sfu_engine::NodeStatsBlock> {
    if block.name.contains(name) {
        return Some(block);
    }
    block
        .children
        .iter()
        .find_map(|child| find_block(child, name))
}

fn find_stat(block: &sfu_engine::NodeStatsBlock, key: &str) -> Option<String> {
    for (k, v) in &block.extras {
        if k == key {
            return Some(v.clone());
        }
    }
    block.children.iter().find_map(|child| find_stat(child, key))
}
