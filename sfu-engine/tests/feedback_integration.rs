//! Feedback-generation tests: receiver reports, NACKs and transport-CC
//! feedback flowing out of the transceiver's outgoing queue.

use bytes::BytesMut;
use crossbeam_channel::Receiver;
use sfu_engine::{
    MediaFormat, MediaType, PacketInfo, RtpExtensionKind, SrtpTransformers, Transceiver,
    TransceiverConfig,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn rtp_bytes(pt: u8, seq: u16, ssrc: u32, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0x80, pt & 0x7F]);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&ssrc.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn fast_feedback_transceiver() -> (Transceiver, Receiver<PacketInfo>) {
    let _ = env_logger::builder().is_test(true).try_init();

    let config = TransceiverConfig::default()
        .with_receiver_report_interval(Duration::from_millis(100))
        .with_nack_delay(Duration::from_millis(20))
        .with_tcc_feedback_interval(Duration::from_millis(20));
    let transceiver = Transceiver::new(config).unwrap();
    transceiver.install_srtp_transformers(SrtpTransformers::identity());
    transceiver.set_incoming_rtp_handler(Arc::new(|_| {}));
    let outgoing = transceiver.outgoing_queue();
    (transceiver, outgoing)
}

/// Drains the outgoing queue until `pick` accepts a parsed RTCP element
/// or the deadline passes.
fn wait_for_rtcp<T>(
    outgoing: &Receiver<PacketInfo>,
    deadline: Duration,
    mut pick: impl FnMut(&rtcp::Packet) -> Option<T>,
) -> Option<T> {
    let until = Instant::now() + deadline;
    while Instant::now() < until {
        let Ok(info) = outgoing.recv_timeout(Duration::from_millis(50)) else {
            continue;
        };
        if let sfu_engine::Packet::Raw(bytes) = &info.packet {
            if let Ok(parsed) = rtcp::Packet::parse(bytes) {
                if let Some(value) = pick(&parsed) {
                    return Some(value);
                }
            }
        }
    }
    None
}

#[test]
fn test_receiver_report_generation() {
    let (transceiver, outgoing) = fast_feedback_transceiver();
    transceiver
        .add_dynamic_rtp_payload_type(111, MediaFormat::new("opus", MediaType::Audio, 48_000));

    for seq in 0..10u16 {
        transceiver
            .handle_incoming_packet(rtp_bytes(111, 100 + seq, 0xB, b"pcm"))
            .unwrap();
    }

    let report = wait_for_rtcp(&outgoing, Duration::from_secs(2), |packet| match packet {
        rtcp::Packet::ReceiverReport(rr) if !rr.reports.is_empty() => Some(rr.reports[0]),
        _ => None,
    })
    .expect("receiver report emitted");

    assert_eq!(report.ssrc, 0xB);
    assert_eq!(report.total_lost, 0);
    assert_eq!(report.fraction_lost, 0);
    assert_eq!(report.last_sequence_number & 0xFFFF, 109);

    let snapshots = transceiver.stream_snapshots();
    assert_eq!(snapshots[0].packets_received, 10);
}

#[test]
fn test_nack_emission_for_gap() {
    let (transceiver, outgoing) = fast_feedback_transceiver();
    transceiver.add_dynamic_rtp_payload_type(96, MediaFormat::new("VP8", MediaType::Video, 90_000));

    for seq in [1u16, 2, 3, 5, 6, 7] {
        transceiver
            .handle_incoming_packet(rtp_bytes(96, seq, 0xC, b"vp8"))
            .unwrap();
    }

    let nacked = wait_for_rtcp(&outgoing, Duration::from_secs(2), |packet| match packet {
        rtcp::Packet::TransportLayerNack(nack) if nack.media_ssrc == 0xC => Some(
            nack.nacks
                .iter()
                .flat_map(|pair| pair.packet_list())
                .collect::<Vec<u16>>(),
        ),
        _ => None,
    })
    .expect("nack emitted");

    assert!(nacked.contains(&4), "nack should reference PID 4: {nacked:?}");
}

#[test]
fn test_transport_cc_feedback_emission() {
    let (transceiver, outgoing) = fast_feedback_transceiver();
    transceiver.add_dynamic_rtp_payload_type(96, MediaFormat::new("VP8", MediaType::Video, 90_000));
    transceiver.add_rtp_extension(5, RtpExtensionKind::TransportCc);

    // RTP with a transport-wide sequence-number extension
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0x90, 96, 0x00, 0x01]);
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(&0xCCu32.to_be_bytes());
    buf.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01]);
    buf.extend_from_slice(&[(5 << 4) | 0x01, 0x00, 0x2A, 0x00]); // twcc seq 42
    buf.extend_from_slice(b"vp8");
    transceiver.handle_incoming_packet(buf).unwrap();

    let base_seq = wait_for_rtcp(&outgoing, Duration::from_secs(2), |packet| match packet {
        rtcp::Packet::TransportLayerCc(fb) => Some(fb.base_sequence_number),
        _ => None,
    })
    .expect("tcc feedback emitted");

    assert_eq!(base_seq, 42);
}

#[test]
fn test_peer_feedback_reaches_estimator() {
    use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
    use sfu_engine::BandwidthEstimator;

    struct Probe {
        feedbacks: AtomicU64,
        remb_bps: AtomicU64,
    }
    impl BandwidthEstimator for Probe {
        fn on_transport_cc_feedback(&self, _: &TransportLayerCc) {
            self.feedbacks.fetch_add(1, Ordering::SeqCst);
        }
        fn on_remb(&self, bitrate_bps: u64) {
            self.remb_bps.store(bitrate_bps, Ordering::SeqCst);
        }
    }

    let (transceiver, _outgoing) = fast_feedback_transceiver();
    let probe = Arc::new(Probe {
        feedbacks: AtomicU64::new(0),
        remb_bps: AtomicU64::new(0),
    });
    transceiver.set_bandwidth_estimator(probe.clone());

    // Peer TCC feedback arrives as SRTCP (identity-protected)
    let feedback = TransportLayerCc {
        sender_ssrc: 1,
        media_ssrc: 2,
        ..Default::default()
    };
    transceiver
        .handle_incoming_packet(BytesMut::from(feedback.marshal().as_slice()))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while probe.feedbacks.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(probe.feedbacks.load(Ordering::SeqCst), 1);
}
