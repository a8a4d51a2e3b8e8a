//! Transport-wide congestion control: records arrival times of packets
//! carrying the transport-CC sequence extension, periodically builds
//! feedback packets, and forwards peer feedback to an abstract bandwidth
//! estimator. Estimation itself lives outside the engine.

use crate::rtcp_bus::{RtcpListener, RtcpSender};
use rtcp::transport_feedbacks::transport_layer_cc::{
    PacketStatusChunk, PacketStatusSymbol, RecvDelta, TransportLayerCc, DELTA_SCALE_MICROS,
    MAX_RUN_LENGTH, MAX_TWO_BIT_SYMBOLS, REFERENCE_TIME_MICROS,
};
use shared::util::SeqNumUnwrapper;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Sink for congestion-control signals. Implemented by the hosting SFU's
/// bandwidth estimator.
pub trait BandwidthEstimator: Send + Sync {
    fn on_transport_cc_feedback(&self, feedback: &TransportLayerCc);
    fn on_remb(&self, bitrate_bps: u64);
}

#[derive(Default)]
struct TccInner {
    unwrapper: SeqNumUnwrapper,
    /// Unwrapped transport-wide sequence number -> arrival in microseconds
    /// since the engine epoch.
    arrivals: BTreeMap<i64, i64>,
    media_ssrc: Option<u32>,
    fb_pkt_count: u8,
}

pub struct TransportCcEngine {
    epoch: Instant,
    sender_ssrc: u32,
    inner: Mutex<TccInner>,
    estimator: Mutex<Option<Arc<dyn BandwidthEstimator>>>,
    rtcp_sender: RtcpSender,
    num_feedback_sent: AtomicU64,
}

impl TransportCcEngine {
    pub(crate) fn new(rtcp_sender: RtcpSender) -> Self {
        Self {
            epoch: Instant::now(),
            sender_ssrc: rand::random::<u32>(),
            inner: Mutex::new(TccInner::default()),
            estimator: Mutex::new(None),
            rtcp_sender,
            num_feedback_sent: AtomicU64::new(0),
        }
    }

    pub fn set_estimator(&self, estimator: Arc<dyn BandwidthEstimator>) {
        *self.estimator.lock().unwrap() = Some(estimator);
    }

    pub(crate) fn record_arrival(&self, tcc_seq: u16, media_ssrc: u32, arrival: Instant) {
        let micros = arrival.saturating_duration_since(self.epoch).as_micros() as i64;
        let mut inner = self.inner.lock().unwrap();
        let unwrapped = inner.unwrapper.unwrap(tcc_seq);
        inner.media_ssrc = Some(media_ssrc);
        // Only the first arrival of a sequence number counts
        inner.arrivals.entry(unwrapped).or_insert(micros);
    }

    pub(crate) fn num_feedback_sent(&self) -> u64 {
        self.num_feedback_sent.load(Ordering::Relaxed)
    }

    /// Drains recorded arrivals into one feedback packet and emits it.
    pub(crate) fn tick(&self) {
        if let Some(feedback) = self.build_feedback() {
            self.num_feedback_sent.fetch_add(1, Ordering::Relaxed);
            (self.rtcp_sender)(rtcp::Packet::TransportLayerCc(feedback));
        }
    }

    fn build_feedback(&self) -> Option<TransportLayerCc> {
        let mut inner = self.inner.lock().unwrap();
        let media_ssrc = inner.media_ssrc?;
        if inner.arrivals.is_empty() {
            return None;
        }

        let (&base_seq, &first_arrival) = inner.arrivals.iter().next().unwrap();
        let (&last_seq, _) = inner.arrivals.iter().next_back().unwrap();
        let status_count = ((last_seq - base_seq + 1).min(0xFFFF)) as u16;

        let reference_time = ((first_arrival / REFERENCE_TIME_MICROS) & 0xFF_FFFF) as u32;
        let mut prev_time = reference_time as i64 * REFERENCE_TIME_MICROS;

        let mut symbols = Vec::with_capacity(status_count as usize);
        let mut recv_deltas = Vec::new();
        for seq in base_seq..base_seq + status_count as i64 {
            match inner.arrivals.get(&seq) {
                Some(&arrival) => {
                    let delta_units = (arrival - prev_time) / DELTA_SCALE_MICROS;
                    let symbol = if (0..=255).contains(&delta_units) {
                        PacketStatusSymbol::ReceivedSmallDelta
                    } else {
                        PacketStatusSymbol::ReceivedLargeDelta
                    };
                    symbols.push(symbol);
                    recv_deltas.push(RecvDelta {
                        symbol,
                        delta_micros: delta_units * DELTA_SCALE_MICROS,
                    });
                    // Carry the quantized time so rounding does not drift
                    prev_time += delta_units * DELTA_SCALE_MICROS;
                }
                None => symbols.push(PacketStatusSymbol::NotReceived),
            }
        }

        let packet_chunks = chunk_symbols(&symbols);
        let feedback = TransportLayerCc {
            sender_ssrc: self.sender_ssrc,
            media_ssrc,
            base_sequence_number: (base_seq & 0xFFFF) as u16,
            packet_status_count: status_count,
            reference_time,
            fb_pkt_count: inner.fb_pkt_count,
            packet_chunks,
            recv_deltas,
        };

        inner.fb_pkt_count = inner.fb_pkt_count.wrapping_add(1);
        inner.arrivals.clear();

        Some(feedback)
    }
}

/// Greedy chunking: runs of one symbol become run-length chunks, mixed
/// stretches become two-bit status vectors.
fn chunk_symbols(symbols: &[PacketStatusSymbol]) -> Vec<PacketStatusChunk> {
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < symbols.len() {
        let mut run = 1;
        while i + run < symbols.len()
            && symbols[i + run] == symbols[i]
            && run < MAX_RUN_LENGTH
        {
            run += 1;
        }
        if run >= MAX_TWO_BIT_SYMBOLS || i + run == symbols.len() {
            chunks.push(PacketStatusChunk::RunLength {
                symbol: symbols[i],
                run_length: run as u16,
            });
            i += run;
        } else {
            let take = MAX_TWO_BIT_SYMBOLS.min(symbols.len() - i);
            chunks.push(PacketStatusChunk::StatusVector {
                symbols: symbols[i..i + take].to_vec(),
            });
            i += take;
        }
    }
    chunks
}

impl RtcpListener for TransportCcEngine {
    fn on_rtcp_received(&self, packet: &rtcp::Packet, _received: Instant) {
        let estimator = self.estimator.lock().unwrap().clone();
        let Some(estimator) = estimator else {
            return;
        };
        match packet {
            rtcp::Packet::TransportLayerCc(feedback) => {
                estimator.on_transport_cc_feedback(feedback);
            }
            rtcp::Packet::ReceiverEstimatedMaximumBitrate(remb) => {
                estimator.on_remb(remb.bitrate_bps);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn engine_with_capture() -> (TransportCcEngine, Arc<Mutex<Vec<rtcp::Packet>>>) {
        let sent: Arc<Mutex<Vec<rtcp::Packet>>> = Arc::new(Mutex::new(Vec::new()));
        let sender: RtcpSender = {
            let sent = sent.clone();
            Arc::new(move |p| sent.lock().unwrap().push(p))
        };
        (TransportCcEngine::new(sender), sent)
    }

    #[test]
    fn test_no_feedback_without_arrivals() {
        let (engine, sent) = engine_with_capture();
        engine.tick();
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_feedback_covers_gap() {
        let (engine, sent) = engine_with_capture();
        let base = engine.epoch + Duration::from_millis(100);

        engine.record_arrival(10, 0xAB, base);
        engine.record_arrival(11, 0xAB, base + Duration::from_millis(5));
        // 12 missing
        engine.record_arrival(13, 0xAB, base + Duration::from_millis(11));

        engine.tick();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            rtcp::Packet::TransportLayerCc(fb) => {
                assert_eq!(fb.base_sequence_number, 10);
                assert_eq!(fb.media_ssrc, 0xAB);
                assert_eq!(fb.packet_status_count, 4);
                let symbols = fb.symbol_list();
                assert!(symbols[0].received());
                assert!(symbols[1].received());
                assert!(!symbols[2].received());
                assert!(symbols[3].received());
                assert_eq!(fb.recv_deltas.len(), 3);
            }
            other => panic!("expected TCC feedback, got {}", other.name()),
        }
    }

    #[test]
    fn test_feedback_drains_and_counts() {
        let (engine, sent) = engine_with_capture();
        engine.record_arrival(1, 0xAB, engine.epoch + Duration::from_millis(70));
        engine.tick();
        engine.tick(); // nothing left

        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(engine.num_feedback_sent(), 1);

        engine.record_arrival(2, 0xAB, engine.epoch + Duration::from_millis(90));
        engine.tick();
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        match &sent[1] {
            rtcp::Packet::TransportLayerCc(fb) => assert_eq!(fb.fb_pkt_count, 1),
            other => panic!("expected TCC feedback, got {}", other.name()),
        }
    }

    #[test]
    fn test_duplicate_arrival_ignored() {
        let (engine, sent) = engine_with_capture();
        let base = engine.epoch + Duration::from_millis(100);
        engine.record_arrival(5, 0xAB, base);
        engine.record_arrival(5, 0xAB, base + Duration::from_millis(50));
        engine.tick();

        let sent = sent.lock().unwrap();
        match &sent[0] {
            rtcp::Packet::TransportLayerCc(fb) => {
                assert_eq!(fb.packet_status_count, 1);
                assert_eq!(fb.recv_deltas.len(), 1);
            }
            other => panic!("expected TCC feedback, got {}", other.name()),
        }
    }

    #[test]
    fn test_estimator_receives_peer_feedback() {
        use std::sync::atomic::AtomicU64;

        struct Probe {
            feedbacks: AtomicU64,
            last_remb: AtomicU64,
        }
        impl BandwidthEstimator for Probe {
            fn on_transport_cc_feedback(&self, _: &TransportLayerCc) {
                self.feedbacks.fetch_add(1, Ordering::SeqCst);
            }
            fn on_remb(&self, bitrate_bps: u64) {
                self.last_remb.store(bitrate_bps, Ordering::SeqCst);
            }
        }

        let (engine, _) = engine_with_capture();
        let probe = Arc::new(Probe {
            feedbacks: AtomicU64::new(0),
            last_remb: AtomicU64::new(0),
        });
        engine.set_estimator(probe.clone());

        engine.on_rtcp_received(
            &rtcp::Packet::TransportLayerCc(TransportLayerCc::default()),
            Instant::now(),
        );
        let remb = rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate {
            sender_ssrc: 1,
            bitrate_bps: 1_500_000,
            ssrcs: vec![],
        };
        engine.on_rtcp_received(
            &rtcp::Packet::ReceiverEstimatedMaximumBitrate(remb),
            Instant::now(),
        );

        assert_eq!(probe.feedbacks.load(Ordering::SeqCst), 1);
        assert_eq!(probe.last_remb.load(Ordering::SeqCst), 1_500_000);
    }

    #[test]
    fn test_chunking_prefers_runs() {
        let symbols = vec![PacketStatusSymbol::ReceivedSmallDelta; 20];
        let chunks = chunk_symbols(&symbols);
        assert_eq!(chunks.len(), 1);
        assert!(matches!(
            chunks[0],
            PacketStatusChunk::RunLength { run_length: 20, .. }
        ));

        let mixed = vec![
            PacketStatusSymbol::ReceivedSmallDelta,
            PacketStatusSymbol::NotReceived,
            PacketStatusSymbol::ReceivedSmallDelta,
        ];
        let chunks = chunk_symbols(&mixed);
        // Short mixed stretch: single status vector
        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], PacketStatusChunk::StatusVector { symbols } if symbols.len() == 3));
    }
}
