//! Per-SSRC arrival statistics feeding the receiver-report generator.

use crate::event::TransceiverEvent;
use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::PacketInfo;
use rtcp::reception_report::ReceptionReport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Packets tracked per u64 entry of the receive bitmap.
const PACKETS_PER_ENTRY: usize = 64;
/// Entries in the bitmap; 128 * 64 = 8192 packets of history.
const BITMAP_ENTRIES: usize = 128;

/// Arrival state for one remote stream. Sequence arithmetic is u16 with
/// wraparound; jitter follows RFC 3550 page 39.
struct StreamStats {
    clock_rate: f64,

    packets: Vec<u64>,
    started: bool,
    seq_num_cycles: u16,
    last_seq_num: u16,
    last_report_seq_num: u16,
    last_rtp_time_rtp: u32,
    last_rtp_time_time: Instant,
    jitter: f64,
    packets_received: u64,
    bytes_received: u64,
    last_sender_report: u32,
    last_sender_report_time: Option<Instant>,
    total_lost: u32,
}

impl StreamStats {
    fn new(clock_rate: u32) -> Self {
        Self {
            clock_rate: clock_rate as f64,
            packets: vec![0u64; BITMAP_ENTRIES],
            started: false,
            seq_num_cycles: 0,
            last_seq_num: 0,
            last_report_seq_num: 0,
            last_rtp_time_rtp: 0,
            last_rtp_time_time: Instant::now(),
            jitter: 0.0,
            packets_received: 0,
            bytes_received: 0,
            last_sender_report: 0,
            last_sender_report_time: None,
            total_lost: 0,
        }
    }

    fn set_received(&mut self, seq: u16) {
        let pos = (seq as usize) % (BITMAP_ENTRIES * PACKETS_PER_ENTRY);
        self.packets[pos / PACKETS_PER_ENTRY] |= 1 << (pos % PACKETS_PER_ENTRY);
    }

    fn del_received(&mut self, seq: u16) {
        let pos = (seq as usize) % (BITMAP_ENTRIES * PACKETS_PER_ENTRY);
        self.packets[pos / PACKETS_PER_ENTRY] &= !(1u64 << (pos % PACKETS_PER_ENTRY));
    }

    fn get_received(&self, seq: u16) -> bool {
        let pos = (seq as usize) % (BITMAP_ENTRIES * PACKETS_PER_ENTRY);
        (self.packets[pos / PACKETS_PER_ENTRY] & (1 << (pos % PACKETS_PER_ENTRY))) != 0
    }

    fn process_packet(&mut self, now: Instant, seq: u16, rtp_time: u32, size: usize) {
        self.packets_received += 1;
        self.bytes_received += size as u64;

        if !self.started {
            self.started = true;
            self.set_received(seq);
            self.last_seq_num = seq;
            self.last_report_seq_num = seq.wrapping_sub(1);
            self.last_rtp_time_rtp = rtp_time;
            self.last_rtp_time_time = now;
            return;
        }

        self.set_received(seq);

        let diff = seq.wrapping_sub(self.last_seq_num);
        if diff > 0 && diff < (1 << 15) {
            if seq < self.last_seq_num {
                self.seq_num_cycles = self.seq_num_cycles.wrapping_add(1);
            }

            // Mark the gap as not-received; the window wrapped over any
            // state those slots held 8192 packets ago
            let mut i = self.last_seq_num.wrapping_add(1);
            while i != seq {
                self.del_received(i);
                i = i.wrapping_add(1);
            }

            self.last_seq_num = seq;
        }

        // https://tools.ietf.org/html/rfc3550#page-39
        let d = now.duration_since(self.last_rtp_time_time).as_secs_f64() * self.clock_rate
            - (rtp_time as f64 - self.last_rtp_time_rtp as f64);
        self.jitter += (d.abs() - self.jitter) / 16.0;

        self.last_rtp_time_rtp = rtp_time;
        self.last_rtp_time_time = now;
    }

    fn generate_report(&mut self, ssrc: u32, now: Instant) -> ReceptionReport {
        let total_since_report = self.last_seq_num.wrapping_sub(self.last_report_seq_num);
        let mut lost_since_report = {
            if self.last_seq_num == self.last_report_seq_num {
                0u32
            } else {
                let mut lost = 0u32;
                let mut i = self.last_report_seq_num.wrapping_add(1);
                while i != self.last_seq_num {
                    if !self.get_received(i) {
                        lost += 1;
                    }
                    i = i.wrapping_add(1);
                }
                lost
            }
        };

        self.total_lost += lost_since_report;

        // Both fields are 24-bit on the wire
        if lost_since_report > 0xFF_FFFF {
            lost_since_report = 0xFF_FFFF;
        }
        if self.total_lost > 0xFF_FFFF {
            self.total_lost = 0xFF_FFFF;
        }

        let delay = match self.last_sender_report_time {
            Some(sr_time) => (now.duration_since(sr_time).as_secs_f64() * 65536.0) as u32,
            None => 0,
        };

        let fraction_lost = if total_since_report > 0 {
            ((lost_since_report * 256) as f64 / total_since_report as f64) as u8
        } else {
            0
        };

        let report = ReceptionReport {
            ssrc,
            fraction_lost,
            total_lost: self.total_lost,
            last_sequence_number: (self.seq_num_cycles as u32) << 16
                | (self.last_seq_num as u32 & 0xFFFF),
            jitter: self.jitter as u32,
            last_sender_report: self.last_sender_report,
            delay,
        };

        self.last_report_seq_num = self.last_seq_num;

        report
    }
}

/// A consistent per-SSRC view handed to stats consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub ssrc: u32,
    pub packets_received: u64,
    pub bytes_received: u64,
    pub cumulative_lost: u32,
    pub jitter: u32,
}

/// Shared arrival tracker. The pipeline node writes packet arrivals; the
/// receiver-report generator and stats surface read per-SSRC state. One
/// mutex keeps every per-SSRC operation internally consistent.
#[derive(Default)]
pub struct IncomingStatisticsTracker {
    streams: Mutex<HashMap<u32, StreamStats>>,
    clock_rates: Mutex<HashMap<u8, u32>>,
}

impl IncomingStatisticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn clock_rate(&self, payload_type: u8) -> u32 {
        const DEFAULT_CLOCK_RATE: u32 = 90_000;
        self.clock_rates
            .lock()
            .unwrap()
            .get(&payload_type)
            .copied()
            .unwrap_or(DEFAULT_CLOCK_RATE)
    }

    pub(crate) fn note_payload_type(&self, payload_type: u8, clock_rate: u32) {
        self.clock_rates
            .lock()
            .unwrap()
            .insert(payload_type, clock_rate);
    }

    pub(crate) fn clear_payload_types(&self) {
        self.clock_rates.lock().unwrap().clear();
    }

    pub(crate) fn on_packet(
        &self,
        now: Instant,
        ssrc: u32,
        seq: u16,
        rtp_time: u32,
        payload_type: u8,
        size: usize,
    ) {
        let clock_rate = self.clock_rate(payload_type);
        let mut streams = self.streams.lock().unwrap();
        streams
            .entry(ssrc)
            .or_insert_with(|| StreamStats::new(clock_rate))
            .process_packet(now, seq, rtp_time, size);
    }

    /// Records the LSR information of a received sender report.
    pub fn note_sender_report(&self, ssrc: u32, compact_ntp: u32, arrival: Instant) {
        let mut streams = self.streams.lock().unwrap();
        if let Some(stream) = streams.get_mut(&ssrc) {
            stream.last_sender_report = compact_ntp;
            stream.last_sender_report_time = Some(arrival);
        }
    }

    pub(crate) fn remove_stream(&self, ssrc: u32) {
        self.streams.lock().unwrap().remove(&ssrc);
    }

    /// One reception report per tracked stream. Mutates interval state, so
    /// each call reports on the span since the previous one.
    pub fn generate_reports(&self, now: Instant) -> Vec<ReceptionReport> {
        let mut streams = self.streams.lock().unwrap();
        streams
            .iter_mut()
            .map(|(&ssrc, stream)| stream.generate_report(ssrc, now))
            .collect()
    }

    pub fn snapshots(&self) -> Vec<StreamSnapshot> {
        let streams = self.streams.lock().unwrap();
        streams
            .iter()
            .map(|(&ssrc, s)| StreamSnapshot {
                ssrc,
                packets_received: s.packets_received,
                bytes_received: s.bytes_received,
                cumulative_lost: s.total_lost,
                jitter: s.jitter as u32,
            })
            .collect()
    }
}

/// Pipeline node feeding the shared tracker.
pub(crate) struct StatTracker {
    tracker: Arc<IncomingStatisticsTracker>,
}

impl StatTracker {
    pub(crate) fn new(tracker: Arc<IncomingStatisticsTracker>) -> Self {
        Self { tracker }
    }
}

impl PacketProcessor for StatTracker {
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        if let Some(rtp) = packet.packet.rtp() {
            self.tracker.on_packet(
                packet.received,
                rtp.header.ssrc,
                rtp.header.sequence_number,
                rtp.header.timestamp,
                rtp.header.payload_type,
                rtp.len(),
            );
        }
        out.push(packet);
    }

    fn handle_event(&mut self, event: &TransceiverEvent) {
        match event {
            TransceiverEvent::RtpPayloadTypeAdded {
                payload_type,
                format,
            } => self
                .tracker
                .note_payload_type(*payload_type, format.clock_rate),
            TransceiverEvent::RtpPayloadTypesCleared => self.tracker.clear_payload_types(),
            TransceiverEvent::ReceiveSsrcRemoved { ssrc } => self.tracker.remove_stream(*ssrc),
            _ => {}
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        for snapshot in self.tracker.snapshots() {
            block.add_stat(
                format!("ssrc {:#x}", snapshot.ssrc),
                format!(
                    "{} packets, {} bytes, {} lost, jitter {}",
                    snapshot.packets_received,
                    snapshot.bytes_received,
                    snapshot.cumulative_lost,
                    snapshot.jitter
                ),
            );
        }
    }
}
