//! Tracks received sequence numbers per SSRC and requests retransmission
//! of the gaps.
//!
//! The pipeline node records arrivals; the background worker drives
//! [`NackEngine::generate`] on the configured cadence. A missing packet is
//! NACKed at most `max_nacks_per_packet` times, and packets that arrive
//! late clear their pending state.

use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::PacketInfo;
use crate::rtcp_bus::RtcpSender;
use rtcp::transport_feedbacks::transport_layer_nack::{
    nack_pairs_from_sequence_numbers, TransportLayerNack,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Half of u16 space, the wraparound horizon.
const SEQ_HALF: u16 = 1 << 15;

/// Circular bitmap of received sequence numbers.
pub(crate) struct ReceiveWindow {
    packets: Vec<u64>,
    size: u16,
    end: u16,
    started: bool,
    last_consecutive: u16,
}

impl ReceiveWindow {
    /// `size` must be a power of two in 64..=32768.
    pub(crate) fn new(size: u16) -> Option<Self> {
        let valid = (6..=15).any(|i| size == 1 << i);
        if !valid {
            return None;
        }
        Some(Self {
            packets: vec![0u64; (size / 64) as usize],
            size,
            end: 0,
            started: false,
            last_consecutive: 0,
        })
    }

    pub(crate) fn add(&mut self, seq: u16) {
        if !self.started {
            self.set(seq);
            self.end = seq;
            self.started = true;
            self.last_consecutive = seq;
            return;
        }

        let diff = seq.wrapping_sub(self.end);
        match diff {
            0 => return, // duplicate
            d if d < SEQ_HALF => {
                // In-order advance; clear the gap slots, which may hold
                // stale state from one window-size ago
                let mut i = self.end.wrapping_add(1);
                while i != seq {
                    self.clear(i);
                    i = i.wrapping_add(1);
                }
                self.end = seq;

                if self.last_consecutive.wrapping_add(1) == seq {
                    self.last_consecutive = seq;
                } else if seq.wrapping_sub(self.last_consecutive) > self.size {
                    self.last_consecutive = seq.wrapping_sub(self.size);
                    self.advance_last_consecutive();
                }
            }
            _ => {
                // Late arrival filling an old gap
                if self.last_consecutive.wrapping_add(1) == seq {
                    self.last_consecutive = seq;
                    self.advance_last_consecutive();
                }
            }
        }

        self.set(seq);
    }

    pub(crate) fn contains(&self, seq: u16) -> bool {
        let diff = self.end.wrapping_sub(seq);
        if diff >= SEQ_HALF || diff >= self.size {
            return false;
        }
        self.get(seq)
    }

    /// Missing sequence numbers between the last consecutive run and the
    /// newest arrival, optionally ignoring the freshest `skip_last_n`.
    pub(crate) fn missing(&self, skip_last_n: u16) -> Vec<u16> {
        let until = self.end.wrapping_sub(skip_last_n);
        if until.wrapping_sub(self.last_consecutive) >= SEQ_HALF {
            return Vec::new();
        }

        let mut missing = Vec::new();
        let mut i = self.last_consecutive.wrapping_add(1);
        while i != until.wrapping_add(1) {
            if !self.get(i) {
                missing.push(i);
            }
            i = i.wrapping_add(1);
        }
        missing
    }

    fn set(&mut self, seq: u16) {
        let pos = seq % self.size;
        self.packets[(pos / 64) as usize] |= 1 << (pos % 64);
    }

    fn clear(&mut self, seq: u16) {
        let pos = seq % self.size;
        self.packets[(pos / 64) as usize] &= !(1u64 << (pos % 64));
    }

    fn get(&self, seq: u16) -> bool {
        let pos = seq % self.size;
        (self.packets[(pos / 64) as usize] & (1 << (pos % 64))) != 0
    }

    fn advance_last_consecutive(&mut self) {
        let mut i = self.last_consecutive.wrapping_add(1);
        while i != self.end.wrapping_add(1) && self.get(i) {
            i = i.wrapping_add(1);
        }
        self.last_consecutive = i.wrapping_sub(1);
    }
}

struct StreamNackState {
    window: ReceiveWindow,
    /// NACK retries already spent per missing sequence number.
    nack_counts: HashMap<u16, u8>,
}

struct NackEngineInner {
    streams: HashMap<u32, StreamNackState>,
    num_nacks_sent: u64,
}

/// Shared between the pipeline node (arrivals) and the background worker
/// (generation).
pub(crate) struct NackEngine {
    inner: Mutex<NackEngineInner>,
    sender_ssrc: u32,
    window_size: u16,
    skip_last_n: u16,
    max_nacks_per_packet: u8,
    rtcp_sender: RtcpSender,
}

impl NackEngine {
    pub(crate) fn new(
        window_size: u16,
        skip_last_n: u16,
        max_nacks_per_packet: u8,
        rtcp_sender: RtcpSender,
    ) -> Self {
        Self {
            inner: Mutex::new(NackEngineInner {
                streams: HashMap::new(),
                num_nacks_sent: 0,
            }),
            sender_ssrc: rand::random::<u32>(),
            window_size,
            skip_last_n,
            max_nacks_per_packet,
            rtcp_sender,
        }
    }

    pub(crate) fn on_packet(&self, ssrc: u32, seq: u16) {
        let mut inner = self.inner.lock().unwrap();
        let window_size = self.window_size;
        let state = inner
            .streams
            .entry(ssrc)
            .or_insert_with(|| StreamNackState {
                window: ReceiveWindow::new(window_size)
                    .unwrap_or_else(|| ReceiveWindow::new(512).unwrap()),
                nack_counts: HashMap::new(),
            });
        state.window.add(seq);
        state.nack_counts.remove(&seq);
    }

    pub(crate) fn remove_stream(&self, ssrc: u32) {
        self.inner.lock().unwrap().streams.remove(&ssrc);
    }

    /// Emits one NACK per stream with outstanding gaps, suppressing
    /// sequence numbers that exhausted their retry budget.
    pub(crate) fn generate(&self) {
        let mut nacks = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            let max_retries = self.max_nacks_per_packet;
            let skip_last_n = self.skip_last_n;
            for (&ssrc, state) in inner.streams.iter_mut() {
                let missing = state.window.missing(skip_last_n);
                if missing.is_empty() {
                    state.nack_counts.clear();
                    continue;
                }

                let requested: Vec<u16> = missing
                    .iter()
                    .filter(|&&seq| {
                        let count = state.nack_counts.entry(seq).or_insert(0);
                        if *count < max_retries {
                            *count += 1;
                            true
                        } else {
                            false
                        }
                    })
                    .copied()
                    .collect();

                state.nack_counts.retain(|seq, _| missing.contains(seq));

                if !requested.is_empty() {
                    nacks.push(TransportLayerNack {
                        sender_ssrc: self.sender_ssrc,
                        media_ssrc: ssrc,
                        nacks: nack_pairs_from_sequence_numbers(&requested),
                    });
                }
            }
            inner.num_nacks_sent += nacks.len() as u64;
        }

        for nack in nacks {
            (self.rtcp_sender)(rtcp::Packet::TransportLayerNack(nack));
        }
    }

    fn num_nacks_sent(&self) -> u64 {
        self.inner.lock().unwrap().num_nacks_sent
    }
}

/// The pipeline node: records arrivals, forwards everything.
pub(crate) struct RetransmissionRequester {
    engine: Arc<NackEngine>,
}

impl RetransmissionRequester {
    pub(crate) fn new(engine: Arc<NackEngine>) -> Self {
        Self { engine }
    }
}

impl PacketProcessor for RetransmissionRequester {
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        if let Some(rtp) = packet.packet.rtp() {
            self.engine
                .on_packet(rtp.header.ssrc, rtp.header.sequence_number);
        }
        out.push(packet);
    }

    fn handle_event(&mut self, event: &crate::event::TransceiverEvent) {
        if let crate::event::TransceiverEvent::ReceiveSsrcRemoved { ssrc } = event {
            self.engine.remove_stream(*ssrc);
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("nacks sent", self.engine.num_nacks_sent());
    }
}
