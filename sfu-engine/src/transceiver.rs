//! The per-endpoint transceiver: owns the receive and send graphs, the
//! bounded queues between them and the transport layer, the worker
//! threads that drive them, and the control surface the hosting SFU
//! configures them through.
//!
//! Threading: one worker per direction, so each pipeline is
//! single-threaded; a shared background worker runs the periodic
//! generators (receiver reports, NACKs, transport-CC feedback).

use crate::event::{
    MediaFormat, MediaType, RtpEncoding, RtpExtensionKind, SsrcAssociation, TransceiverEvent,
};
use crate::handler::{HandlerSlot, PacketHandler};
use crate::node::{broadcast_event, collect_stats, stop_graph, Node, NodeStatsBlock};
use crate::packet::{Packet, PacketInfo, RtcpElement};
use crate::rtcp_bus::{
    EndpointConnectionStats, ReceiverReportGenerator, RtcpEventNotifier, RtcpSender,
};
use crate::rx::{
    build_receive_pipeline, AudioLevelListener, AudioLevelSlot, IncomingStatisticsTracker,
    NackEngine, ReceivePipelineParts, StreamSnapshot, VideoPayloadParser,
};
use crate::srtp::{
    DtlsRole, KeyingMaterialExporter, SrtpKeys, SrtpProfile, SrtpTransformerFactory,
    SrtpTransformers, TransformerSlot,
};
use crate::tcc::{BandwidthEstimator, TransportCcEngine};
use crate::tx::{build_send_pipeline, SendPipelineParts};
use bytes::BytesMut;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, warn};
use shared::error::{Error, Result};
use shared::{PayloadType, Ssrc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub struct TransceiverConfig {
    pub incoming_queue_size: usize,
    pub send_queue_size: usize,
    pub outgoing_queue_size: usize,
    /// Bound on each worker's blocking wait, and therefore on shutdown.
    pub queue_poll_timeout: Duration,
    pub background_tick: Duration,
    pub receiver_report_interval: Duration,
    pub nack_delay: Duration,
    pub nack_window_size: u16,
    pub nack_skip_last_n: u16,
    pub max_nacks_per_packet: u8,
    pub tcc_feedback_interval: Duration,
    pub snapshot_ring_size: usize,
    /// Codec payload parsers keyed by encoding name ("VP8", ...).
    pub video_parsers: HashMap<String, Arc<dyn VideoPayloadParser>>,
}

impl Default for TransceiverConfig {
    fn default() -> Self {
        Self {
            incoming_queue_size: 1024,
            send_queue_size: 1024,
            outgoing_queue_size: 1024,
            queue_poll_timeout: Duration::from_millis(100),
            background_tick: Duration::from_millis(10),
            receiver_report_interval: Duration::from_secs(1),
            nack_delay: Duration::from_millis(20),
            nack_window_size: 512,
            nack_skip_last_n: 0,
            max_nacks_per_packet: 10,
            tcc_feedback_interval: Duration::from_millis(20),
            snapshot_ring_size: 16,
            video_parsers: HashMap::new(),
        }
    }
}

impl TransceiverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_poll_timeout(mut self, timeout: Duration) -> Self {
        self.queue_poll_timeout = timeout;
        self
    }

    pub fn with_receiver_report_interval(mut self, interval: Duration) -> Self {
        self.receiver_report_interval = interval;
        self
    }

    pub fn with_nack_delay(mut self, delay: Duration) -> Self {
        self.nack_delay = delay;
        self
    }

    pub fn with_tcc_feedback_interval(mut self, interval: Duration) -> Self {
        self.tcc_feedback_interval = interval;
        self
    }

    pub fn with_video_parser(
        mut self,
        encoding: impl Into<String>,
        parser: Arc<dyn VideoPayloadParser>,
    ) -> Self {
        self.video_parsers.insert(encoding.into(), parser);
        self
    }
}

/// Top-level counters and the two pipeline stats trees.
pub struct TransceiverStats {
    pub receive_pipeline: NodeStatsBlock,
    pub send_pipeline: NodeStatsBlock,
    pub incoming_queue_dropped: u64,
    pub incoming_packets_processed: u64,
    pub send_queue_dropped: u64,
    pub rtt_ms: Option<f64>,
    pub streams: Vec<StreamSnapshot>,
}

impl fmt::Display for TransceiverStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "incoming queue: {} processed, {} dropped; send queue: {} dropped",
            self.incoming_packets_processed, self.incoming_queue_dropped, self.send_queue_dropped
        )?;
        if let Some(rtt) = self.rtt_ms {
            writeln!(f, "rtt: {rtt:.1} ms")?;
        }
        writeln!(f, "receive pipeline:")?;
        write!(f, "{}", self.receive_pipeline)?;
        writeln!(f, "send pipeline:")?;
        write!(f, "{}", self.send_pipeline)
    }
}

pub struct Transceiver {
    config_poll_timeout: Duration,

    incoming_tx: Sender<PacketInfo>,
    incoming_rx: Receiver<PacketInfo>,
    send_tx: Sender<PacketInfo>,
    send_rx: Receiver<PacketInfo>,
    outgoing_rx: Receiver<PacketInfo>,

    rx_root: Node,
    tx_root: Node,

    rtp_handler: HandlerSlot,
    rtcp_handler: HandlerSlot,
    audio_level_listener: AudioLevelSlot,

    rtp_decrypt: TransformerSlot,
    rtcp_decrypt: TransformerSlot,
    rtp_encrypt: TransformerSlot,
    rtcp_encrypt: TransformerSlot,

    payload_types: Mutex<HashMap<PayloadType, MediaFormat>>,
    extensions: Mutex<HashMap<u8, RtpExtensionKind>>,
    receive_ssrcs: Mutex<HashSet<Ssrc>>,
    ssrc_associations: Mutex<Vec<SsrcAssociation>>,

    notifier: Arc<RtcpEventNotifier>,
    tracker: Arc<IncomingStatisticsTracker>,
    tcc: Arc<TransportCcEngine>,
    connection_stats: Arc<EndpointConnectionStats>,
    rtcp_sender: RtcpSender,

    incoming_queue_dropped: Arc<AtomicU64>,
    incoming_packets_processed: Arc<AtomicU64>,
    send_queue_dropped: Arc<AtomicU64>,

    running: Arc<AtomicBool>,
    workers: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl Transceiver {
    pub fn new(config: TransceiverConfig) -> Result<Self> {
        let (incoming_tx, incoming_rx) = bounded(config.incoming_queue_size);
        let (send_tx, send_rx) = bounded(config.send_queue_size);
        let (outgoing_tx, outgoing_rx) = bounded(config.outgoing_queue_size);

        let send_queue_dropped = Arc::new(AtomicU64::new(0));
        let rtcp_sender: RtcpSender = {
            let send_tx = send_tx.clone();
            let dropped = send_queue_dropped.clone();
            Arc::new(move |packet| {
                let info = PacketInfo::new(Packet::Rtcp(RtcpElement::generated(packet)));
                if send_tx.try_send(info).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        let notifier = Arc::new(RtcpEventNotifier::new());
        let tracker = Arc::new(IncomingStatisticsTracker::new());
        let tcc = Arc::new(TransportCcEngine::new(rtcp_sender.clone()));
        let nack = Arc::new(NackEngine::new(
            config.nack_window_size,
            config.nack_skip_last_n,
            config.max_nacks_per_packet,
            rtcp_sender.clone(),
        ));
        let rr_generator = Arc::new(ReceiverReportGenerator::new(
            tracker.clone(),
            rtcp_sender.clone(),
        ));
        let connection_stats = Arc::new(EndpointConnectionStats::new());

        notifier.subscribe(rr_generator.clone());
        notifier.subscribe(connection_stats.clone());
        notifier.subscribe(tcc.clone());

        let rtp_handler = HandlerSlot::new();
        let rtcp_handler = HandlerSlot::new();
        let audio_level_listener = AudioLevelSlot::new();

        let rtp_decrypt = TransformerSlot::new();
        let rtcp_decrypt = TransformerSlot::new();
        let rtp_encrypt = TransformerSlot::new();
        let rtcp_encrypt = TransformerSlot::new();

        let rx_root = build_receive_pipeline(ReceivePipelineParts {
            rtp_decrypt: rtp_decrypt.clone(),
            rtcp_decrypt: rtcp_decrypt.clone(),
            tracker: tracker.clone(),
            tcc: tcc.clone(),
            nack: nack.clone(),
            notifier: notifier.clone(),
            rtp_handler: rtp_handler.clone(),
            rtcp_handler: rtcp_handler.clone(),
            audio_level_listener: audio_level_listener.clone(),
            video_parsers: config.video_parsers.clone(),
            snapshot_ring_size: config.snapshot_ring_size,
        })?;

        let tx_root = build_send_pipeline(SendPipelineParts {
            rtp_encrypt: rtp_encrypt.clone(),
            rtcp_encrypt: rtcp_encrypt.clone(),
            notifier: notifier.clone(),
            outgoing: outgoing_tx,
        })?;

        let running = Arc::new(AtomicBool::new(true));
        let incoming_queue_dropped = Arc::new(AtomicU64::new(0));
        let incoming_packets_processed = Arc::new(AtomicU64::new(0));

        let mut workers = Vec::with_capacity(3);

        workers.push(spawn_direction_worker(
            "sfu-rx",
            running.clone(),
            incoming_rx.clone(),
            config.queue_poll_timeout,
            rx_root.clone(),
            incoming_packets_processed.clone(),
        )?);

        workers.push(spawn_direction_worker(
            "sfu-tx",
            running.clone(),
            send_rx.clone(),
            config.queue_poll_timeout,
            tx_root.clone(),
            Arc::new(AtomicU64::new(0)),
        )?);

        workers.push({
            let running = running.clone();
            let tick = config.background_tick;
            let rr_interval = config.receiver_report_interval;
            let nack_delay = config.nack_delay;
            let tcc_interval = config.tcc_feedback_interval;
            let rr_generator = rr_generator.clone();
            let nack = nack.clone();
            let tcc = tcc.clone();
            thread::Builder::new()
                .name("sfu-bg".into())
                .spawn(move || {
                    let mut next_rr = Instant::now() + rr_interval;
                    let mut next_nack = Instant::now() + nack_delay;
                    let mut next_tcc = Instant::now() + tcc_interval;
                    while running.load(Ordering::Relaxed) {
                        thread::sleep(tick);
                        let now = Instant::now();
                        if now >= next_rr {
                            rr_generator.tick(now);
                            next_rr = now + rr_interval;
                        }
                        if now >= next_nack {
                            nack.generate();
                            next_nack = now + nack_delay;
                        }
                        if now >= next_tcc {
                            tcc.tick();
                            next_tcc = now + tcc_interval;
                        }
                    }
                })
                .map_err(|e| Error::Other(format!("spawn background worker: {e}")))?
        });

        Ok(Self {
            config_poll_timeout: config.queue_poll_timeout,
            incoming_tx,
            incoming_rx,
            send_tx,
            send_rx,
            outgoing_rx,
            rx_root,
            tx_root,
            rtp_handler,
            rtcp_handler,
            audio_level_listener,
            rtp_decrypt,
            rtcp_decrypt,
            rtp_encrypt,
            rtcp_encrypt,
            payload_types: Mutex::new(HashMap::new()),
            extensions: Mutex::new(HashMap::new()),
            receive_ssrcs: Mutex::new(HashSet::new()),
            ssrc_associations: Mutex::new(Vec::new()),
            notifier,
            tracker,
            tcc,
            connection_stats,
            rtcp_sender,
            incoming_queue_dropped,
            incoming_packets_processed,
            send_queue_dropped,
            running,
            workers: Mutex::new(Some(workers)),
        })
    }

    /// Non-blocking enqueue of wire bytes into the receive queue. Overflow
    /// drops with a counter and reports the condition.
    pub fn handle_incoming_packet(&self, buf: BytesMut) -> Result<()> {
        let mut info = PacketInfo::new(Packet::Raw(buf));
        info.note("entered incoming queue");
        match self.incoming_tx.try_send(info) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.incoming_queue_dropped.fetch_add(1, Ordering::Relaxed);
                Err(Error::ErrQueueFull)
            }
        }
    }

    /// Hands forwardable RTP (audio/video/plain) to the send pipeline.
    pub fn send_rtp(&self, packets: Vec<PacketInfo>) -> Result<()> {
        let mut overflowed = false;
        for packet in packets {
            if self.send_tx.try_send(packet).is_err() {
                self.send_queue_dropped.fetch_add(1, Ordering::Relaxed);
                overflowed = true;
            }
        }
        if overflowed {
            Err(Error::ErrQueueFull)
        } else {
            Ok(())
        }
    }

    /// Hands RTCP to the send pipeline at its RTCP entry.
    pub fn send_rtcp(&self, packets: Vec<rtcp::Packet>) {
        for packet in packets {
            (self.rtcp_sender)(packet);
        }
    }

    /// The bounded queue the transport layer drains.
    pub fn outgoing_queue(&self) -> Receiver<PacketInfo> {
        self.outgoing_rx.clone()
    }

    pub fn set_incoming_rtp_handler(&self, handler: PacketHandler) {
        self.rtp_handler.set(handler);
    }

    pub fn set_incoming_rtcp_handler(&self, handler: PacketHandler) {
        self.rtcp_handler.set(handler);
    }

    pub fn set_audio_level_listener(&self, listener: AudioLevelListener) {
        self.audio_level_listener.set(listener);
    }

    pub fn set_bandwidth_estimator(&self, estimator: Arc<dyn BandwidthEstimator>) {
        self.tcc.set_estimator(estimator);
    }

    pub fn connection_stats(&self) -> Arc<EndpointConnectionStats> {
        self.connection_stats.clone()
    }

    pub fn rtcp_notifier(&self) -> Arc<RtcpEventNotifier> {
        self.notifier.clone()
    }

    pub fn add_receive_ssrc(&self, ssrc: Ssrc, media_type: MediaType) {
        self.receive_ssrcs.lock().unwrap().insert(ssrc);
        self.broadcast(&TransceiverEvent::ReceiveSsrcAdded { ssrc, media_type });
    }

    pub fn remove_receive_ssrc(&self, ssrc: Ssrc) {
        self.receive_ssrcs.lock().unwrap().remove(&ssrc);
        self.broadcast(&TransceiverEvent::ReceiveSsrcRemoved { ssrc });
    }

    pub fn add_dynamic_rtp_payload_type(&self, payload_type: PayloadType, format: MediaFormat) {
        self.payload_types
            .lock()
            .unwrap()
            .insert(payload_type, format.clone());
        self.broadcast(&TransceiverEvent::RtpPayloadTypeAdded {
            payload_type,
            format,
        });
    }

    pub fn clear_dynamic_rtp_payload_types(&self) {
        self.payload_types.lock().unwrap().clear();
        self.broadcast(&TransceiverEvent::RtpPayloadTypesCleared);
    }

    pub fn add_rtp_extension(&self, id: u8, kind: RtpExtensionKind) {
        self.extensions.lock().unwrap().insert(id, kind);
        self.broadcast(&TransceiverEvent::RtpExtensionAdded { id, kind });
    }

    pub fn clear_rtp_extensions(&self) {
        self.extensions.lock().unwrap().clear();
        self.broadcast(&TransceiverEvent::RtpExtensionsCleared);
    }

    pub fn add_ssrc_association(&self, association: SsrcAssociation) {
        self.ssrc_associations.lock().unwrap().push(association);
        self.broadcast(&TransceiverEvent::SsrcAssociationAdded(association));
    }

    pub fn set_rtp_encodings(&self, encodings: Vec<RtpEncoding>) {
        self.broadcast(&TransceiverEvent::RtpEncodingsUpdated { encodings });
    }

    pub fn receive_ssrcs(&self) -> Vec<Ssrc> {
        self.receive_ssrcs.lock().unwrap().iter().copied().collect()
    }

    pub fn payload_type_format(&self, payload_type: PayloadType) -> Option<MediaFormat> {
        self.payload_types.lock().unwrap().get(&payload_type).cloned()
    }

    pub fn rtp_extension(&self, id: u8) -> Option<RtpExtensionKind> {
        self.extensions.lock().unwrap().get(&id).copied()
    }

    pub fn ssrc_associations(&self) -> Vec<SsrcAssociation> {
        self.ssrc_associations.lock().unwrap().clone()
    }

    /// Derives keying material from the DTLS context, builds the four
    /// transformers and installs them on both directions.
    pub fn set_srtp_information(
        &self,
        profile: SrtpProfile,
        role: DtlsRole,
        exporter: &dyn KeyingMaterialExporter,
        factory: &dyn SrtpTransformerFactory,
    ) -> Result<()> {
        let keys = SrtpKeys::derive(profile, role, exporter)?;
        let transformers = factory.initialize(profile, &keys)?;
        self.install_srtp_transformers(transformers);
        debug!("srtp transformers installed for {profile:?} as {role:?}");
        Ok(())
    }

    /// Installs already-constructed transformers (loopback, tests).
    pub fn install_srtp_transformers(&self, transformers: SrtpTransformers) {
        self.rtp_decrypt.install(transformers.rtp_decrypt);
        self.rtcp_decrypt.install(transformers.rtcp_decrypt);
        self.rtp_encrypt.install(transformers.rtp_encrypt);
        self.rtcp_encrypt.install(transformers.rtcp_encrypt);
    }

    /// The incoming per-SSRC statistics surface.
    pub fn stream_snapshots(&self) -> Vec<StreamSnapshot> {
        self.tracker.snapshots()
    }

    pub fn stats(&self) -> TransceiverStats {
        TransceiverStats {
            receive_pipeline: collect_stats(&self.rx_root),
            send_pipeline: collect_stats(&self.tx_root),
            incoming_queue_dropped: self.incoming_queue_dropped.load(Ordering::Relaxed),
            incoming_packets_processed: self.incoming_packets_processed.load(Ordering::Relaxed),
            send_queue_dropped: self.send_queue_dropped.load(Ordering::Relaxed),
            rtt_ms: self.connection_stats.rtt_ms(),
            streams: self.tracker.snapshots(),
        }
    }

    /// Shuts both worker loops down (bounded by the poll timeout), stops
    /// node background work and releases the transformers.
    pub fn stop(&self) -> Result<()> {
        let workers = self.workers.lock().unwrap().take();
        let Some(workers) = workers else {
            return Err(Error::ErrAlreadyStopped);
        };

        self.running.store(false, Ordering::Relaxed);
        for worker in workers {
            if worker.join().is_err() {
                warn!("transceiver worker panicked during shutdown");
            }
        }

        // Drain whatever the workers never got to
        while self.incoming_rx.try_recv().is_ok() {}
        while self.send_rx.try_recv().is_ok() {}

        stop_graph(&self.rx_root);
        stop_graph(&self.tx_root);

        self.rtp_decrypt.clear();
        self.rtcp_decrypt.clear();
        self.rtp_encrypt.clear();
        self.rtcp_encrypt.clear();
        Ok(())
    }

    /// Worst-case shutdown latency, 2x the queue poll timeout.
    pub fn stop_deadline(&self) -> Duration {
        self.config_poll_timeout * 2
    }

    /// Events run on the caller's thread; per-node locking means a packet
    /// in flight observes each node's configuration fully applied or
    /// fully absent.
    fn broadcast(&self, event: &TransceiverEvent) {
        broadcast_event(&self.rx_root, event);
        broadcast_event(&self.tx_root, event);
    }
}

impl Drop for Transceiver {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn spawn_direction_worker(
    name: &str,
    running: Arc<AtomicBool>,
    queue: Receiver<PacketInfo>,
    poll_timeout: Duration,
    root: Node,
    processed: Arc<AtomicU64>,
) -> Result<JoinHandle<()>> {
    let label: &'static str = if name == "sfu-rx" {
        "exited incoming queue"
    } else {
        "exited send queue"
    };
    thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            while running.load(Ordering::Relaxed) {
                match queue.recv_timeout(poll_timeout) {
                    Ok(mut info) => {
                        info.note(label);
                        processed.fetch_add(1, Ordering::Relaxed);
                        root.process_packets(vec![info]);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .map_err(|e| Error::Other(format!("spawn {name} worker: {e}")))
}
