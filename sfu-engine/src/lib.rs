//! Per-endpoint media transport engine for a selective forwarding unit.
//!
//! One [`Transceiver`] terminates a single peer's SRTP/SRTCP stream:
//! incoming packets are parsed, decrypted, classified and handed to the
//! hosting SFU's handlers; outgoing packets run the symmetric path into a
//! bounded queue the transport layer drains. Both directions are built on
//! the same node-graph framework with per-node statistics and a broadcast
//! control-event bus.
//!
//! Cryptography, DTLS, codec bit-parsing and socket I/O stay outside the
//! engine behind the traits in [`srtp`], [`rx`] and [`tcc`].

#![warn(rust_2018_idioms)]

pub mod event;
mod handler;
pub mod node;
pub mod packet;
pub mod pipeline;
pub mod rtcp_bus;
pub mod rx;
pub mod srtp;
pub mod tcc;
mod transceiver;
mod tx;

pub use event::{
    MediaFormat, MediaType, RtpEncoding, RtpExtensionKind, SsrcAssociation, SsrcAssociationKind,
    TransceiverEvent,
};
pub use handler::PacketHandler;
pub use node::{
    broadcast_event, collect_stats, visit_forward, visit_reverse, ConditionalPacketPath, Node,
    NodeStats, NodeStatsBlock, PacketProcessor,
};
pub use packet::{AudioLevel, AudioPacket, Packet, PacketInfo, RtcpElement, VideoPacket};
pub use pipeline::PipelineBuilder;
pub use rtcp_bus::{EndpointConnectionStats, RtcpEventNotifier, RtcpListener, RtcpSender};
pub use rx::{AudioLevelListener, IncomingStatisticsTracker, StreamSnapshot, VideoPayloadParser};
pub use srtp::{
    DtlsRole, IdentityTransformer, KeyingMaterialExporter, PacketTransformer, SrtpKeys,
    SrtpProfile, SrtpTransformerFactory, SrtpTransformers,
};
pub use tcc::{BandwidthEstimator, TransportCcEngine};
pub use transceiver::{Transceiver, TransceiverConfig, TransceiverStats};
