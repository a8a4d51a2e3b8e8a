//! The incoming pipeline: protocol parse, SRTP/SRTCP split, decryption,
//! media classification, per-media processing and RTCP termination.

mod audio_level;
mod decrypt;
mod filter;
mod media_type;
mod nack_requester;
mod padding;
mod parse;
mod rtcp;
mod rtx;
mod stats_tracker;
mod tcc_generator;
mod video;

pub use audio_level::AudioLevelListener;
pub use stats_tracker::{IncomingStatisticsTracker, StreamSnapshot};
pub use video::VideoPayloadParser;

pub(crate) use self::audio_level::AudioLevelSlot;
pub(crate) use self::nack_requester::NackEngine;
pub(crate) use self::rtcp::DiagnosticRing;

use self::rtcp::{PreParseSnapshot, RtcpParser, RtcpTermination};

use crate::handler::{HandlerNode, HandlerSlot};
use crate::node::{ConditionalPacketPath, Node};
use crate::packet::{Packet, PacketInfo};
use crate::pipeline::PipelineBuilder;
use crate::rtcp_bus::RtcpEventNotifier;
use crate::srtp::TransformerSlot;
use crate::tcc::TransportCcEngine;
use shared::error::Result;
use shared::util::{match_srtcp, match_srtp};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) struct ReceivePipelineParts {
    pub rtp_decrypt: TransformerSlot,
    pub rtcp_decrypt: TransformerSlot,
    pub tracker: Arc<IncomingStatisticsTracker>,
    pub tcc: Arc<TransportCcEngine>,
    pub nack: Arc<NackEngine>,
    pub notifier: Arc<RtcpEventNotifier>,
    pub rtp_handler: HandlerSlot,
    pub rtcp_handler: HandlerSlot,
    pub audio_level_listener: AudioLevelSlot,
    pub video_parsers: HashMap<String, Arc<dyn VideoPayloadParser>>,
    pub snapshot_ring_size: usize,
}

fn is_srtp(info: &PacketInfo) -> bool {
    matches!(&info.packet, Packet::SrtpProtocol(buf) if match_srtp(buf))
}

fn is_srtcp(info: &PacketInfo) -> bool {
    matches!(&info.packet, Packet::SrtpProtocol(buf) if match_srtcp(buf))
}

pub(crate) fn build_receive_pipeline(parts: ReceivePipelineParts) -> Result<Node> {
    let ring = DiagnosticRing::new(parts.snapshot_ring_size);

    let audio_path = PipelineBuilder::new()
        .node(
            "audio level reader",
            audio_level::AudioLevelReader::new(parts.audio_level_listener),
        )?
        .node("rtp handler", HandlerNode::new(parts.rtp_handler.clone()))?
        .build()?;

    let video_path = PipelineBuilder::new()
        .node("rtx handler", rtx::RtxHandler::default())?
        .node("padding termination", padding::PaddingTermination::default())?
        .node("video parser", video::VideoParser::new(parts.video_parsers))?
        .node(
            "retransmission requester",
            nack_requester::RetransmissionRequester::new(parts.nack),
        )?
        .node("rtp handler", HandlerNode::new(parts.rtp_handler))?
        .build()?;

    let rtp_path = PipelineBuilder::new()
        .node("srtp parser", parse::SrtpParser::default())?
        .node("payload type filter", filter::PayloadTypeFilter::default())?
        .node("tcc generator", tcc_generator::TccGenerator::new(parts.tcc))?
        .node("srtp decrypt", decrypt::SrtpDecrypt::new(parts.rtp_decrypt))?
        .node("media type parser", media_type::MediaTypeParser::default())?
        .node(
            "incoming stat tracker",
            stats_tracker::StatTracker::new(parts.tracker),
        )?
        .demux(
            "media type",
            vec![
                ConditionalPacketPath::new(
                    "audio",
                    |p: &PacketInfo| matches!(p.packet, Packet::Audio(_)),
                    audio_path,
                ),
                ConditionalPacketPath::new(
                    "video",
                    |p: &PacketInfo| matches!(p.packet, Packet::Video(_)),
                    video_path,
                ),
            ],
        )?
        .build()?;

    let rtcp_path = PipelineBuilder::new()
        .node("srtcp parser", parse::SrtcpParser::default())?
        .node(
            "srtcp decrypt",
            decrypt::SrtcpDecrypt::new(parts.rtcp_decrypt),
        )?
        .node("pre-parse snapshot", PreParseSnapshot::new(ring.clone()))?
        .node("rtcp parser", RtcpParser::new(ring))?
        .node("rtcp termination", RtcpTermination::new(parts.notifier))?
        .node("rtcp handler", HandlerNode::new(parts.rtcp_handler))?
        .build()?;

    PipelineBuilder::new()
        .node("srtp protocol parser", parse::SrtpProtocolParser::default())?
        .demux(
            "srtp/srtcp",
            vec![
                ConditionalPacketPath::new("rtp", is_srtp, rtp_path),
                ConditionalPacketPath::new("rtcp", is_srtcp, rtcp_path),
            ],
        )?
        .build()
}
