//! The unit of work flowing through a pipeline: one packet buffer in its
//! current stage of interpretation, plus a diagnostic timeline.

use bytes::BytesMut;
use std::borrow::Cow;
use std::time::Instant;

/// Audio level read from the RFC 6464 header extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioLevel {
    pub voice_activity: bool,
    /// Level as -dBov, 0..=127.
    pub level: u8,
}

/// An RTP packet classified as audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    pub rtp: rtp::Packet,
    pub level: Option<AudioLevel>,
}

/// An RTP packet classified as video, annotated with codec metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPacket {
    pub rtp: rtp::Packet,
    pub is_keyframe: bool,
    pub is_start_of_frame: bool,
    pub temporal_layer: Option<u8>,
    pub spatial_layer: Option<u8>,
}

/// One parsed RTCP element. `raw` keeps the wire bytes of elements that
/// arrived off the network so they can be relayed without re-serialization;
/// locally generated elements carry `None` and are marshaled on egress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtcpElement {
    pub packet: rtcp::Packet,
    pub raw: Option<BytesMut>,
}

impl RtcpElement {
    pub fn generated(packet: rtcp::Packet) -> Self {
        Self { packet, raw: None }
    }
}

/// The successive interpretations a buffer takes on as it moves through a
/// pipeline. Nodes reinterpret in place; the buffer is only copied when
/// decryption replaces it or a compound RTCP packet is split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Unclassified ingress bytes.
    Raw(BytesMut),
    /// Validated as the SRTP protocol family, not yet split into RTP/RTCP.
    SrtpProtocol(BytesMut),
    /// RTP with a parsed cleartext header and SRTP-protected payload.
    Srtp(rtp::Packet),
    /// SRTCP-protected compound RTCP.
    Srtcp(BytesMut),
    /// Authenticated plaintext RTP.
    Rtp(rtp::Packet),
    Audio(AudioPacket),
    Video(VideoPacket),
    /// Authenticated plaintext compound RTCP, not yet split.
    RtcpCompound(BytesMut),
    /// One RTCP element.
    Rtcp(RtcpElement),
}

impl Packet {
    pub fn size(&self) -> usize {
        match self {
            Self::Raw(b) | Self::SrtpProtocol(b) | Self::Srtcp(b) | Self::RtcpCompound(b) => {
                b.len()
            }
            Self::Srtp(p) | Self::Rtp(p) => p.len(),
            Self::Audio(a) => a.rtp.len(),
            Self::Video(v) => v.rtp.len(),
            Self::Rtcp(e) => e.raw.as_ref().map(|r| r.len()).unwrap_or(0),
        }
    }

    /// The RTP view of this packet, at whatever protection stage.
    pub fn rtp(&self) -> Option<&rtp::Packet> {
        match self {
            Self::Srtp(p) | Self::Rtp(p) => Some(p),
            Self::Audio(a) => Some(&a.rtp),
            Self::Video(v) => Some(&v.rtp),
            _ => None,
        }
    }

    pub fn rtp_mut(&mut self) -> Option<&mut rtp::Packet> {
        match self {
            Self::Srtp(p) | Self::Rtp(p) => Some(p),
            Self::Audio(a) => Some(&mut a.rtp),
            Self::Video(v) => Some(&mut v.rtp),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Raw(_) => "raw",
            Self::SrtpProtocol(_) => "srtp-protocol",
            Self::Srtp(_) => "srtp",
            Self::Srtcp(_) => "srtcp",
            Self::Rtp(_) => "rtp",
            Self::Audio(_) => "audio",
            Self::Video(_) => "video",
            Self::RtcpCompound(_) => "rtcp-compound",
            Self::Rtcp(_) => "rtcp",
        }
    }
}

/// A packet plus its receive time and an append-only timeline of the
/// pipeline stages it has passed, used for post-mortem diagnostics.
#[derive(Debug, Clone)]
pub struct PacketInfo {
    pub packet: Packet,
    pub received: Instant,
    timeline: Vec<(Cow<'static, str>, Instant)>,
    /// Clone of an earlier wire form, kept by the snapshot node so parse
    /// failures can dump what was actually on the wire.
    pub pre_parse_snapshot: Option<BytesMut>,
}

impl PacketInfo {
    pub fn new(packet: Packet) -> Self {
        Self::with_received(packet, Instant::now())
    }

    pub fn with_received(packet: Packet, received: Instant) -> Self {
        Self {
            packet,
            received,
            timeline: Vec::new(),
            pre_parse_snapshot: None,
        }
    }

    pub fn note(&mut self, label: impl Into<Cow<'static, str>>) {
        self.timeline.push((label.into(), Instant::now()));
    }

    pub fn timeline(&self) -> &[(Cow<'static, str>, Instant)] {
        &self.timeline
    }

    pub fn size(&self) -> usize {
        self.packet.size()
    }

    /// A sibling produced by splitting this packet: same receive time, a
    /// copy of the timeline up to the split point.
    pub fn split_sibling(&self, packet: Packet) -> Self {
        Self {
            packet,
            received: self.received,
            timeline: self.timeline.clone(),
            pre_parse_snapshot: None,
        }
    }
}
