//! Control-plane events broadcast to every node of a pipeline graph.
//!
//! Events carry configuration only, never per-packet data. A node that
//! cares about an event copies what it needs into its own state, so the
//! packet path never consults shared maps.

use shared::{PayloadType, Ssrc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

/// A negotiated RTP payload format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFormat {
    /// Encoding name as negotiated, e.g. "opus", "VP8", "rtx".
    pub encoding: String,
    pub media_type: MediaType,
    pub clock_rate: u32,
}

impl MediaFormat {
    pub fn new(encoding: impl Into<String>, media_type: MediaType, clock_rate: u32) -> Self {
        Self {
            encoding: encoding.into(),
            media_type,
            clock_rate,
        }
    }

    pub fn is_rtx(&self) -> bool {
        self.encoding.eq_ignore_ascii_case("rtx")
    }
}

/// Header extensions the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RtpExtensionKind {
    /// RFC 6464 client-to-mixer audio level.
    AudioLevel,
    /// Transport-wide congestion control sequence number.
    TransportCc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SsrcAssociationKind {
    /// Retransmission stream (RFC 4588 FID group).
    Fid,
    /// Forward error correction stream.
    Fec,
}

/// Links a secondary SSRC (RTX, FEC) to the primary stream it protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsrcAssociation {
    pub primary: Ssrc,
    pub secondary: Ssrc,
    pub kind: SsrcAssociationKind,
}

/// One negotiated send or receive encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpEncoding {
    pub ssrc: Ssrc,
    pub rtx_ssrc: Option<Ssrc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransceiverEvent {
    RtpPayloadTypeAdded {
        payload_type: PayloadType,
        format: MediaFormat,
    },
    RtpPayloadTypesCleared,
    RtpExtensionAdded {
        id: u8,
        kind: RtpExtensionKind,
    },
    RtpExtensionsCleared,
    ReceiveSsrcAdded {
        ssrc: Ssrc,
        media_type: MediaType,
    },
    ReceiveSsrcRemoved {
        ssrc: Ssrc,
    },
    SsrcAssociationAdded(SsrcAssociation),
    RtpEncodingsUpdated {
        encodings: Vec<RtpEncoding>,
    },
}
