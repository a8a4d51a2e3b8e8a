use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("packet too short: {0} bytes")]
    ErrPacketTooShort(usize),
    #[error("bad RTP version")]
    ErrBadVersion,
    #[error("bad RTCP packet type {0}")]
    ErrBadRtcpPacketType(u8),
    #[error("RTCP length field exceeds buffer")]
    ErrBadRtcpLength,
    #[error("header extension malformed")]
    ErrBadHeaderExtension,
    #[error("RTX payload carries no original sequence number")]
    ErrRtxPayloadTooShort,
    #[error("padding length exceeds payload")]
    ErrBadPadding,

    #[error("attach is not supported on a demuxer node")]
    ErrAttachOnDemuxer,
    #[error("packet path is missing a {0}")]
    ErrIncompletePacketPath(&'static str),
    #[error("pipeline is empty")]
    ErrEmptyPipeline,

    #[error("keying material too short for profile")]
    ErrKeyingMaterialTooShort,
    #[error("unsupported SRTP protection profile")]
    ErrUnsupportedProfile,

    #[error("queue full")]
    ErrQueueFull,
    #[error("transceiver already stopped")]
    ErrAlreadyStopped,

    #[error("{0}")]
    Other(String),
}
