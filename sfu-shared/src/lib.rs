#![warn(rust_2018_idioms)]

pub mod error;
pub mod time;
pub mod util;

/// SSRC represents a synchronization source.
/// A synchronization source is a randomly chosen
/// value meant to be globally unique within a particular
/// RTP session. Used to identify a single stream of media.
/// <https://tools.ietf.org/html/rfc3550#section-3>
pub type Ssrc = u32;

/// PayloadType identifies the format of the RTP payload and determines
/// its interpretation by the application.
/// <https://tools.ietf.org/html/rfc3550#section-3>
pub type PayloadType = u8;
