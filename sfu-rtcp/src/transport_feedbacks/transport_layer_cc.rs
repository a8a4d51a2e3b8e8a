//! Transport-wide congestion-control feedback,
//! draft-holmer-rmcat-transport-wide-cc-extensions-01.

use crate::header::{Header, FORMAT_TCC, TYPE_TRANSPORT_FEEDBACK};
use shared::error::{Error, Result};

/// Scale of the receive deltas, 250 microseconds.
pub const DELTA_SCALE_MICROS: i64 = 250;

/// Scale of the reference time field, 64 milliseconds.
pub const REFERENCE_TIME_MICROS: i64 = 64_000;

/// Maximum run length a run-length chunk can carry (13 bits).
pub const MAX_RUN_LENGTH: usize = 0x1FFF;

/// Symbols a two-bit status vector chunk can carry.
pub const MAX_TWO_BIT_SYMBOLS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatusSymbol {
    NotReceived,
    ReceivedSmallDelta,
    ReceivedLargeDelta,
}

impl PacketStatusSymbol {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            1 => Self::ReceivedSmallDelta,
            2 => Self::ReceivedLargeDelta,
            _ => Self::NotReceived,
        }
    }

    fn bits(self) -> u16 {
        match self {
            Self::NotReceived => 0,
            Self::ReceivedSmallDelta => 1,
            Self::ReceivedLargeDelta => 2,
        }
    }

    pub fn received(self) -> bool {
        !matches!(self, Self::NotReceived)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketStatusChunk {
    /// One symbol repeated up to 8191 times.
    RunLength {
        symbol: PacketStatusSymbol,
        run_length: u16,
    },
    /// Up to seven explicit two-bit symbols.
    StatusVector { symbols: Vec<PacketStatusSymbol> },
}

impl PacketStatusChunk {
    pub fn symbol_count(&self) -> usize {
        match self {
            Self::RunLength { run_length, .. } => *run_length as usize,
            Self::StatusVector { symbols } => symbols.len(),
        }
    }

    fn marshal(&self) -> u16 {
        match self {
            Self::RunLength { symbol, run_length } => {
                (symbol.bits() << 13) | (run_length & 0x1FFF)
            }
            Self::StatusVector { symbols } => {
                let mut word = (1 << 15) | (1 << 14);
                for (i, symbol) in symbols.iter().enumerate() {
                    word |= symbol.bits() << (12 - 2 * i);
                }
                word
            }
        }
    }

    fn parse(word: u16) -> Self {
        if word & (1 << 15) == 0 {
            return Self::RunLength {
                symbol: PacketStatusSymbol::from_bits(word >> 13),
                run_length: word & 0x1FFF,
            };
        }
        if word & (1 << 14) == 0 {
            // One-bit vector: 14 symbols, 1 = received with small delta
            let symbols = (0..14)
                .map(|i| {
                    if word & (1 << (13 - i)) != 0 {
                        PacketStatusSymbol::ReceivedSmallDelta
                    } else {
                        PacketStatusSymbol::NotReceived
                    }
                })
                .collect();
            Self::StatusVector { symbols }
        } else {
            let symbols = (0..MAX_TWO_BIT_SYMBOLS)
                .map(|i| PacketStatusSymbol::from_bits(word >> (12 - 2 * i)))
                .collect();
            Self::StatusVector { symbols }
        }
    }
}

/// One receive delta in units of 250 microseconds. Small deltas marshal to
/// one unsigned byte, large deltas to a signed 16-bit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvDelta {
    pub symbol: PacketStatusSymbol,
    /// Delta in microseconds; always a multiple of [`DELTA_SCALE_MICROS`].
    pub delta_micros: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportLayerCc {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub base_sequence_number: u16,
    pub packet_status_count: u16,
    /// Arrival time of the base packet in 64 ms units.
    pub reference_time: u32,
    pub fb_pkt_count: u8,
    pub packet_chunks: Vec<PacketStatusChunk>,
    pub recv_deltas: Vec<RecvDelta>,
}

impl TransportLayerCc {
    /// Expands the chunk list into one symbol per tracked packet.
    pub fn symbol_list(&self) -> Vec<PacketStatusSymbol> {
        let mut symbols = Vec::with_capacity(self.packet_status_count as usize);
        for chunk in &self.packet_chunks {
            match chunk {
                PacketStatusChunk::RunLength { symbol, run_length } => {
                    symbols.extend(std::iter::repeat(*symbol).take(*run_length as usize));
                }
                PacketStatusChunk::StatusVector { symbols: s } => symbols.extend_from_slice(s),
            }
        }
        symbols.truncate(self.packet_status_count as usize);
        symbols
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut deltas = Vec::new();
        for delta in &self.recv_deltas {
            let scaled = delta.delta_micros / DELTA_SCALE_MICROS;
            match delta.symbol {
                PacketStatusSymbol::ReceivedSmallDelta => deltas.push(scaled as u8),
                PacketStatusSymbol::ReceivedLargeDelta => {
                    deltas.extend_from_slice(&(scaled as i16).to_be_bytes())
                }
                PacketStatusSymbol::NotReceived => {}
            }
        }

        // Trailing zeros square the length up to a word boundary; the
        // status count tells the parser where real deltas end, so the
        // padding bit stays clear
        let unpadded = 4 + 8 + 8 + self.packet_chunks.len() * 2 + deltas.len();
        let padded = (unpadded + 3) & !3;
        let header = Header {
            padding: false,
            count: FORMAT_TCC,
            packet_type: TYPE_TRANSPORT_FEEDBACK,
            length: (padded / 4 - 1) as u16,
        };

        let mut out = Vec::with_capacity(padded);
        header.marshal_into(&mut out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
        out.extend_from_slice(&self.base_sequence_number.to_be_bytes());
        out.extend_from_slice(&self.packet_status_count.to_be_bytes());
        out.extend_from_slice(&self.reference_time.to_be_bytes()[1..]);
        out.push(self.fb_pkt_count);
        for chunk in &self.packet_chunks {
            out.extend_from_slice(&chunk.marshal().to_be_bytes());
        }
        out.extend_from_slice(&deltas);
        out.resize(padded, 0);
        out
    }

    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 16 {
            return Err(Error::ErrBadRtcpLength);
        }
        let sender_ssrc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let media_ssrc = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
        let base_sequence_number = u16::from_be_bytes([body[8], body[9]]);
        let packet_status_count = u16::from_be_bytes([body[10], body[11]]);
        let reference_time = u32::from_be_bytes([0, body[12], body[13], body[14]]);
        let fb_pkt_count = body[15];

        let mut offset = 16;
        let mut packet_chunks = Vec::new();
        let mut symbols_seen = 0usize;
        while symbols_seen < packet_status_count as usize {
            if body.len() < offset + 2 {
                return Err(Error::ErrBadRtcpLength);
            }
            let chunk = PacketStatusChunk::parse(u16::from_be_bytes([
                body[offset],
                body[offset + 1],
            ]));
            offset += 2;
            symbols_seen += chunk.symbol_count();
            packet_chunks.push(chunk);
        }

        let mut symbols = Vec::with_capacity(packet_status_count as usize);
        for chunk in &packet_chunks {
            match chunk {
                PacketStatusChunk::RunLength { symbol, run_length } => {
                    symbols.extend(std::iter::repeat(*symbol).take(*run_length as usize))
                }
                PacketStatusChunk::StatusVector { symbols: s } => symbols.extend_from_slice(s),
            }
        }
        symbols.truncate(packet_status_count as usize);

        let mut recv_deltas = Vec::new();
        for symbol in symbols {
            match symbol {
                PacketStatusSymbol::ReceivedSmallDelta => {
                    let Some(&b) = body.get(offset) else {
                        return Err(Error::ErrBadRtcpLength);
                    };
                    offset += 1;
                    recv_deltas.push(RecvDelta {
                        symbol,
                        delta_micros: b as i64 * DELTA_SCALE_MICROS,
                    });
                }
                PacketStatusSymbol::ReceivedLargeDelta => {
                    if body.len() < offset + 2 {
                        return Err(Error::ErrBadRtcpLength);
                    }
                    let v = i16::from_be_bytes([body[offset], body[offset + 1]]);
                    offset += 2;
                    recv_deltas.push(RecvDelta {
                        symbol,
                        delta_micros: v as i64 * DELTA_SCALE_MICROS,
                    });
                }
                PacketStatusSymbol::NotReceived => {}
            }
        }

        Ok(Self {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count,
            packet_chunks,
            recv_deltas,
        })
    }
}
