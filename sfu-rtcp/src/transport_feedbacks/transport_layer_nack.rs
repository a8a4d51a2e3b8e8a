//! Generic NACK transport-layer feedback, RFC 4585 section 6.2.1.

use crate::header::{Header, FORMAT_NACK, TYPE_TRANSPORT_FEEDBACK};
use shared::error::{Error, Result};

/// One PID/BLP pair covering up to 17 sequence numbers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NackPair {
    pub packet_id: u16,
    pub lost_packets: u16,
}

impl NackPair {
    /// Every sequence number this pair requests.
    pub fn packet_list(&self) -> Vec<u16> {
        let mut seqs = vec![self.packet_id];
        for i in 0..16 {
            if self.lost_packets & (1 << i) != 0 {
                seqs.push(self.packet_id.wrapping_add(i + 1));
            }
        }
        seqs
    }
}

/// Packs a sorted run of sequence numbers into PID/BLP pairs.
pub fn nack_pairs_from_sequence_numbers(seqs: &[u16]) -> Vec<NackPair> {
    let mut pairs: Vec<NackPair> = Vec::new();
    for &seq in seqs {
        match pairs.last_mut() {
            Some(pair) => {
                let distance = seq.wrapping_sub(pair.packet_id);
                if distance != 0 && distance <= 16 {
                    pair.lost_packets |= 1 << (distance - 1);
                    continue;
                }
                if distance == 0 {
                    continue;
                }
                pairs.push(NackPair {
                    packet_id: seq,
                    lost_packets: 0,
                });
            }
            None => pairs.push(NackPair {
                packet_id: seq,
                lost_packets: 0,
            }),
        }
    }
    pairs
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportLayerNack {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub nacks: Vec<NackPair>,
}

impl TransportLayerNack {
    pub fn parse(body: &[u8]) -> Result<Self> {
        if body.len() < 8 || (body.len() - 8) % 4 != 0 {
            return Err(Error::ErrBadRtcpLength);
        }
        let sender_ssrc = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        let media_ssrc = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
        let nacks = body[8..]
            .chunks_exact(4)
            .map(|c| NackPair {
                packet_id: u16::from_be_bytes([c[0], c[1]]),
                lost_packets: u16::from_be_bytes([c[2], c[3]]),
            })
            .collect();
        Ok(Self {
            sender_ssrc,
            media_ssrc,
            nacks,
        })
    }

    pub fn marshal(&self) -> Vec<u8> {
        let body_len = 8 + self.nacks.len() * 4;
        let header = Header {
            padding: false,
            count: FORMAT_NACK,
            packet_type: TYPE_TRANSPORT_FEEDBACK,
            length: ((4 + body_len) / 4 - 1) as u16,
        };
        let mut out = Vec::with_capacity(4 + body_len);
        header.marshal_into(&mut out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
        for pair in &self.nacks {
            out.extend_from_slice(&pair.packet_id.to_be_bytes());
            out.extend_from_slice(&pair.lost_packets.to_be_bytes());
        }
        out
    }
}
