//! RTCP Goodbye (BYE), RFC 3550 section 6.6.

use shared::error::{Error, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Goodbye {
    pub sources: Vec<u32>,
    pub reason: Vec<u8>,
}

impl Goodbye {
    pub fn parse(count: u8, body: &[u8]) -> Result<Self> {
        let sources_len = count as usize * 4;
        if body.len() < sources_len {
            return Err(Error::ErrBadRtcpLength);
        }
        let sources = body[..sources_len]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let mut reason = Vec::new();
        if let Some(&len) = body.get(sources_len) {
            let start = sources_len + 1;
            let end = start + len as usize;
            if body.len() < end {
                return Err(Error::ErrBadRtcpLength);
            }
            reason = body[start..end].to_vec();
        }

        Ok(Self { sources, reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_reason() {
        let mut body = Vec::new();
        body.extend_from_slice(&0x1u32.to_be_bytes());
        body.extend_from_slice(&0x2u32.to_be_bytes());
        body.push(4);
        body.extend_from_slice(b"done");
        let bye = Goodbye::parse(2, &body).unwrap();
        assert_eq!(bye.sources, vec![1, 2]);
        assert_eq!(bye.reason, b"done");
    }
}
