//! A parsed RTCP element as a tagged variant.

use crate::goodbye::Goodbye;
use crate::header::*;
use crate::payload_feedbacks::full_intra_request::FullIntraRequest;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use crate::receiver_report::ReceiverReport;
use crate::sender_report::SenderReport;
use crate::source_description::SourceDescription;
use crate::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use crate::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use shared::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    SenderReport(SenderReport),
    ReceiverReport(ReceiverReport),
    SourceDescription(SourceDescription),
    Goodbye(Goodbye),
    TransportLayerNack(TransportLayerNack),
    TransportLayerCc(TransportLayerCc),
    PictureLossIndication(PictureLossIndication),
    FullIntraRequest(FullIntraRequest),
    ReceiverEstimatedMaximumBitrate(ReceiverEstimatedMaximumBitrate),
    /// Anything this crate does not model; kept whole for forwarding.
    Unknown { header: Header, raw: Vec<u8> },
}

impl Packet {
    /// Parses one compound element (header included).
    pub fn parse(element: &[u8]) -> Result<Self> {
        let header = Header::parse(element)?;
        if element.len() < header.packet_len() {
            return Err(Error::ErrBadRtcpLength);
        }
        let body = &element[4..header.packet_len()];

        Ok(match (header.packet_type, header.count) {
            (TYPE_SENDER_REPORT, _) => Self::SenderReport(SenderReport::parse(&header, body)?),
            (TYPE_RECEIVER_REPORT, _) => {
                Self::ReceiverReport(ReceiverReport::parse(&header, body)?)
            }
            (TYPE_SOURCE_DESCRIPTION, count) => {
                Self::SourceDescription(SourceDescription::parse(count, body)?)
            }
            (TYPE_GOODBYE, count) => Self::Goodbye(Goodbye::parse(count, body)?),
            (TYPE_TRANSPORT_FEEDBACK, FORMAT_NACK) => {
                Self::TransportLayerNack(TransportLayerNack::parse(body)?)
            }
            (TYPE_TRANSPORT_FEEDBACK, FORMAT_TCC) => {
                Self::TransportLayerCc(TransportLayerCc::parse(body)?)
            }
            (TYPE_PAYLOAD_FEEDBACK, FORMAT_PLI) => {
                Self::PictureLossIndication(PictureLossIndication::parse(body)?)
            }
            (TYPE_PAYLOAD_FEEDBACK, FORMAT_FIR) => {
                Self::FullIntraRequest(FullIntraRequest::parse(body)?)
            }
            (TYPE_PAYLOAD_FEEDBACK, FORMAT_REMB)
                if body.len() >= 12 && &body[8..12] == b"REMB" =>
            {
                Self::ReceiverEstimatedMaximumBitrate(ReceiverEstimatedMaximumBitrate::parse(
                    body,
                )?)
            }
            _ => Self::Unknown {
                header,
                raw: element[..header.packet_len()].to_vec(),
            },
        })
    }

    /// Serializes the kinds the engine originates or relays whole. Parsed
    /// kinds the engine only terminates have no marshal path.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        match self {
            Self::ReceiverReport(rr) => Ok(rr.marshal()),
            Self::TransportLayerNack(nack) => Ok(nack.marshal()),
            Self::TransportLayerCc(cc) => Ok(cc.marshal()),
            Self::Unknown { raw, .. } => Ok(raw.clone()),
            other => Err(Error::Other(format!(
                "marshal unsupported for {}",
                other.name()
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SenderReport(_) => "SR",
            Self::ReceiverReport(_) => "RR",
            Self::SourceDescription(_) => "SDES",
            Self::Goodbye(_) => "BYE",
            Self::TransportLayerNack(_) => "NACK",
            Self::TransportLayerCc(_) => "TCC",
            Self::PictureLossIndication(_) => "PLI",
            Self::FullIntraRequest(_) => "FIR",
            Self::ReceiverEstimatedMaximumBitrate(_) => "REMB",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }
}
