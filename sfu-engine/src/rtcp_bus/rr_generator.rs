//! Periodic receiver-report generation from the incoming statistics
//! tracker. Also feeds sender-report timing into the tracker so DLSR
//! fields are meaningful.

use super::{RtcpListener, RtcpSender};
use crate::rx::IncomingStatisticsTracker;
use rtcp::receiver_report::ReceiverReport;
use shared::time::compact_ntp;
use std::sync::Arc;
use std::time::Instant;

pub(crate) struct ReceiverReportGenerator {
    tracker: Arc<IncomingStatisticsTracker>,
    rtcp_sender: RtcpSender,
    receiver_ssrc: u32,
}

impl ReceiverReportGenerator {
    pub(crate) fn new(tracker: Arc<IncomingStatisticsTracker>, rtcp_sender: RtcpSender) -> Self {
        Self {
            tracker,
            rtcp_sender,
            receiver_ssrc: rand::random::<u32>(),
        }
    }

    /// Emits one RR per tracked receive SSRC.
    pub(crate) fn tick(&self, now: Instant) {
        for report in self.tracker.generate_reports(now) {
            let rr = ReceiverReport {
                ssrc: self.receiver_ssrc,
                reports: vec![report],
            };
            (self.rtcp_sender)(rtcp::Packet::ReceiverReport(rr));
        }
    }
}

impl RtcpListener for ReceiverReportGenerator {
    fn on_rtcp_received(&self, packet: &rtcp::Packet, received: Instant) {
        if let rtcp::Packet::SenderReport(sr) = packet {
            self.tracker
                .note_sender_report(sr.ssrc, compact_ntp(sr.ntp_time), received);
        }
    }
}
