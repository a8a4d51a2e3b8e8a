//! Endpoint connection statistics derived from the SR/RR exchange.
//!
//! RTT follows RFC 3550 section 6.4.1: a receiver report echoes the
//! compact NTP timestamp of the last sender report it saw (LSR) and the
//! delay since then (DLSR); `rtt = now - lsr - dlsr` in 1/65536-second
//! units, valid when the echoed SR left this endpoint's clock.

use super::RtcpListener;
use shared::time::NtpAnchor;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Default)]
struct ConnectionStatsInner {
    rtt_ms: Option<f64>,
    num_received_sr: u64,
    num_received_rr: u64,
}

pub struct EndpointConnectionStats {
    anchor: NtpAnchor,
    inner: Mutex<ConnectionStatsInner>,
}

impl Default for EndpointConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointConnectionStats {
    pub fn new() -> Self {
        Self {
            anchor: NtpAnchor::now(),
            inner: Mutex::new(ConnectionStatsInner::default()),
        }
    }

    #[cfg(test)]
    fn with_anchor(anchor: NtpAnchor) -> Self {
        Self {
            anchor,
            inner: Mutex::new(ConnectionStatsInner::default()),
        }
    }

    /// Smoothed round-trip time, if any RR has carried usable LSR/DLSR.
    pub fn rtt_ms(&self) -> Option<f64> {
        self.inner.lock().unwrap().rtt_ms
    }

    fn note_reception_report(&self, report: &rtcp::reception_report::ReceptionReport, now: Instant) {
        if report.last_sender_report == 0 {
            return;
        }
        let now_compact = self.anchor.compact_ntp(now);
        let rtt_units = now_compact
            .wrapping_sub(report.last_sender_report)
            .wrapping_sub(report.delay);
        // Reject wrapped / nonsense results beyond a minute
        if rtt_units > 60 * 65536 {
            return;
        }
        let rtt_ms = rtt_units as f64 * 1000.0 / 65536.0;
        self.inner.lock().unwrap().rtt_ms = Some(rtt_ms);
    }
}

impl RtcpListener for EndpointConnectionStats {
    fn on_rtcp_received(&self, packet: &rtcp::Packet, received: Instant) {
        match packet {
            rtcp::Packet::SenderReport(sr) => {
                let mut inner = self.inner.lock().unwrap();
                inner.num_received_sr += 1;
                drop(inner);
                for report in &sr.reports {
                    self.note_reception_report(report, received);
                }
            }
            rtcp::Packet::ReceiverReport(rr) => {
                self.inner.lock().unwrap().num_received_rr += 1;
                for report in &rr.reports {
                    self.note_reception_report(report, received);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtcp::receiver_report::ReceiverReport;
    use rtcp::reception_report::ReceptionReport;
    use std::time::Duration;

    #[test]
    fn test_rtt_from_rr_echo() {
        let anchor = NtpAnchor::now();
        let stats = EndpointConnectionStats::with_anchor(anchor);

        // Pretend we sent an SR at t0 and the peer echoes it in an RR that
        // arrives 80 ms later having been held 30 ms (DLSR): RTT = 50 ms.
        let t0 = Instant::now();
        let lsr = anchor.compact_ntp(t0);
        let dlsr = (0.030f64 * 65536.0) as u32;

        let rr = ReceiverReport {
            ssrc: 1,
            reports: vec![ReceptionReport {
                ssrc: 2,
                last_sender_report: lsr,
                delay: dlsr,
                ..Default::default()
            }],
        };
        stats.on_rtcp_received(
            &rtcp::Packet::ReceiverReport(rr),
            t0 + Duration::from_millis(80),
        );

        let rtt = stats.rtt_ms().expect("rtt computed");
        assert!((rtt - 50.0).abs() < 2.0, "rtt {rtt} ms");
    }

    #[test]
    fn test_no_rtt_without_lsr() {
        let stats = EndpointConnectionStats::new();
        let rr = ReceiverReport {
            ssrc: 1,
            reports: vec![ReceptionReport::default()],
        };
        stats.on_rtcp_received(&rtcp::Packet::ReceiverReport(rr), Instant::now());
        assert!(stats.rtt_ms().is_none());
    }
}
