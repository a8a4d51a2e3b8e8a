//! The control hub for parsed RTCP: a synchronous pub/sub the termination
//! node and the sender publish into, plus the subscribers the engine
//! ships (receiver reports, connection stats; the transport-CC engine
//! subscribes from its own module).

mod connection_stats;
mod rr_generator;

pub use connection_stats::EndpointConnectionStats;
pub(crate) use rr_generator::ReceiverReportGenerator;

use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Injects locally generated RTCP into the send pipeline at its RTCP
/// entry.
pub type RtcpSender = Arc<dyn Fn(rtcp::Packet) + Send + Sync>;

/// Receives every parsed RTCP element the engine sees, on the thread that
/// produced it.
pub trait RtcpListener: Send + Sync {
    fn on_rtcp_received(&self, _packet: &rtcp::Packet, _received: Instant) {}
    fn on_rtcp_sent(&self, _packet: &rtcp::Packet) {}
}

/// Synchronous fan-out of RTCP events: delivery completes before the
/// publisher continues, so subscribers observe RTCP in arrival order per
/// direction.
#[derive(Default)]
pub struct RtcpEventNotifier {
    listeners: Mutex<Vec<Arc<dyn RtcpListener>>>,
}

impl RtcpEventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn RtcpListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn publish_received(&self, packet: &rtcp::Packet, received: Instant) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_rtcp_received(packet, received);
        }
    }

    pub fn publish_sent(&self, packet: &rtcp::Packet) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_rtcp_sent(packet);
        }
    }
}
