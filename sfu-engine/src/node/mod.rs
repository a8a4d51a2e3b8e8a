//! The packet-processing graph: nodes, demultiplexers and traversal.
//!
//! A node owns at most one forward edge (`next`); a demuxer owns an ordered
//! list of predicate-routed branches instead, and refuses `attach`. Nodes
//! are shared handles so a graph can fan in, be visited from the control
//! thread, and be processed from a worker thread; the per-node mutex makes
//! an event application and a packet batch mutually exclusive, which is
//! what keeps configuration views untorn.

mod stats;
mod visitor;

pub use stats::{collect_stats, NodeStats, NodeStatsBlock};
pub use visitor::{broadcast_event, stop_graph, visit_forward, visit_reverse};

use crate::event::TransceiverEvent;
use crate::packet::PacketInfo;
use log::trace;
use shared::error::{Error, Result};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

/// The processing hook a node runs on each batch. The surrounding
/// framework, not the implementation, measures time, bytes and packet
/// counts, so statistics stay uniform across every node.
pub trait PacketProcessor: Send {
    /// Transform one packet into zero or more output packets. Zero means
    /// the packet was dropped or buffered; errors never cross this
    /// boundary.
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>);

    /// Batch hook; the default forwards packet by packet.
    fn process_batch(&mut self, batch: Vec<PacketInfo>, out: &mut Vec<PacketInfo>) {
        for packet in batch {
            self.process_packet(packet, out);
        }
    }

    fn handle_event(&mut self, _event: &TransceiverEvent) {}

    fn stop(&mut self) {}

    /// Contribute processor-specific counters (drops, windows) to the
    /// stats tree.
    fn append_stats(&self, _block: &mut NodeStatsBlock) {}
}

/// One predicate-routed branch of a demuxer.
pub struct ConditionalPacketPath {
    pub(crate) name: String,
    pub(crate) predicate: Box<dyn Fn(&PacketInfo) -> bool + Send>,
    pub(crate) head: Node,
}

impl ConditionalPacketPath {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&PacketInfo) -> bool + Send + 'static,
        head: Node,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            head,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) enum NodeKind {
    Processor(Box<dyn PacketProcessor>),
    Demuxer {
        paths: Vec<ConditionalPacketPath>,
        num_dropped: u64,
    },
}

pub(crate) struct NodeInner {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) next: Option<Node>,
    pub(crate) inputs: Vec<Weak<Mutex<NodeInner>>>,
    pub(crate) stats: NodeStats,
}

/// Shared handle to a node in a pipeline graph.
#[derive(Clone)]
pub struct Node(pub(crate) Arc<Mutex<NodeInner>>);

impl Node {
    pub fn new(name: impl Into<String>, processor: impl PacketProcessor + 'static) -> Self {
        Self(Arc::new(Mutex::new(NodeInner {
            name: name.into(),
            kind: NodeKind::Processor(Box::new(processor)),
            next: None,
            inputs: Vec::new(),
            stats: NodeStats::default(),
        })))
    }

    pub(crate) fn demuxer(name: impl Into<String>, paths: Vec<ConditionalPacketPath>) -> Self {
        Self(Arc::new(Mutex::new(NodeInner {
            name: name.into(),
            kind: NodeKind::Demuxer {
                paths,
                num_dropped: 0,
            },
            next: None,
            inputs: Vec::new(),
            stats: NodeStats::default(),
        })))
    }

    pub fn name(&self) -> String {
        self.0.lock().unwrap().name.clone()
    }

    pub fn is_demuxer(&self) -> bool {
        matches!(self.0.lock().unwrap().kind, NodeKind::Demuxer { .. })
    }

    /// Stable identity used by visitors and stats naming.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub(crate) fn same(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Binds `next` as this node's successor, updating back-edges on both
    /// the old and new target. Demuxers route through their paths instead
    /// and refuse attachment; that is a construction-time programming
    /// error, not a recoverable condition.
    pub fn attach(&self, next: &Node) -> Result<()> {
        let old = {
            let mut inner = self.0.lock().unwrap();
            if matches!(inner.kind, NodeKind::Demuxer { .. }) {
                return Err(Error::ErrAttachOnDemuxer);
            }
            inner.next.replace(next.clone())
        };
        if let Some(old) = old {
            let mut old_inner = old.0.lock().unwrap();
            old_inner
                .inputs
                .retain(|w| w.upgrade().map(|a| !Arc::ptr_eq(&a, &self.0)).unwrap_or(false));
        }
        next.0
            .lock()
            .unwrap()
            .inputs
            .push(Arc::downgrade(&self.0));
        Ok(())
    }

    pub fn next(&self) -> Option<Node> {
        self.0.lock().unwrap().next.clone()
    }

    /// Runs a batch through this node and everything downstream of it.
    /// Forwarding happens outside the node's own lock so a long chain
    /// never holds more than one node locked at a time.
    pub fn process_packets(&self, batch: Vec<PacketInfo>) {
        if batch.is_empty() {
            return;
        }

        let mut dispatch: Vec<(Node, Vec<PacketInfo>)> = Vec::new();
        {
            let mut inner = self.0.lock().unwrap();
            let entered = Instant::now();
            let inner = &mut *inner;

            inner.stats.num_input_packets += batch.len() as u64;
            if inner.stats.first_packet_time.is_none() {
                inner.stats.first_packet_time = Some(entered);
            }
            inner.stats.last_packet_time = Some(entered);

            let mut batch = batch;
            for packet in &mut batch {
                inner.stats.num_bytes += packet.size() as u64;
                packet.note(format!("entered {}", inner.name));
            }

            match &mut inner.kind {
                NodeKind::Processor(processor) => {
                    let mut out = Vec::with_capacity(batch.len());
                    processor.process_batch(batch, &mut out);
                    inner.stats.num_output_packets += out.len() as u64;
                    if let Some(next) = &inner.next {
                        for packet in &mut out {
                            packet.note(format!("exited {}", inner.name));
                        }
                        if !out.is_empty() {
                            dispatch.push((next.clone(), out));
                        }
                    }
                }
                NodeKind::Demuxer { paths, num_dropped } => {
                    let mut routed: Vec<Vec<PacketInfo>> =
                        paths.iter().map(|_| Vec::new()).collect();
                    for mut packet in batch {
                        match paths.iter().position(|path| (path.predicate)(&packet)) {
                            Some(i) => {
                                packet.note(format!("matched path {}", paths[i].name));
                                routed[i].push(packet);
                            }
                            None => {
                                *num_dropped += 1;
                                trace!(
                                    "{}: no path matched {} packet, dropping",
                                    inner.name,
                                    packet.packet.kind()
                                );
                            }
                        }
                    }
                    for (path, packets) in paths.iter().zip(routed) {
                        if !packets.is_empty() {
                            inner.stats.num_output_packets += packets.len() as u64;
                            dispatch.push((path.head.clone(), packets));
                        }
                    }
                }
            }

            inner.stats.total_processing_duration += entered.elapsed();
        }

        for (node, packets) in dispatch {
            node.process_packets(packets);
        }
    }

    pub(crate) fn handle_event_local(&self, event: &TransceiverEvent) {
        let mut inner = self.0.lock().unwrap();
        if let NodeKind::Processor(processor) = &mut inner.kind {
            processor.handle_event(event);
        }
    }

    pub(crate) fn stop_local(&self) {
        let mut inner = self.0.lock().unwrap();
        if let NodeKind::Processor(processor) = &mut inner.kind {
            processor.stop();
        }
    }
}

/// Stateless per-packet transformer, the `simple_node` building block.
pub struct FnProcessor<F>(pub F);

impl<F> PacketProcessor for FnProcessor<F>
where
    F: FnMut(PacketInfo) -> Option<PacketInfo> + Send,
{
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        if let Some(packet) = (self.0)(packet) {
            out.push(packet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use bytes::BytesMut;

    fn raw_info(len: usize) -> PacketInfo {
        PacketInfo::new(Packet::Raw(BytesMut::from(vec![0u8; len].as_slice())))
    }

    fn passthrough(name: &str) -> Node {
        Node::new(name, FnProcessor(Some))
    }

    #[test]
    fn test_stats_measured_by_framework() {
        let a = passthrough("a");
        let b = passthrough("b");
        a.attach(&b).unwrap();

        a.process_packets(vec![raw_info(10), raw_info(20)]);

        let stats_a = a.0.lock().unwrap().stats.clone();
        assert_eq!(stats_a.num_input_packets, 2);
        assert_eq!(stats_a.num_output_packets, 2);
        assert_eq!(stats_a.num_bytes, 30);
        assert!(stats_a.first_packet_time.is_some());

        let stats_b = b.0.lock().unwrap().stats.clone();
        assert_eq!(stats_b.num_input_packets, 2);
    }

    #[test]
    fn test_conservation_on_linear_chain() {
        let a = passthrough("a");
        let b = passthrough("b");
        let c = passthrough("c");
        a.attach(&b).unwrap();
        b.attach(&c).unwrap();

        for _ in 0..5 {
            a.process_packets(vec![raw_info(1)]);
        }

        assert_eq!(a.0.lock().unwrap().stats.num_input_packets, 5);
        assert_eq!(b.0.lock().unwrap().stats.num_input_packets, 5);
        assert_eq!(c.0.lock().unwrap().stats.num_input_packets, 5);
    }

    #[test]
    fn test_timeline_records_traversal() {
        let a = passthrough("first");
        let probe: Arc<Mutex<Vec<PacketInfo>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let probe = probe.clone();
            Node::new(
                "sink",
                FnProcessor(move |p: PacketInfo| {
                    probe.lock().unwrap().push(p);
                    None
                }),
            )
        };
        a.attach(&sink).unwrap();
        a.process_packets(vec![raw_info(4)]);

        let captured = probe.lock().unwrap();
        let labels: Vec<_> = captured[0].timeline().iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(labels, vec!["entered first", "exited first", "entered sink"]);
    }

    #[test]
    fn test_attach_rebind_updates_back_edges() {
        let a = passthrough("a");
        let b = passthrough("b");
        let c = passthrough("c");
        a.attach(&b).unwrap();
        a.attach(&c).unwrap();

        assert!(a.next().unwrap().same(&c));
        assert!(b.0.lock().unwrap().inputs.is_empty());
        assert_eq!(c.0.lock().unwrap().inputs.len(), 1);
    }

    #[test]
    fn test_demuxer_refuses_attach() {
        let d = Node::demuxer(
            "demux",
            vec![ConditionalPacketPath::new("all", |_| true, passthrough("p"))],
        );
        let e = passthrough("e");
        assert_eq!(d.attach(&e), Err(Error::ErrAttachOnDemuxer));
    }

    #[test]
    fn test_demuxer_first_match_wins_and_drops_count() {
        let small = passthrough("small");
        let any = passthrough("any");
        let d = Node::demuxer(
            "demux",
            vec![
                ConditionalPacketPath::new("small", |p: &PacketInfo| p.size() < 10, small.clone()),
                ConditionalPacketPath::new(
                    "medium",
                    |p: &PacketInfo| p.size() < 100,
                    any.clone(),
                ),
            ],
        );

        d.process_packets(vec![raw_info(5), raw_info(50), raw_info(500)]);

        assert_eq!(small.0.lock().unwrap().stats.num_input_packets, 1);
        assert_eq!(any.0.lock().unwrap().stats.num_input_packets, 1);

        let inner = d.0.lock().unwrap();
        assert_eq!(inner.stats.num_input_packets, 3);
        assert_eq!(inner.stats.num_output_packets, 2);
        match &inner.kind {
            NodeKind::Demuxer { num_dropped, .. } => assert_eq!(*num_dropped, 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_drop_in_processor_stops_forwarding() {
        let dropper = Node::new("dropper", FnProcessor(|_| None));
        let sink = passthrough("sink");
        dropper.attach(&sink).unwrap();

        dropper.process_packets(vec![raw_info(8)]);

        let inner = dropper.0.lock().unwrap();
        assert_eq!(inner.stats.num_input_packets, 1);
        assert_eq!(inner.stats.num_output_packets, 0);
        drop(inner);
        assert_eq!(sink.0.lock().unwrap().stats.num_input_packets, 0);
    }
}
