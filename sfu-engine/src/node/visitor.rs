//! Graph traversal. Both directions carry a visited set keyed by node
//! identity so traversal terminates even on a cyclic graph and visits
//! each node exactly once.

use super::{Node, NodeKind};
use crate::event::TransceiverEvent;
use std::collections::HashSet;

fn successors(node: &Node) -> Vec<Node> {
    let inner = node.0.lock().unwrap();
    match &inner.kind {
        NodeKind::Processor(_) => inner.next.iter().cloned().collect(),
        NodeKind::Demuxer { paths, .. } => paths.iter().map(|p| p.head.clone()).collect(),
    }
}

fn predecessors(node: &Node) -> Vec<Node> {
    let inner = node.0.lock().unwrap();
    inner
        .inputs
        .iter()
        .filter_map(|w| w.upgrade())
        .map(Node)
        .collect()
}

/// Pre-order traversal along forward edges; demuxer branches in
/// declaration order.
pub fn visit_forward(start: &Node, visitor: &mut dyn FnMut(&Node)) {
    let mut visited = HashSet::new();
    forward_inner(start, visitor, &mut visited);
}

fn forward_inner(node: &Node, visitor: &mut dyn FnMut(&Node), visited: &mut HashSet<usize>) {
    if !visited.insert(node.id()) {
        return;
    }
    visitor(node);
    for next in successors(node) {
        forward_inner(&next, visitor, visited);
    }
}

/// Post-order traversal along back-edges: inputs first, then the node.
/// Used on outgoing trees that fan in.
pub fn visit_reverse(start: &Node, visitor: &mut dyn FnMut(&Node)) {
    let mut visited = HashSet::new();
    reverse_inner(start, visitor, &mut visited);
}

fn reverse_inner(node: &Node, visitor: &mut dyn FnMut(&Node), visited: &mut HashSet<usize>) {
    if !visited.insert(node.id()) {
        return;
    }
    for input in predecessors(node) {
        reverse_inner(&input, visitor, visited);
    }
    visitor(node);
}

/// Delivers one event to every node reachable from `root`. Synchronous:
/// on return every node has observed the event.
pub fn broadcast_event(root: &Node, event: &TransceiverEvent) {
    visit_forward(root, &mut |node| node.handle_event_local(event));
}

/// Stops background work in every node reachable from `root`.
pub fn stop_graph(root: &Node) {
    visit_forward(root, &mut |node| node.stop_local());
}
