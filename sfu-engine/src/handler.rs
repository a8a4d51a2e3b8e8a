//! The pluggable handler slots at the pipeline tails. The hosting SFU
//! installs a function to receive fully-parsed packets; the slot can be
//! rebound at any time and the packet path always sees either the old or
//! the new handler, never a torn state.

use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::PacketInfo;
use std::sync::{Arc, Mutex};

/// A batch consumer installed by the hosting SFU.
pub type PacketHandler = Arc<dyn Fn(Vec<PacketInfo>) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct HandlerSlot(Arc<Mutex<Option<PacketHandler>>>);

impl HandlerSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, handler: PacketHandler) {
        *self.0.lock().unwrap() = Some(handler);
    }

    fn get(&self) -> Option<PacketHandler> {
        self.0.lock().unwrap().clone()
    }
}

/// Terminal node handing batches to the installed handler. Packets that
/// arrive while no handler is installed are dropped and counted.
pub(crate) struct HandlerNode {
    slot: HandlerSlot,
    num_dropped_no_handler: u64,
}

impl HandlerNode {
    pub(crate) fn new(slot: HandlerSlot) -> Self {
        Self {
            slot,
            num_dropped_no_handler: 0,
        }
    }
}

impl PacketProcessor for HandlerNode {
    fn process_packet(&mut self, packet: PacketInfo, out: &mut Vec<PacketInfo>) {
        self.process_batch(vec![packet], out);
    }

    fn process_batch(&mut self, batch: Vec<PacketInfo>, _out: &mut Vec<PacketInfo>) {
        match self.slot.get() {
            Some(handler) => handler(batch),
            None => self.num_dropped_no_handler += batch.len() as u64,
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("packets dropped (no handler)", self.num_dropped_no_handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::packet::Packet;
    use bytes::BytesMut;

    #[test]
    fn test_rebind_takes_effect() {
        let slot = HandlerSlot::new();
        let node = Node::new("handler", HandlerNode::new(slot.clone()));

        // No handler yet: dropped with counter
        node.process_packets(vec![PacketInfo::new(Packet::Raw(BytesMut::new()))]);

        let first: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        {
            let first = first.clone();
            slot.set(Arc::new(move |batch| {
                *first.lock().unwrap() += batch.len() as u32;
            }));
        }
        node.process_packets(vec![PacketInfo::new(Packet::Raw(BytesMut::new()))]);
        assert_eq!(*first.lock().unwrap(), 1);

        let second: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        {
            let second = second.clone();
            slot.set(Arc::new(move |batch| {
                *second.lock().unwrap() += batch.len() as u32;
            }));
        }
        node.process_packets(vec![PacketInfo::new(Packet::Raw(BytesMut::new()))]);
        assert_eq!(*first.lock().unwrap(), 1);
        assert_eq!(*second.lock().unwrap(), 1);
    }
}
