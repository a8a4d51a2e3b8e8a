//! Terminal node: non-blocking put into the bounded outgoing queue the
//! transport layer drains. A full queue drops and counts.

use crate::node::{NodeStatsBlock, PacketProcessor};
use crate::packet::PacketInfo;
use crossbeam_channel::{Sender, TrySendError};
use log::trace;

pub(crate) struct OutgoingQueue {
    queue: Sender<PacketInfo>,
    num_dropped_full: u64,
}

impl OutgoingQueue {
    pub(crate) fn new(queue: Sender<PacketInfo>) -> Self {
        Self {
            queue,
            num_dropped_full: 0,
        }
    }
}

impl PacketProcessor for OutgoingQueue {
    fn process_packet(&mut self, mut packet: PacketInfo, _out: &mut Vec<PacketInfo>) {
        packet.note("entered outgoing queue");
        match self.queue.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.num_dropped_full += 1;
                trace!("outgoing queue full, dropping packet");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn append_stats(&self, block: &mut NodeStatsBlock) {
        block.add_stat("packets dropped (queue full)", self.num_dropped_full);
    }
}
