//! Per-node counters and the recursive stats tree.

use super::{Node, NodeKind};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

/// Counters the framework maintains for every node. All counters are
/// monotonic.
#[derive(Debug, Default, Clone)]
pub struct NodeStats {
    pub num_input_packets: u64,
    pub num_output_packets: u64,
    /// Input bytes only; fan-out does not inflate this.
    pub num_bytes: u64,
    pub first_packet_time: Option<Instant>,
    pub last_packet_time: Option<Instant>,
    pub total_processing_duration: Duration,
}

impl NodeStats {
    /// Bytes over elapsed wall-clock time between first and last packet.
    pub fn wall_clock_throughput_bps(&self) -> f64 {
        match (self.first_packet_time, self.last_packet_time) {
            (Some(first), Some(last)) if last > first => {
                self.num_bytes as f64 * 8.0 / (last - first).as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// Bytes over time actually spent inside this node.
    pub fn module_throughput_bps(&self) -> f64 {
        let busy = self.total_processing_duration.as_secs_f64();
        if busy > 0.0 {
            self.num_bytes as f64 * 8.0 / busy
        } else {
            0.0
        }
    }
}

/// One labeled block of the recursive stats tree.
#[derive(Debug, Clone)]
pub struct NodeStatsBlock {
    /// Node name plus an identity suffix, so duplicate names stay distinct.
    pub name: String,
    pub stats: NodeStats,
    /// Processor-specific counters.
    pub extras: Vec<(String, String)>,
    pub children: Vec<NodeStatsBlock>,
}

impl NodeStatsBlock {
    pub fn add_stat(&mut self, key: impl Into<String>, value: impl ToString) {
        self.extras.push((key.into(), value.to_string()));
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        writeln!(f, "{pad}{}:", self.name)?;
        writeln!(
            f,
            "{pad}  packets in/out: {}/{}, bytes: {}",
            self.stats.num_input_packets, self.stats.num_output_packets, self.stats.num_bytes
        )?;
        writeln!(
            f,
            "{pad}  throughput: {:.0} bps wall-clock, {:.0} bps module",
            self.stats.wall_clock_throughput_bps(),
            self.stats.module_throughput_bps()
        )?;
        for (key, value) in &self.extras {
            writeln!(f, "{pad}  {key}: {value}")?;
        }
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeStatsBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// Builds the stats tree rooted at `node`. A node reached twice (fan-in,
/// or a cycle in a malformed graph) is emitted once; later sightings
/// become reference-only children.
pub fn collect_stats(node: &Node) -> NodeStatsBlock {
    let mut visited = HashSet::new();
    collect_inner(node, &mut visited)
}

fn collect_inner(node: &Node, visited: &mut HashSet<usize>) -> NodeStatsBlock {
    let id = node.id();
    let inner = node.0.lock().unwrap();
    let name = format!("{}#{:04x}", inner.name, id & 0xFFFF);

    if !visited.insert(id) {
        return NodeStatsBlock {
            name: format!("{name} (shared)"),
            stats: NodeStats::default(),
            extras: Vec::new(),
            children: Vec::new(),
        };
    }

    let mut block = NodeStatsBlock {
        name,
        stats: inner.stats.clone(),
        extras: Vec::new(),
        children: Vec::new(),
    };

    match &inner.kind {
        NodeKind::Processor(processor) => {
            processor.append_stats(&mut block);
            let next = inner.next.clone();
            drop(inner);
            if let Some(next) = next {
                block.children.push(collect_inner(&next, visited));
            }
        }
        NodeKind::Demuxer { paths, num_dropped } => {
            block.add_stat("packets dropped (no path)", num_dropped);
            let heads: Vec<(String, Node)> = paths
                .iter()
                .map(|p| (p.name.clone(), p.head.clone()))
                .collect();
            drop(inner);
            for (path_name, head) in heads {
                let mut child = collect_inner(&head, visited);
                child.name = format!("[{path_name}] {}", child.name);
                block.children.push(child);
            }
        }
    }

    block
}
