//! Fluent construction of pipeline graphs.
//!
//! Linear chaining is a left fold over `node` calls keeping a current
//! tail; `demux` installs a demuxer whose branches are themselves built
//! pipelines. A demuxer terminates its chain, since attaching past one is
//! a topology error.

use crate::node::{ConditionalPacketPath, FnProcessor, Node, PacketProcessor};
use crate::packet::PacketInfo;
use shared::error::{Error, Result};

#[derive(Default)]
pub struct PipelineBuilder {
    head: Option<Node>,
    tail: Option<Node>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a processing node.
    pub fn node(
        self,
        name: impl Into<String>,
        processor: impl PacketProcessor + 'static,
    ) -> Result<Self> {
        self.node_ref(Node::new(name, processor))
    }

    /// Appends a one-shot stateless transformer.
    pub fn simple_node(
        self,
        name: impl Into<String>,
        f: impl FnMut(PacketInfo) -> Option<PacketInfo> + Send + 'static,
    ) -> Result<Self> {
        self.node_ref(Node::new(name, FnProcessor(f)))
    }

    /// Appends an already-constructed node (or sub-graph head).
    pub fn node_ref(mut self, node: Node) -> Result<Self> {
        match &self.tail {
            Some(tail) => tail.attach(&node)?,
            None => self.head = Some(node.clone()),
        }
        self.tail = Some(node);
        Ok(self)
    }

    /// Appends a demuxer and finishes the chain. Routing is per packet:
    /// paths are consulted in declaration order and the first predicate
    /// that matches wins; a packet matching no path is dropped and
    /// counted.
    pub fn demux(self, name: impl Into<String>, paths: Vec<ConditionalPacketPath>) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::ErrIncompletePacketPath("path list"));
        }
        for path in &paths {
            if path.name().is_empty() {
                return Err(Error::ErrIncompletePacketPath("name"));
            }
        }
        self.node_ref(Node::demuxer(name, paths))
    }

    pub fn build(self) -> Result<Node> {
        self.head.ok_or(Error::ErrEmptyPipeline)
    }
}
