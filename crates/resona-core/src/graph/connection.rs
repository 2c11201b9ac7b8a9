//! Graph connection types.
//!
//! A connection is a directed edge between two nodes. Audio connections
//! address a specific source and destination channel; event connections
//! carry control events whole. Both kinds participate in cycle detection
//! and render ordering.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// A directed edge between two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Connection {
    /// Audio signal flow from one channel of the source to one channel of
    /// the destination. Multiple connections landing on the same destination
    /// channel sum.
    Audio {
        /// Source node.
        source: NodeId,
        /// Channel index within the source node's outputs.
        source_channel: usize,
        /// Destination node.
        dest: NodeId,
        /// Channel index within the destination node's inputs.
        dest_channel: usize,
    },
    /// Control event flow from source to destination.
    Event {
        /// Source node.
        source: NodeId,
        /// Destination node.
        dest: NodeId,
    },
}

impl Connection {
    /// The edge's source node.
    pub fn source(&self) -> NodeId {
        match self {
            Connection::Audio { source, .. } | Connection::Event { source, .. } => *source,
        }
    }

    /// The edge's destination node.
    pub fn dest(&self) -> NodeId {
        match self {
            Connection::Audio { dest, .. } | Connection::Event { dest, .. } => *dest,
        }
    }

    /// Whether this is an audio connection.
    pub fn is_audio(&self) -> bool {
        matches!(self, Connection::Audio { .. })
    }

    /// Whether either endpoint is the given node.
    pub fn touches(&self, id: NodeId) -> bool {
        self.source() == id || self.dest() == id
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connection::Audio {
                source,
                source_channel,
                dest,
                dest_channel,
            } => write!(f, "{source}[{source_channel}] → {dest}[{dest_channel}]"),
            Connection::Event { source, dest } => write!(f, "{source} ⇒ {dest}"),
        }
    }
}
