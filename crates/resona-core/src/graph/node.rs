//! Graph node types.

use serde::{Deserialize, Serialize};

use crate::buffer::{AudioBuffer, EventQueue};
use crate::unit::ProcessingUnit;

/// Unique identifier for a node in a graph.
///
/// Node IDs are assigned from a monotonically increasing counter and never
/// reused for new nodes within a graph instance. They remain stable across
/// mutations and render-order rebuilds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    /// Returns the raw numeric identifier.
    #[inline]
    pub fn index(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// The role of a node in the graph.
pub(crate) enum NodeKind {
    /// Receives external audio input; no audio predecessors.
    AudioInput,
    /// Produces final audio output; no audio successors.
    AudioOutput,
    /// Wraps a hosted [`ProcessingUnit`].
    Unit(Box<dyn ProcessingUnit>),
}

impl NodeKind {
    pub(crate) fn is_unit(&self) -> bool {
        matches!(self, NodeKind::Unit(_))
    }
}

/// Internal bookkeeping for a node.
pub(crate) struct NodeData {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Factory kind identifier for snapshot restore. `None` for nodes
    /// injected directly without going through a [`crate::UnitFactory`].
    pub unit_kind: Option<String>,
    pub enabled: bool,
    pub bypassed: bool,
    pub input_channels: usize,
    pub output_channels: usize,
    /// In-place work buffer, sized at prepare. Holds the node's input during
    /// gather and its output after processing.
    pub buffer: AudioBuffer,
    /// Per-block event traffic for this node.
    pub events: EventQueue,
}

impl NodeData {
    pub(crate) fn new(
        id: NodeId,
        name: String,
        kind: NodeKind,
        unit_kind: Option<String>,
        input_channels: usize,
        output_channels: usize,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            unit_kind,
            enabled: true,
            bypassed: false,
            input_channels,
            output_channels,
            buffer: AudioBuffer::new(0, 0),
            events: EventQueue::default(),
        }
    }

    /// Latency the node contributes to paths running through it.
    ///
    /// Disabled nodes contribute nothing; bypassed nodes keep their
    /// positional latency contribution.
    pub(crate) fn latency_contribution(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        match &self.kind {
            NodeKind::Unit(unit) => unit.latency_samples(),
            _ => 0,
        }
    }
}
