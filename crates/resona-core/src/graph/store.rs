//! Graph store and real-time processor.
//!
//! [`GraphStore`] owns the node and connection collections and a cached
//! topological render order. Mutations run on the control plane and
//! invalidate the cached order; the render call rebuilds it lazily and
//! executes it against per-node work buffers allocated at prepare time.
//!
//! Acyclicity is enforced when a connection is added: an edge that would
//! introduce a cycle is rejected and the graph is left unchanged, so the
//! render path never encounters an unsortable topology.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::buffer::{AudioBuffer, Event, EventQueue};
use crate::context::{EngineConfig, EngineContext};
use crate::notify::{Notification, Origin};
use crate::stats::{PerformanceReport, RenderStats};
use crate::unit::{FAULT_SAMPLE_LIMIT, ProcessingUnit};

use super::connection::Connection;
use super::node::{NodeData, NodeId, NodeKind};

/// Maximum channel count accepted for a hosted unit.
pub const MAX_CHANNELS: usize = 32;

/// Errors that can occur during graph operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// The specified node was not found in the graph.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    /// The specified connection does not exist.
    #[error("connection not found: {0}")]
    ConnectionNotFound(Connection),
    /// A channel index is outside the node's channel bounds.
    #[error("channel {channel} out of bounds for node {node}")]
    ChannelOutOfBounds {
        /// Node whose bounds were exceeded.
        node: NodeId,
        /// Offending channel index.
        channel: usize,
    },
    /// A unit reported an unusable channel configuration.
    #[error("invalid channel counts: {inputs} in / {outputs} out")]
    InvalidChannelCount {
        /// Reported input channel count.
        inputs: usize,
        /// Reported output channel count.
        outputs: usize,
    },
    /// An identical edge already exists.
    #[error("duplicate connection: {0}")]
    DuplicateConnection(Connection),
    /// Adding this edge would create a cycle.
    #[error("connection would create a cycle")]
    CycleDetected,
    /// Source and destination are the same node.
    #[error("nodes cannot connect to themselves")]
    SelfConnection,
    /// The connection is structurally invalid (e.g. into an input anchor).
    #[error("invalid connection: {0}")]
    InvalidConnection(String),
    /// A node already occupies the slot being restored into.
    #[error("node slot {0} already occupied")]
    NodeOccupied(NodeId),
    /// The operation requires the engine driving this graph to be stopped.
    #[error("graph is attached to a running engine")]
    EngineRunning,
}

/// A node lifted out of the graph with everything needed to put it back.
///
/// Produced by [`GraphStore::extract_node`] and consumed by
/// [`GraphStore::restore_node`]; the undo history and snapshot restore use
/// it to move whole nodes (unit included) in and out of the graph.
pub struct ExtractedNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) unit_kind: Option<String>,
    pub(crate) enabled: bool,
    pub(crate) bypassed: bool,
    pub(crate) input_channels: usize,
    pub(crate) output_channels: usize,
    /// Connections that were incident to the node at extraction time.
    pub(crate) connections: Vec<Connection>,
}

impl ExtractedNode {
    /// The extracted node's identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }
}

/// Owns nodes and connections and executes blocks in topological order.
pub struct GraphStore {
    context: Arc<EngineContext>,
    nodes: Vec<Option<NodeData>>,
    connections: Vec<Connection>,
    /// Cached topological order (node slot indices); `None` after a
    /// topology mutation.
    render_order: Option<Vec<usize>>,
    config: EngineConfig,
    prepared: bool,
    running: AtomicBool,
    stats: RenderStats,
    next_node: u64,
}

impl GraphStore {
    /// Creates an empty graph bound to the given context.
    pub fn new(context: Arc<EngineContext>) -> Self {
        let config = context.config();
        Self {
            context,
            nodes: Vec::new(),
            connections: Vec::new(),
            render_order: None,
            config,
            prepared: false,
            running: AtomicBool::new(false),
            stats: RenderStats::new(),
            next_node: 0,
        }
    }

    // --- Node mutations ---

    /// Adds a node wrapping the given unit. Returns the new node's ID.
    ///
    /// The unit's channel counts are validated; the node starts enabled and
    /// not bypassed, and is prepared immediately if the graph is prepared.
    pub fn add_node(
        &mut self,
        unit: Box<dyn ProcessingUnit>,
        name: &str,
    ) -> Result<NodeId, GraphError> {
        self.add_node_with_kind(unit, name, None)
    }

    /// Adds a node wrapping the given unit, recording the factory kind used
    /// to create it so snapshots can restore it.
    pub fn add_node_with_kind(
        &mut self,
        mut unit: Box<dyn ProcessingUnit>,
        name: &str,
        unit_kind: Option<String>,
    ) -> Result<NodeId, GraphError> {
        let inputs = unit.input_channels();
        let outputs = unit.output_channels();
        if inputs > MAX_CHANNELS || outputs > MAX_CHANNELS || inputs + outputs == 0 {
            return Err(GraphError::InvalidChannelCount { inputs, outputs });
        }

        if self.prepared {
            unit.prepare(self.config.sample_rate, self.config.block_size);
        }

        let id = self.alloc_id();
        let mut node = NodeData::new(
            id,
            name.to_string(),
            NodeKind::Unit(unit),
            unit_kind,
            inputs,
            outputs,
        );
        if self.prepared {
            node.buffer = AudioBuffer::new(inputs.max(outputs).max(1), self.config.block_size);
        }
        tracing::debug!(%id, name, "graph_add: unit node");
        self.insert(node);
        Ok(id)
    }

    /// Adds an audio input anchor carrying the configured external input
    /// channels. Returns the new node's ID.
    pub fn add_audio_input(&mut self) -> NodeId {
        let id = self.alloc_id();
        let mut node = NodeData::new(
            id,
            "audio-in".to_string(),
            NodeKind::AudioInput,
            None,
            0,
            self.config.input_channels,
        );
        if self.prepared {
            node.buffer = AudioBuffer::new(
                self.config.input_channels.max(1),
                self.config.block_size,
            );
        }
        tracing::debug!(%id, "graph_add: audio input anchor");
        self.insert(node);
        id
    }

    /// Adds an audio output anchor collecting the configured external output
    /// channels. Returns the new node's ID.
    pub fn add_audio_output(&mut self) -> NodeId {
        let id = self.alloc_id();
        let mut node = NodeData::new(
            id,
            "audio-out".to_string(),
            NodeKind::AudioOutput,
            None,
            self.config.output_channels,
            0,
        );
        if self.prepared {
            node.buffer = AudioBuffer::new(
                self.config.output_channels.max(1),
                self.config.block_size,
            );
        }
        tracing::debug!(%id, "graph_add: audio output anchor");
        self.insert(node);
        id
    }

    /// Removes a node, cascading removal of every incident connection as one
    /// atomic step. The unit is released and dropped.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.extract_node(id).map(|_| ())
    }

    /// Removes a node and returns it together with its incident connections,
    /// so it can later be restored verbatim with
    /// [`restore_node`](Self::restore_node).
    pub fn extract_node(&mut self, id: NodeId) -> Result<ExtractedNode, GraphError> {
        let idx = id.0 as usize;
        if self.nodes.get(idx).and_then(|n| n.as_ref()).is_none() {
            return Err(GraphError::NodeNotFound(id));
        }

        let mut incident = Vec::new();
        self.connections.retain(|conn| {
            if conn.touches(id) {
                incident.push(*conn);
                false
            } else {
                true
            }
        });

        let mut node = self.nodes[idx].take().expect("checked above");
        if self.prepared
            && let NodeKind::Unit(unit) = &mut node.kind
        {
            unit.release();
        }
        self.render_order = None;
        tracing::debug!(%id, connections = incident.len(), "graph_remove");

        Ok(ExtractedNode {
            id: node.id,
            name: node.name,
            kind: node.kind,
            unit_kind: node.unit_kind,
            enabled: node.enabled,
            bypassed: node.bypassed,
            input_channels: node.input_channels,
            output_channels: node.output_channels,
            connections: incident,
        })
    }

    /// Puts an extracted node back under its original ID and re-adds the
    /// connections that were incident to it, skipping any whose other
    /// endpoint no longer exists.
    pub fn restore_node(&mut self, extracted: ExtractedNode) -> Result<NodeId, GraphError> {
        let id = extracted.id;
        let idx = id.0 as usize;
        if self.nodes.get(idx).and_then(|n| n.as_ref()).is_some() {
            return Err(GraphError::NodeOccupied(id));
        }

        let mut node = NodeData::new(
            id,
            extracted.name,
            extracted.kind,
            extracted.unit_kind,
            extracted.input_channels,
            extracted.output_channels,
        );
        node.enabled = extracted.enabled;
        node.bypassed = extracted.bypassed;

        if self.prepared {
            if let NodeKind::Unit(unit) = &mut node.kind {
                unit.prepare(self.config.sample_rate, self.config.block_size);
            }
            let channels = node.input_channels.max(node.output_channels).max(1);
            node.buffer = AudioBuffer::new(channels, self.config.block_size);
        }

        self.next_node = self.next_node.max(id.0 + 1);
        self.insert(node);

        for conn in extracted.connections {
            let other = if conn.source() == id {
                conn.dest()
            } else {
                conn.source()
            };
            if self.node(other).is_some() && !self.connections.contains(&conn) {
                self.connections.push(conn);
            }
        }
        self.render_order = None;
        tracing::debug!(%id, "graph_restore");
        Ok(id)
    }

    // --- Connection mutations ---

    /// Connects one audio channel of `source` to one audio channel of `dest`.
    pub fn connect_audio(
        &mut self,
        source: NodeId,
        source_channel: usize,
        dest: NodeId,
        dest_channel: usize,
    ) -> Result<(), GraphError> {
        self.add_connection(Connection::Audio {
            source,
            source_channel,
            dest,
            dest_channel,
        })
    }

    /// Connects `source`'s emitted events to `dest`.
    pub fn connect_event(&mut self, source: NodeId, dest: NodeId) -> Result<(), GraphError> {
        self.add_connection(Connection::Event { source, dest })
    }

    /// Adds a connection after full validation: both endpoints exist and are
    /// distinct, channel indices are in bounds, the edge is not a duplicate,
    /// and it does not introduce a cycle.
    pub fn add_connection(&mut self, conn: Connection) -> Result<(), GraphError> {
        let source = conn.source();
        let dest = conn.dest();

        if source == dest {
            return Err(GraphError::SelfConnection);
        }
        let src = self.node(source).ok_or(GraphError::NodeNotFound(source))?;
        let dst = self.node(dest).ok_or(GraphError::NodeNotFound(dest))?;

        if matches!(dst.kind, NodeKind::AudioInput) {
            return Err(GraphError::InvalidConnection(format!(
                "cannot connect into input anchor {dest}"
            )));
        }
        if matches!(src.kind, NodeKind::AudioOutput) {
            return Err(GraphError::InvalidConnection(format!(
                "cannot connect from output anchor {source}"
            )));
        }

        if let Connection::Audio {
            source_channel,
            dest_channel,
            ..
        } = conn
        {
            if source_channel >= src.output_channels {
                return Err(GraphError::ChannelOutOfBounds {
                    node: source,
                    channel: source_channel,
                });
            }
            if dest_channel >= dst.input_channels {
                return Err(GraphError::ChannelOutOfBounds {
                    node: dest,
                    channel: dest_channel,
                });
            }
        }

        if self.connections.contains(&conn) {
            return Err(GraphError::DuplicateConnection(conn));
        }

        // A cycle exists if `dest` can already reach `source`.
        if self.can_reach(dest, source) {
            return Err(GraphError::CycleDetected);
        }

        tracing::debug!(connection = %conn, "graph_connect");
        self.connections.push(conn);
        self.render_order = None;
        Ok(())
    }

    /// Removes one connection.
    pub fn disconnect(&mut self, conn: &Connection) -> Result<(), GraphError> {
        let pos = self
            .connections
            .iter()
            .position(|c| c == conn)
            .ok_or(GraphError::ConnectionNotFound(*conn))?;
        self.connections.remove(pos);
        self.render_order = None;
        tracing::debug!(connection = %conn, "graph_disconnect");
        Ok(())
    }

    // --- Node state ---

    /// Enables or disables a node. A disabled node is removed from the
    /// active render set entirely: downstream nodes read silence from it.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), GraphError> {
        let node = self.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        node.enabled = enabled;
        Ok(())
    }

    /// Bypasses or un-bypasses a node. A bypassed node stays in the topology
    /// (keeping its positional latency contribution) but passes its input
    /// through unmodified.
    pub fn set_bypassed(&mut self, id: NodeId, bypassed: bool) -> Result<(), GraphError> {
        let node = self.node_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        node.bypassed = bypassed;
        Ok(())
    }

    /// Whether the node is enabled, or `None` for an unknown id.
    pub fn is_enabled(&self, id: NodeId) -> Option<bool> {
        self.node(id).map(|n| n.enabled)
    }

    /// Whether the node is bypassed, or `None` for an unknown id.
    pub fn is_bypassed(&self, id: NodeId) -> Option<bool> {
        self.node(id).map(|n| n.bypassed)
    }

    /// The node's display name, or `None` for an unknown id.
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// Whether a node with this id exists.
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// IDs of all live nodes, in id order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter_map(|n| n.as_ref().map(|n| n.id))
            .collect()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// All current connections.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Number of connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // --- Lifecycle ---

    /// Prepares the graph for processing with the context's configuration.
    ///
    /// Re-reads the engine configuration, re-sizes anchor channel counts,
    /// validates existing connections against the (possibly changed) channel
    /// bounds, allocates per-node work buffers, and prepares every unit.
    ///
    /// Rejected while a driving engine is running: reconfiguration requires
    /// stop → reconfigure → prepare → restart.
    pub fn prepare(&mut self) -> Result<(), GraphError> {
        if self.is_running() {
            return Err(GraphError::EngineRunning);
        }
        let config = self.context.config();
        self.config = config;

        for node in self.nodes.iter_mut().flatten() {
            match node.kind {
                NodeKind::AudioInput => node.output_channels = config.input_channels,
                NodeKind::AudioOutput => node.input_channels = config.output_channels,
                NodeKind::Unit(_) => {}
            }
        }

        for conn in &self.connections {
            if let Connection::Audio {
                source,
                source_channel,
                dest,
                dest_channel,
            } = conn
            {
                let src = self.node(*source).ok_or(GraphError::NodeNotFound(*source))?;
                let dst = self.node(*dest).ok_or(GraphError::NodeNotFound(*dest))?;
                if *source_channel >= src.output_channels {
                    return Err(GraphError::ChannelOutOfBounds {
                        node: *source,
                        channel: *source_channel,
                    });
                }
                if *dest_channel >= dst.input_channels {
                    return Err(GraphError::ChannelOutOfBounds {
                        node: *dest,
                        channel: *dest_channel,
                    });
                }
            }
        }

        for node in self.nodes.iter_mut().flatten() {
            let channels = node.input_channels.max(node.output_channels).max(1);
            node.buffer = AudioBuffer::new(channels, config.block_size);
            node.events = EventQueue::with_capacity(32);
            if let NodeKind::Unit(unit) = &mut node.kind {
                unit.prepare(config.sample_rate, config.block_size);
            }
        }

        self.render_order = self.compute_render_order();
        self.prepared = true;
        self.stats.reset();
        tracing::debug!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            "graph_prepare"
        );
        self.context.hub().notify(&Notification::StateChanged {
            origin: Origin::Graph,
            state: "prepared".to_string(),
        });
        Ok(())
    }

    /// Releases every unit and leaves the graph unprepared.
    pub fn release(&mut self) -> Result<(), GraphError> {
        if self.is_running() {
            return Err(GraphError::EngineRunning);
        }
        if self.prepared {
            for node in self.nodes.iter_mut().flatten() {
                if let NodeKind::Unit(unit) = &mut node.kind {
                    unit.release();
                }
            }
            self.prepared = false;
            tracing::debug!("graph_release");
            self.context.hub().notify(&Notification::StateChanged {
                origin: Origin::Graph,
                state: "released".to_string(),
            });
        }
        Ok(())
    }

    /// Removes every node and connection. Requires a stopped engine.
    pub fn clear(&mut self) -> Result<(), GraphError> {
        if self.is_running() {
            return Err(GraphError::EngineRunning);
        }
        if self.prepared {
            for node in self.nodes.iter_mut().flatten() {
                if let NodeKind::Unit(unit) = &mut node.kind {
                    unit.release();
                }
            }
        }
        self.nodes.clear();
        self.connections.clear();
        self.render_order = None;
        self.prepared = false;
        tracing::debug!("graph_clear");
        Ok(())
    }

    /// Whether [`prepare`](Self::prepare) has completed.
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Marks the graph as driven by a running engine. Lock-free flag polled
    /// by the control plane to reject reconfiguration mid-flight.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Whether a driving engine is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The configuration captured at the last prepare.
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// The shared engine context.
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    // --- Processing ---

    /// Processes one block: external input feeds the audio input anchors,
    /// nodes execute in cached topological order, and the audio output
    /// anchors sum into `output`.
    ///
    /// A fault during one node's render (unit error or non-finite /
    /// out-of-range output) disables that node, reports an error, and the
    /// remaining nodes still execute with silence in place of the faulty
    /// node's output. Faults never escape this call.
    ///
    /// Does nothing (beyond clearing `output`) before [`prepare`](Self::prepare).
    pub fn process(
        &mut self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        events: &mut EventQueue,
    ) {
        let started = Instant::now();
        output.clear();
        if !self.prepared {
            return;
        }

        let order = match self.render_order.take() {
            Some(order) => order,
            // Rebuilt lazily after a mutation. A cycle cannot appear through
            // the mutation API, so an unsortable graph renders silence.
            None => match self.compute_render_order() {
                Some(order) => order,
                None => return,
            },
        };

        for &idx in &order {
            self.render_node(idx, input, output, events);
        }

        self.render_order = Some(order);
        self.stats
            .record(started.elapsed().as_secs_f64() * 1000.0);
    }

    /// Rolling render performance over the recent window.
    pub fn performance_stats(&self) -> PerformanceReport {
        self.stats
            .report(self.config.block_size, self.config.sample_rate)
    }

    // --- Render internals ---

    fn render_node(
        &mut self,
        idx: usize,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        events: &mut EventQueue,
    ) {
        // Lift the node's work buffer and event queue out so the gather and
        // routing phases can borrow the rest of the graph freely.
        let (node_id, enabled, bypassed, is_input_anchor, is_output_anchor);
        let mut work;
        let mut node_events;
        {
            let Some(node) = self.nodes[idx].as_mut() else {
                return;
            };
            node_id = node.id;
            enabled = node.enabled;
            bypassed = node.bypassed;
            is_input_anchor = matches!(node.kind, NodeKind::AudioInput);
            is_output_anchor = matches!(node.kind, NodeKind::AudioOutput);
            work = std::mem::take(&mut node.buffer);
            node_events = std::mem::take(&mut node.events);
        }

        work.clear();

        if is_input_anchor && enabled {
            work.copy_from(input);
            // External events enter the graph through the input anchor.
            for event in events.incoming() {
                node_events.emit(*event);
            }
        } else if enabled {
            // Gather: sum every audio connection landing on this node.
            for conn in &self.connections {
                let Connection::Audio {
                    source,
                    source_channel,
                    dest,
                    dest_channel,
                } = conn
                else {
                    continue;
                };
                if *dest != node_id {
                    continue;
                }
                if let Some(src) = self.node(*source)
                    && *source_channel < src.buffer.channel_count()
                    && *dest_channel < work.channel_count()
                {
                    work.accumulate_channel(*dest_channel, src.buffer.channel(*source_channel));
                }
            }

            if is_output_anchor {
                // Sum into the external output; the scrub against invalid
                // samples happened at each producing node.
                for c in 0..output.channel_count().min(work.channel_count()) {
                    output.accumulate_channel(c, work.channel(c));
                }
            } else if !bypassed {
                // In-place unit processing; a bypassed node leaves the
                // gathered input untouched, which is exactly pass-through.
                let fault = {
                    let Some(node) = self.nodes[idx].as_mut() else {
                        return;
                    };
                    let NodeKind::Unit(unit) = &mut node.kind else {
                        unreachable!("anchors handled above")
                    };
                    match unit.process(&mut work, &mut node_events) {
                        Err(err) => Some(err.to_string()),
                        Ok(()) if !work.within_range(FAULT_SAMPLE_LIMIT) => {
                            Some("non-finite or out-of-range output sample".to_string())
                        }
                        Ok(()) => None,
                    }
                };
                if let Some(message) = fault {
                    work.clear();
                    if let Some(node) = self.nodes[idx].as_mut() {
                        node.enabled = false;
                    }
                    let name = self.node_name(node_id).unwrap_or("").to_string();
                    tracing::warn!(node = %node_id, %name, %message, "graph_fault");
                    self.context.hub().notify(&Notification::Error {
                        origin: Origin::Graph,
                        message: format!("node {node_id} ({name}) disabled: {message}"),
                    });
                }
            }
        }
        // A disabled node skips gather and processing entirely; its work
        // buffer stays silent, so downstream reads silence.

        // Route emitted events along event connections, in topological
        // order within the same block. Events reaching an output anchor are
        // handed back to the caller.
        let outgoing: Vec<Event> = node_events.drain_outgoing().collect();
        if !outgoing.is_empty() {
            let dests: Vec<NodeId> = self
                .connections
                .iter()
                .filter_map(|conn| match conn {
                    Connection::Event { source, dest } if *source == node_id => Some(*dest),
                    _ => None,
                })
                .collect();
            for dest in dests {
                let dest_is_output = self
                    .node(dest)
                    .is_some_and(|n| matches!(n.kind, NodeKind::AudioOutput));
                if dest_is_output {
                    for event in &outgoing {
                        events.emit(*event);
                    }
                } else if let Some(dst) = self.node_mut(dest) {
                    for event in &outgoing {
                        dst.events.push_incoming(*event);
                    }
                }
            }
        }
        node_events.clear();

        if let Some(node) = self.nodes[idx].as_mut() {
            node.buffer = work;
            node.events = node_events;
        }
    }

    // --- Internal helpers ---

    fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    fn insert(&mut self, node: NodeData) {
        let idx = node.id.0 as usize;
        if idx >= self.nodes.len() {
            self.nodes.resize_with(idx + 1, || None);
        }
        self.nodes[idx] = Some(node);
        self.render_order = None;
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0 as usize).and_then(|n| n.as_ref())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0 as usize).and_then(|n| n.as_mut())
    }

    /// A fresh topological order as node IDs, or `None` if the graph is
    /// cyclic. Used by the manager's depth/latency analysis.
    pub(crate) fn topo_ids(&self) -> Option<Vec<NodeId>> {
        self.compute_render_order()
            .map(|order| order.into_iter().map(|idx| NodeId(idx as u64)).collect())
    }

    /// DFS reachability: can `from` reach `to` along existing edges?
    fn can_reach(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            let idx = current.0 as usize;
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;

            for conn in &self.connections {
                if conn.source() == current {
                    stack.push(conn.dest());
                }
            }
        }
        false
    }

    /// Kahn's topological sort over all connections.
    ///
    /// Returns `None` if the graph contains a cycle (unreachable through the
    /// mutation API, which rejects cycle-introducing edges).
    fn compute_render_order(&self) -> Option<Vec<usize>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0u32; n];
        let mut active = 0usize;

        for (idx, node) in self.nodes.iter().enumerate() {
            if node.is_some() {
                active += 1;
                in_degree[idx] = self
                    .connections
                    .iter()
                    .filter(|c| c.dest().0 as usize == idx && self.node(c.source()).is_some())
                    .count() as u32;
            }
        }

        let mut queue: Vec<usize> = (0..n)
            .filter(|&i| self.nodes[i].is_some() && in_degree[i] == 0)
            .collect();
        let mut sorted = Vec::with_capacity(active);

        while let Some(idx) = queue.pop() {
            sorted.push(idx);
            let id = NodeId(idx as u64);
            for conn in &self.connections {
                if conn.source() == id {
                    let to = conn.dest().0 as usize;
                    if self.nodes.get(to).is_some_and(|n| n.is_some()) {
                        in_degree[to] -= 1;
                        if in_degree[to] == 0 {
                            queue.push(to);
                        }
                    }
                }
            }
        }

        (sorted.len() == active).then_some(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineConfig;
    use crate::unit::ProcessError;
    use crate::units::{GainUnit, PassthroughUnit};

    fn store() -> GraphStore {
        GraphStore::new(EngineContext::new(EngineConfig {
            sample_rate: 48000.0,
            block_size: 8,
            input_channels: 2,
            output_channels: 2,
        }))
    }

    fn ones(frames: usize) -> AudioBuffer {
        let mut buf = AudioBuffer::new(2, frames);
        buf.channel_mut(0).fill(1.0);
        buf.channel_mut(1).fill(1.0);
        buf
    }

    /// Connects both stereo channels between two nodes.
    fn connect_stereo(store: &mut GraphStore, from: NodeId, to: NodeId) {
        store.connect_audio(from, 0, to, 0).unwrap();
        store.connect_audio(from, 1, to, 1).unwrap();
    }

    struct FaultingUnit;

    impl ProcessingUnit for FaultingUnit {
        fn name(&self) -> &str {
            "faulting"
        }
        fn process(
            &mut self,
            _buffer: &mut AudioBuffer,
            _events: &mut EventQueue,
        ) -> Result<(), ProcessError> {
            Err(ProcessError::Fault("synthetic".to_string()))
        }
    }

    #[test]
    fn unity_chain_passes_ones() {
        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        let node = store
            .add_node(Box::new(GainUnit::new(1.0)), "unity")
            .unwrap();
        connect_stereo(&mut store, input, node);
        connect_stereo(&mut store, node, output);
        store.prepare().unwrap();

        let inb = ones(8);
        let mut outb = AudioBuffer::new(2, 8);
        let mut events = EventQueue::default();
        store.process(&inb, &mut outb, &mut events);

        assert_eq!(outb.channel(0), &[1.0; 8]);
        assert_eq!(outb.channel(1), &[1.0; 8]);
    }

    #[test]
    fn cycle_rejected_and_graph_unchanged() {
        let mut store = store();
        let a = store.add_node(Box::new(PassthroughUnit), "a").unwrap();
        let b = store.add_node(Box::new(PassthroughUnit), "b").unwrap();
        store.connect_audio(a, 0, b, 0).unwrap();
        let before = store.connection_count();

        assert_eq!(store.connect_audio(b, 0, a, 0), Err(GraphError::CycleDetected));
        assert_eq!(store.connection_count(), before);
    }

    #[test]
    fn duplicate_edge_rejected() {
        let mut store = store();
        let a = store.add_node(Box::new(PassthroughUnit), "a").unwrap();
        let b = store.add_node(Box::new(PassthroughUnit), "b").unwrap();
        store.connect_audio(a, 0, b, 0).unwrap();
        assert!(matches!(
            store.connect_audio(a, 0, b, 0),
            Err(GraphError::DuplicateConnection(_))
        ));
        // A different channel pair is a different edge.
        store.connect_audio(a, 1, b, 1).unwrap();
    }

    #[test]
    fn channel_bounds_enforced() {
        let mut store = store();
        let a = store.add_node(Box::new(PassthroughUnit), "a").unwrap();
        let b = store.add_node(Box::new(PassthroughUnit), "b").unwrap();
        assert!(matches!(
            store.connect_audio(a, 2, b, 0),
            Err(GraphError::ChannelOutOfBounds { .. })
        ));
        assert!(matches!(
            store.connect_audio(a, 0, b, 7),
            Err(GraphError::ChannelOutOfBounds { .. })
        ));
    }

    #[test]
    fn anchor_direction_enforced() {
        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        let node = store.add_node(Box::new(PassthroughUnit), "n").unwrap();
        assert!(matches!(
            store.connect_audio(node, 0, input, 0),
            Err(GraphError::InvalidConnection(_))
        ));
        assert!(matches!(
            store.connect_audio(output, 0, node, 0),
            Err(GraphError::InvalidConnection(_))
        ));
    }

    #[test]
    fn remove_cascades_exactly_incident_connections() {
        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        let a = store.add_node(Box::new(PassthroughUnit), "a").unwrap();
        let b = store.add_node(Box::new(PassthroughUnit), "b").unwrap();
        connect_stereo(&mut store, input, a);
        connect_stereo(&mut store, a, output);
        store.connect_audio(input, 0, b, 0).unwrap();

        store.remove_node(a).unwrap();
        assert!(!store.contains_node(a));
        // Only input→b survives.
        assert_eq!(store.connection_count(), 1);
        assert!(store.connections()[0].touches(b));
        // Removing again fails.
        assert_eq!(store.remove_node(a), Err(GraphError::NodeNotFound(a)));
    }

    #[test]
    fn ids_never_reused() {
        let mut store = store();
        let a = store.add_node(Box::new(PassthroughUnit), "a").unwrap();
        store.remove_node(a).unwrap();
        let b = store.add_node(Box::new(PassthroughUnit), "b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn disabled_node_renders_silence_downstream() {
        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        let gain = store.add_node(Box::new(GainUnit::new(2.0)), "g").unwrap();
        connect_stereo(&mut store, input, gain);
        connect_stereo(&mut store, gain, output);
        store.set_enabled(gain, false).unwrap();
        store.prepare().unwrap();

        let inb = ones(8);
        let mut outb = AudioBuffer::new(2, 8);
        let mut events = EventQueue::default();
        store.process(&inb, &mut outb, &mut events);
        assert_eq!(outb.channel(0), &[0.0; 8]);
    }

    #[test]
    fn bypassed_node_passes_input_through() {
        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        let gain = store.add_node(Box::new(GainUnit::new(2.0)), "g").unwrap();
        connect_stereo(&mut store, input, gain);
        connect_stereo(&mut store, gain, output);
        store.set_bypassed(gain, true).unwrap();
        store.prepare().unwrap();

        let inb = ones(8);
        let mut outb = AudioBuffer::new(2, 8);
        let mut events = EventQueue::default();
        store.process(&inb, &mut outb, &mut events);
        assert_eq!(outb.channel(0), &[1.0; 8]);
    }

    #[test]
    fn fault_disables_node_and_block_completes() {
        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        let bad = store.add_node(Box::new(FaultingUnit), "bad").unwrap();
        let good = store.add_node(Box::new(GainUnit::new(1.0)), "good").unwrap();
        connect_stereo(&mut store, input, bad);
        store.connect_audio(input, 0, good, 0).unwrap();
        connect_stereo(&mut store, bad, output);
        store.connect_audio(good, 0, output, 1).unwrap();
        store.prepare().unwrap();

        let inb = ones(8);
        let mut outb = AudioBuffer::new(2, 8);
        let mut events = EventQueue::default();
        store.process(&inb, &mut outb, &mut events);

        // The faulty branch contributed silence; the good branch still ran.
        assert_eq!(store.is_enabled(bad), Some(false));
        assert_eq!(outb.channel(0), &[0.0; 8]);
        assert_eq!(outb.channel(1), &[1.0; 8]);
    }

    #[test]
    fn fan_in_sums_sources() {
        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        let a = store.add_node(Box::new(GainUnit::new(2.0)), "a").unwrap();
        let b = store.add_node(Box::new(GainUnit::new(3.0)), "b").unwrap();
        store.connect_audio(input, 0, a, 0).unwrap();
        store.connect_audio(input, 0, b, 0).unwrap();
        store.connect_audio(a, 0, output, 0).unwrap();
        store.connect_audio(b, 0, output, 0).unwrap();
        store.prepare().unwrap();

        let inb = ones(8);
        let mut outb = AudioBuffer::new(2, 8);
        let mut events = EventQueue::default();
        store.process(&inb, &mut outb, &mut events);
        assert_eq!(outb.channel(0), &[5.0; 8]);
    }

    #[test]
    fn reconfigure_rejected_while_running() {
        let mut store = store();
        store.add_audio_input();
        store.prepare().unwrap();
        store.set_running(true);
        assert_eq!(store.prepare(), Err(GraphError::EngineRunning));
        assert_eq!(store.release(), Err(GraphError::EngineRunning));
        store.set_running(false);
        store.release().unwrap();
    }

    #[test]
    fn events_route_through_anchors() {
        use crate::buffer::EventKind;

        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        let gain = store.add_node(Box::new(GainUnit::new(1.0)), "g").unwrap();
        connect_stereo(&mut store, input, gain);
        connect_stereo(&mut store, gain, output);
        store.connect_event(input, gain).unwrap();
        store.prepare().unwrap();

        let inb = ones(8);
        let mut outb = AudioBuffer::new(2, 8);
        let mut events = EventQueue::default();
        events.push_incoming(Event {
            offset: 0,
            kind: EventKind::ParamChange { index: 0, value: 4.0 },
        });
        store.process(&inb, &mut outb, &mut events);
        // The gain unit consumed the routed param change this block.
        assert_eq!(outb.channel(0), &[4.0; 8]);
    }

    #[test]
    fn extract_restore_roundtrip() {
        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        let gain = store.add_node(Box::new(GainUnit::new(2.0)), "g").unwrap();
        connect_stereo(&mut store, input, gain);
        connect_stereo(&mut store, gain, output);

        let extracted = store.extract_node(gain).unwrap();
        assert_eq!(store.connection_count(), 0);

        let restored = store.restore_node(extracted).unwrap();
        assert_eq!(restored, gain);
        assert_eq!(store.connection_count(), 4);
    }

    #[test]
    fn performance_stats_accumulate() {
        let mut store = store();
        let input = store.add_audio_input();
        let output = store.add_audio_output();
        connect_stereo(&mut store, input, output);
        store.prepare().unwrap();

        let inb = ones(8);
        let mut outb = AudioBuffer::new(2, 8);
        let mut events = EventQueue::default();
        for _ in 0..5 {
            store.process(&inb, &mut outb, &mut events);
        }
        let report = store.performance_stats();
        assert!(report.peak_ms >= report.average_ms);
    }
}
