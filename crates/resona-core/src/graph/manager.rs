//! Graph manager: validation, undo/redo, batching, snapshots.
//!
//! [`GraphManager`] is the control-plane façade above [`GraphStore`]. Every
//! mutation goes through it, is validated by the store, and is recorded as
//! an invertible [`Operation`] in a capped linear history. Mutations can be
//! grouped into a batch committed (or discarded) as one undoable unit, and
//! the full graph state can be captured into restorable snapshots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::context::EngineContext;
use crate::unit::UnitFactory;

use super::connection::Connection;
use super::history::{History, NodeProperty, Operation};
use super::node::NodeId;
use super::snapshot::{self, Snapshot};
use super::store::{GraphError, GraphStore};

/// Graph depth beyond which validation emits a warning.
const MAX_RECOMMENDED_DEPTH: usize = 64;

/// Errors from manager operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ManagerError {
    /// The underlying graph mutation was rejected.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The unit factory does not know this kind.
    #[error("unknown unit kind '{0}'")]
    UnknownUnitKind(String),
    /// A batch is already active.
    #[error("a batch is already active")]
    BatchActive,
    /// No batch is active.
    #[error("no batch is active")]
    NoBatchActive,
    /// The undo stack is empty.
    #[error("nothing to undo")]
    NothingToUndo,
    /// The redo stack is empty.
    #[error("nothing to redo")]
    NothingToRedo,
    /// No snapshot with this id exists.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    /// The node was injected without a factory kind and cannot appear in a
    /// restorable snapshot.
    #[error("node {0} was not created from a unit kind and cannot be restored")]
    UnitNotRestorable(NodeId),
    /// Snapshot (de)serialization failed.
    #[error("snapshot serialization failed: {0}")]
    Serialization(String),
}

/// Result of [`GraphManager::validate`].
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Whether the graph has no errors (warnings do not affect validity).
    pub is_valid: bool,
    /// Dangling connections, out-of-bounds channels, detected cycles.
    pub errors: Vec<String>,
    /// Disconnected nodes, excessive depth.
    pub warnings: Vec<String>,
}

/// Listing entry for a stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Random token identifying the snapshot.
    pub id: String,
    /// Caller-supplied display name.
    pub name: String,
}

struct BatchState {
    name: String,
    operations: Vec<Operation>,
}

/// Validated, observable, undoable façade above the graph store.
pub struct GraphManager {
    store: Arc<Mutex<GraphStore>>,
    factory: Arc<dyn UnitFactory>,
    history: History,
    batch: Option<BatchState>,
    snapshots: HashMap<String, Snapshot>,
}

impl GraphManager {
    /// Creates a manager with a fresh store bound to the given context.
    pub fn new(context: Arc<EngineContext>, factory: Arc<dyn UnitFactory>) -> Self {
        Self {
            store: Arc::new(Mutex::new(GraphStore::new(context))),
            factory,
            history: History::default(),
            batch: None,
            snapshots: HashMap::new(),
        }
    }

    /// The shared store, for handing to an engine that drives `process`.
    pub fn store(&self) -> Arc<Mutex<GraphStore>> {
        Arc::clone(&self.store)
    }

    fn lock_store(&self) -> MutexGuard<'_, GraphStore> {
        self.store.lock().expect("graph store poisoned")
    }

    fn record(&mut self, op: Operation) {
        match &mut self.batch {
            Some(batch) => batch.operations.push(op),
            None => self.history.push(op),
        }
    }

    // --- Mutations ---

    /// Creates a unit of `kind` through the factory and adds it as a node.
    pub fn add_unit(&mut self, kind: &str, name: &str) -> Result<NodeId, ManagerError> {
        let unit = self
            .factory
            .create(kind)
            .ok_or_else(|| ManagerError::UnknownUnitKind(kind.to_string()))?;
        let id = self
            .lock_store()
            .add_node_with_kind(unit, name, Some(kind.to_string()))?;
        self.record(Operation::AddNode { id, stash: None });
        Ok(id)
    }

    /// Adds an audio input anchor.
    pub fn add_audio_input(&mut self) -> NodeId {
        let id = self.lock_store().add_audio_input();
        self.record(Operation::AddNode { id, stash: None });
        id
    }

    /// Adds an audio output anchor.
    pub fn add_audio_output(&mut self) -> NodeId {
        let id = self.lock_store().add_audio_output();
        self.record(Operation::AddNode { id, stash: None });
        id
    }

    /// Removes a node and all its incident connections as one undoable step.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), ManagerError> {
        let stash = self.lock_store().extract_node(id)?;
        self.record(Operation::RemoveNode {
            id,
            stash: Some(stash),
        });
        Ok(())
    }

    /// Connects one audio channel of `source` to one of `dest`.
    pub fn connect_audio(
        &mut self,
        source: NodeId,
        source_channel: usize,
        dest: NodeId,
        dest_channel: usize,
    ) -> Result<(), ManagerError> {
        let connection = Connection::Audio {
            source,
            source_channel,
            dest,
            dest_channel,
        };
        self.lock_store().add_connection(connection)?;
        self.record(Operation::AddConnection { connection });
        Ok(())
    }

    /// Connects `source`'s emitted events to `dest`.
    pub fn connect_event(&mut self, source: NodeId, dest: NodeId) -> Result<(), ManagerError> {
        let connection = Connection::Event { source, dest };
        self.lock_store().add_connection(connection)?;
        self.record(Operation::AddConnection { connection });
        Ok(())
    }

    /// Removes one connection.
    pub fn disconnect(&mut self, connection: Connection) -> Result<(), ManagerError> {
        self.lock_store().disconnect(&connection)?;
        self.record(Operation::RemoveConnection { connection });
        Ok(())
    }

    /// Enables or disables a node. A no-op change records no history entry.
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> Result<(), ManagerError> {
        let previous = {
            let mut store = self.lock_store();
            let previous = store
                .is_enabled(id)
                .ok_or(GraphError::NodeNotFound(id))?;
            if previous != enabled {
                store.set_enabled(id, enabled)?;
            }
            previous
        };
        if previous != enabled {
            self.record(Operation::SetProperty {
                id,
                property: NodeProperty::Enabled,
                previous,
                value: enabled,
            });
        }
        Ok(())
    }

    /// Bypasses or un-bypasses a node. A no-op change records no history entry.
    pub fn set_bypassed(&mut self, id: NodeId, bypassed: bool) -> Result<(), ManagerError> {
        let previous = {
            let mut store = self.lock_store();
            let previous = store
                .is_bypassed(id)
                .ok_or(GraphError::NodeNotFound(id))?;
            if previous != bypassed {
                store.set_bypassed(id, bypassed)?;
            }
            previous
        };
        if previous != bypassed {
            self.record(Operation::SetProperty {
                id,
                property: NodeProperty::Bypassed,
                previous,
                value: bypassed,
            });
        }
        Ok(())
    }

    // --- Undo / redo ---

    /// Reverts the most recent mutation (or committed batch).
    pub fn undo(&mut self) -> Result<(), ManagerError> {
        if self.batch.is_some() {
            return Err(ManagerError::BatchActive);
        }
        let mut op = self.history.pop_undo().ok_or(ManagerError::NothingToUndo)?;
        {
            let mut store = self.lock_store();
            op.undo(&mut store)?;
        }
        self.history.push_undone(op);
        tracing::debug!("graph_undo");
        Ok(())
    }

    /// Re-applies the most recently undone mutation.
    pub fn redo(&mut self) -> Result<(), ManagerError> {
        if self.batch.is_some() {
            return Err(ManagerError::BatchActive);
        }
        let mut op = self.history.pop_redo().ok_or(ManagerError::NothingToRedo)?;
        {
            let mut store = self.lock_store();
            op.redo(&mut store)?;
        }
        self.history.push_redone(op);
        tracing::debug!("graph_redo");
        Ok(())
    }

    /// Number of operations available to undo.
    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    /// Number of operations available to redo.
    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    // --- Batch operations ---

    /// Starts buffering mutations into one undoable unit.
    ///
    /// At most one batch may be active; a second `begin_batch` is rejected.
    pub fn begin_batch(&mut self, name: &str) -> Result<(), ManagerError> {
        if self.batch.is_some() {
            return Err(ManagerError::BatchActive);
        }
        self.batch = Some(BatchState {
            name: name.to_string(),
            operations: Vec::new(),
        });
        tracing::debug!(name, "graph_batch_begin");
        Ok(())
    }

    /// Commits the active batch as a single undoable unit.
    pub fn end_batch(&mut self) -> Result<(), ManagerError> {
        let batch = self.batch.take().ok_or(ManagerError::NoBatchActive)?;
        tracing::debug!(name = %batch.name, ops = batch.operations.len(), "graph_batch_end");
        if !batch.operations.is_empty() {
            self.history.push(Operation::Batch {
                name: batch.name,
                operations: batch.operations,
            });
        }
        Ok(())
    }

    /// Discards the active batch, rolling its mutations back so the graph is
    /// as if the batch had never been applied.
    pub fn cancel_batch(&mut self) -> Result<(), ManagerError> {
        let mut batch = self.batch.take().ok_or(ManagerError::NoBatchActive)?;
        let mut store = self.lock_store();
        for op in batch.operations.iter_mut().rev() {
            op.undo(&mut store)?;
        }
        tracing::debug!(name = %batch.name, "graph_batch_cancel");
        Ok(())
    }

    /// Whether a batch is currently active.
    pub fn batch_active(&self) -> bool {
        self.batch.is_some()
    }

    // --- Validation and analysis ---

    /// Checks the graph for errors (dangling connections, out-of-bounds
    /// channels, cycles) and warnings (disconnected nodes, excessive depth).
    pub fn validate(&self) -> ValidationReport {
        let store = self.lock_store();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for conn in store.connections() {
            let source = store.node(conn.source());
            let dest = store.node(conn.dest());
            if source.is_none() || dest.is_none() {
                errors.push(format!("dangling connection: {conn}"));
                continue;
            }
            if let Connection::Audio {
                source_channel,
                dest_channel,
                ..
            } = conn
            {
                if source.is_some_and(|n| *source_channel >= n.output_channels) {
                    errors.push(format!("source channel out of bounds: {conn}"));
                }
                if dest.is_some_and(|n| *dest_channel >= n.input_channels) {
                    errors.push(format!("destination channel out of bounds: {conn}"));
                }
            }
        }

        let loops = Self::loops_in(&store);
        if !loops.is_empty() {
            errors.push(format!("cycle detected involving {} node(s)", loops.len()));
        }

        for id in store.node_ids() {
            let node = store.node(id).expect("node_ids listed a missing node");
            if node.kind.is_unit() && !store.connections().iter().any(|c| c.touches(id)) {
                warnings.push(format!("node {id} ({}) is disconnected", node.name));
            }
        }

        let depth = Self::depth_in(&store);
        if depth > MAX_RECOMMENDED_DEPTH {
            warnings.push(format!(
                "graph depth {depth} exceeds recommended maximum {MAX_RECOMMENDED_DEPTH}"
            ));
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Depth-first cycle search. Returns the nodes reached by a back-edge;
    /// empty means the graph is acyclic.
    pub fn detect_loops(&self) -> Vec<NodeId> {
        Self::loops_in(&self.lock_store())
    }

    /// Longest path through the graph, counted in edges.
    ///
    /// Meaningful only for acyclic graphs; with a cycle present this returns
    /// the node count as a degenerate upper bound.
    pub fn graph_depth(&self) -> usize {
        Self::depth_in(&self.lock_store())
    }

    /// Cumulative reported unit latency along the critical audio path.
    pub fn estimate_latency(&self) -> usize {
        let store = self.lock_store();
        let Some(order) = store.topo_ids() else {
            return 0;
        };
        let mut latency: HashMap<NodeId, usize> = HashMap::new();
        let mut max = 0;
        for id in order {
            let own = store.node(id).map_or(0, |n| n.latency_contribution());
            let incoming = store
                .connections()
                .iter()
                .filter(|c| c.is_audio() && c.dest() == id)
                .map(|c| latency.get(&c.source()).copied().unwrap_or(0))
                .max()
                .unwrap_or(0);
            let total = incoming + own;
            max = max.max(total);
            latency.insert(id, total);
        }
        max
    }

    fn loops_in(store: &GraphStore) -> Vec<NodeId> {
        // 0 = unvisited, 1 = on the recursion stack, 2 = finished.
        let mut state: HashMap<NodeId, u8> = HashMap::new();
        let mut cycles = Vec::new();

        let successors = |id: NodeId| -> Vec<NodeId> {
            store
                .connections()
                .iter()
                .filter(|c| c.source() == id)
                .map(|c| c.dest())
                .collect()
        };

        for root in store.node_ids() {
            if state.get(&root).copied().unwrap_or(0) != 0 {
                continue;
            }
            let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = vec![(root, successors(root), 0)];
            state.insert(root, 1);

            loop {
                let next = {
                    let Some(frame) = stack.last_mut() else { break };
                    if frame.2 < frame.1.len() {
                        let next = frame.1[frame.2];
                        frame.2 += 1;
                        Some(next)
                    } else {
                        None
                    }
                };
                match next {
                    Some(next) => match state.get(&next).copied().unwrap_or(0) {
                        0 => {
                            state.insert(next, 1);
                            let succ = successors(next);
                            stack.push((next, succ, 0));
                        }
                        1 => {
                            // Back-edge to a node still on the stack.
                            if !cycles.contains(&next) {
                                cycles.push(next);
                            }
                        }
                        _ => {}
                    },
                    None => {
                        let (node, _, _) = stack.pop().expect("frame checked above");
                        state.insert(node, 2);
                    }
                }
            }
        }
        cycles
    }

    fn depth_in(store: &GraphStore) -> usize {
        let Some(order) = store.topo_ids() else {
            return store.node_count();
        };
        let mut depth: HashMap<NodeId, usize> = HashMap::new();
        let mut max = 0;
        for id in order {
            let d = depth.get(&id).copied().unwrap_or(0);
            for conn in store.connections() {
                if conn.source() == id {
                    let entry = depth.entry(conn.dest()).or_insert(0);
                    *entry = (*entry).max(d + 1);
                    max = max.max(*entry);
                }
            }
        }
        max
    }

    // --- Snapshots ---

    /// Captures the full graph state and stores it under a fresh random id.
    pub fn create_snapshot(&mut self, name: &str) -> Result<String, ManagerError> {
        let blob = snapshot::capture(&self.lock_store())?;
        let id = snapshot_token();
        tracing::debug!(%id, name, bytes = blob.len(), "graph_snapshot_create");
        self.snapshots.insert(
            id.clone(),
            Snapshot {
                id: id.clone(),
                name: name.to_string(),
                blob,
            },
        );
        Ok(id)
    }

    /// Replaces the current graph state wholesale from a stored snapshot.
    ///
    /// Clears the undo/redo history: operations recorded against the
    /// replaced state cannot be replayed against the restored one.
    pub fn restore_snapshot(&mut self, id: &str) -> Result<(), ManagerError> {
        if self.batch.is_some() {
            return Err(ManagerError::BatchActive);
        }
        let snap = self
            .snapshots
            .get(id)
            .cloned()
            .ok_or_else(|| ManagerError::SnapshotNotFound(id.to_string()))?;
        {
            let mut store = self.lock_store();
            snapshot::restore(&mut store, self.factory.as_ref(), &snap.blob)?;
        }
        self.history.clear();
        tracing::debug!(id, "graph_snapshot_restore");
        Ok(())
    }

    /// Deletes a stored snapshot.
    pub fn delete_snapshot(&mut self, id: &str) -> Result<(), ManagerError> {
        self.snapshots
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ManagerError::SnapshotNotFound(id.to_string()))
    }

    /// Lists stored snapshots in unspecified order.
    pub fn list_snapshots(&self) -> Vec<SnapshotInfo> {
        self.snapshots
            .values()
            .map(|s| SnapshotInfo {
                id: s.id.clone(),
                name: s.name.clone(),
            })
            .collect()
    }
}

/// Generates a collision-resistant random snapshot token.
fn snapshot_token() -> String {
    format!("{:016x}{:016x}", fastrand::u64(..), fastrand::u64(..))
}
