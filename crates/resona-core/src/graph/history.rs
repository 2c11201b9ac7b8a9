//! Undo/redo operation log.
//!
//! Every mutation through the [`GraphManager`](super::GraphManager) appends
//! an [`Operation`] carrying enough payload to invert itself. Node-removing
//! operations stash the extracted node (unit included) inside the operation,
//! so undo and redo move whole nodes in and out of the graph without
//! needing to clone units.

use std::collections::VecDeque;

use super::connection::Connection;
use super::node::NodeId;
use super::store::{ExtractedNode, GraphError, GraphStore};

/// Maximum number of operations kept in the undo history. Older entries are
/// dropped and become unrecoverable.
pub const HISTORY_LIMIT: usize = 64;

/// A boolean node property toggled through the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeProperty {
    /// Whether the node participates in rendering at all.
    Enabled,
    /// Whether the node passes audio through unmodified.
    Bypassed,
}

/// One undoable mutation.
///
/// The `stash` fields hold a node lifted out of the graph: filled when the
/// operation's current direction has the node removed, emptied when it has
/// been put back. Applying an operation in either direction exchanges the
/// stash with the graph.
pub enum Operation {
    /// A node was added.
    AddNode {
        /// The added node.
        id: NodeId,
        /// Holds the node while it is undone out of the graph.
        stash: Option<ExtractedNode>,
    },
    /// A node was removed, along with its incident connections.
    RemoveNode {
        /// The removed node.
        id: NodeId,
        /// Holds the node while it is out of the graph.
        stash: Option<ExtractedNode>,
    },
    /// A connection was added.
    AddConnection {
        /// The added connection.
        connection: Connection,
    },
    /// A connection was removed.
    RemoveConnection {
        /// The removed connection.
        connection: Connection,
    },
    /// A node property was changed.
    SetProperty {
        /// The affected node.
        id: NodeId,
        /// Which property changed.
        property: NodeProperty,
        /// Value before the change.
        previous: bool,
        /// Value after the change.
        value: bool,
    },
    /// A group of mutations committed as one undoable unit.
    Batch {
        /// Batch label supplied at `begin_batch`.
        name: String,
        /// The buffered operations, in application order.
        operations: Vec<Operation>,
    },
}

impl Operation {
    /// Applies the inverse of this operation to the store.
    pub(crate) fn undo(&mut self, store: &mut GraphStore) -> Result<(), GraphError> {
        match self {
            Operation::AddNode { id, stash } => {
                *stash = Some(store.extract_node(*id)?);
                Ok(())
            }
            Operation::RemoveNode { stash, .. } => {
                let node = stash.take().expect("undo of remove without stashed node");
                store.restore_node(node)?;
                Ok(())
            }
            Operation::AddConnection { connection } => store.disconnect(connection),
            Operation::RemoveConnection { connection } => store.add_connection(*connection),
            Operation::SetProperty {
                id,
                property,
                previous,
                ..
            } => apply_property(store, *id, *property, *previous),
            Operation::Batch { operations, .. } => {
                for op in operations.iter_mut().rev() {
                    op.undo(store)?;
                }
                Ok(())
            }
        }
    }

    /// Re-applies this operation to the store.
    pub(crate) fn redo(&mut self, store: &mut GraphStore) -> Result<(), GraphError> {
        match self {
            Operation::AddNode { stash, .. } => {
                let node = stash.take().expect("redo of add without stashed node");
                store.restore_node(node)?;
                Ok(())
            }
            Operation::RemoveNode { id, stash } => {
                *stash = Some(store.extract_node(*id)?);
                Ok(())
            }
            Operation::AddConnection { connection } => store.add_connection(*connection),
            Operation::RemoveConnection { connection } => store.disconnect(connection),
            Operation::SetProperty {
                id,
                property,
                value,
                ..
            } => apply_property(store, *id, *property, *value),
            Operation::Batch { operations, .. } => {
                for op in operations.iter_mut() {
                    op.redo(store)?;
                }
                Ok(())
            }
        }
    }
}

fn apply_property(
    store: &mut GraphStore,
    id: NodeId,
    property: NodeProperty,
    value: bool,
) -> Result<(), GraphError> {
    match property {
        NodeProperty::Enabled => store.set_enabled(id, value),
        NodeProperty::Bypassed => store.set_bypassed(id, value),
    }
}

/// Linear undo/redo history with a bounded undo stack.
#[derive(Default)]
pub(crate) struct History {
    undo: VecDeque<Operation>,
    redo: Vec<Operation>,
}

impl History {
    /// Appends a freshly applied operation. Clears the redo stack (standard
    /// linear history) and drops the oldest entry past [`HISTORY_LIMIT`].
    pub fn push(&mut self, op: Operation) {
        self.redo.clear();
        if self.undo.len() == HISTORY_LIMIT {
            self.undo.pop_front();
        }
        self.undo.push_back(op);
    }

    pub fn pop_undo(&mut self) -> Option<Operation> {
        self.undo.pop_back()
    }

    pub fn push_undone(&mut self, op: Operation) {
        self.redo.push(op);
    }

    pub fn pop_redo(&mut self) -> Option<Operation> {
        self.redo.pop()
    }

    pub fn push_redone(&mut self, op: Operation) {
        if self.undo.len() == HISTORY_LIMIT {
            self.undo.pop_front();
        }
        self.undo.push_back(op);
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
