//! Node/connection graph engine.
//!
//! The graph module hosts processing units in a mutable routing topology:
//!
//! - [`GraphStore`] — owns nodes and connections, caches a topological
//!   render order, and executes blocks on the render path. Mutations happen
//!   on the control plane; the render call executes the cached order with
//!   per-node buffers allocated at prepare time.
//! - [`GraphManager`] — the validated, observable, undoable façade above the
//!   store: validation and loop detection, depth/latency estimation, a
//!   capped undo/redo history of invertible operations, batched mutations,
//!   and restorable snapshots.
//!
//! Fixed I/O anchor nodes pin the ends of the render order: an audio input
//! anchor has no audio predecessors and an audio output anchor has no audio
//! successors. Acyclicity is enforced at `connect` time; a mutation that
//! would introduce a cycle is rejected and the graph is left unchanged.

mod connection;
mod history;
mod manager;
mod node;
mod snapshot;
mod store;

pub use connection::Connection;
pub use history::{HISTORY_LIMIT, NodeProperty, Operation};
pub use manager::{GraphManager, ManagerError, SnapshotInfo, ValidationReport};
pub use node::NodeId;
pub use store::{ExtractedNode, GraphError, GraphStore, MAX_CHANNELS};
