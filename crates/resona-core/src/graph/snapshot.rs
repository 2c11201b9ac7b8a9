//! Snapshot capture and restore.
//!
//! A snapshot is an opaque serialized capture of the full graph state:
//! nodes (with each unit's saved state blob), connections, and the I/O
//! configuration. Restoring replaces the current graph wholesale; units are
//! re-instantiated through the manager's [`UnitFactory`] from the kind
//! identifier recorded when the node was created.

use serde::{Deserialize, Serialize};

use crate::context::EngineConfig;
use crate::unit::UnitFactory;

use super::connection::Connection;
use super::manager::ManagerError;
use super::node::{NodeId, NodeKind};
use super::store::{ExtractedNode, GraphStore};

/// A named, opaque capture of full graph state.
#[derive(Clone)]
pub struct Snapshot {
    /// Collision-resistant random token identifying the snapshot.
    pub id: String,
    /// Caller-supplied display name.
    pub name: String,
    pub(crate) blob: Vec<u8>,
}

impl Snapshot {
    /// The serialized state blob. Opaque to callers; the on-disk format is
    /// the embedder's concern.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bytes", &self.blob.len())
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotDocument {
    config: EngineConfig,
    nodes: Vec<SnapshotNode>,
    connections: Vec<Connection>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotNode {
    id: u64,
    name: String,
    kind: SnapshotNodeKind,
    enabled: bool,
    bypassed: bool,
}

#[derive(Serialize, Deserialize)]
enum SnapshotNodeKind {
    AudioInput,
    AudioOutput,
    Unit { kind: String, state: Vec<u8> },
}

/// Serializes the store's full state into a blob.
pub(crate) fn capture(store: &GraphStore) -> Result<Vec<u8>, ManagerError> {
    let mut nodes = Vec::new();
    for id in store.node_ids() {
        let node = store.node(id).expect("node_ids listed a missing node");
        let kind = match &node.kind {
            NodeKind::AudioInput => SnapshotNodeKind::AudioInput,
            NodeKind::AudioOutput => SnapshotNodeKind::AudioOutput,
            NodeKind::Unit(unit) => {
                let kind = node
                    .unit_kind
                    .clone()
                    .ok_or(ManagerError::UnitNotRestorable(id))?;
                SnapshotNodeKind::Unit {
                    kind,
                    state: unit.save_state(),
                }
            }
        };
        nodes.push(SnapshotNode {
            id: id.index(),
            name: node.name.clone(),
            kind,
            enabled: node.enabled,
            bypassed: node.bypassed,
        });
    }

    let document = SnapshotDocument {
        config: store.config(),
        nodes,
        connections: store.connections().to_vec(),
    };
    serde_json::to_vec(&document).map_err(|e| ManagerError::Serialization(e.to_string()))
}

/// Replaces the store's state wholesale from a captured blob.
pub(crate) fn restore(
    store: &mut GraphStore,
    factory: &dyn UnitFactory,
    blob: &[u8],
) -> Result<(), ManagerError> {
    let document: SnapshotDocument =
        serde_json::from_slice(blob).map_err(|e| ManagerError::Serialization(e.to_string()))?;

    store.clear()?;
    store.context().set_config(document.config);

    for node in document.nodes {
        let (kind, unit_kind, inputs, outputs) = match node.kind {
            SnapshotNodeKind::AudioInput => {
                (NodeKind::AudioInput, None, 0, document.config.input_channels)
            }
            SnapshotNodeKind::AudioOutput => (
                NodeKind::AudioOutput,
                None,
                document.config.output_channels,
                0,
            ),
            SnapshotNodeKind::Unit { kind, state } => {
                let mut unit = factory
                    .create(&kind)
                    .ok_or_else(|| ManagerError::UnknownUnitKind(kind.clone()))?;
                unit.load_state(&state);
                let inputs = unit.input_channels();
                let outputs = unit.output_channels();
                (NodeKind::Unit(unit), Some(kind), inputs, outputs)
            }
        };

        store.restore_node(ExtractedNode {
            id: NodeId(node.id),
            name: node.name,
            kind,
            unit_kind,
            enabled: node.enabled,
            bypassed: node.bypassed,
            input_channels: inputs,
            output_channels: outputs,
            connections: Vec::new(),
        })?;
    }

    for conn in document.connections {
        store.add_connection(conn)?;
    }
    Ok(())
}
