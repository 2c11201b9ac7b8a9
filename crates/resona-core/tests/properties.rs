//! Property-based tests for graph invariants.
//!
//! Uses proptest to drive random mutation sequences against the graph
//! manager and verify the structural invariants: the graph stays acyclic or
//! the offending mutation is rejected with the graph unchanged, and the undo
//! history is an exact inverse of every applied sequence.

use std::sync::Arc;

use proptest::prelude::*;

use resona_core::graph::{Connection, GraphManager, ManagerError, NodeId};
use resona_core::units::{BasicUnitFactory, GAIN_KIND};
use resona_core::{EngineConfig, EngineContext};

fn manager() -> GraphManager {
    GraphManager::new(
        EngineContext::new(EngineConfig {
            sample_rate: 48000.0,
            block_size: 16,
            input_channels: 2,
            output_channels: 2,
        }),
        Arc::new(BasicUnitFactory),
    )
}

/// One randomized control-plane action. Indices are reduced modulo the
/// current node/connection count at application time, and channel indices
/// deliberately range past the valid bounds to exercise rejection paths.
#[derive(Debug, Clone)]
enum Step {
    Add,
    Remove(usize),
    ConnectAudio(usize, usize, usize, usize),
    Disconnect(usize),
    SetEnabled(usize, bool),
    SetBypassed(usize, bool),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::Add),
        1 => any::<usize>().prop_map(Step::Remove),
        4 => (any::<usize>(), 0usize..4, any::<usize>(), 0usize..4)
            .prop_map(|(a, ac, b, bc)| Step::ConnectAudio(a, ac, b, bc)),
        1 => any::<usize>().prop_map(Step::Disconnect),
        1 => (any::<usize>(), any::<bool>()).prop_map(|(i, v)| Step::SetEnabled(i, v)),
        1 => (any::<usize>(), any::<bool>()).prop_map(|(i, v)| Step::SetBypassed(i, v)),
    ]
}

type GraphState = (Vec<(NodeId, bool, bool)>, Vec<Connection>);

fn graph_state(mgr: &GraphManager) -> GraphState {
    let store = mgr.store();
    let store = store.lock().unwrap();
    let nodes = store
        .node_ids()
        .into_iter()
        .map(|id| {
            (
                id,
                store.is_enabled(id).unwrap(),
                store.is_bypassed(id).unwrap(),
            )
        })
        .collect();
    (nodes, store.connections().to_vec())
}

fn node_at(mgr: &GraphManager, index: usize) -> Option<NodeId> {
    let store = mgr.store();
    let ids = store.lock().unwrap().node_ids();
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()])
    }
}

fn connection_at(mgr: &GraphManager, index: usize) -> Option<Connection> {
    let store = mgr.store();
    let conns = store.lock().unwrap().connections().to_vec();
    if conns.is_empty() {
        None
    } else {
        Some(conns[index % conns.len()])
    }
}

/// Applies one step; steps addressing an empty collection are no-ops.
fn try_apply(mgr: &mut GraphManager, step: &Step) -> Result<(), ManagerError> {
    match step {
        Step::Add => mgr.add_unit(GAIN_KIND, "unit").map(|_| ()),
        Step::Remove(i) => match node_at(mgr, *i) {
            Some(id) => mgr.remove_node(id),
            None => Ok(()),
        },
        Step::ConnectAudio(a, ac, b, bc) => {
            match (node_at(mgr, *a), node_at(mgr, *b)) {
                (Some(src), Some(dst)) => mgr.connect_audio(src, *ac, dst, *bc),
                _ => Ok(()),
            }
        }
        Step::Disconnect(i) => match connection_at(mgr, *i) {
            Some(conn) => mgr.disconnect(conn),
            None => Ok(()),
        },
        Step::SetEnabled(i, v) => match node_at(mgr, *i) {
            Some(id) => mgr.set_enabled(id, *v),
            None => Ok(()),
        },
        Step::SetBypassed(i, v) => match node_at(mgr, *i) {
            Some(id) => mgr.set_bypassed(id, *v),
            None => Ok(()),
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// For any mutation sequence, the graph remains acyclic, or the
    /// offending mutation is rejected and the graph is unchanged.
    #[test]
    fn mutations_preserve_acyclicity(steps in prop::collection::vec(step_strategy(), 1..24)) {
        let mut mgr = manager();
        for step in &steps {
            let before = graph_state(&mgr);
            let result = try_apply(&mut mgr, step);
            if result.is_err() {
                prop_assert_eq!(graph_state(&mgr), before);
            }
            prop_assert!(mgr.detect_loops().is_empty(), "cycle after {:?}", step);
            prop_assert!(mgr.validate().is_valid);
        }
    }

    /// Undoing every recorded operation walks the graph back to empty, and
    /// redoing them reproduces the final state exactly.
    #[test]
    fn undo_is_exact_inverse(steps in prop::collection::vec(step_strategy(), 1..24)) {
        let mut mgr = manager();
        for step in &steps {
            let _ = try_apply(&mut mgr, step);
        }
        let final_state = graph_state(&mgr);
        let depth = mgr.undo_depth();

        for _ in 0..depth {
            mgr.undo().unwrap();
        }
        let (nodes, connections) = graph_state(&mgr);
        prop_assert!(nodes.is_empty());
        prop_assert!(connections.is_empty());

        for _ in 0..depth {
            mgr.redo().unwrap();
        }
        prop_assert_eq!(graph_state(&mgr), final_state);
    }
}
