//! Resona Core - plugin-hosting graph and chain engines
//!
//! This crate provides the control-plane and render-path core of the resona
//! engine: it hosts opaque audio processing units inside a mutable routing
//! topology and executes that topology one block at a time.
//!
//! # Core Abstractions
//!
//! ## Unit Hosting
//!
//! - [`ProcessingUnit`] - Object-safe capability trait the engine consumes
//!   (prepare / process / release / latency / state)
//! - [`UnitFactory`] - Boundary to plugin discovery; creates units by kind
//! - [`AudioBuffer`] / [`EventQueue`] - Block currency on the render path
//!
//! ## Engines
//!
//! - [`GraphStore`](graph::GraphStore) - Node/connection store with a cached
//!   topological render order and fault-isolating block execution
//! - [`GraphManager`](graph::GraphManager) - Validated, undoable façade:
//!   cycle detection, capped undo/redo history, batched mutations, snapshots
//! - [`ProcessingChain`] - Ordered-list alternative for strictly series
//!   routing, one exclusive lock for edits and render
//!
//! ## Ambient
//!
//! - [`EngineContext`] - Explicit shared context (configuration +
//!   notification hub) passed to every engine at construction
//! - [`NotificationHub`] - Callback registry with explicit subscription
//!   handles; delivery is synchronous on the detecting thread
//! - [`RenderStats`] - Rolling window of block timings (average/peak/CPU%)
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use resona_core::graph::GraphManager;
//! use resona_core::units::BasicUnitFactory;
//! use resona_core::{EngineConfig, EngineContext};
//!
//! let context = EngineContext::new(EngineConfig::default());
//! let mut manager = GraphManager::new(context, Arc::new(BasicUnitFactory));
//!
//! let input = manager.add_audio_input();
//! let output = manager.add_audio_output();
//! let gain = manager.add_unit("gain", "main gain").unwrap();
//! manager.connect_audio(input, 0, gain, 0).unwrap();
//! manager.connect_audio(gain, 0, output, 0).unwrap();
//!
//! assert!(manager.validate().is_valid);
//! ```
//!
//! # Design Principles
//!
//! - **Faults never cross the render boundary**: a unit error or invalid
//!   output sample becomes disable-and-notify inside the render path
//! - **Mutations are invertible**: every manager mutation is an operation
//!   that can be undone, redone, or batched
//! - **Explicit context**: no ambient globals; engines share one
//!   reference-counted [`EngineContext`]

pub mod buffer;
pub mod chain;
pub mod context;
pub mod graph;
pub mod notify;
pub mod stats;
pub mod unit;
pub mod units;

pub use buffer::{AudioBuffer, Event, EventKind, EventQueue};
pub use chain::{ChainError, ProcessingChain};
pub use context::{EngineConfig, EngineContext};
pub use notify::{Notification, NotificationHub, Origin, SubscriptionHandle};
pub use stats::{PerformanceReport, RenderStats, STATS_WINDOW};
pub use unit::{FAULT_SAMPLE_LIMIT, ProcessError, ProcessingUnit, UnitFactory};
