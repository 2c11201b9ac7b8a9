//! Shared engine context.
//!
//! An [`EngineContext`] bundles the execution configuration and the
//! notification hub. It is created once, wrapped in an `Arc`, and passed
//! explicitly to every manager and engine at construction — there is no
//! ambient global state. Init and shutdown are explicit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::notify::NotificationHub;

/// Execution parameters shared by all engines.
///
/// Immutable during an active render pass: changing the configuration
/// requires stopping the engine, reconfiguring, re-preparing, and
/// restarting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Frames per processing block.
    pub block_size: usize,
    /// External input channel count.
    pub input_channels: usize,
    /// External output channel count.
    pub output_channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            block_size: 512,
            input_channels: 2,
            output_channels: 2,
        }
    }
}

impl EngineConfig {
    /// Duration of one block in milliseconds.
    pub fn block_duration_ms(&self) -> f64 {
        self.block_size as f64 / f64::from(self.sample_rate) * 1000.0
    }
}

/// Shared, reference-counted engine context.
pub struct EngineContext {
    config: Mutex<EngineConfig>,
    hub: NotificationHub,
    initialized: AtomicBool,
}

impl EngineContext {
    /// Creates a context with the given configuration.
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            config: Mutex::new(config),
            hub: NotificationHub::new(),
            initialized: AtomicBool::new(false),
        })
    }

    /// Marks the context initialized. Idempotent.
    pub fn initialize(&self) {
        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!("engine context initialized");
    }

    /// Marks the context shut down. Idempotent.
    pub fn shutdown(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        tracing::info!("engine context shut down");
    }

    /// Whether [`initialize`](Self::initialize) has been called.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Returns a copy of the current configuration.
    pub fn config(&self) -> EngineConfig {
        *self.config.lock().expect("engine config poisoned")
    }

    /// Replaces the configuration.
    ///
    /// Callers must stop any running engine first; the engines themselves
    /// reject reconfiguration while running.
    pub fn set_config(&self, config: EngineConfig) {
        *self.config.lock().expect("engine config poisoned") = config;
    }

    /// The notification hub shared by all engines using this context.
    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_shutdown_cycle() {
        let ctx = EngineContext::new(EngineConfig::default());
        assert!(!ctx.is_initialized());
        ctx.initialize();
        assert!(ctx.is_initialized());
        ctx.shutdown();
        assert!(!ctx.is_initialized());
    }

    #[test]
    fn config_replaced_wholesale() {
        let ctx = EngineContext::new(EngineConfig::default());
        let updated = EngineConfig {
            sample_rate: 44100.0,
            block_size: 256,
            ..EngineConfig::default()
        };
        ctx.set_config(updated);
        assert_eq!(ctx.config(), updated);
    }

    #[test]
    fn block_duration() {
        let config = EngineConfig {
            sample_rate: 48000.0,
            block_size: 480,
            ..EngineConfig::default()
        };
        assert!((config.block_duration_ms() - 10.0).abs() < 1e-9);
    }
}
