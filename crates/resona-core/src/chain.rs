//! Linear processing chain.
//!
//! An ordered list of processing units for strictly series routing, used
//! where full-graph flexibility is unnecessary. All list edits and the
//! render call itself serialize on a single exclusive lock — a deliberate
//! simplification trading peak concurrency for reasoning simplicity.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::buffer::{AudioBuffer, EventQueue};
use crate::context::EngineContext;
use crate::notify::{Notification, Origin};
use crate::stats::{PerformanceReport, RenderStats};
use crate::unit::{FAULT_SAMPLE_LIMIT, ProcessingUnit};

/// Errors from chain list edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The slot index does not exist.
    #[error("chain slot {0} out of bounds")]
    SlotOutOfBounds(usize),
}

struct ChainSlot {
    unit: Box<dyn ProcessingUnit>,
    enabled: bool,
    bypassed: bool,
}

struct ChainInner {
    slots: Vec<ChainSlot>,
    /// `Some((sample_rate, block_size))` between prepare and release.
    prepared: Option<(f32, usize)>,
    /// Pre-unit snapshot used to recover the signal when a unit faults.
    scratch: AudioBuffer,
    stats: RenderStats,
}

/// Ordered series chain of processing units.
///
/// Each slot is a unit plus its `enabled`/`bypassed` flags. Disabled slots
/// are skipped entirely; bypassed slots stay in the series but pass their
/// input through unmodified. A unit that faults during
/// [`process_block`](Self::process_block) is disabled, an error notification
/// fires, and the rest of the chain still runs in the same call.
pub struct ProcessingChain {
    inner: Mutex<ChainInner>,
    context: Arc<EngineContext>,
}

impl ProcessingChain {
    /// Creates an empty chain bound to the given context.
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            inner: Mutex::new(ChainInner {
                slots: Vec::new(),
                prepared: None,
                scratch: AudioBuffer::new(0, 0),
                stats: RenderStats::new(),
            }),
            context,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainInner> {
        self.inner.lock().expect("chain lock poisoned")
    }

    // --- List edits ---

    /// Appends a unit to the end of the chain. Returns its slot index.
    pub fn add_unit(&self, mut unit: Box<dyn ProcessingUnit>) -> usize {
        let mut inner = self.lock();
        if let Some((sample_rate, block_size)) = inner.prepared {
            unit.prepare(sample_rate, block_size);
        }
        tracing::debug!(slot = inner.slots.len(), unit = unit.name(), "chain_add");
        inner.slots.push(ChainSlot {
            unit,
            enabled: true,
            bypassed: false,
        });
        inner.slots.len() - 1
    }

    /// Inserts a unit at `index`, shifting later slots right.
    pub fn insert_unit(&self, index: usize, mut unit: Box<dyn ProcessingUnit>) -> Result<(), ChainError> {
        let mut inner = self.lock();
        if index > inner.slots.len() {
            return Err(ChainError::SlotOutOfBounds(index));
        }
        if let Some((sample_rate, block_size)) = inner.prepared {
            unit.prepare(sample_rate, block_size);
        }
        tracing::debug!(slot = index, unit = unit.name(), "chain_insert");
        inner.slots.insert(
            index,
            ChainSlot {
                unit,
                enabled: true,
                bypassed: false,
            },
        );
        Ok(())
    }

    /// Removes the unit at `index` and returns it, released.
    pub fn remove_unit(&self, index: usize) -> Result<Box<dyn ProcessingUnit>, ChainError> {
        let mut inner = self.lock();
        if index >= inner.slots.len() {
            return Err(ChainError::SlotOutOfBounds(index));
        }
        let mut slot = inner.slots.remove(index);
        if inner.prepared.is_some() {
            slot.unit.release();
        }
        tracing::debug!(slot = index, "chain_remove");
        Ok(slot.unit)
    }

    /// Moves the unit at `from` to position `to`, shifting slots between.
    pub fn move_unit(&self, from: usize, to: usize) -> Result<(), ChainError> {
        let mut inner = self.lock();
        if from >= inner.slots.len() {
            return Err(ChainError::SlotOutOfBounds(from));
        }
        if to >= inner.slots.len() {
            return Err(ChainError::SlotOutOfBounds(to));
        }
        let slot = inner.slots.remove(from);
        inner.slots.insert(to, slot);
        tracing::debug!(from, to, "chain_move");
        Ok(())
    }

    /// Enables or disables the slot at `index`.
    ///
    /// A disabled slot is removed from the active series entirely.
    pub fn set_enabled(&self, index: usize, enabled: bool) -> Result<(), ChainError> {
        let mut inner = self.lock();
        let slot = inner
            .slots
            .get_mut(index)
            .ok_or(ChainError::SlotOutOfBounds(index))?;
        slot.enabled = enabled;
        Ok(())
    }

    /// Bypasses or un-bypasses the slot at `index`.
    ///
    /// A bypassed slot stays in the series but passes audio through
    /// unmodified, preserving its positional latency contribution.
    pub fn set_bypassed(&self, index: usize, bypassed: bool) -> Result<(), ChainError> {
        let mut inner = self.lock();
        let slot = inner
            .slots
            .get_mut(index)
            .ok_or(ChainError::SlotOutOfBounds(index))?;
        slot.bypassed = bypassed;
        Ok(())
    }

    /// Whether the slot at `index` is enabled.
    pub fn is_enabled(&self, index: usize) -> Option<bool> {
        self.lock().slots.get(index).map(|s| s.enabled)
    }

    /// Whether the slot at `index` is bypassed.
    pub fn is_bypassed(&self, index: usize) -> Option<bool> {
        self.lock().slots.get(index).map(|s| s.bypassed)
    }

    /// Number of slots in the chain.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Whether the chain has no slots.
    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    // --- Lifecycle ---

    /// Prepares every unit at the given sample rate and block size.
    pub fn prepare(&self, sample_rate: f32, block_size: usize) {
        let mut inner = self.lock();
        for slot in &mut inner.slots {
            slot.unit.prepare(sample_rate, block_size);
        }
        inner.prepared = Some((sample_rate, block_size));
        inner.stats.reset();
        tracing::debug!(sample_rate, block_size, "chain_prepare");
    }

    /// Releases every unit. Safe to call repeatedly.
    pub fn release(&self) {
        let mut inner = self.lock();
        if inner.prepared.take().is_some() {
            for slot in &mut inner.slots {
                slot.unit.release();
            }
            tracing::debug!("chain_release");
        }
    }

    /// Sum of reported unit latencies over enabled slots.
    pub fn latency_samples(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.unit.latency_samples())
            .sum()
    }

    // --- Processing ---

    /// Processes one block in place through the series.
    ///
    /// Holds the chain lock for the duration of the pass. A slot that faults
    /// (unit error or non-finite/out-of-range output) is disabled, its input
    /// passes through unchanged, an error notification fires, and the
    /// remaining slots still process.
    pub fn process_block(&self, buffer: &mut AudioBuffer, events: &mut EventQueue) {
        let started = Instant::now();
        let mut inner = self.lock();
        let inner = &mut *inner;

        if inner.scratch.channel_count() != buffer.channel_count()
            || inner.scratch.frames() != buffer.frames()
        {
            inner.scratch = AudioBuffer::new(buffer.channel_count(), buffer.frames());
        }

        for (index, slot) in inner.slots.iter_mut().enumerate() {
            if !slot.enabled || slot.bypassed {
                continue;
            }

            inner.scratch.copy_from(buffer);
            let result = slot.unit.process(buffer, events);
            let faulted = match result {
                Err(err) => Some(err.to_string()),
                Ok(()) if !buffer.within_range(FAULT_SAMPLE_LIMIT) => {
                    Some("non-finite or out-of-range output sample".to_string())
                }
                Ok(()) => None,
            };

            if let Some(message) = faulted {
                slot.enabled = false;
                buffer.copy_from(&inner.scratch);
                tracing::warn!(slot = index, unit = slot.unit.name(), %message, "chain_fault");
                self.context.hub().notify(&Notification::Error {
                    origin: Origin::Chain,
                    message: format!("slot {index} ({}) disabled: {message}", slot.unit.name()),
                });
            }
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        inner.stats.record(elapsed_ms);
    }

    /// Rolling performance over the last processed blocks.
    ///
    /// Returns the default (zeroed) report before `prepare`.
    pub fn performance(&self) -> PerformanceReport {
        let inner = self.lock();
        match inner.prepared {
            Some((sample_rate, block_size)) => inner.stats.report(block_size, sample_rate),
            None => PerformanceReport::default(),
        }
    }
}
