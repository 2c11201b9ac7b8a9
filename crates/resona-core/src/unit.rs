//! The [`ProcessingUnit`] capability trait.
//!
//! A processing unit is an opaque audio processor hosted by the engine: a
//! plugin wrapper, a built-in utility, or an I/O anchor. The engine is
//! generic over this trait and never sees concrete unit types. Discovery and
//! instantiation of real plugins live outside this crate, behind
//! [`UnitFactory`].

use crate::buffer::{AudioBuffer, EventQueue};

/// Highest sample magnitude a unit may produce before its output is treated
/// as a render fault.
pub const FAULT_SAMPLE_LIMIT: f32 = 8.0;

/// Fault raised by a unit during a render call.
///
/// A `ProcessError` never crosses the render boundary: the engine converts
/// it into disable-and-notify inside the render path and the block completes
/// with silence in place of the faulty unit's output.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessError {
    /// The unit was asked to process before `prepare` was called.
    #[error("unit processed before prepare")]
    NotPrepared,
    /// The unit's internal processing failed.
    #[error("unit fault: {0}")]
    Fault(String),
}

/// An audio processing unit hosted by the engine.
///
/// The lifecycle is `prepare → process* → release`. `prepare` supplies the
/// sample rate and maximum block size; `process` is called once per block on
/// the render path and must not allocate or block; `release` frees any
/// resources acquired in `prepare`. Units must tolerate repeated
/// prepare/release cycles.
///
/// # Example
///
/// ```rust
/// use resona_core::{AudioBuffer, EventQueue, ProcessError, ProcessingUnit};
///
/// struct Inverter;
///
/// impl ProcessingUnit for Inverter {
///     fn name(&self) -> &str {
///         "inverter"
///     }
///
///     fn process(
///         &mut self,
///         buffer: &mut AudioBuffer,
///         _events: &mut EventQueue,
///     ) -> Result<(), ProcessError> {
///         for ch in 0..buffer.channel_count() {
///             for s in buffer.channel_mut(ch) {
///                 *s = -*s;
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ProcessingUnit: Send {
    /// Human-readable unit name.
    fn name(&self) -> &str;

    /// Prepares the unit for processing at the given sample rate and block size.
    fn prepare(&mut self, _sample_rate: f32, _block_size: usize) {}

    /// Processes one block of audio in place.
    ///
    /// `buffer` carries the unit's input on entry and must carry its output
    /// on return. `events` holds routed incoming events and collects any the
    /// unit emits.
    fn process(
        &mut self,
        buffer: &mut AudioBuffer,
        events: &mut EventQueue,
    ) -> Result<(), ProcessError>;

    /// Releases resources acquired in [`prepare`](Self::prepare).
    fn release(&mut self) {}

    /// Number of input channels the unit consumes.
    fn input_channels(&self) -> usize {
        2
    }

    /// Number of output channels the unit produces.
    fn output_channels(&self) -> usize {
        2
    }

    /// Processing latency in samples, as reported by the unit.
    fn latency_samples(&self) -> usize {
        0
    }

    /// Serializes the unit's internal state to an opaque blob.
    fn save_state(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restores internal state from a blob produced by [`save_state`](Self::save_state).
    ///
    /// Unrecognized blobs must be ignored, not panicked on.
    fn load_state(&mut self, _blob: &[u8]) {}
}

/// Creates processing units from a kind identifier.
///
/// This is the engine's boundary to plugin discovery: scanning, on-disk
/// catalogs, and format bridging all live behind an implementation of this
/// trait. The graph manager uses it to re-instantiate units when restoring a
/// snapshot.
pub trait UnitFactory: Send + Sync {
    /// Instantiates a unit of the given kind, or `None` if the kind is unknown.
    fn create(&self, kind: &str) -> Option<Box<dyn ProcessingUnit>>;

    /// Kind identifiers this factory can instantiate.
    fn kinds(&self) -> Vec<String>;
}
