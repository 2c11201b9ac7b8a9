//! Audio I/O layer for the resona engine.
//!
//! This crate provides:
//!
//! - **Streaming WAV I/O**: [`WavBlockReader`] and [`WavBlockWriter`] for
//!   block-at-a-time file processing
//! - **Audio backends**: the [`AudioBackend`] trait and the default
//!   [`CpalBackend`] implementation
//! - **Realtime engine**: [`RealtimeEngine`] bridging a live device callback
//!   to a processing chain (monitoring modes, recording, delay compensation,
//!   metering)
//! - **Offline engine**: [`OfflineEngine`] running file-to-file batch jobs
//!   across a bounded worker pool with cooperative pause/cancel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use resona_core::{EngineConfig, EngineContext, ProcessingChain};
//! use resona_core::units::GainUnit;
//! use resona_io::{OfflineEngine, TaskConfig};
//!
//! let context = EngineContext::new(EngineConfig::default());
//! let engine = OfflineEngine::new(Arc::clone(&context));
//!
//! let chain = ProcessingChain::new(Arc::clone(&context));
//! chain.add_unit(Box::new(GainUnit::from_db(-6.0)));
//!
//! engine.add_task("in.wav", "out.wav", chain, TaskConfig::default());
//! engine.start()?;
//! ```

mod backend;
mod cpal_backend;
mod offline;
mod realtime;
mod wav;

pub use backend::{
    AudioBackend, AudioDevice, BackendStreamConfig, ErrorCallback, InputCallback, OutputCallback,
    StreamHandle,
};
pub use cpal_backend::CpalBackend;
pub use offline::{OfflineEngine, TaskConfig, TaskId, TaskInfo, TaskStatus};
pub use realtime::{
    DelayCompensator, OUTPUT_SAMPLE_LIMIT, RealtimeConfig, RealtimeEngine, RenderState,
    RoutingMode,
};
pub use wav::{WavBlockReader, WavBlockWriter, WavFormat, WavInfo, WavSpec, read_wav_info};

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The requested sample format is not supported.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// The engine is already running.
    #[error("Engine already running")]
    AlreadyRunning,

    /// A recording is already active.
    #[error("Recording already active")]
    RecordingActive,

    /// The requested task does not exist.
    #[error("Unknown task id: {0}")]
    UnknownTask(u64),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;
