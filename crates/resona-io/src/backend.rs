//! Pluggable audio backend abstraction.
//!
//! [`AudioBackend`] decouples the realtime engine from any specific
//! platform audio API: device enumeration, default-device queries, and
//! stream construction with boxed callbacks. The default implementation is
//! [`CpalBackend`](crate::CpalBackend); a deterministic mock can stand in
//! for tests or headless use.
//!
//! The trait is object-safe by design — callbacks are boxed closures and
//! stream handles are type-erased — so backends can be selected at runtime
//! behind `Box<dyn AudioBackend>`.

use crate::Result;

/// Audio device information.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Human-readable device name.
    pub name: String,
    /// Whether the device supports audio input.
    pub is_input: bool,
    /// Whether the device supports audio output.
    pub is_output: bool,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
}

/// Configuration for building an audio stream.
#[derive(Debug, Clone)]
pub struct BackendStreamConfig {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Preferred buffer size in frames.
    pub buffer_size: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Optional device name filter (system default when `None`).
    pub device_name: Option<String>,
}

impl Default for BackendStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 512,
            channels: 2,
            device_name: None,
        }
    }
}

/// Type-erased audio stream handle.
///
/// The stream is active while this handle exists; dropping it stops
/// playback or capture. The inner value is `Box<dyn Send>`, keeping
/// backend-specific types out of engine code.
pub struct StreamHandle {
    _inner: Box<dyn Send>,
}

impl StreamHandle {
    /// Wraps a backend-specific stream object, keeping it alive until the
    /// handle is dropped.
    pub fn new<T: Send + 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Output callback: invoked on the audio thread with an interleaved buffer
/// to fill. Must not allocate, lock unboundedly, or perform I/O.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send>;

/// Input callback: invoked on the audio thread with captured interleaved
/// samples.
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send>;

/// Error callback: invoked with a human-readable message when the backend
/// encounters a streaming error.
pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

/// Platform audio API abstraction.
pub trait AudioBackend: Send {
    /// Human-readable backend name (e.g. `"cpal"`, `"mock"`).
    fn name(&self) -> &str;

    /// Lists all available audio devices.
    fn list_devices(&self) -> Result<Vec<AudioDevice>>;

    /// The default output device, if any.
    fn default_output_device(&self) -> Result<Option<AudioDevice>>;

    /// The default input device, if any.
    fn default_input_device(&self) -> Result<Option<AudioDevice>>;

    /// Builds and starts an output stream. The returned handle keeps it
    /// alive; dropping the handle stops playback.
    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;

    /// Builds and starts an input stream. The returned handle keeps it
    /// alive; dropping the handle stops capture.
    fn build_input_stream(
        &self,
        config: &BackendStreamConfig,
        callback: InputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;

    /// The sample rate the backend would actually use for this config.
    /// Defaults to the requested rate.
    fn actual_sample_rate(&self, config: &BackendStreamConfig) -> u32 {
        config.sample_rate
    }
}
