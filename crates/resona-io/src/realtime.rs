//! Device-coupled realtime engine.
//!
//! [`RealtimeEngine`] bridges a live device callback to a
//! [`ProcessingChain`]: input frames are captured, routed through the chain
//! according to the active [`RoutingMode`], delay-compensated, scrubbed
//! against invalid samples, optionally recorded, metered, and delivered to
//! the output stream.
//!
//! Recording state lives under its own lock, distinct from the
//! configuration lock, so file-writer setup and teardown never block the
//! render path; the render thread only ever `try_lock`s the recorder.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::time::Instant;

use resona_core::{
    AudioBuffer, EngineContext, EventQueue, Notification, Origin, PerformanceReport,
    ProcessingChain, RenderStats,
};

use crate::backend::{AudioBackend, BackendStreamConfig, StreamHandle};
use crate::wav::{WavBlockWriter, WavSpec};
use crate::{Error, Result};

/// Output-path sample scrub limit: any non-finite sample, or one whose
/// magnitude exceeds this, is replaced with silence rather than propagated
/// to the device.
pub const OUTPUT_SAMPLE_LIMIT: f32 = 2.0;

/// Time constant of the exponential level-meter smoothing.
const METER_TIME_CONSTANT_SECS: f64 = 0.2;

/// How the engine routes input and processed signal to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// Raw input copied to the output, scaled by the monitoring gain.
    DirectMonitoring,
    /// Processed signal copied to the output, or silence if monitoring is
    /// disabled.
    ProcessedMonitoring,
    /// Channel 0 carries raw input, channel 1 the processed signal.
    SplitMonitoring,
}

/// Runtime configuration of a [`RealtimeEngine`].
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Active routing mode.
    pub mode: RoutingMode,
    /// Gain applied to raw input in [`RoutingMode::DirectMonitoring`].
    pub monitor_gain: f32,
    /// Whether [`RoutingMode::ProcessedMonitoring`] produces output at all.
    pub monitoring_enabled: bool,
    /// Delay compensation length in samples. Applied from the next
    /// [`RealtimeEngine::start`].
    pub compensation_samples: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::ProcessedMonitoring,
            monitor_gain: 1.0,
            monitoring_enabled: true,
            compensation_samples: 0,
        }
    }
}

/// Fixed-delay multi-channel ring buffer.
///
/// Each sample position performs the classic delay-line exchange: read the
/// delayed sample before writing the incoming one, yielding a deterministic
/// constant added latency of exactly `delay_samples`.
pub struct DelayCompensator {
    lines: Vec<Vec<f32>>,
    write_pos: usize,
    delay_samples: usize,
}

impl DelayCompensator {
    /// Creates a compensator for `channels` channels with a fixed delay.
    /// A delay of 0 is a no-op.
    pub fn new(channels: usize, delay_samples: usize) -> Self {
        let len = delay_samples.max(1);
        Self {
            lines: (0..channels).map(|_| vec![0.0; len]).collect(),
            write_pos: 0,
            delay_samples,
        }
    }

    /// The configured delay in samples.
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    /// Delays the first `frames` frames of the buffer in place.
    pub fn process_block_inplace(&mut self, buffer: &mut AudioBuffer, frames: usize) {
        if self.delay_samples == 0 {
            return;
        }
        let channels = self.lines.len().min(buffer.channel_count());
        let frames = frames.min(buffer.frames());
        for i in 0..frames {
            let pos = self.write_pos;
            for c in 0..channels {
                let ch = buffer.channel_mut(c);
                let delayed = self.lines[c][pos];
                self.lines[c][pos] = ch[i];
                ch[i] = delayed;
            }
            self.write_pos = (pos + 1) % self.delay_samples;
        }
    }

    /// Clears the delay lines to silence.
    pub fn clear(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write_pos = 0;
    }
}

/// Render-thread-owned scratch state for one engine instance.
///
/// Created by [`RealtimeEngine::render_state`] and owned by the output
/// callback (or a test harness); the engine itself holds no per-block
/// scratch, keeping [`RealtimeEngine::render_block`] callable without a
/// device.
pub struct RenderState {
    processed: AudioBuffer,
    events: EventQueue,
    compensator: DelayCompensator,
}

/// State shared between the engine handle and the device callbacks.
struct EngineShared {
    context: Arc<EngineContext>,
    chain: Arc<ProcessingChain>,
    config: Mutex<RealtimeConfig>,
    recorder: Mutex<Option<WavBlockWriter>>,
    recording: AtomicBool,
    running: AtomicBool,
    device_failed: AtomicBool,
    input_level: AtomicU32,
    output_level: AtomicU32,
    stats: Mutex<RenderStats>,
}

/// Bridges a live device callback to a processing chain.
pub struct RealtimeEngine {
    shared: Arc<EngineShared>,
    streams: Mutex<Vec<StreamHandle>>,
}

impl RealtimeEngine {
    /// Creates an engine driving the given chain.
    pub fn new(context: Arc<EngineContext>, chain: Arc<ProcessingChain>) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                context,
                chain,
                config: Mutex::new(RealtimeConfig::default()),
                recorder: Mutex::new(None),
                recording: AtomicBool::new(false),
                running: AtomicBool::new(false),
                device_failed: AtomicBool::new(false),
                input_level: AtomicU32::new(0),
                output_level: AtomicU32::new(0),
                stats: Mutex::new(RenderStats::new()),
            }),
            streams: Mutex::new(Vec::new()),
        }
    }

    /// The chain this engine drives.
    pub fn chain(&self) -> &Arc<ProcessingChain> {
        &self.shared.chain
    }

    // --- Configuration ---

    /// Returns a copy of the current runtime configuration.
    pub fn config(&self) -> RealtimeConfig {
        self.shared.lock_config().clone()
    }

    /// Switches the routing mode. Takes effect at the next block.
    pub fn set_routing_mode(&self, mode: RoutingMode) {
        self.shared.lock_config().mode = mode;
    }

    /// Sets the direct-monitoring gain.
    pub fn set_monitor_gain(&self, gain: f32) {
        self.shared.lock_config().monitor_gain = gain;
    }

    /// Enables or disables processed monitoring output.
    pub fn set_monitoring_enabled(&self, enabled: bool) {
        self.shared.lock_config().monitoring_enabled = enabled;
    }

    /// Sets the delay compensation length. Takes effect at the next
    /// [`start`](Self::start).
    pub fn set_compensation_samples(&self, samples: usize) {
        self.shared.lock_config().compensation_samples = samples;
    }

    // --- Lifecycle ---

    /// Opens input and output streams on the backend and starts processing.
    ///
    /// A device failure here (or later, via the backend's error callback) is
    /// fatal to this engine instance until the next `start`, which clears
    /// the failure flag.
    pub fn start(&self, backend: &dyn AudioBackend) -> Result<()> {
        let shared = &self.shared;
        if shared.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }
        shared.device_failed.store(false, Ordering::SeqCst);

        let cfg = shared.context.config();
        shared.chain.prepare(cfg.sample_rate, cfg.block_size);

        match open_streams(shared, backend, &cfg) {
            Ok(streams) => {
                *self.streams.lock().expect("stream handles poisoned") = streams;
                tracing::info!(
                    sample_rate = cfg.sample_rate,
                    block_size = cfg.block_size,
                    "realtime engine started"
                );
                shared.context.hub().notify(&Notification::StateChanged {
                    origin: Origin::Realtime,
                    state: "started".to_string(),
                });
                Ok(())
            }
            Err(err) => {
                shared.running.store(false, Ordering::SeqCst);
                shared.device_failed.store(true, Ordering::SeqCst);
                shared.chain.release();
                tracing::error!(%err, "realtime engine failed to start");
                Err(err)
            }
        }
    }

    /// Stops the streams, finalizes any active recording, and releases the
    /// chain. Idempotent.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.streams.lock().expect("stream handles poisoned").clear();
        if let Err(err) = self.stop_recording() {
            tracing::warn!(%err, "recording finalize failed during stop");
        }
        self.shared.chain.release();
        tracing::info!("realtime engine stopped");
        self.shared.context.hub().notify(&Notification::StateChanged {
            origin: Origin::Realtime,
            state: "stopped".to_string(),
        });
    }

    /// Whether the engine is currently running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether a device failure has been detected since the last start.
    pub fn is_failed(&self) -> bool {
        self.shared.device_failed.load(Ordering::SeqCst)
    }

    // --- Recording ---

    /// Starts recording the raw input signal to a WAV file.
    ///
    /// Recording state is independent of the run state; it is guarded by its
    /// own lock so writer setup never blocks the render path.
    pub fn start_recording<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let shared = &self.shared;
        let mut recorder = shared.recorder.lock().expect("recorder poisoned");
        if recorder.is_some() {
            return Err(Error::RecordingActive);
        }
        let cfg = shared.context.config();
        let writer = WavBlockWriter::create(
            path,
            WavSpec {
                channels: cfg.input_channels.max(1) as u16,
                sample_rate: cfg.sample_rate as u32,
                bits_per_sample: 32,
            },
        )?;
        *recorder = Some(writer);
        drop(recorder);
        shared.recording.store(true, Ordering::SeqCst);
        tracing::info!("recording started");
        shared.context.hub().notify(&Notification::StateChanged {
            origin: Origin::Realtime,
            state: "recording".to_string(),
        });
        Ok(())
    }

    /// Stops recording and finalizes the file. Idempotent.
    pub fn stop_recording(&self) -> Result<()> {
        let shared = &self.shared;
        shared.recording.store(false, Ordering::SeqCst);
        let mut recorder = shared.recorder.lock().expect("recorder poisoned");
        if let Some(mut writer) = recorder.take() {
            writer.finalize()?;
            tracing::info!("recording stopped");
            shared.context.hub().notify(&Notification::StateChanged {
                origin: Origin::Realtime,
                state: "idle".to_string(),
            });
        }
        Ok(())
    }

    /// Whether a recording is active.
    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    // --- Metering and stats ---

    /// Smoothed input level (linear peak), for polling.
    pub fn input_level(&self) -> f32 {
        f32::from_bits(self.shared.input_level.load(Ordering::Relaxed))
    }

    /// Smoothed output level (linear peak), for polling.
    pub fn output_level(&self) -> f32 {
        f32::from_bits(self.shared.output_level.load(Ordering::Relaxed))
    }

    /// Rolling callback performance over the last processed blocks.
    pub fn performance(&self) -> PerformanceReport {
        let cfg = self.shared.context.config();
        self.shared
            .stats
            .lock()
            .expect("realtime stats poisoned")
            .report(cfg.block_size, cfg.sample_rate)
    }

    // --- Rendering ---

    /// Allocates render-thread scratch state sized to the current engine
    /// configuration.
    pub fn render_state(&self) -> RenderState {
        self.shared.render_state()
    }

    /// Processes one block from raw device input to device output.
    ///
    /// Runs the chain, applies delay compensation, routes according to the
    /// active mode, scrubs invalid samples from the output path, feeds the
    /// recorder from the raw input, and updates meters and stats.
    pub fn render_block(
        &self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        state: &mut RenderState,
    ) {
        self.shared.render_block(input, output, state);
    }
}

impl EngineShared {
    fn lock_config(&self) -> MutexGuard<'_, RealtimeConfig> {
        self.config.lock().expect("realtime config poisoned")
    }

    fn render_state(&self) -> RenderState {
        let cfg = self.context.config();
        let channels = cfg.input_channels.max(1);
        let compensation = self.lock_config().compensation_samples;
        RenderState {
            processed: AudioBuffer::new(channels, cfg.block_size),
            events: EventQueue::default(),
            compensator: DelayCompensator::new(channels, compensation),
        }
    }

    fn on_device_error(&self, err: &str) {
        self.device_failed.store(true, Ordering::SeqCst);
        tracing::error!(err, "audio device error");
        self.context.hub().notify(&Notification::Error {
            origin: Origin::Realtime,
            message: format!("device error: {err}"),
        });
    }

    fn render_block(&self, input: &AudioBuffer, output: &mut AudioBuffer, state: &mut RenderState) {
        let started = Instant::now();
        let frames = input.frames().min(output.frames());

        if state.processed.frames() != input.frames() {
            state.processed.resize(input.frames());
        }
        state.processed.copy_from(input);
        state.events.clear();
        self.chain.process_block(&mut state.processed, &mut state.events);
        state
            .compensator
            .process_block_inplace(&mut state.processed, frames);

        let (mode, gain, monitoring) = {
            let config = self.lock_config();
            (config.mode, config.monitor_gain, config.monitoring_enabled)
        };

        output.clear();
        match mode {
            RoutingMode::DirectMonitoring => {
                for c in 0..output.channel_count() {
                    let src = c.min(input.channel_count().saturating_sub(1));
                    let channel = output.channel_mut(c);
                    for (out, raw) in channel[..frames].iter_mut().zip(input.channel(src)) {
                        *out = *raw * gain;
                    }
                }
            }
            RoutingMode::ProcessedMonitoring => {
                if monitoring {
                    output.copy_from(&state.processed);
                }
            }
            RoutingMode::SplitMonitoring => {
                if output.channel_count() > 0 && input.channel_count() > 0 {
                    output.channel_mut(0)[..frames].copy_from_slice(&input.channel(0)[..frames]);
                }
                if output.channel_count() > 1 {
                    output.channel_mut(1)[..frames]
                        .copy_from_slice(&state.processed.channel(0)[..frames]);
                }
            }
        }

        // Output scrub: never propagate invalid samples to the device.
        for c in 0..output.channel_count() {
            for s in output.channel_mut(c) {
                if !s.is_finite() || s.abs() > OUTPUT_SAMPLE_LIMIT {
                    *s = 0.0;
                }
            }
        }

        // Recording reads the raw input, post-block. `try_lock` keeps
        // writer setup/teardown from ever stalling the render thread.
        if self.recording.load(Ordering::Relaxed)
            && let Ok(mut recorder) = self.recorder.try_lock()
            && let Some(writer) = recorder.as_mut()
            && let Err(err) = writer.write_block(input, frames)
        {
            *recorder = None;
            self.recording.store(false, Ordering::SeqCst);
            tracing::error!(%err, "recording write failed");
            self.context.hub().notify(&Notification::Error {
                origin: Origin::Realtime,
                message: format!("recording failed: {err}"),
            });
        }

        // Exponentially smoothed per-direction block peaks.
        let cfg = self.context.config();
        let block_secs = frames as f64 / f64::from(cfg.sample_rate);
        let coeff = (1.0 - (-block_secs / METER_TIME_CONSTANT_SECS).exp()) as f32;
        let input_level = smooth(&self.input_level, input.peak(), coeff);
        let output_level = smooth(&self.output_level, output.peak(), coeff);
        self.context.hub().notify(&Notification::Levels {
            input: input_level,
            output: output_level,
        });

        self.stats
            .lock()
            .expect("realtime stats poisoned")
            .record(started.elapsed().as_secs_f64() * 1000.0);
    }
}

/// Builds the input and output streams, wiring the device callbacks to the
/// shared engine state.
fn open_streams(
    shared: &Arc<EngineShared>,
    backend: &dyn AudioBackend,
    cfg: &resona_core::EngineConfig,
) -> Result<Vec<StreamHandle>> {
    let input_channels = cfg.input_channels.max(1);
    let output_channels = cfg.output_channels.max(1);
    let in_config = BackendStreamConfig {
        sample_rate: cfg.sample_rate as u32,
        buffer_size: cfg.block_size as u32,
        channels: input_channels as u16,
        device_name: None,
    };
    let out_config = BackendStreamConfig {
        channels: output_channels as u16,
        ..in_config.clone()
    };

    let (tx, rx) = mpsc::sync_channel::<Vec<f32>>(4);

    let input_stream = backend.build_input_stream(
        &in_config,
        Box::new(move |data| {
            let _ = tx.try_send(data.to_vec());
        }),
        Box::new({
            let shared = Arc::clone(shared);
            move |err| shared.on_device_error(err)
        }),
    )?;

    let engine = Arc::clone(shared);
    let mut state = shared.render_state();
    let mut pending: Vec<f32> = Vec::new();
    let mut in_buffer = AudioBuffer::new(input_channels, 0);
    let mut out_buffer = AudioBuffer::new(output_channels, 0);

    let output_stream = backend.build_output_stream(
        &out_config,
        Box::new(move |data| {
            if !engine.running.load(Ordering::SeqCst) {
                data.fill(0.0);
                return;
            }
            while let Ok(samples) = rx.try_recv() {
                pending.extend(samples);
            }

            let frames = data.len() / output_channels;
            let needed = frames * input_channels;
            if pending.len() < needed {
                // Input underrun: output silence rather than stale data.
                data.fill(0.0);
                return;
            }

            if in_buffer.frames() != frames {
                in_buffer.resize(frames);
                out_buffer.resize(frames);
            }
            let chunk: Vec<f32> = pending.drain(..needed).collect();
            deinterleave_into(&chunk, input_channels, &mut in_buffer);
            engine.render_block(&in_buffer, &mut out_buffer, &mut state);
            interleave_from(&out_buffer, output_channels, data);
        }),
        Box::new({
            let shared = Arc::clone(shared);
            move |err| shared.on_device_error(err)
        }),
    )?;

    Ok(vec![input_stream, output_stream])
}

fn smooth(level: &AtomicU32, peak: f32, coeff: f32) -> f32 {
    let current = f32::from_bits(level.load(Ordering::Relaxed));
    let next = current + coeff * (peak - current);
    level.store(next.to_bits(), Ordering::Relaxed);
    next
}

/// Splits interleaved device samples into buffer channels. A mono source is
/// duplicated across all buffer channels.
fn deinterleave_into(interleaved: &[f32], channels: usize, buffer: &mut AudioBuffer) {
    let frames = (interleaved.len() / channels).min(buffer.frames());
    for f in 0..frames {
        let base = f * channels;
        for c in 0..buffer.channel_count() {
            buffer.channel_mut(c)[f] = interleaved[base + c.min(channels - 1)];
        }
    }
}

/// Interleaves buffer channels into a device output buffer. Missing buffer
/// channels duplicate channel 0.
fn interleave_from(buffer: &AudioBuffer, channels: usize, out: &mut [f32]) {
    let frames = (out.len() / channels).min(buffer.frames());
    for f in 0..frames {
        let base = f * channels;
        for c in 0..channels {
            out[base + c] = if c < buffer.channel_count() {
                buffer.channel(c)[f]
            } else if buffer.channel_count() > 0 {
                buffer.channel(0)[f]
            } else {
                0.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resona_core::EngineConfig;
    use resona_core::units::GainUnit;
    use tempfile::NamedTempFile;

    fn engine() -> RealtimeEngine {
        let context = EngineContext::new(EngineConfig {
            sample_rate: 48000.0,
            block_size: 32,
            input_channels: 2,
            output_channels: 2,
        });
        let chain = Arc::new(ProcessingChain::new(Arc::clone(&context)));
        RealtimeEngine::new(context, chain)
    }

    fn ones(frames: usize) -> AudioBuffer {
        let mut buf = AudioBuffer::new(2, frames);
        buf.channel_mut(0).fill(1.0);
        buf.channel_mut(1).fill(1.0);
        buf
    }

    #[test]
    fn impulse_is_delayed_by_exactly_n_samples() {
        const N: usize = 16;
        let mut comp = DelayCompensator::new(1, N);
        let mut buf = AudioBuffer::new(1, 64);
        buf.channel_mut(0)[0] = 1.0;

        comp.process_block_inplace(&mut buf, 64);

        for (i, &s) in buf.channel(0).iter().enumerate() {
            if i == N {
                assert_eq!(s, 1.0, "impulse expected at position {N}");
            } else {
                assert_eq!(s, 0.0, "unexpected nonzero at position {i}");
            }
        }
    }

    #[test]
    fn zero_compensation_is_identity() {
        let mut comp = DelayCompensator::new(2, 0);
        let mut buf = ones(8);
        comp.process_block_inplace(&mut buf, 8);
        assert_eq!(buf.channel(0), &[1.0; 8]);
    }

    #[test]
    fn delay_spans_block_boundaries() {
        const N: usize = 10;
        let mut comp = DelayCompensator::new(1, N);
        let mut first = AudioBuffer::new(1, 8);
        first.channel_mut(0)[4] = 1.0;
        comp.process_block_inplace(&mut first, 8);
        assert_eq!(first.channel(0), &[0.0; 8]);

        let mut second = AudioBuffer::new(1, 8);
        comp.process_block_inplace(&mut second, 8);
        // Impulse entered at absolute sample 4, emerges at 14 = block 2, offset 6.
        assert_eq!(second.channel(0)[6], 1.0);
    }

    #[test]
    fn direct_monitoring_applies_gain() {
        let engine = engine();
        engine.set_routing_mode(RoutingMode::DirectMonitoring);
        engine.set_monitor_gain(0.5);
        let mut state = engine.render_state();

        let input = ones(32);
        let mut output = AudioBuffer::new(2, 32);
        engine.render_block(&input, &mut output, &mut state);
        assert_eq!(output.channel(0), &[0.5; 32]);
        assert_eq!(output.channel(1), &[0.5; 32]);
    }

    #[test]
    fn processed_monitoring_runs_the_chain() {
        let engine = engine();
        engine.chain().add_unit(Box::new(GainUnit::new(2.0)));
        engine.chain().prepare(48000.0, 32);
        let mut state = engine.render_state();

        let input = ones(32);
        let mut output = AudioBuffer::new(2, 32);
        engine.render_block(&input, &mut output, &mut state);
        assert_eq!(output.channel(0), &[2.0; 32]);

        engine.set_monitoring_enabled(false);
        engine.render_block(&input, &mut output, &mut state);
        assert_eq!(output.channel(0), &[0.0; 32]);
    }

    #[test]
    fn split_monitoring_separates_raw_and_processed() {
        let engine = engine();
        engine.chain().add_unit(Box::new(GainUnit::new(0.25)));
        engine.chain().prepare(48000.0, 32);
        engine.set_routing_mode(RoutingMode::SplitMonitoring);
        let mut state = engine.render_state();

        let input = ones(32);
        let mut output = AudioBuffer::new(2, 32);
        engine.render_block(&input, &mut output, &mut state);
        assert_eq!(output.channel(0), &[1.0; 32]);
        assert_eq!(output.channel(1), &[0.25; 32]);
    }

    #[test]
    fn invalid_samples_are_scrubbed_from_output() {
        let engine = engine();
        engine.set_routing_mode(RoutingMode::DirectMonitoring);
        let mut state = engine.render_state();

        let mut input = ones(32);
        input.channel_mut(0)[0] = f32::NAN;
        input.channel_mut(0)[1] = f32::INFINITY;
        input.channel_mut(0)[2] = 10.0;
        let mut output = AudioBuffer::new(2, 32);
        engine.render_block(&input, &mut output, &mut state);

        assert_eq!(output.channel(0)[0], 0.0);
        assert_eq!(output.channel(0)[1], 0.0);
        assert_eq!(output.channel(0)[2], 0.0);
        assert_eq!(output.channel(0)[3], 1.0);
    }

    #[test]
    fn recording_captures_raw_input() {
        let engine = engine();
        let file = NamedTempFile::new().unwrap();
        engine.start_recording(file.path()).unwrap();
        assert!(engine.is_recording());
        assert!(matches!(
            engine.start_recording(file.path()),
            Err(Error::RecordingActive)
        ));

        let mut state = engine.render_state();
        let input = ones(32);
        let mut output = AudioBuffer::new(2, 32);
        engine.render_block(&input, &mut output, &mut state);
        engine.render_block(&input, &mut output, &mut state);
        engine.stop_recording().unwrap();
        assert!(!engine.is_recording());

        let info = crate::wav::read_wav_info(file.path()).unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.num_frames, 64);

        let mut reader = crate::wav::WavBlockReader::open(file.path()).unwrap();
        let mut block = AudioBuffer::new(2, 64);
        reader.read_block(&mut block).unwrap();
        assert_eq!(block.channel(0), &[1.0; 64]);
    }

    #[test]
    fn meters_rise_with_signal() {
        let engine = engine();
        engine.set_routing_mode(RoutingMode::DirectMonitoring);
        let mut state = engine.render_state();
        assert_eq!(engine.input_level(), 0.0);

        let input = ones(32);
        let mut output = AudioBuffer::new(2, 32);
        for _ in 0..100 {
            engine.render_block(&input, &mut output, &mut state);
        }
        assert!(engine.input_level() > 0.05);
        assert!(engine.output_level() > 0.05);
        assert!(engine.input_level() <= 1.0 + 1e-6);

        let report = engine.performance();
        assert!(report.peak_ms >= report.average_ms);
    }

    #[test]
    fn compensation_length_reaches_render_state() {
        let engine = engine();
        engine.set_compensation_samples(8);
        let state = engine.render_state();
        assert_eq!(state.compensator.delay_samples(), 8);
    }

    #[test]
    fn interleave_roundtrip() {
        let mut buf = AudioBuffer::new(2, 3);
        buf.channel_mut(0).copy_from_slice(&[1.0, 3.0, 5.0]);
        buf.channel_mut(1).copy_from_slice(&[2.0, 4.0, 6.0]);

        let mut inter = vec![0.0; 6];
        interleave_from(&buf, 2, &mut inter);
        assert_eq!(inter, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let mut back = AudioBuffer::new(2, 3);
        deinterleave_into(&inter, 2, &mut back);
        assert_eq!(back.channel(0), buf.channel(0));
        assert_eq!(back.channel(1), buf.channel(1));
    }
}
