//! Multi-channel audio buffers and control events.
//!
//! [`AudioBuffer`] is the block currency of the engine: a set of
//! non-interleaved channels of equal length, allocated once at prepare time
//! and reused every block. [`EventQueue`] carries control events into and out
//! of a processing unit during one render call.

/// A non-interleaved multi-channel audio buffer.
///
/// All channels have the same length. Buffers are allocated up-front and
/// reused; the render path never grows them.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffer {
    /// Creates a zeroed buffer with the given channel count and frame count.
    pub fn new(channel_count: usize, frames: usize) -> Self {
        Self {
            channels: (0..channel_count).map(|_| vec![0.0; frames]).collect(),
            frames,
        }
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns the number of frames per channel.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Returns the samples of one channel.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Returns the samples of one channel, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Fills every channel with silence.
    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.fill(0.0);
        }
    }

    /// Resizes every channel to a new frame count, zeroing new samples.
    pub fn resize(&mut self, frames: usize) {
        self.frames = frames;
        for ch in &mut self.channels {
            ch.resize(frames, 0.0);
        }
    }

    /// Copies as many channels and frames as both buffers share.
    pub fn copy_from(&mut self, other: &AudioBuffer) {
        let chans = self.channels.len().min(other.channels.len());
        let frames = self.frames.min(other.frames);
        for c in 0..chans {
            self.channels[c][..frames].copy_from_slice(&other.channels[c][..frames]);
        }
    }

    /// Adds `src` sample-by-sample into the channel at `dst_channel`.
    ///
    /// Used for fan-in: multiple connections landing on the same destination
    /// channel accumulate.
    ///
    /// # Panics
    ///
    /// Panics if `dst_channel >= channel_count()`.
    pub fn accumulate_channel(&mut self, dst_channel: usize, src: &[f32]) {
        let dst = &mut self.channels[dst_channel];
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d += *s;
        }
    }

    /// Whether every sample is finite and within `limit` in magnitude.
    pub fn within_range(&self, limit: f32) -> bool {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite() && s.abs() <= limit)
    }

    /// Returns the peak absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

/// A control event delivered to or emitted by a processing unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Sample offset of the event within the current block.
    pub offset: u32,
    /// Event payload.
    pub kind: EventKind,
}

/// Payload of a control [`Event`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// A parameter change addressed by parameter index.
    ParamChange {
        /// Parameter index, unit-defined.
        index: u32,
        /// New parameter value.
        value: f32,
    },
    /// A raw three-byte MIDI message.
    Midi([u8; 3]),
}

/// Per-render event traffic for one processing unit.
///
/// `incoming` holds events routed to the unit for this block; the unit may
/// push events to `outgoing`, which the graph forwards along event
/// connections after the unit returns.
#[derive(Debug, Default)]
pub struct EventQueue {
    incoming: Vec<Event>,
    outgoing: Vec<Event>,
}

impl EventQueue {
    /// Creates an empty queue with room for `capacity` events per direction.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            incoming: Vec::with_capacity(capacity),
            outgoing: Vec::with_capacity(capacity),
        }
    }

    /// Events routed to the unit for this block.
    pub fn incoming(&self) -> &[Event] {
        &self.incoming
    }

    /// Queues an event for delivery to the unit at the next render call.
    pub fn push_incoming(&mut self, event: Event) {
        self.incoming.push(event);
    }

    /// Emits an event from the unit, to be forwarded along event connections.
    pub fn emit(&mut self, event: Event) {
        self.outgoing.push(event);
    }

    /// Drains the unit's emitted events.
    pub fn drain_outgoing(&mut self) -> std::vec::Drain<'_, Event> {
        self.outgoing.drain(..)
    }

    /// Discards all queued events in both directions.
    pub fn clear(&mut self) {
        self.incoming.clear();
        self.outgoing.clear();
    }
}
