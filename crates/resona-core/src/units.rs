//! Built-in utility units.
//!
//! Real plugin backends live outside this crate; these utility units exist
//! for routing plumbing, the CLI, and tests.

use serde::{Deserialize, Serialize};

use crate::buffer::{AudioBuffer, EventKind, EventQueue};
use crate::unit::{ProcessError, ProcessingUnit, UnitFactory};

/// Kind identifier for [`PassthroughUnit`].
pub const PASSTHROUGH_KIND: &str = "passthrough";
/// Kind identifier for [`GainUnit`].
pub const GAIN_KIND: &str = "gain";

/// Copies input to output unmodified.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughUnit;

impl ProcessingUnit for PassthroughUnit {
    fn name(&self) -> &str {
        PASSTHROUGH_KIND
    }

    fn process(
        &mut self,
        _buffer: &mut AudioBuffer,
        _events: &mut EventQueue,
    ) -> Result<(), ProcessError> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GainState {
    gain: f32,
}

/// Applies a static linear gain to every channel.
///
/// Parameter 0 (via [`EventKind::ParamChange`]) sets the gain factor.
#[derive(Debug, Clone, Copy)]
pub struct GainUnit {
    gain: f32,
}

impl GainUnit {
    /// Creates a gain unit with the given linear factor.
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// Creates a gain unit from a decibel value.
    pub fn from_db(db: f32) -> Self {
        Self {
            gain: 10.0f32.powf(db / 20.0),
        }
    }

    /// Returns the current linear gain factor.
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Default for GainUnit {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ProcessingUnit for GainUnit {
    fn name(&self) -> &str {
        GAIN_KIND
    }

    fn process(
        &mut self,
        buffer: &mut AudioBuffer,
        events: &mut EventQueue,
    ) -> Result<(), ProcessError> {
        for event in events.incoming() {
            if let EventKind::ParamChange { index: 0, value } = event.kind {
                self.gain = value;
            }
        }
        for ch in 0..buffer.channel_count() {
            for s in buffer.channel_mut(ch) {
                *s *= self.gain;
            }
        }
        Ok(())
    }

    fn save_state(&self) -> Vec<u8> {
        serde_json::to_vec(&GainState { gain: self.gain }).unwrap_or_default()
    }

    fn load_state(&mut self, blob: &[u8]) {
        if let Ok(state) = serde_json::from_slice::<GainState>(blob) {
            self.gain = state.gain;
        }
    }
}

/// Factory for the built-in utility units.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicUnitFactory;

impl UnitFactory for BasicUnitFactory {
    fn create(&self, kind: &str) -> Option<Box<dyn ProcessingUnit>> {
        match kind {
            PASSTHROUGH_KIND => Some(Box::new(PassthroughUnit)),
            GAIN_KIND => Some(Box::new(GainUnit::default())),
            _ => None,
        }
    }

    fn kinds(&self) -> Vec<String> {
        vec![PASSTHROUGH_KIND.to_string(), GAIN_KIND.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Event;

    #[test]
    fn gain_scales_all_channels() {
        let mut unit = GainUnit::new(2.0);
        let mut buf = AudioBuffer::new(2, 4);
        buf.channel_mut(0).fill(1.0);
        buf.channel_mut(1).fill(-0.5);
        let mut events = EventQueue::default();
        unit.process(&mut buf, &mut events).unwrap();
        assert_eq!(buf.channel(0), &[2.0; 4]);
        assert_eq!(buf.channel(1), &[-1.0; 4]);
    }

    #[test]
    fn gain_follows_param_events() {
        let mut unit = GainUnit::new(1.0);
        let mut buf = AudioBuffer::new(1, 2);
        buf.channel_mut(0).fill(1.0);
        let mut events = EventQueue::default();
        events.push_incoming(Event {
            offset: 0,
            kind: EventKind::ParamChange { index: 0, value: 3.0 },
        });
        unit.process(&mut buf, &mut events).unwrap();
        assert_eq!(buf.channel(0), &[3.0, 3.0]);
    }

    #[test]
    fn gain_state_roundtrip() {
        let unit = GainUnit::from_db(-6.0);
        let blob = unit.save_state();
        let mut restored = GainUnit::default();
        restored.load_state(&blob);
        assert!((restored.gain() - unit.gain()).abs() < 1e-6);
    }

    #[test]
    fn factory_knows_its_kinds() {
        let factory = BasicUnitFactory;
        assert!(factory.create(GAIN_KIND).is_some());
        assert!(factory.create(PASSTHROUGH_KIND).is_some());
        assert!(factory.create("granulator").is_none());
        assert_eq!(factory.kinds().len(), 2);
    }
}
