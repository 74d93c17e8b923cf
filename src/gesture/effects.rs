// src/gesture/effects.rs
// Secondary-hand one-shot effect triggering

use super::GestureConfig;
use super::detector::elapsed_beyond;
use super::hand::HandObservation;

/// Maps the effect hand's finger count (1..=M) to effect slot `count - 1`.
///
/// Fires on a *change* of finger count rather than on a hold, so switching
/// 1 -> 2 -> 1 plays three effects but holding 2 plays one.
#[derive(Debug, Clone)]
pub struct EffectTrigger {
    effects_per_hand: u8,
    debounce_ms: u64,
    last_finger: Option<u8>,
    last_trigger_at: Option<u64>,
}

impl EffectTrigger {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            effects_per_hand: config.effects_per_hand,
            debounce_ms: config.effect_trigger_debounce_ms,
            last_finger: None,
            last_trigger_at: None,
        }
    }

    /// Slot to fire this frame, if any. Call [`confirm`](Self::confirm) once
    /// the engine has actually played it.
    pub fn evaluate(&mut self, hand: Option<&HandObservation>, now: u64) -> Option<usize> {
        let fingers = hand.map_or(0, |h| h.extended_finger_count);
        if !(1..=self.effects_per_hand).contains(&fingers) {
            self.last_finger = None;
            return None;
        }

        let changed = self.last_finger != Some(fingers);
        let cooled = elapsed_beyond(self.last_trigger_at, now, self.debounce_ms);
        self.last_finger = Some(fingers);

        (changed && cooled).then(|| usize::from(fingers - 1))
    }

    /// Start the debounce window from an accepted trigger.
    pub fn confirm(&mut self, now: u64) {
        self.last_trigger_at = Some(now);
    }

    pub fn reset(&mut self) {
        self.last_finger = None;
        self.last_trigger_at = None;
    }
}
