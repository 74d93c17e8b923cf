//! Per-frame bridge from hand landmarks to engine commands.

use tracing::debug;

use crate::audio::LayerEngine;
use crate::config::Config;
use crate::gesture::{
    EffectTrigger, GestureConfig, GestureDetector, GestureState, HandAdapter, HandConfig, RawHand,
};

/// Owns the gesture machinery and drives a [`LayerEngine`] from it.
///
/// Holds no audio resources; every side effect goes through the engine
/// passed to [`process_frame`](Self::process_frame). Rejected engine
/// commands are not retried, the next frame re-evaluates anyway.
#[derive(Debug, Clone)]
pub struct DjController {
    adapter: HandAdapter,
    detector: GestureDetector,
    effects: EffectTrigger,
    last_state: GestureState,
}

impl DjController {
    pub fn new(hand: HandConfig, gesture: GestureConfig) -> Self {
        Self {
            adapter: HandAdapter::new(hand),
            effects: EffectTrigger::new(&gesture),
            last_state: GestureState {
                volume: gesture.default_volume,
                ..GestureState::default()
            },
            detector: GestureDetector::new(gesture),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.hand.clone(), config.gesture.clone())
    }

    /// Interpret one camera frame and apply the result to `engine`.
    pub fn process_frame<E: LayerEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        raw: &[RawHand],
        now: u64,
    ) -> GestureState {
        engine.poll();

        let hands = self.adapter.observe(raw);
        let roles = self.adapter.assign_roles(&hands);
        let mut state = self.detector.update(roles.control, now);

        if let Some(stem) = state.stem_select {
            let accepted = engine.select_layer(stem);
            debug!(stem, accepted, "select layer");
        }

        if state.play_pause {
            engine.toggle_playback();
        }

        if state.is_pinching
            && let Some(selected) = engine.state().selected_layer
        {
            engine.set_layer_gain(selected, state.volume);
        }

        if state.track_switch {
            if engine.state().is_loading {
                debug!("track switch ignored, load in flight");
            } else {
                let accepted = engine.advance_track();
                debug!(accepted, "advance track");
            }
        }

        if let Some(slot) = self.effects.evaluate(roles.effect, now)
            && engine.trigger_effect(slot)
        {
            self.effects.confirm(now);
            state.effect_trigger = Some(slot + 1);
        }

        self.last_state = state.clone();
        state
    }

    /// State produced by the most recent frame.
    pub fn last_state(&self) -> &GestureState {
        &self.last_state
    }

    pub fn reset(&mut self) {
        self.adapter.reset();
        self.detector.reset();
        self.effects.reset();
        self.last_state = GestureState {
            volume: self.detector.volume(),
            ..GestureState::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::EngineState;
    use crate::gesture::Handedness;
    use crate::gesture::hand::testing::raw_hand;

    /// Records every command; layers 0..available exist.
    #[derive(Default)]
    struct MockEngine {
        available: usize,
        selected: Option<usize>,
        gains: Vec<(usize, f32)>,
        toggles: usize,
        advances: usize,
        effects: Vec<usize>,
        loading: bool,
        refuse_effects: bool,
        polls: usize,
    }

    impl MockEngine {
        fn with_layers(available: usize) -> Self {
            Self {
                available,
                ..Self::default()
            }
        }
    }

    impl LayerEngine for MockEngine {
        fn select_layer(&mut self, index: usize) -> bool {
            if index >= self.available {
                return false;
            }
            self.selected = Some(index);
            true
        }

        fn set_layer_gain(&mut self, index: usize, gain: f32) -> bool {
            self.gains.push((index, gain));
            true
        }

        fn toggle_playback(&mut self) {
            self.toggles += 1;
        }

        fn advance_track(&mut self) -> bool {
            self.advances += 1;
            true
        }

        fn trigger_effect(&mut self, index: usize) -> bool {
            if self.refuse_effects {
                return false;
            }
            self.effects.push(index);
            true
        }

        fn state(&self) -> EngineState {
            EngineState {
                track_index: 0,
                track_name: "mock".into(),
                selected_layer: self.selected,
                layer_gains: vec![0.0; self.available],
                available_layers: vec![true; self.available],
                is_playing: true,
                is_loading: self.loading,
                effect_slots: vec![true; 3],
            }
        }

        fn poll(&mut self) {
            self.polls += 1;
        }
    }

    fn controller() -> DjController {
        let hand = HandConfig {
            mirrored: false,
            ..HandConfig::default()
        };
        DjController::new(hand, GestureConfig::default())
    }

    fn right(cx: f32, fingers: u8) -> RawHand {
        raw_hand(Handedness::Right, cx, 0.5, fingers, None)
    }

    fn left(fingers: u8) -> RawHand {
        raw_hand(Handedness::Left, 0.2, 0.5, fingers, None)
    }

    fn right_pinch(py: f32) -> RawHand {
        raw_hand(Handedness::Right, 0.5, 0.5, 0, Some((0.5, py)))
    }

    #[test]
    fn test_held_fingers_select_layer() {
        let mut dj = controller();
        let mut engine = MockEngine::with_layers(4);

        let mut committed = Vec::new();
        for t in [1000, 1060, 1120, 1180, 1240] {
            committed.push(dj.process_frame(&mut engine, &[right(0.5, 2)], t).stem_select);
        }

        assert_eq!(committed, vec![None, None, None, Some(1), None]);
        assert_eq!(engine.selected, Some(1));
        assert_eq!(engine.polls, 5);
        assert_eq!(dj.last_state().stem_select, None);
    }

    #[test]
    fn test_rejected_selection_is_ignored() {
        let mut dj = controller();
        let mut engine = MockEngine::with_layers(1);

        for t in [0, 60, 120, 180] {
            dj.process_frame(&mut engine, &[right(0.5, 3)], t);
        }
        assert_eq!(engine.selected, None);
    }

    #[test]
    fn test_open_palm_toggles_once() {
        let mut dj = controller();
        let mut engine = MockEngine::with_layers(4);

        for i in 0..20 {
            dj.process_frame(&mut engine, &[right(0.5, 4)], i * 60);
        }
        assert_eq!(engine.toggles, 1);
    }

    #[test]
    fn test_pinch_needs_selected_layer() {
        let mut dj = controller();
        let mut engine = MockEngine::with_layers(4);

        dj.process_frame(&mut engine, &[right_pinch(0.3)], 0);
        assert!(engine.gains.is_empty());

        engine.selected = Some(2);
        let state = dj.process_frame(&mut engine, &[right_pinch(0.3)], 20);
        assert_eq!(engine.gains.len(), 1);
        assert_eq!(engine.gains[0].0, 2);
        assert_eq!(engine.gains[0].1, state.volume);

        // Not pinching: gain untouched
        dj.process_frame(&mut engine, &[right(0.5, 1)], 40);
        assert_eq!(engine.gains.len(), 1);
    }

    #[test]
    fn test_track_switch_respects_loading_flag() {
        let mut dj = controller();
        let mut engine = MockEngine::with_layers(4);

        engine.loading = true;
        dj.process_frame(&mut engine, &[right(0.2, 1)], 0);
        let state = dj.process_frame(&mut engine, &[right(0.4, 1)], 30);
        assert!(state.track_switch);
        assert_eq!(engine.advances, 0);

        engine.loading = false;
        dj.process_frame(&mut engine, &[right(0.4, 1)], 1000);
        dj.process_frame(&mut engine, &[right(0.6, 1)], 1030);
        assert_eq!(engine.advances, 1);
    }

    #[test]
    fn test_effect_hand_triggers_slot() {
        let mut dj = controller();
        let mut engine = MockEngine::with_layers(4);

        // Two fingers: effect 2, engine slot 1
        let state = dj.process_frame(&mut engine, &[right(0.7, 0), left(2)], 0);
        assert_eq!(state.effect_trigger, Some(2));
        assert_eq!(engine.effects, vec![1]);

        // Held: no retrigger
        let state = dj.process_frame(&mut engine, &[right(0.7, 0), left(2)], 500);
        assert_eq!(state.effect_trigger, None);
        assert_eq!(engine.effects, vec![1]);
    }

    #[test]
    fn test_refused_effect_not_reported() {
        let mut dj = controller();
        let mut engine = MockEngine {
            refuse_effects: true,
            ..MockEngine::with_layers(4)
        };

        let state = dj.process_frame(&mut engine, &[right(0.7, 0), left(1)], 0);
        assert_eq!(state.effect_trigger, None);
    }

    #[test]
    fn test_lone_effect_label_drives_control() {
        // With only a left hand visible it becomes the control hand, never an effect hand
        let mut dj = controller();
        let mut engine = MockEngine::with_layers(4);

        let state = dj.process_frame(&mut engine, &[left(2)], 0);
        assert!(state.hand_detected);
        assert_eq!(state.finger_count, 2);
        assert_eq!(state.effect_trigger, None);
        assert!(engine.effects.is_empty());
    }

    #[test]
    fn test_malformed_frame_reads_as_no_hand() {
        let mut dj = controller();
        let mut engine = MockEngine::with_layers(4);

        let mut broken = right(0.5, 2);
        broken.landmarks.truncate(10);
        let state = dj.process_frame(&mut engine, &[broken], 0);
        assert!(!state.hand_detected);

        let mut nan = right(0.5, 2);
        nan.landmarks[3].x = f32::NAN;
        let state = dj.process_frame(&mut engine, &[nan, left(1)], 10);
        assert!(!state.hand_detected);
        assert!(engine.effects.is_empty());
    }

    #[test]
    fn test_reset_keeps_volume() {
        let mut dj = controller();
        let mut engine = MockEngine::with_layers(4);

        let pinched = dj.process_frame(&mut engine, &[right_pinch(0.1)], 0).volume;
        dj.reset();
        assert_eq!(dj.last_state().volume, pinched);
        assert!(!dj.last_state().hand_detected);

        let state = dj.process_frame(&mut engine, &[], 10);
        assert_eq!(state.volume, pinched);
    }
}
