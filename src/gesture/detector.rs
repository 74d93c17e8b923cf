//! Gesture state machine for single-hand stem control.
//!
//! | Gesture | Output |
//! |---|---|
//! | Hold 1..=N fingers | `stem_select` (0-based), then a selection lock |
//! | Hold an open palm | `play_pause` once per hold |
//! | Pinch, move up/down | sticky, smoothed `volume` |
//! | Flick or wave sideways | `track_switch` |
//!
//! Each gesture channel keeps its own state; the detector only routes the
//! control hand's observation through them once per frame.

use tracing::debug;

use super::hand::HandObservation;
use super::smoothing::{ScalarKalman, apply_dead_zone, clamp, map_range};
use super::GestureConfig;

/// Everything the rest of the system needs to know about one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureState {
    pub hand_detected: bool,
    pub finger_count: u8,
    /// Stem to select this frame, `None` for no change.
    pub stem_select: Option<usize>,
    /// Fires on a single frame per open-palm hold.
    pub play_pause: bool,
    /// Fires on a single frame per flick or wave.
    pub track_switch: bool,
    /// Smoothed pinch height, held while not pinching.
    pub volume: f32,
    pub is_pinching: bool,
    pub is_fist: bool,
    pub is_open: bool,
    /// An open palm is currently being held toward play/pause.
    pub is_play_pause_gesture: bool,
    /// 1-based effect number fired this frame; filled in by the controller.
    pub effect_trigger: Option<usize>,
    pub stem_selection_locked: bool,
    pub stem_selection_lock_remaining_ms: u64,
}

/// `true` once at least `window` ms have passed since `last` (or it never happened).
fn elapsed_at_least(last: Option<u64>, now: u64, window: u64) -> bool {
    last.is_none_or(|t| now.saturating_sub(t) >= window)
}

/// Strict variant of [`elapsed_at_least`].
pub(crate) fn elapsed_beyond(last: Option<u64>, now: u64, window: u64) -> bool {
    last.is_none_or(|t| now.saturating_sub(t) > window)
}

/// Time covered by a hold at the end of the current frame. Each frame counts
/// for its own interval, taken as the gap since the hold's previous frame.
fn hold_span(since: u64, last_seen: u64, now: u64) -> u64 {
    now.saturating_sub(since) + now.saturating_sub(last_seen)
}

// ════════════════════════════════════════════════════════════════════════════
// Stem selection
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FingerHold {
    Idle,
    Holding { fingers: u8, since: u64, last_seen: u64 },
}

#[derive(Debug, Clone)]
struct StemSelect {
    hold: FingerHold,
    /// Finger count of the last commit; cleared by a fist or losing the hand.
    last_committed: Option<u8>,
    last_commit_at: Option<u64>,
    locked_until: Option<u64>,
}

impl StemSelect {
    fn new() -> Self {
        Self {
            hold: FingerHold::Idle,
            last_committed: None,
            last_commit_at: None,
            locked_until: None,
        }
    }

    fn lock_remaining(&self, now: u64) -> u64 {
        self.locked_until.map_or(0, |until| until.saturating_sub(now))
    }

    fn update(&mut self, fingers: u8, pinching: bool, now: u64, config: &GestureConfig) -> Option<usize> {
        let locked = self.lock_remaining(now) > 0;
        let in_range = (1..=config.stems_per_track).contains(&fingers);

        if !in_range || pinching || locked {
            self.hold = FingerHold::Idle;
            if fingers == 0 {
                self.last_committed = None;
            }
            return None;
        }

        match self.hold {
            FingerHold::Holding {
                fingers: held,
                since,
                last_seen,
            } if held == fingers => {
                self.hold = FingerHold::Holding {
                    fingers,
                    since,
                    last_seen: now,
                };
                let repeat = self.last_committed == Some(fingers);
                let held_long_enough =
                    hold_span(since, last_seen, now) >= config.stem_select_hold_ms;
                let debounced =
                    elapsed_at_least(self.last_commit_at, now, config.stem_select_debounce_ms);

                if !repeat && held_long_enough && debounced {
                    self.last_committed = Some(fingers);
                    self.last_commit_at = Some(now);
                    self.locked_until = Some(now + config.stem_select_lock_ms);
                    return Some(usize::from(fingers - 1));
                }
            }
            _ => {
                self.hold = FingerHold::Holding {
                    fingers,
                    since: now,
                    last_seen: now,
                }
            }
        }
        None
    }

    fn clear_transient(&mut self) {
        self.hold = FingerHold::Idle;
        self.last_committed = None;
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Play / pause
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PalmHold {
    Idle,
    Holding { since: u64, last_seen: u64 },
    /// Already toggled for this hold; wait for the palm to close.
    Fired,
}

#[derive(Debug, Clone)]
struct PlayPause {
    hold: PalmHold,
    last_fired_at: Option<u64>,
}

impl PlayPause {
    fn new() -> Self {
        Self {
            hold: PalmHold::Idle,
            last_fired_at: None,
        }
    }

    fn update(&mut self, open: bool, now: u64, config: &GestureConfig) -> bool {
        if !open {
            self.hold = PalmHold::Idle;
            return false;
        }

        let (since, last_seen) = match self.hold {
            PalmHold::Fired => return false,
            PalmHold::Idle => (now, now),
            PalmHold::Holding { since, last_seen } => (since, last_seen),
        };
        self.hold = PalmHold::Holding {
            since,
            last_seen: now,
        };

        if hold_span(since, last_seen, now) >= config.play_pause_hold_ms
            && elapsed_at_least(self.last_fired_at, now, config.play_pause_debounce_ms)
        {
            self.hold = PalmHold::Fired;
            self.last_fired_at = Some(now);
            return true;
        }
        false
    }

    fn clear_transient(&mut self) {
        self.hold = PalmHold::Idle;
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Track switch (flick / wave)
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Left,
    Right,
}

impl Direction {
    fn of(dx: f32) -> Self {
        if dx > 0.0 { Self::Right } else { Self::Left }
    }
}

#[derive(Debug, Clone)]
struct SwipeTracker {
    last_x: Option<f32>,
    direction: Option<Direction>,
    reversals: u32,
    last_motion_at: Option<u64>,
    last_switch_at: Option<u64>,
}

impl SwipeTracker {
    fn new() -> Self {
        Self {
            last_x: None,
            direction: None,
            reversals: 0,
            last_motion_at: None,
            last_switch_at: None,
        }
    }

    fn update(&mut self, x: f32, now: u64, config: &GestureConfig) -> bool {
        let debounced = elapsed_beyond(self.last_switch_at, now, config.track_switch_debounce_ms);
        let mut fired = false;

        if let Some(last_x) = self.last_x {
            let dx = x - last_x;

            if dx.abs() > config.flick_velocity_threshold && debounced {
                self.last_switch_at = Some(now);
                self.reversals = 0;
                self.direction = Some(Direction::of(dx));
                self.last_x = Some(x);
                self.last_motion_at = Some(now);
                return true;
            }

            if dx.abs() > config.wave_velocity_threshold {
                self.last_motion_at = Some(now);
                let direction = Direction::of(dx);

                if self.direction.is_some_and(|d| d != direction) {
                    self.reversals += 1;
                    if self.reversals >= config.wave_count_threshold && debounced {
                        self.last_switch_at = Some(now);
                        self.reversals = 0;
                        fired = true;
                    }
                }
                self.direction = Some(direction);
            }
        }

        self.last_x = Some(x);

        if elapsed_beyond(self.last_motion_at, now, config.wave_timeout_ms) {
            self.reversals = 0;
            self.direction = None;
        }
        fired
    }

    fn clear_transient(&mut self) {
        self.last_x = None;
        self.direction = None;
        self.reversals = 0;
        self.last_motion_at = None;
    }
}

// ════════════════════════════════════════════════════════════════════════════
// GestureDetector
// ════════════════════════════════════════════════════════════════════════════

/// Stateful per-session interpreter of the control hand.
#[derive(Debug, Clone)]
pub struct GestureDetector {
    config: GestureConfig,
    volume_filter: ScalarKalman,
    volume: f32,
    stem: StemSelect,
    play_pause: PlayPause,
    swipe: SwipeTracker,
}

impl GestureDetector {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            volume_filter: ScalarKalman::new(config.kalman_q, config.kalman_r),
            volume: config.default_volume,
            stem: StemSelect::new(),
            play_pause: PlayPause::new(),
            swipe: SwipeTracker::new(),
            config,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    /// Current sticky volume.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Process one frame. `now` is a monotonic timestamp in milliseconds.
    pub fn update(&mut self, hand: Option<&HandObservation>, now: u64) -> GestureState {
        let mut state = GestureState {
            volume: self.volume,
            ..GestureState::default()
        };

        let Some(hand) = hand else {
            self.stem.clear_transient();
            self.play_pause.clear_transient();
            self.swipe.clear_transient();
            self.fill_lock_status(&mut state, now);
            return state;
        };

        let fingers = hand.extended_finger_count;
        state.hand_detected = true;
        state.finger_count = fingers;
        state.is_fist = hand.is_fist;
        state.is_open = hand.is_open;
        state.is_pinching = hand.is_pinching;

        state.stem_select = self.stem.update(fingers, hand.is_pinching, now, &self.config);
        if let Some(stem) = state.stem_select {
            debug!(stem, fingers, "stem select committed");
        }
        self.fill_lock_status(&mut state, now);

        let open_palm = hand.is_open && !hand.is_pinching;
        state.is_play_pause_gesture = open_palm;
        state.play_pause = self.play_pause.update(open_palm, now, &self.config);
        if state.play_pause {
            debug!(now, "play/pause committed");
        }

        if hand.is_pinching {
            // Higher on screen is louder
            let raised = map_range(hand.pinch_position.y, 1.0, 0.0, 0.0, 1.0);
            let dz = self.config.volume_dead_zone;
            let clamped = clamp(raised, 0.0, 1.0);
            let target = apply_dead_zone(apply_dead_zone(clamped, 0.0, dz), 1.0, dz);
            self.volume = self.volume_filter.filter(target);
        }
        state.volume = self.volume;

        state.track_switch = self.swipe.update(hand.palm_center.x, now, &self.config);
        if state.track_switch {
            debug!(x = hand.palm_center.x, "track switch committed");
        }

        state
    }

    fn fill_lock_status(&self, state: &mut GestureState, now: u64) {
        let remaining = self.stem.lock_remaining(now);
        state.stem_selection_locked = remaining > 0;
        state.stem_selection_lock_remaining_ms = remaining;
    }

    /// Clear all gesture memory. The sticky volume value is kept.
    pub fn reset(&mut self) {
        self.volume_filter.reset();
        self.stem = StemSelect::new();
        self.play_pause = PlayPause::new();
        self.swipe = SwipeTracker::new();
    }
}
