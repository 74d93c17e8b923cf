//! Hand-gesture interpretation: landmark frames in, control events out.
//!
//! ```text
//! RawHand[] ──► HandAdapter ──► HandObservation ──► GestureDetector ──► GestureState
//!                   │                                                     (per frame)
//!                   └─ effect hand ──► EffectTrigger
//! ```
//!
//! Every timing constant is wall-clock milliseconds taken from the
//! timestamp passed into each call, so behaviour does not depend on the
//! frame rate.

pub mod detector;
pub mod effects;
pub mod hand;
pub mod smoothing;

use serde::Deserialize;
use std::fmt;

pub use detector::{GestureDetector, GestureState};
pub use effects::EffectTrigger;
pub use hand::{HandAdapter, HandObservation, HandRoles, Landmark, Point, RawHand};
pub use smoothing::ScalarKalman;

/// Which hand an observation belongs to, from the performer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// The opposite label, used to undo front-camera mirroring.
    pub fn mirrored(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "Left"),
            Self::Right => write!(f, "Right"),
        }
    }
}

/// Thresholds used to derive a [`HandObservation`] from raw landmarks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    /// Thumb-tip to index-tip distance below which the hand is pinching.
    pub pinch_threshold: f32,
    /// All fingertips closer than this to the palm center reads as curled.
    pub fist_threshold: f32,
    /// Fingertip distance from the palm center above which a finger is extended.
    pub palm_open_threshold: f32,
    /// The thumb moves sideways, so it uses a scaled-down threshold.
    pub thumb_threshold_scale: f32,
    /// Include the thumb tip in the extended-finger count.
    pub count_thumb: bool,
    /// Extended-finger count at which the palm reads as open.
    pub open_finger_count: u8,
    /// Detector labels come from a front camera and must be swapped.
    pub mirrored: bool,
    pub control_hand: Handedness,
    pub effect_hand: Handedness,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: 0.08,
            fist_threshold: 0.15,
            palm_open_threshold: 0.12,
            thumb_threshold_scale: 0.7,
            count_thumb: false,
            open_finger_count: 4,
            mirrored: true,
            control_hand: Handedness::Right,
            effect_hand: Handedness::Left,
        }
    }
}

/// Timing and motion constants for the gesture state machine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Stems per track; held finger counts 1..=N select a stem.
    pub stems_per_track: u8,
    pub stem_select_hold_ms: u64,
    pub stem_select_debounce_ms: u64,
    /// No further stem commits for this long after one lands.
    pub stem_select_lock_ms: u64,
    pub play_pause_hold_ms: u64,
    pub play_pause_debounce_ms: u64,
    pub track_switch_debounce_ms: u64,
    /// Frame-to-frame palm x delta that switches track on its own.
    pub flick_velocity_threshold: f32,
    /// Frame-to-frame palm x delta that counts as wave motion.
    pub wave_velocity_threshold: f32,
    /// Direction reversals needed for a wave.
    pub wave_count_threshold: u32,
    pub wave_timeout_ms: u64,
    pub effect_trigger_debounce_ms: u64,
    pub effects_per_hand: u8,
    pub kalman_q: f32,
    pub kalman_r: f32,
    /// Pinch volumes this close to 0 or 1 snap to the end; 0 disables.
    pub volume_dead_zone: f32,
    /// Volume reported before the first pinch.
    pub default_volume: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            stems_per_track: 4,
            stem_select_hold_ms: 200,
            stem_select_debounce_ms: 300,
            stem_select_lock_ms: 4000,
            play_pause_hold_ms: 650,
            play_pause_debounce_ms: 600,
            track_switch_debounce_ms: 800,
            flick_velocity_threshold: 0.15,
            wave_velocity_threshold: 0.04,
            wave_count_threshold: 1,
            wave_timeout_ms: 800,
            effect_trigger_debounce_ms: 400,
            effects_per_hand: 3,
            kalman_q: 0.08,
            kalman_r: 0.3,
            volume_dead_zone: 0.0,
            default_volume: 0.7,
        }
    }
}
