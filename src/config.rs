use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::audio::AudioConfig;
use crate::gesture::{GestureConfig, HandConfig};

/// Everything the pipeline reads at start-up. Every table and key is
/// optional; missing ones take their defaults.
///
/// ```toml
/// [hand]
/// mirrored = false
///
/// [gesture]
/// stem_select_lock_ms = 2500
///
/// [audio]
/// music_dir = "/srv/stems"
/// tracks = ["intro", "drop"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hand: HandConfig,
    pub gesture: GestureConfig,
    pub audio: AudioConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Parse and validate.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("invalid config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let hand = &self.hand;
        for (name, value) in [
            ("hand.pinch_threshold", hand.pinch_threshold),
            ("hand.fist_threshold", hand.fist_threshold),
            ("hand.palm_open_threshold", hand.palm_open_threshold),
            ("hand.thumb_threshold_scale", hand.thumb_threshold_scale),
        ] {
            unit_interval(name, value)?;
        }
        let max_fingers = if hand.count_thumb { 5 } else { 4 };
        ensure!(
            (1..=max_fingers).contains(&hand.open_finger_count),
            "hand.open_finger_count must be between 1 and {max_fingers}"
        );
        ensure!(
            hand.control_hand != hand.effect_hand,
            "hand.control_hand and hand.effect_hand must differ"
        );

        let gesture = &self.gesture;
        ensure!(gesture.stems_per_track > 0, "gesture.stems_per_track must be at least 1");
        ensure!(gesture.wave_count_threshold > 0, "gesture.wave_count_threshold must be at least 1");
        unit_interval("gesture.flick_velocity_threshold", gesture.flick_velocity_threshold)?;
        unit_interval("gesture.wave_velocity_threshold", gesture.wave_velocity_threshold)?;
        ensure!(
            gesture.wave_velocity_threshold <= gesture.flick_velocity_threshold,
            "gesture.wave_velocity_threshold must not exceed flick_velocity_threshold"
        );
        ensure!(
            gesture.kalman_q > 0.0 && gesture.kalman_r > 0.0,
            "gesture.kalman_q and kalman_r must be positive"
        );
        ensure!(
            (0.0..0.5).contains(&gesture.volume_dead_zone),
            "gesture.volume_dead_zone must be within 0..0.5"
        );
        ensure!(
            (0.0..=1.0).contains(&gesture.default_volume),
            "gesture.default_volume must be within 0..=1"
        );

        let audio = &self.audio;
        ensure!(audio.sample_rate > 0, "audio.sample_rate must be positive");
        ensure!(audio.buffer_size > 0, "audio.buffer_size must be positive");
        ensure!(!audio.tracks.is_empty(), "audio.tracks must list at least one track");
        ensure!(
            audio.max_layers >= usize::from(gesture.stems_per_track),
            "audio.max_layers ({}) is smaller than gesture.stems_per_track ({})",
            audio.max_layers,
            gesture.stems_per_track
        );
        ensure!(
            (0.0..=1.0).contains(&audio.selected_stem_default_volume),
            "audio.selected_stem_default_volume must be within 0..=1"
        );
        Ok(())
    }
}

fn unit_interval(name: &str, value: f32) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        bail!("{name} must be within (0, 1], got {value}");
    }
    Ok(())
}
