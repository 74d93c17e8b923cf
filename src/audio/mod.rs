pub mod effects;
pub mod engine;
pub mod io;
pub mod layer;
pub mod mixer;
pub mod source;
pub mod stream;

use serde::Deserialize;
use std::path::PathBuf;

pub use effects::OneShot;
pub use engine::{StemEngine, wait_for_shared_load};
pub use io::{export_wav, import_wav};
pub use layer::StemLayer;
pub use mixer::SimdMixer;
pub use source::{FolderSource, LoadedTrack, ToneSource, TrackSource};
pub use stream::AudioOutput;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub buffer_size: usize,
    /// Stem slots per track (`stem1.wav` ..= `stemN.wav`).
    pub max_layers: usize,
    /// Root holding one folder per track plus the effect files.
    pub music_dir: PathBuf,
    /// Track folder names under `music_dir`, played in order and wrapping.
    pub tracks: Vec<String>,
    /// Effect files relative to `music_dir`, one per effect slot.
    pub effects: Vec<String>,
    /// Gain given to a silent stem when it gets selected.
    pub selected_stem_default_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 512,
            max_layers: 4,
            music_dir: PathBuf::from("music"),
            tracks: vec!["track1".into(), "track2".into(), "track3".into()],
            effects: vec![
                "effects/effect1.wav".into(),
                "effects/effect2.wav".into(),
                "effects/effect3.wav".into(),
            ],
            selected_stem_default_volume: 0.7,
        }
    }
}

/// Read-only snapshot of a [`LayerEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub track_index: usize,
    pub track_name: String,
    pub selected_layer: Option<usize>,
    /// Gain per stem slot, 0.0 - 1.0.
    pub layer_gains: Vec<f32>,
    /// Which stem slots have audio on the current track.
    pub available_layers: Vec<bool>,
    pub is_playing: bool,
    pub is_loading: bool,
    /// Which effect slots have audio loaded.
    pub effect_slots: Vec<bool>,
}

impl EngineState {
    /// Gain of the selected stem, 0.0 when nothing is selected.
    pub fn selected_gain(&self) -> f32 {
        self.selected_layer
            .and_then(|i| self.layer_gains.get(i).copied())
            .unwrap_or(0.0)
    }

    pub fn layer_count(&self) -> usize {
        self.available_layers.iter().filter(|&&a| a).count()
    }
}

/// The audio side of the gesture pipeline.
///
/// Commands return `false` when rejected; a rejected command leaves the
/// engine state untouched.
pub trait LayerEngine {
    /// Make `index` the stem that volume gestures act on.
    fn select_layer(&mut self, index: usize) -> bool;

    fn set_layer_gain(&mut self, index: usize, gain: f32) -> bool;

    /// Pause or resume every stem together.
    fn toggle_playback(&mut self);

    /// Start loading the next track in the background. Rejected while a load
    /// is already in flight.
    fn advance_track(&mut self) -> bool;

    /// Play a one-shot effect, restarting it if it is already playing.
    fn trigger_effect(&mut self, index: usize) -> bool;

    fn state(&self) -> EngineState;

    /// Pick up finished background work. Called once per frame.
    fn poll(&mut self) {}
}
