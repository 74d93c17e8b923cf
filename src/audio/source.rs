// src/audio/source.rs
// Where track stems and effect samples come from

use anyhow::{Result, anyhow};
use std::f32::consts::TAU;
use std::path::PathBuf;
use tracing::debug;

use super::{AudioConfig, import_wav};

/// Decoded audio for one track. `stems[i]` is `None` when the track has no
/// audio for slot `i`.
#[derive(Debug, Clone)]
pub struct LoadedTrack {
    pub index: usize,
    pub name: String,
    pub stems: Vec<Option<Vec<f32>>>,
}

/// Supplies tracks to the engine. Loading runs off the frame loop, hence the
/// thread bounds.
pub trait TrackSource: Send + Sync {
    fn track_count(&self) -> usize;

    fn load_track(&self, index: usize) -> Result<LoadedTrack>;

    /// One entry per effect slot; `None` for a slot with no sample.
    fn load_effects(&self) -> Result<Vec<Option<Vec<f32>>>>;
}

/// Tracks laid out on disk as `<music_dir>/<track>/stem1.wav ..= stemN.wav`.
#[derive(Debug, Clone)]
pub struct FolderSource {
    music_dir: PathBuf,
    tracks: Vec<String>,
    effects: Vec<String>,
    stems_per_track: usize,
    sample_rate: u32,
}

impl FolderSource {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            music_dir: config.music_dir.clone(),
            tracks: config.tracks.clone(),
            effects: config.effects.clone(),
            stems_per_track: config.max_layers,
            sample_rate: config.sample_rate,
        }
    }

    fn stem_path(&self, track: &str, slot: usize) -> PathBuf {
        self.music_dir.join(track).join(format!("stem{}.wav", slot + 1))
    }
}

impl TrackSource for FolderSource {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn load_track(&self, index: usize) -> Result<LoadedTrack> {
        let name = self
            .tracks
            .get(index)
            .ok_or_else(|| anyhow!("Track index {} out of range", index))?;

        let mut stems = Vec::with_capacity(self.stems_per_track);
        for slot in 0..self.stems_per_track {
            let path = self.stem_path(name, slot);
            if path.exists() {
                stems.push(Some(import_wav(&path, self.sample_rate)?));
            } else {
                debug!(track = %name, slot, "No stem file");
                stems.push(None);
            }
        }

        Ok(LoadedTrack {
            index,
            name: name.clone(),
            stems,
        })
    }

    fn load_effects(&self) -> Result<Vec<Option<Vec<f32>>>> {
        self.effects
            .iter()
            .map(|file| {
                let path = self.music_dir.join(file);
                if path.exists() {
                    import_wav(&path, self.sample_rate).map(Some)
                } else {
                    debug!(path = %path.display(), "No effect file");
                    Ok(None)
                }
            })
            .collect()
    }
}

/// Synthetic sine stems, for running without a music folder.
///
/// Track `t` stem `s` is a tone at `base_hz * (s + 1) * (1 + t / 4)`. All
/// stems of a track share one loop length so they line up.
#[derive(Debug, Clone)]
pub struct ToneSource {
    tracks: usize,
    stems_per_track: usize,
    effects: usize,
    sample_rate: u32,
    loop_samples: usize,
    base_hz: f32,
}

impl ToneSource {
    pub fn new(tracks: usize, stems_per_track: usize, effects: usize, sample_rate: u32) -> Self {
        Self {
            tracks,
            stems_per_track,
            effects,
            sample_rate,
            loop_samples: sample_rate as usize * 2,
            base_hz: 110.0,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(
            config.tracks.len().max(1),
            config.max_layers,
            config.effects.len(),
            config.sample_rate,
        )
    }

    /// Override the loop length; tests use very short loops.
    pub fn with_loop_samples(mut self, samples: usize) -> Self {
        self.loop_samples = samples.max(1);
        self
    }

    fn tone(&self, hz: f32, samples: usize, amplitude: f32) -> Vec<f32> {
        let step = TAU * hz / self.sample_rate as f32;
        (0..samples)
            .map(|n| (n as f32 * step).sin() * amplitude)
            .collect()
    }
}

impl TrackSource for ToneSource {
    fn track_count(&self) -> usize {
        self.tracks
    }

    fn load_track(&self, index: usize) -> Result<LoadedTrack> {
        if index >= self.tracks {
            return Err(anyhow!("Track index {} out of range", index));
        }

        let detune = 1.0 + index as f32 / 4.0;
        let stems = (0..self.stems_per_track)
            .map(|slot| {
                let hz = self.base_hz * (slot + 1) as f32 * detune;
                Some(self.tone(hz, self.loop_samples, 0.25))
            })
            .collect();

        Ok(LoadedTrack {
            index,
            name: format!("tone{}", index + 1),
            stems,
        })
    }

    fn load_effects(&self) -> Result<Vec<Option<Vec<f32>>>> {
        let len = (self.sample_rate / 4) as usize;
        Ok((0..self.effects)
            .map(|slot| Some(self.tone(880.0 * (slot + 1) as f32, len, 0.5)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::export_wav;
    use std::fs;

    #[test]
    fn test_tone_source_shapes() {
        let source = ToneSource::new(3, 4, 2, 8000).with_loop_samples(100);
        assert_eq!(source.track_count(), 3);

        let track = source.load_track(1).unwrap();
        assert_eq!(track.name, "tone2");
        assert_eq!(track.stems.len(), 4);
        assert!(track.stems.iter().all(|s| s.as_ref().map(Vec::len) == Some(100)));

        assert!(source.load_track(3).is_err());
        assert_eq!(source.load_effects().unwrap().len(), 2);
    }

    #[test]
    fn test_folder_source_marks_missing_stems() {
        let root = std::env::temp_dir().join("stemdeck_folder_source");
        let track_dir = root.join("alpha");
        fs::create_dir_all(&track_dir).unwrap();
        export_wav(track_dir.join("stem1.wav"), &[0.1; 32], 8000).unwrap();
        export_wav(track_dir.join("stem3.wav"), &[0.2; 32], 8000).unwrap();

        let config = AudioConfig {
            sample_rate: 8000,
            music_dir: root.clone(),
            tracks: vec!["alpha".into()],
            effects: vec!["nope.wav".into()],
            ..AudioConfig::default()
        };
        let source = FolderSource::new(&config);
        let track = source.load_track(0).unwrap();
        let effects = source.load_effects().unwrap();
        let _ = fs::remove_dir_all(&root);

        let present: Vec<bool> = track.stems.iter().map(Option::is_some).collect();
        assert_eq!(present, vec![true, false, true, false]);
        assert_eq!(effects.len(), 1);
        assert!(effects[0].is_none());
        assert!(source.load_track(1).is_err());
    }
}
