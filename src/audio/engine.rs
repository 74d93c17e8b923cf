use anyhow::{Context, Result, anyhow};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    AudioConfig, EngineState, LayerEngine, LoadedTrack, OneShot, SimdMixer, StemLayer, TrackSource,
};

/// Gap between polls in [`wait_for_shared_load`].
const SHARED_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A track load running on the loader thread.
struct PendingLoad {
    target: usize,
    receiver: Receiver<Result<LoadedTrack>>,
}

/// Plays every stem of the current track in lockstep off one shared
/// transport, with per-stem gains and a bank of one-shot effects.
///
/// `is_playing` is the listener's intent. While a track is loading the
/// transport is held and stems are silent regardless; effects keep playing.
pub struct StemEngine {
    config: AudioConfig,
    source: Arc<dyn TrackSource>,
    layers: Vec<StemLayer>,
    effects: Vec<OneShot>,
    mixer: SimdMixer,
    transport: usize,
    is_playing: bool,
    track_index: usize,
    track_name: String,
    selected_layer: Option<usize>,
    pending: Option<PendingLoad>,
}

impl StemEngine {
    /// Load the first track synchronously and start playing it.
    pub fn new(config: AudioConfig, source: Arc<dyn TrackSource>) -> Result<Self> {
        if source.track_count() == 0 {
            return Err(anyhow!("No tracks configured"));
        }

        let first = source.load_track(0).context("loading first track")?;
        let effects = match source.load_effects() {
            Ok(samples) => samples.into_iter().map(OneShot::new).collect(),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Effects unavailable");
                Vec::new()
            }
        };

        let mut engine = Self {
            layers: (0..config.max_layers).map(StemLayer::new).collect(),
            effects,
            mixer: SimdMixer::new(config.buffer_size),
            transport: 0,
            is_playing: true,
            track_index: 0,
            track_name: String::new(),
            selected_layer: None,
            pending: None,
            config,
            source,
        };
        engine.install(first);
        info!(
            track = %engine.track_name,
            stems = engine.state().layer_count(),
            effects = engine.effects.iter().filter(|e| e.is_loaded()).count(),
            "Engine ready"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Samples rendered since the current track started.
    pub fn transport(&self) -> usize {
        self.transport
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Install a finished background load, if there is one. Returns whether
    /// a load completed (successfully or not).
    pub fn poll_loading(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        match pending.receiver.try_recv() {
            Ok(result) => {
                self.finish_load(pending.target, result);
                true
            }
            Err(TryRecvError::Empty) => {
                self.pending = Some(pending);
                false
            }
            Err(TryRecvError::Disconnected) => {
                self.finish_load(pending.target, Err(anyhow!("Loader exited without a result")));
                true
            }
        }
    }

    /// Block until the in-flight load lands or `timeout` passes. Returns
    /// `false` on timeout. Not for use on the frame loop.
    pub fn wait_for_load(&mut self, timeout: Duration) -> bool {
        let Some(pending) = self.pending.take() else {
            return true;
        };
        match pending.receiver.recv_timeout(timeout) {
            Ok(result) => {
                self.finish_load(pending.target, result);
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                self.pending = Some(pending);
                false
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.finish_load(pending.target, Err(anyhow!("Loader exited without a result")));
                true
            }
        }
    }

    /// Mix the next block of mono output.
    pub fn render(&mut self, output: &mut [f32]) {
        if self.is_playing && self.pending.is_none() {
            self.mixer.mix_stems(&self.layers, self.transport, output);
            self.transport = self.transport.wrapping_add(output.len());
        } else {
            output.fill(0.0);
        }
        self.mixer.mix_one_shots(&mut self.effects, output);
        self.mixer.limit(output);
    }

    /// Swap in a new track's stems, all silent, transport at the top.
    fn install(&mut self, track: LoadedTrack) {
        let mut stems = track.stems.into_iter();
        for layer in &mut self.layers {
            layer.load(stems.next().flatten());
            layer.set_gain(0.0);
        }
        self.track_index = track.index;
        self.track_name = track.name;
        self.transport = 0;
    }

    fn finish_load(&mut self, target: usize, result: Result<LoadedTrack>) {
        let track = match result {
            Ok(track) => track,
            Err(err) => {
                warn!(
                    target_track = target,
                    error = %format!("{err:#}"),
                    "Track load failed, keeping {}", self.track_name
                );
                return;
            }
        };

        let gains: Vec<f32> = self.layers.iter().map(StemLayer::gain).collect();
        let selected = self.selected_layer;
        self.install(track);

        for (layer, gain) in self.layers.iter_mut().zip(gains) {
            if layer.is_available() {
                layer.set_gain(gain);
            }
        }
        self.selected_layer = selected.filter(|&i| self.layer_available(i));

        info!(
            track = %self.track_name,
            index = self.track_index,
            selected = ?self.selected_layer,
            "Track loaded"
        );
    }

    fn layer_available(&self, index: usize) -> bool {
        self.layers.get(index).is_some_and(StemLayer::is_available)
    }
}

impl LayerEngine for StemEngine {
    fn select_layer(&mut self, index: usize) -> bool {
        if !self.layer_available(index) {
            debug!(layer = index, "Stem not available");
            return false;
        }

        self.selected_layer = Some(index);
        let layer = &mut self.layers[index];
        if layer.gain() <= 0.0 {
            layer.set_gain(self.config.selected_stem_default_volume);
        }
        info!(layer = index, gain = layer.gain(), "Selected stem");
        true
    }

    fn set_layer_gain(&mut self, index: usize, gain: f32) -> bool {
        if !gain.is_finite() || !self.layer_available(index) {
            return false;
        }
        self.layers[index].set_gain(gain);
        true
    }

    fn toggle_playback(&mut self) {
        self.is_playing = !self.is_playing;
        info!(playing = self.is_playing, "Transport");
    }

    fn advance_track(&mut self) -> bool {
        if self.pending.is_some() {
            debug!("Track change already in flight");
            return false;
        }

        let target = (self.track_index + 1) % self.source.track_count();
        let (sender, receiver) = channel::bounded(1);
        let source = Arc::clone(&self.source);

        let spawned = thread::Builder::new()
            .name("track-loader".into())
            .spawn(move || {
                let _ = sender.send(source.load_track(target));
            });
        if let Err(err) = spawned {
            warn!(error = %err, "Could not start track loader");
            return false;
        }

        info!(from = self.track_index, to = target, "Loading next track");
        self.pending = Some(PendingLoad { target, receiver });
        true
    }

    fn trigger_effect(&mut self, index: usize) -> bool {
        let fired = self.effects.get_mut(index).is_some_and(OneShot::trigger);
        debug!(effect = index, fired, "Effect");
        fired
    }

    fn state(&self) -> EngineState {
        EngineState {
            track_index: self.track_index,
            track_name: self.track_name.clone(),
            selected_layer: self.selected_layer,
            layer_gains: self.layers.iter().map(StemLayer::gain).collect(),
            available_layers: self.layers.iter().map(StemLayer::is_available).collect(),
            is_playing: self.is_playing,
            is_loading: self.pending.is_some(),
            effect_slots: self.effects.iter().map(OneShot::is_loaded).collect(),
        }
    }

    fn poll(&mut self) {
        self.poll_loading();
    }
}

/// Wait for a pending track change on an engine shared with the audio
/// callback. The lock is only taken for each poll, so the callback keeps
/// rendering meanwhile. Returns whether the load finished within `timeout`.
pub fn wait_for_shared_load(engine: &Mutex<StemEngine>, timeout: Duration) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        {
            let mut engine = engine
                .lock()
                .map_err(|_| anyhow!("audio engine lock poisoned"))?;
            engine.poll_loading();
            if !engine.is_loading() {
                return Ok(true);
            }
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(SHARED_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ToneSource;
    use crossbeam::channel::Sender;

    const WAIT: Duration = Duration::from_secs(5);

    /// Fixed in-memory tracks. Loads of track `gated_from` onward block until
    /// the test releases them; tracks listed in `failing` error out.
    struct StubSource {
        tracks: Vec<Vec<Option<Vec<f32>>>>,
        effects: Vec<Option<Vec<f32>>>,
        failing: Vec<usize>,
        gate: Option<(usize, Receiver<()>)>,
    }

    impl StubSource {
        fn new(tracks: Vec<Vec<Option<Vec<f32>>>>) -> Self {
            Self {
                tracks,
                effects: vec![Some(vec![0.5; 8]), None],
                failing: Vec::new(),
                gate: None,
            }
        }
    }

    impl TrackSource for StubSource {
        fn track_count(&self) -> usize {
            self.tracks.len()
        }

        fn load_track(&self, index: usize) -> Result<LoadedTrack> {
            if let Some((from, gate)) = &self.gate
                && index >= *from
            {
                let _ = gate.recv();
            }
            if self.failing.contains(&index) {
                return Err(anyhow!("corrupt stem"));
            }
            Ok(LoadedTrack {
                index,
                name: format!("t{index}"),
                stems: self.tracks[index].clone(),
            })
        }

        fn load_effects(&self) -> Result<Vec<Option<Vec<f32>>>> {
            Ok(self.effects.clone())
        }
    }

    fn stem(value: f32) -> Option<Vec<f32>> {
        Some(vec![value; 16])
    }

    fn engine(source: StubSource) -> StemEngine {
        StemEngine::new(AudioConfig::default(), Arc::new(source)).unwrap()
    }

    fn gated(tracks: Vec<Vec<Option<Vec<f32>>>>) -> (StemEngine, Sender<()>) {
        let (release, gate) = channel::unbounded();
        let mut source = StubSource::new(tracks);
        source.gate = Some((1, gate));
        (engine(source), release)
    }

    #[test]
    fn test_starts_playing_first_track() {
        let e = engine(StubSource::new(vec![vec![stem(0.1), None, stem(0.3), None]]));
        let state = e.state();

        assert_eq!(state.track_name, "t0");
        assert!(state.is_playing);
        assert!(!state.is_loading);
        assert_eq!(state.available_layers, vec![true, false, true, false]);
        assert_eq!(state.layer_gains, vec![0.0; 4]);
        assert_eq!(state.effect_slots, vec![true, false]);
        assert_eq!(state.selected_layer, None);
    }

    #[test]
    fn test_no_tracks_is_an_error() {
        let result = StemEngine::new(AudioConfig::default(), Arc::new(StubSource::new(Vec::new())));
        assert!(result.is_err());
    }

    #[test]
    fn test_select_missing_layer_rejected() {
        let mut e = engine(StubSource::new(vec![vec![stem(0.1), None, None, None]]));

        assert!(!e.select_layer(1));
        assert!(!e.select_layer(9));
        assert_eq!(e.state().selected_layer, None);
        assert!(!e.set_layer_gain(1, 0.5));
    }

    #[test]
    fn test_select_raises_silent_layer() {
        let mut e = engine(StubSource::new(vec![vec![stem(0.1), stem(0.2), None, None]]));

        assert!(e.select_layer(0));
        assert_eq!(e.state().selected_gain(), 0.7);

        // An audible layer keeps its level on reselection
        assert!(e.set_layer_gain(1, 0.3));
        assert!(e.select_layer(1));
        assert_eq!(e.state().selected_gain(), 0.3);
        assert!(!e.set_layer_gain(1, f32::NAN));
    }

    #[test]
    fn test_advance_preserves_selection_and_gains() {
        let mut e = engine(StubSource::new(vec![
            vec![stem(0.1), stem(0.2), stem(0.3), None],
            vec![stem(0.1), stem(0.2), None, stem(0.4)],
        ]));
        e.select_layer(1);
        e.set_layer_gain(1, 0.4);
        e.set_layer_gain(2, 0.9);

        assert!(e.advance_track());
        assert!(e.wait_for_load(WAIT));

        let state = e.state();
        assert_eq!(state.track_index, 1);
        assert_eq!(state.selected_layer, Some(1));
        // Slot 2 is missing on the new track, so its gain is dropped
        assert_eq!(state.layer_gains, vec![0.0, 0.4, 0.0, 0.0]);
        assert!(state.is_playing);
    }

    #[test]
    fn test_selection_dropped_when_stem_missing() {
        let mut e = engine(StubSource::new(vec![
            vec![stem(0.1), None, stem(0.3), None],
            vec![stem(0.1), None, None, None],
        ]));
        e.select_layer(2);
        e.advance_track();
        e.wait_for_load(WAIT);
        assert_eq!(e.state().selected_layer, None);
    }

    #[test]
    fn test_advance_rejected_while_loading() {
        let (mut e, release) = gated(vec![vec![stem(0.1)], vec![stem(0.2)], vec![stem(0.3)]]);

        assert!(e.advance_track());
        assert!(e.state().is_loading);
        assert!(!e.advance_track());

        // Still in flight: polling leaves everything as it was
        e.poll();
        assert!(e.state().is_loading);
        assert_eq!(e.state().track_index, 0);

        release.send(()).unwrap();
        assert!(e.wait_for_load(WAIT));
        assert_eq!(e.state().track_index, 1);
        assert!(!e.state().is_loading);
    }

    #[test]
    fn test_tracks_wrap_around() {
        let mut e = engine(StubSource::new(vec![vec![stem(0.1)], vec![stem(0.2)]]));
        for expected in [1, 0, 1] {
            assert!(e.advance_track());
            assert!(e.wait_for_load(WAIT));
            assert_eq!(e.state().track_index, expected);
        }
    }

    #[test]
    fn test_failed_load_keeps_current_track() {
        let mut source = StubSource::new(vec![vec![stem(0.1)], vec![stem(0.2)]]);
        source.failing = vec![1];
        let mut e = engine(source);
        e.select_layer(0);

        assert!(e.advance_track());
        assert!(e.wait_for_load(WAIT));

        let state = e.state();
        assert_eq!(state.track_index, 0);
        assert_eq!(state.selected_layer, Some(0));
        assert!(!state.is_loading);
        assert!(state.is_playing);
    }

    #[test]
    fn test_pause_freezes_transport_but_effects_sound() {
        let mut e = engine(StubSource::new(vec![vec![stem(0.25)]]));
        e.select_layer(0);
        e.set_layer_gain(0, 1.0);

        let mut out = vec![0.0; 4];
        e.render(&mut out);
        assert_eq!(out, vec![0.25; 4]);
        assert_eq!(e.transport(), 4);

        e.toggle_playback();
        assert!(e.trigger_effect(0));
        e.render(&mut out);
        assert_eq!(out, vec![0.5; 4]);
        assert_eq!(e.transport(), 4);

        e.toggle_playback();
        e.render(&mut out);
        // Stem plus the tail of the effect
        assert_eq!(out, vec![0.75; 4]);
        assert_eq!(e.transport(), 8);
    }

    #[test]
    fn test_stems_silent_while_loading() {
        let (mut e, release) = gated(vec![vec![stem(0.25)], vec![stem(0.5)]]);
        e.select_layer(0);

        e.advance_track();
        let mut out = vec![1.0; 8];
        e.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(e.transport(), 0);

        release.send(()).unwrap();
        e.wait_for_load(WAIT);
        e.render(&mut out);
        assert!(out.iter().all(|&s| (s - 0.35).abs() < 1e-6));
    }

    #[test]
    fn test_shared_wait_leaves_lock_free() {
        let (mut e, release) = gated(vec![vec![stem(0.1)], vec![stem(0.2)]]);
        assert!(e.advance_track());
        let shared = Arc::new(Mutex::new(e));

        let waiter = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || wait_for_shared_load(&shared, WAIT))
        };
        thread::sleep(Duration::from_millis(50));

        // An audio callback would try_lock like this while the wait runs
        let mut got_lock = false;
        for _ in 0..500 {
            if let Ok(engine) = shared.try_lock() {
                assert!(engine.is_loading());
                got_lock = true;
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        release.send(()).unwrap();

        assert!(got_lock);
        assert!(waiter.join().unwrap().unwrap());
        assert_eq!(shared.lock().unwrap().state().track_index, 1);
    }

    #[test]
    fn test_shared_wait_times_out() {
        let (mut e, release) = gated(vec![vec![stem(0.1)], vec![stem(0.2)]]);
        e.advance_track();
        let shared = Mutex::new(e);

        assert!(!wait_for_shared_load(&shared, Duration::from_millis(30)).unwrap());
        assert!(shared.lock().unwrap().is_loading());
        release.send(()).unwrap();
    }

    #[test]
    fn test_unloaded_effect_rejected() {
        let mut e = engine(StubSource::new(vec![vec![stem(0.1)]]));
        assert!(!e.trigger_effect(1));
        assert!(!e.trigger_effect(7));
        assert!(e.trigger_effect(0));
    }

    #[test]
    fn test_tone_source_engine() {
        let config = AudioConfig {
            sample_rate: 8000,
            ..AudioConfig::default()
        };
        let source = ToneSource::from_config(&config).with_loop_samples(64);
        let mut e = StemEngine::new(config, Arc::new(source)).unwrap();

        assert_eq!(e.state().layer_count(), 4);
        assert_eq!(e.state().effect_slots, vec![true; 3]);
        assert!(e.select_layer(3));

        let mut out = vec![0.0; 256];
        e.render(&mut out);
        assert!(out.iter().any(|&s| s != 0.0));
        assert!(out.iter().all(|&s| (-1.0..=1.0).contains(&s)));
    }
}
