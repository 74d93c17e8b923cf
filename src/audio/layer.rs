/// One stem slot of the current track.
///
/// A stem never tracks its own playhead: it is read at the engine's shared
/// transport position, wrapped to its own length, so stems cannot drift
/// apart no matter how their gains change.
#[derive(Debug, Clone)]
pub struct StemLayer {
    pub id: usize,
    buffer: Option<Vec<f32>>,
    gain: f32,
}

impl StemLayer {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            buffer: None,
            gain: 0.0,
        }
    }

    /// Replace the audio. An empty buffer counts as missing.
    pub fn load(&mut self, samples: Option<Vec<f32>>) {
        self.buffer = samples.filter(|s| !s.is_empty());
    }

    pub fn is_available(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    /// Whether the mixer has anything to do for this stem.
    pub fn is_audible(&self) -> bool {
        self.is_available() && self.gain > 0.0
    }

    /// Copy unscaled samples starting at `transport`, looping. Missing stems
    /// write silence.
    pub fn fill_at(&self, transport: usize, output: &mut [f32]) {
        let Some(buffer) = self.buffer.as_deref() else {
            output.fill(0.0);
            return;
        };

        let len = buffer.len();
        let mut pos = transport % len;
        let mut written = 0;
        while written < output.len() {
            let run = (len - pos).min(output.len() - written);
            output[written..written + run].copy_from_slice(&buffer[pos..pos + run]);
            written += run;
            pos = 0;
        }
    }
}

impl Default for StemLayer {
    fn default() -> Self {
        Self::new(0)
    }
}
