// src/audio/effects.rs
// One-shot effect players

/// A fire-and-forget sample. Triggering while it is still sounding cuts the
/// old instance and starts again from the top.
#[derive(Debug, Clone, Default)]
pub struct OneShot {
    buffer: Option<Vec<f32>>,
    position: Option<usize>,
}

impl OneShot {
    pub fn new(samples: Option<Vec<f32>>) -> Self {
        Self {
            buffer: samples.filter(|s| !s.is_empty()),
            position: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.position.is_some()
    }

    /// Returns `false` if there is nothing loaded to play.
    pub fn trigger(&mut self) -> bool {
        if !self.is_loaded() {
            return false;
        }
        self.position = Some(0);
        true
    }

    /// Write the next samples into `output` (silence past the end) and advance.
    pub fn fill_next(&mut self, output: &mut [f32]) {
        let (Some(buffer), Some(pos)) = (self.buffer.as_deref(), self.position) else {
            output.fill(0.0);
            return;
        };

        let run = (buffer.len() - pos).min(output.len());
        output[..run].copy_from_slice(&buffer[pos..pos + run]);
        output[run..].fill(0.0);

        let next = pos + run;
        self.position = (next < buffer.len()).then_some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_trigger_fails() {
        let mut shot = OneShot::new(None);
        assert!(!shot.trigger());
        assert!(!shot.is_playing());
    }

    #[test]
    fn test_plays_once_then_stops() {
        let mut shot = OneShot::new(Some(vec![0.5; 5]));
        assert!(shot.trigger());

        let mut out = vec![0.0; 4];
        shot.fill_next(&mut out);
        assert_eq!(out, vec![0.5; 4]);
        assert!(shot.is_playing());

        shot.fill_next(&mut out);
        assert_eq!(out, vec![0.5, 0.0, 0.0, 0.0]);
        assert!(!shot.is_playing());
    }

    #[test]
    fn test_retrigger_restarts() {
        let mut shot = OneShot::new(Some(vec![1.0, 2.0, 3.0, 4.0]));
        shot.trigger();

        let mut out = vec![0.0; 3];
        shot.fill_next(&mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0]);

        // Still sounding; restart from the first sample
        assert!(shot.trigger());
        shot.fill_next(&mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
    }
}
