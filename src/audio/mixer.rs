// src/audio/mixer.rs
// SIMD-accelerated stem mixing

use super::{OneShot, StemLayer};
use wide::f32x4;

/// Sums stems and one-shots into a mono buffer.
///
/// Real-time safe after construction: the scratch buffer only grows if a
/// callback asks for more frames than it was sized for.
pub struct SimdMixer {
    scratch_buffer: Vec<f32>,
}

impl SimdMixer {
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            scratch_buffer: vec![0.0; max_buffer_size],
        }
    }

    /// Mix every audible stem, read at the shared `transport`, into `output`.
    pub fn mix_stems(&mut self, layers: &[StemLayer], transport: usize, output: &mut [f32]) {
        Self::clear_buffer_simd(output);
        let len = self.ensure_scratch(output.len());

        for layer in layers.iter().filter(|l| l.is_audible()) {
            let scratch = &mut self.scratch_buffer[..len];
            layer.fill_at(transport, scratch);
            Self::add_buffer_simd(output, scratch, layer.gain());
        }
    }

    /// Add every sounding one-shot on top of `output` at unity gain.
    pub fn mix_one_shots(&mut self, shots: &mut [OneShot], output: &mut [f32]) {
        let len = self.ensure_scratch(output.len());

        for shot in shots.iter_mut().filter(|s| s.is_playing()) {
            let scratch = &mut self.scratch_buffer[..len];
            shot.fill_next(scratch);
            Self::add_buffer_simd(output, scratch, 1.0);
        }
    }

    /// Hard limit to [-1, 1].
    pub fn limit(&self, output: &mut [f32]) {
        let one = f32x4::splat(1.0);
        let neg_one = f32x4::splat(-1.0);

        let mut chunks = output.chunks_exact_mut(4);
        for chunk in &mut chunks {
            let v = f32x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]);
            chunk.copy_from_slice(&v.max(neg_one).min(one).to_array());
        }
        for sample in chunks.into_remainder() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }

    fn ensure_scratch(&mut self, len: usize) -> usize {
        if self.scratch_buffer.len() < len {
            self.scratch_buffer.resize(len, 0.0);
        }
        len
    }

    #[inline]
    fn clear_buffer_simd(buffer: &mut [f32]) {
        let zero = f32x4::splat(0.0).to_array();
        let mut chunks = buffer.chunks_exact_mut(4);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&zero);
        }
        chunks.into_remainder().fill(0.0);
    }

    /// dest += src * gain
    #[inline]
    fn add_buffer_simd(dest: &mut [f32], src: &[f32], gain: f32) {
        let gain_vec = f32x4::splat(gain);
        let len = dest.len().min(src.len());
        let chunks = len / 4;

        for i in 0..chunks {
            let idx = i * 4;
            let d = f32x4::new([dest[idx], dest[idx + 1], dest[idx + 2], dest[idx + 3]]);
            let s = f32x4::new([src[idx], src[idx + 1], src[idx + 2], src[idx + 3]]);
            dest[idx..idx + 4].copy_from_slice(&(d + s * gain_vec).to_array());
        }

        for i in chunks * 4..len {
            dest[i] += src[i] * gain;
        }
    }
}
