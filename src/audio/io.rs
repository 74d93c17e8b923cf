use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;

/// Decode a WAV file to mono `f32` at `target_sample_rate`.
pub fn import_wav<P: AsRef<Path>>(path: P, target_sample_rate: u32) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let mut reader =
        WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("decoding {}", path.display()))?,
        SampleFormat::Int => {
            let full_scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("decoding {}", path.display()))?
        }
    };

    let mono = downmix(interleaved, spec.channels as usize);
    if spec.sample_rate == target_sample_rate || mono.is_empty() {
        return Ok(mono);
    }

    resample_mono(&mono, spec.sample_rate, target_sample_rate)
        .with_context(|| format!("resampling {} from {}Hz", path.display(), spec.sample_rate))
}

/// Write mono 32-bit float samples.
pub fn export_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer =
        WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Average interleaved frames down to one channel.
fn downmix(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_mono(samples: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )?;

    let output = resampler.process(&[samples], None)?;
    Ok(output.into_iter().flatten().collect())
}
