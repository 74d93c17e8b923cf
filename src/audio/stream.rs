use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use super::StemEngine;

/// Mono frames rendered per engine call inside the callback.
const RENDER_CHUNK: usize = 1024;

/// The default output device, ready to play a [`StemEngine`].
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    device_name: String,
}

impl AudioOutput {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;
        let default = device.default_output_config()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let config = StreamConfig {
            channels: default.channels(),
            sample_rate: default.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            device = %device_name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?default.sample_format(),
            "Output device"
        );

        Ok(Self {
            device,
            config,
            sample_format: default.sample_format(),
            device_name,
        })
    }

    /// Stems should be decoded at this rate.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Start pulling audio from `engine`. The stream stops when dropped.
    ///
    /// The callback never blocks on the engine lock: if the frame loop holds
    /// it, that block is silent.
    pub fn start(&self, engine: Arc<Mutex<StemEngine>>) -> Result<Stream> {
        if self.sample_format != SampleFormat::F32 {
            return Err(anyhow!(
                "Unsupported output sample format {:?}",
                self.sample_format
            ));
        }

        let channels = self.config.channels as usize;
        let mut mono = vec![0.0f32; RENDER_CHUNK];

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut engine) = engine.try_lock() else {
                    data.fill(0.0);
                    return;
                };
                for block in data.chunks_mut(RENDER_CHUNK * channels) {
                    let frames = block.len() / channels;
                    let mono = &mut mono[..frames];
                    engine.render(mono);
                    for (frame, &sample) in block.chunks_mut(channels).zip(mono.iter()) {
                        frame.fill(sample);
                    }
                }
            },
            |err| warn!(error = %err, "Output stream error"),
            None,
        )?;

        stream.play()?;
        Ok(stream)
    }
}
