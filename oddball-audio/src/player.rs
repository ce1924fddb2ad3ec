use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use log::warn;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("unsupported output sample format {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),
    #[error(transparent)]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
}

type SampleQueue = Arc<Mutex<VecDeque<f32>>>;

/// Mixes queued mono samples into the default output device.
///
/// Sounds are additive: playing a chime while a tone is still sounding
/// overlays the two.
pub struct AudioPlayer {
    _stream: cpal::Stream,
    queue: SampleQueue,
    sample_rate: u32,
}

impl AudioPlayer {
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::new()));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config.into(), channels, queue.clone())?
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config.into(), channels, queue.clone())?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config.into(), channels, queue.clone())?
            }
            other => return Err(AudioError::UnsupportedFormat(other)),
        };
        stream.play()?;

        Ok(Self {
            _stream: stream,
            queue,
            sample_rate,
        })
    }

    /// Device rate to synthesize at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queues mono samples, mixing over anything still pending.
    pub fn play(&self, samples: &[f32]) {
        let Ok(mut queue) = self.queue.lock() else {
            return;
        };
        mix_into(&mut queue, samples);
    }
}

fn mix_into(queue: &mut VecDeque<f32>, samples: &[f32]) {
    for (i, &sample) in samples.iter().enumerate() {
        match queue.get_mut(i) {
            Some(slot) => *slot += sample,
            None => queue.push_back(sample),
        }
    }
}

fn build_stream<S>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    queue: SampleQueue,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    S: SizedSample + FromSample<f32>,
{
    device.build_output_stream(
        config,
        move |data: &mut [S], _| {
            let mut queue = match queue.lock() {
                Ok(queue) => queue,
                Err(_) => {
                    data.fill(S::from_sample(0.0_f32));
                    return;
                }
            };
            for frame in data.chunks_mut(channels) {
                let sample = queue.pop_front().unwrap_or(0.0);
                for out in frame.iter_mut() {
                    *out = S::from_sample(sample);
                }
            }
        },
        |err| warn!("audio stream error: {err}"),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_mixes_overlapping_sounds() {
        let mut queue = VecDeque::new();
        mix_into(&mut queue, &[0.1, 0.2, 0.3]);
        mix_into(&mut queue, &[0.5, 0.5]);

        let samples: Vec<f32> = queue.iter().copied().collect();
        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 0.6).abs() < 1e-6);
        assert!((samples[1] - 0.7).abs() < 1e-6);
        assert!((samples[2] - 0.3).abs() < 1e-6);
    }
}
