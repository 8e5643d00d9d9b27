//! Audio playback using CPAL (Cross-Platform Audio Library).
//!
//! The output stream is opened once and stays open for the whole session.
//! [`CpalOutput::play`] queues a chunk's samples for the device callback and
//! blocks until the callback has consumed them, so consecutive chunks play
//! back to back on the same stream.

use crate::audio::AudioOutput;
use crate::error::{Result, TalkbackError};
use crate::pipeline::types::AudioChunk;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Slack on top of a chunk's own duration before `play` decides the device
/// has stopped pulling audio.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Samples waiting for the device (mono, device rate, -1.0..=1.0).
#[derive(Default)]
struct PlaybackQueue {
    samples: Mutex<VecDeque<f32>>,
    drained: Condvar,
}

impl PlaybackQueue {
    /// Device callback: fill `data` from the queue and wake `play` once the
    /// queue runs dry.
    fn fill<T>(&self, data: &mut [T], channels: usize)
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let had_audio = !samples.is_empty();
        fill_frames(&mut samples, data, channels);
        let drained = had_audio && samples.is_empty();
        drop(samples);

        if drained {
            self.drained.notify_all();
        }
    }
}

/// Writes one queued mono sample per interleaved frame, copied to every
/// channel. Frames past the end of the queue are silence.
fn fill_frames<T>(queue: &mut VecDeque<f32>, data: &mut [T], channels: usize)
where
    T: SizedSample + FromSample<f32>,
{
    for frame in data.chunks_mut(channels.max(1)) {
        let value = T::from_sample(queue.pop_front().unwrap_or(0.0));
        frame.fill(value);
    }
}

/// Converts 16-bit PCM at `from` Hz to float samples at `to` Hz using linear
/// interpolation.
fn resample(samples: &[i16], from: u32, to: u32) -> Vec<f32> {
    let input: Vec<f32> = samples.iter().map(|&s| f32::from(s) / 32768.0).collect();
    if from == to || from == 0 || input.is_empty() {
        return input;
    }

    let last = input.len() - 1;
    let out_len = ((input.len() as u64 * u64::from(to)) / u64::from(from)).max(1) as usize;
    let step = f64::from(from) / f64::from(to);

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = (pos as usize).min(last);
            let frac = (pos - idx as f64) as f32;
            let a = input[idx];
            let b = input[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched while constructing [`CpalOutput`] and
/// when it is dropped; both happen behind the owning Mutex.
struct SendableStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendableStream {}

/// Speaker output on a CPAL device.
pub struct CpalOutput {
    device_name: String,
    sample_rate: u32,
    queue: Arc<PlaybackQueue>,
    _stream: Mutex<SendableStream>,
}

impl CpalOutput {
    /// Opens `device_name`, or the default output device when `None`, and
    /// starts its stream.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| TalkbackError::Playback {
                message: format!("failed to query output config of {name}: {e}"),
            })?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = usize::from(config.channels);

        let queue = Arc::new(PlaybackQueue::default());
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, &queue),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, &queue),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, &queue),
            other => Err(TalkbackError::Playback {
                message: format!("unsupported output sample format {other:?}"),
            }),
        }?;
        stream.play().map_err(|e| TalkbackError::Playback {
            message: format!("failed to start output stream: {e}"),
        })?;

        tracing::info!(device = %name, sample_rate, channels, "audio output opened");
        Ok(Self {
            device_name: name,
            sample_rate,
            queue,
            _stream: Mutex::new(SendableStream(stream)),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn play(&self, chunk: &AudioChunk) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let samples = resample(&chunk.samples, chunk.sample_rate, self.sample_rate);
        let deadline = Instant::now() + Duration::from_millis(chunk.duration_ms()) + DRAIN_GRACE;

        let mut queue = self
            .queue
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.extend(samples);

        while !queue.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                let left = queue.len();
                queue.clear();
                return Err(TalkbackError::Playback {
                    message: format!(
                        "{} stopped consuming audio ({left} samples left)",
                        self.device_name
                    ),
                });
            }
            queue = self
                .queue
                .drained
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    let Some(wanted) = device_name else {
        return host
            .default_output_device()
            .ok_or_else(|| TalkbackError::AudioDeviceNotFound {
                device: "default".to_string(),
            });
    };

    let mut devices = host
        .output_devices()
        .map_err(|e| TalkbackError::Playback {
            message: format!("failed to enumerate output devices: {e}"),
        })?;
    devices
        .find(|device| device.name().is_ok_and(|name| name == wanted))
        .ok_or_else(|| TalkbackError::AudioDeviceNotFound {
            device: wanted.to_string(),
        })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    queue: &Arc<PlaybackQueue>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let queue = Arc::clone(queue);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| queue.fill(data, channels),
            |err| tracing::error!("audio output stream error: {err}"),
            None,
        )
        .map_err(|e| TalkbackError::Playback {
            message: format!("failed to build output stream: {e}"),
        })
}

/// Resolves `device_name`, or the default output device when `None`, to
/// the name the host reports for it.
pub fn device_name(device_name: Option<&str>) -> Result<String> {
    let device = find_device(device_name)?;
    device.name().map_err(|e| TalkbackError::Playback {
        message: format!("failed to read output device name: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_resample_same_rate_only_converts() {
        let out = resample(&[0, 16384, -32768], 24000, 24000);
        assert_eq!(out, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_resample_up_doubles_length() {
        let out = resample(&[0, 16384], 24000, 48000);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.25).abs() < 1e-6);
        assert!((out[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_resample_down_halves_length() {
        let out = resample(&[0; 480], 48000, 24000);
        assert_eq!(out.len(), 240);
    }

    #[test]
    fn test_fill_frames_copies_to_every_channel() {
        let mut queue: VecDeque<f32> = VecDeque::from(vec![0.5, -0.5]);
        let mut data = [0.0f32; 6];
        fill_frames(&mut queue, &mut data, 2);
        assert_eq!(data, [0.5, 0.5, -0.5, -0.5, 0.0, 0.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fill_frames_converts_to_i16() {
        let mut queue: VecDeque<f32> = VecDeque::from(vec![0.0, 1.0]);
        let mut data = [7i16; 3];
        fill_frames(&mut queue, &mut data, 1);
        assert_eq!(data[0], 0);
        assert!(data[1] > 32000);
        assert_eq!(data[2], 0);
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        match device_name(Some("talkback-no-such-device")) {
            Err(TalkbackError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "talkback-no-such-device")
            }
            // Hosts without any audio backend fail enumeration instead
            Err(TalkbackError::Playback { .. }) => {}
            other => panic!("Expected AudioDeviceNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_queue_wakes_waiter_when_drained() {
        let queue = Arc::new(PlaybackQueue::default());
        queue.samples.lock().unwrap().extend([0.1, 0.2, 0.3]);

        let callback = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                let mut data = [0.0f32; 8];
                queue.fill(&mut data, 2);
            })
        };

        let mut samples = queue.samples.lock().unwrap();
        while !samples.is_empty() {
            let (guard, timeout) = queue
                .drained
                .wait_timeout(samples, Duration::from_secs(2))
                .unwrap();
            samples = guard;
            assert!(!timeout.timed_out(), "drain was never signalled");
        }
        drop(samples);
        callback.join().unwrap();
    }
}
