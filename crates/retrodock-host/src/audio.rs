//! Audio output: the cpal sink that drains the sample ring.
//!
//! The core produces interleaved stereo i16 frames at its own rate; the
//! device callback pulls them out of the lock-free ring, resamples linearly
//! to the device rate, and fans the stereo pair out across however many
//! channels the device exposes. Underruns zero-fill rather than block.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use cpal::{
    SampleFormat,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};

use crate::ring::{RingConsumer, RingProducer, ring};

/// Bytes per interleaved stereo i16 frame.
const FRAME_BYTES: usize = 4;

/// Ring capacity in seconds of queued audio at the core's rate.
const QUEUE_SECONDS: f64 = 0.25;

/// Stateful linear interpolator between two adjacent source frames.
///
/// `pos` is the fractional position inside the `[prev, cur]` window; each
/// output frame advances it by `src_rate / dst_rate`.
struct LinearResampler {
    ratio: f64,
    pos: f64,
    prev: [f32; 2],
    cur: [f32; 2],
    primed: bool,
}

impl LinearResampler {
    fn new(src_rate: f64, dst_rate: f64) -> Self {
        Self {
            ratio: src_rate / dst_rate,
            pos: 0.0,
            prev: [0.0; 2],
            cur: [0.0; 2],
            primed: false,
        }
    }

    /// Produces one output frame, pulling source frames as needed. Returns
    /// `None` when the source runs dry.
    fn next_frame(&mut self, mut pull: impl FnMut() -> Option<[f32; 2]>) -> Option<[f32; 2]> {
        if !self.primed {
            self.prev = pull()?;
            self.cur = pull().unwrap_or(self.prev);
            self.primed = true;
        }
        while self.pos >= 1.0 {
            let next = pull()?;
            self.prev = self.cur;
            self.cur = next;
            self.pos -= 1.0;
        }
        let t = self.pos as f32;
        let out = [
            self.prev[0] + (self.cur[0] - self.prev[0]) * t,
            self.prev[1] + (self.cur[1] - self.prev[1]) * t,
        ];
        self.pos += self.ratio;
        Some(out)
    }
}

/// Owns the cpal output stream; dropping it stops playback.
pub struct AudioPipeline {
    sample_rate: u32,
    _stream: cpal::Stream,
    clear_flag: Arc<AtomicBool>,
}

impl AudioPipeline {
    /// Opens the default output device and splits off the producer endpoint
    /// the core's audio callbacks write into.
    pub fn open(core_sample_rate: f64) -> Result<(Self, RingProducer)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no default output device")?;
        let supported_config = device
            .default_output_config()
            .context("no default output config")?;
        let sample_format = supported_config.sample_format();

        let config: cpal::StreamConfig = supported_config.into();
        let sample_rate = config.sample_rate;
        let channels = config.channels as usize;

        let capacity_frames = (core_sample_rate * QUEUE_SECONDS).ceil().max(1.0) as usize;
        let (producer, consumer) = ring(capacity_frames * FRAME_BYTES);

        let clear_flag = Arc::new(AtomicBool::new(false));
        let resampler = LinearResampler::new(core_sample_rate, f64::from(sample_rate));
        let mut drain = Drain {
            consumer,
            resampler,
            clear_flag: clear_flag.clone(),
        };

        let err_fn = |err| tracing::error!("audio stream error: {err}");
        let stream = match sample_format {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    drain.fill(data, channels, |s| s);
                },
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _| {
                    drain.fill(data, channels, |s| (s.clamp(-1.0, 1.0) * 32767.0) as i16);
                },
                err_fn,
                None,
            )?,
            other => anyhow::bail!("unsupported output sample format: {other:?}"),
        };
        stream.play()?;

        tracing::info!(
            device_rate = sample_rate,
            core_rate = core_sample_rate,
            channels,
            ?sample_format,
            "audio output opened"
        );

        Ok((
            Self {
                sample_rate,
                _stream: stream,
                clear_flag,
            },
            producer,
        ))
    }

    /// Requests that queued samples be dropped from the device callback.
    pub fn clear(&self) {
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// The consumer side living inside the device callback.
struct Drain {
    consumer: RingConsumer,
    resampler: LinearResampler,
    clear_flag: Arc<AtomicBool>,
}

impl Drain {
    fn fill<T: Copy + Default>(&mut self, data: &mut [T], channels: usize, convert: impl Fn(f32) -> T) {
        if self.clear_flag.swap(false, Ordering::SeqCst) {
            self.consumer.clear();
        }
        if channels == 0 {
            return;
        }

        let consumer = &mut self.consumer;
        for frame in data.chunks_mut(channels) {
            let pulled = self.resampler.next_frame(|| {
                let mut raw = [0u8; FRAME_BYTES];
                // Whole frames only; a partial frame stays queued until the
                // producer completes it.
                if consumer.read_exact(&mut raw) {
                    Some([
                        f32::from(i16::from_le_bytes([raw[0], raw[1]])) / 32768.0,
                        f32::from(i16::from_le_bytes([raw[2], raw[3]])) / 32768.0,
                    ])
                } else {
                    None
                }
            });

            match pulled {
                // A backend may hand a buffer that is not a multiple of the
                // channel count; the trailing short chunk gets the downmix.
                Some([left, right]) => match frame {
                    [] => {}
                    [single] => *single = convert((left + right) * 0.5),
                    [l, r, rest @ ..] => {
                        *l = convert(left);
                        *r = convert(right);
                        for ch in rest {
                            *ch = convert(right);
                        }
                    }
                },
                None => {
                    for ch in frame.iter_mut() {
                        *ch = T::default();
                    }
                }
            }
        }
    }
}
