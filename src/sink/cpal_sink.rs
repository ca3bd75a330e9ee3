//! cpal-backed audio sink
//!
//! Drives the default output device from a circular clip buffer guarded by a
//! mutex. The output callback reads from the clip at the play cursor and
//! emits silence while paused, so underruns never glitch the device stream.

use super::AudioSink;
use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

struct ClipState {
    /// Interleaved sample storage, `capacity_frames * channels` long.
    data: Vec<f32>,
    /// Play cursor in interleaved samples, fractional to support speed
    /// ratios other than 1.0 (nearest-neighbor resampling).
    cursor: f64,
    playing: bool,
    speed: f32,
}

impl ClipState {
    fn fill_output(&mut self, output: &mut [f32]) {
        if !self.playing || self.data.is_empty() {
            output.fill(0.0);
            return;
        }

        let len = self.data.len() as f64;
        for sample in output.iter_mut() {
            *sample = self.data[self.cursor as usize];
            self.cursor += self.speed as f64;
            if self.cursor >= len {
                self.cursor %= len;
            }
        }
    }
}

pub struct CpalSink {
    state: Arc<Mutex<ClipState>>,
    stream: Option<cpal::Stream>, // kept alive
    channels: u16,
    sample_rate: u32,
    capacity_frames: usize,
}

// cpal::Stream is not Send on every backend; the sink is only ever driven
// from the thread that owns the player.
unsafe impl Send for CpalSink {}

impl CpalSink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ClipState {
                data: Vec::new(),
                cursor: 0.0,
                playing: false,
                speed: 1.0,
            })),
            stream: None,
            channels: 0,
            sample_rate: 0,
            capacity_frames: 0,
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalSink {
    fn configure(
        &mut self,
        channels: u16,
        sample_rate: u32,
        capacity_samples: usize,
    ) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no output audio device"))?;
        let config = cpal::StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        {
            let mut clip = self.state.lock().unwrap();
            clip.data = vec![0.0f32; capacity_samples * channels as usize];
            clip.cursor = 0.0;
            clip.playing = false;
        }

        let state = Arc::clone(&self.state);
        let stream = device.build_output_stream(
            &config,
            move |output: &mut [f32], _| {
                if let Ok(mut clip) = state.lock() {
                    clip.fill_output(output);
                } else {
                    output.fill(0.0);
                }
            },
            |err| log::error!("audio output error: {}", err),
            None,
        )?;
        stream.play()?;

        self.stream = Some(stream);
        self.channels = channels;
        self.sample_rate = sample_rate;
        self.capacity_frames = capacity_samples;
        log::debug!(
            "audio sink configured: {}ch @ {} Hz, clip {} frames",
            channels,
            sample_rate,
            capacity_samples
        );
        Ok(())
    }

    fn write_at(&mut self, samples: &[f32], offset_samples: usize) {
        if self.capacity_frames == 0 {
            return;
        }
        let mut clip = self.state.lock().unwrap();
        let len = clip.data.len();
        if len == 0 {
            return;
        }
        let start = (offset_samples * self.channels as usize) % len;
        for (i, &sample) in samples.iter().enumerate() {
            clip.data[(start + i) % len] = sample;
        }
    }

    fn position_sec(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let cursor = self.state.lock().unwrap().cursor;
        cursor / self.channels as f64 / self.sample_rate as f64
    }

    fn set_position_sec(&mut self, sec: f64) {
        if self.capacity_frames == 0 {
            return;
        }
        let mut clip = self.state.lock().unwrap();
        let frames = (sec * self.sample_rate as f64).max(0.0) as usize % self.capacity_frames;
        clip.cursor = (frames * self.channels as usize) as f64;
    }

    fn play(&mut self) {
        self.state.lock().unwrap().playing = true;
    }

    fn pause(&mut self) {
        self.state.lock().unwrap().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    fn capacity_samples(&self) -> usize {
        self.capacity_frames
    }

    fn set_speed(&mut self, ratio: f32) {
        self.state.lock().unwrap().speed = ratio.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Clip arithmetic is tested without a device; `configure` needs real
    // audio hardware and is exercised by hosts, not CI.

    #[test]
    fn test_fill_output_reads_and_wraps() {
        let mut clip = ClipState {
            data: vec![1.0, 2.0, 3.0, 4.0],
            cursor: 2.0,
            playing: true,
            speed: 1.0,
        };

        let mut out = [0.0f32; 4];
        clip.fill_output(&mut out);
        assert_eq!(out, [3.0, 4.0, 1.0, 2.0]);
        assert_eq!(clip.cursor, 2.0);
    }

    #[test]
    fn test_fill_output_silent_when_paused() {
        let mut clip = ClipState {
            data: vec![1.0; 8],
            cursor: 0.0,
            playing: false,
            speed: 1.0,
        };

        let mut out = [0.5f32; 4];
        clip.fill_output(&mut out);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(clip.cursor, 0.0);
    }

    #[test]
    fn test_fill_output_speed_advances_faster() {
        let mut clip = ClipState {
            data: vec![0.0; 100],
            cursor: 0.0,
            playing: true,
            speed: 2.0,
        };

        let mut out = [0.0f32; 10];
        clip.fill_output(&mut out);
        assert_eq!(clip.cursor, 20.0);
    }
}
