//! Audio sink collaborator
//!
//! The sink owns the hardware audio clock: a circular sample clip the player
//! writes decoded chunks into at their sequence offsets, and a play cursor
//! that advances at the device rate. The player never blocks on the sink;
//! it reads the cursor, repositions it on resync, and trusts the sink to
//! loop through the clip.
//!
//! Offsets, capacities and positions are expressed in sample frames (one
//! frame = one sample per channel).

mod cpal_sink;

pub use cpal_sink::CpalSink;

use anyhow::Result;

pub trait AudioSink: Send {
    /// Allocate the clip and start the device stream.
    fn configure(&mut self, channels: u16, sample_rate: u32, capacity_samples: usize)
    -> Result<()>;

    /// Write interleaved samples into the clip at the given frame offset,
    /// wrapping at the clip end.
    fn write_at(&mut self, samples: &[f32], offset_samples: usize);

    /// Current play cursor within the clip, in seconds.
    fn position_sec(&self) -> f64;

    fn set_position_sec(&mut self, sec: f64);

    fn play(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// Clip capacity in sample frames. Zero before `configure`.
    fn capacity_samples(&self) -> usize;

    /// Playback rate multiplier (pitch follows, as with any resampling
    /// speed change).
    fn set_speed(&mut self, ratio: f32);
}
