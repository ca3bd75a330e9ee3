//! Playback core for volumetric mesh video.
//!
//! Decodes a time-indexed sequence of mesh frames (geometry + texture) plus
//! an audio stream from a finite file or a live network source, and keeps
//! both in synchronized, double-buffered presentation state for a renderer
//! running at its own frame rate.
//!
//! The heavy collaborators stay outside this crate: the low-level decoder is
//! consumed through the [`decoder::StreamDecoder`] capability trait, the
//! hardware audio clock through [`sink::AudioSink`], and the renderer reads
//! published frame slots from [`player::MeshPlayer`] and reacts to its
//! per-tick event batches.

pub mod buffer;
pub mod config;
pub mod decoder;
pub mod error;
pub mod player;
pub mod sink;
pub mod stats;
pub mod sync;
pub mod utils;

pub use buffer::{Appended, AudioLog, AudioLogConfig, FramePool, FrameSlot, MeshFrame, PixelFormat, TextureFrame};
pub use config::{AudioTuning, PlayerConfig, PumpMode, SyncTuning};
pub use decoder::{
    AudioUnit, DecoderAdapter, MeshPull, MeshUnitDesc, StreamDecoder, StreamHandle, StreamInfo,
};
pub use error::PlayerError;
pub use player::{MeshPlayer, PlayerEvent, PlayerState};
pub use sink::{AudioSink, CpalSink};
pub use stats::PlayerStats;
pub use sync::{ClockContext, GapTracker, SourceKind, SourcePolicy};
