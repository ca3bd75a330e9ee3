//! Player configuration
//!
//! All synchronization heuristics are tunable here. The defaults reproduce
//! the behavior the format's reference player ships with; they are exposed as
//! configuration because none of the constants is known to be load-bearing
//! beyond compatibility.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the audio-pull task is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PumpMode {
    /// A dedicated worker thread pulls audio units while playing.
    Threaded,
    /// The host drives audio ingestion itself via `MeshPlayer::pump_audio_now`,
    /// once per scheduler tick.
    HostDriven,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Number of rotating mesh/texture slots (double buffering by default).
    pub buffer_slots: usize,
    /// Master audio switch. When off, streams play silent even if they carry
    /// audio.
    pub audio_enabled: bool,
    /// Loop finite sources from time zero when they end.
    pub looping: bool,
    pub speed_ratio: f32,
    /// Second to start decoding from after open.
    pub start_second: f64,
    /// Offset of this player's timeline against an external clock source.
    pub timeline_start_sec: f64,
    /// Base directory used to resolve relative source paths when a source is
    /// opened as a local asset.
    pub local_asset_root: Option<PathBuf>,
    pub pump_mode: PumpMode,
    pub sync: SyncTuning,
    pub audio: AudioTuning,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffer_slots: 2,
            audio_enabled: true,
            looping: true,
            speed_ratio: 1.0,
            start_second: 0.0,
            timeline_start_sec: 0.0,
            local_asset_root: None,
            pump_mode: PumpMode::Threaded,
            sync: SyncTuning::default(),
            audio: AudioTuning::default(),
        }
    }
}

/// Clock reconciliation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTuning {
    /// Audio/mesh gap below which the streams count as in sync.
    pub gap_threshold_sec: f64,
    /// Extra seconds added to the measured gap when forcing a resync jump.
    pub resync_pad_sec: f64,
    /// Fraction of the clip span past which wraparound detection arms.
    pub wrap_arm_fraction: f64,
    /// Clock value below which an armed detector counts a wrap.
    pub wrap_low_sec: f64,
    /// Maximum tolerated age of buffered audio relative to the mesh cursor
    /// before the stale prefix is evicted.
    pub max_mesh_audio_gap_sec: f64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            gap_threshold_sec: 0.5,
            resync_pad_sec: 3.0,
            wrap_arm_fraction: 0.5,
            wrap_low_sec: 1.0,
            max_mesh_audio_gap_sec: 5.0,
        }
    }
}

/// Audio accumulation and sink-clip tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTuning {
    /// Samples per decoded audio chunk.
    pub chunk_samples: usize,
    /// Buffered chunks required before playback is ready.
    pub ready_chunks: usize,
    /// Ready threshold for clips shorter than `short_clip_max_duration_sec`.
    pub short_clip_ready_chunks: usize,
    pub short_clip_max_duration_sec: f64,
    /// Chunks discarded at the head of the audio stream after open.
    pub leading_chunks_to_drop: u32,
    /// Sink clip headroom past the source duration for finite sources.
    pub file_clip_pad_sec: f64,
    /// Sink clip span for live sources.
    pub live_clip_span_sec: f64,
}

impl Default for AudioTuning {
    fn default() -> Self {
        Self {
            chunk_samples: 1024,
            ready_chunks: 30,
            short_clip_ready_chunks: 1,
            short_clip_max_duration_sec: 1.0,
            leading_chunks_to_drop: 3,
            file_clip_pad_sec: 5.0,
            live_clip_span_sec: 600.0,
        }
    }
}

impl AudioTuning {
    /// Sink clip capacity in sample frames, rounded up to whole chunks.
    pub fn clip_capacity_samples(&self, sample_rate: u32, span_sec: f64) -> usize {
        let raw = (sample_rate as f64 * span_sec) as usize;
        (raw / self.chunk_samples + 1) * self.chunk_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_player() {
        let cfg = PlayerConfig::default();
        assert_eq!(cfg.buffer_slots, 2);
        assert!(cfg.audio_enabled);
        assert!(cfg.looping);
        assert_eq!(cfg.sync.gap_threshold_sec, 0.5);
        assert_eq!(cfg.sync.resync_pad_sec, 3.0);
        assert_eq!(cfg.audio.chunk_samples, 1024);
        assert_eq!(cfg.audio.ready_chunks, 30);
        assert_eq!(cfg.audio.leading_chunks_to_drop, 3);
    }

    #[test]
    fn test_partial_config_round_trip() {
        // Hosts typically override a couple of fields and rely on defaults
        // for the rest.
        let json = r#"{"looping": false, "sync": {"gap_threshold_sec": 0.25}}"#;
        let cfg: PlayerConfig = serde_json::from_str(json).unwrap();
        assert!(!cfg.looping);
        assert_eq!(cfg.sync.gap_threshold_sec, 0.25);
        assert_eq!(cfg.sync.resync_pad_sec, 3.0);

        let back = serde_json::to_string(&cfg).unwrap();
        let again: PlayerConfig = serde_json::from_str(&back).unwrap();
        assert_eq!(again.sync.gap_threshold_sec, 0.25);
    }

    #[test]
    fn test_clip_capacity_whole_chunks() {
        let audio = AudioTuning::default();
        let cap = audio.clip_capacity_samples(44100, 7.0);
        assert_eq!(cap % audio.chunk_samples, 0);
        assert!(cap >= 44100 * 7);
    }
}
