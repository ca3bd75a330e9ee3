//! Source timing policies
//!
//! Finite files and live ingests share one update cycle but disagree on
//! everything clock-related: how play time derives from the sink's hardware
//! cursor, when enough audio is buffered to start, whether a widening
//! audio/mesh gap warrants a forced resync, and whether seeking is legal.
//! Those decisions are collected into one policy object chosen at open time
//! instead of being branched on per call site.

use crate::config::{AudioTuning, SyncTuning};
use crate::sink::AudioSink;
use crate::sync::GapTracker;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Finite, seekable, loopable source read from storage.
    FilePlayback,
    /// Unbounded, non-seekable source consumed in real time; tolerates data
    /// loss.
    LiveIngest,
}

impl SourceKind {
    /// The URL scheme decides the kind: `rtmp://` selects live ingestion.
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("rtmp://") {
            SourceKind::LiveIngest
        } else {
            SourceKind::FilePlayback
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, SourceKind::LiveIngest)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::FilePlayback => write!(f, "file playback"),
            SourceKind::LiveIngest => write!(f, "live ingest"),
        }
    }
}

/// Inputs to play-time derivation that belong to the controller, not the
/// policy: where the audio stream starts, where the host timeline starts,
/// and how long the sink clip is.
#[derive(Debug, Clone, Copy)]
pub struct ClockContext {
    /// PTS of the first accumulated audio chunk.
    pub start_audio_sec: f64,
    /// Offset of the player timeline against an external clock source.
    pub timeline_start_sec: f64,
    /// Span of the sink's circular clip in seconds.
    pub clip_span_sec: f64,
}

/// Per-source-kind timing decisions, selected once at open.
pub trait SourcePolicy: Send {
    fn kind(&self) -> SourceKind;

    /// Derive the unified play cursor from the sink's hardware clock.
    fn compute_play_time(&mut self, sink: &mut dyn AudioSink, ctx: &ClockContext) -> f64;

    /// Whether enough audio is buffered to start the presentation.
    fn is_ready_to_play(
        &self,
        buffered_chunks: usize,
        duration_sec: f64,
        tuning: &AudioTuning,
    ) -> bool;

    /// React to the tracked audio/mesh gap. Returns the jump applied to the
    /// sink clock, if any.
    fn handle_gap(
        &mut self,
        gaps: &mut GapTracker,
        sink: &mut dyn AudioSink,
        tuning: &SyncTuning,
    ) -> Option<f64>;

    fn allow_seek(&self) -> bool;

    /// Span of the sink clip to allocate for this source.
    fn clip_span_sec(&self, duration_sec: f64, tuning: &AudioTuning) -> f64;
}

pub fn policy_for(kind: SourceKind, tuning: &SyncTuning) -> Box<dyn SourcePolicy> {
    match kind {
        SourceKind::FilePlayback => Box::new(FilePlaybackPolicy),
        SourceKind::LiveIngest => Box::new(LiveIngestPolicy::new(tuning)),
    }
}

/// Finite sources: the sink clock maps directly onto the clip timeline.
pub struct FilePlaybackPolicy;

impl SourcePolicy for FilePlaybackPolicy {
    fn kind(&self) -> SourceKind {
        SourceKind::FilePlayback
    }

    fn compute_play_time(&mut self, sink: &mut dyn AudioSink, ctx: &ClockContext) -> f64 {
        let play_time = sink.position_sec() + ctx.start_audio_sec - ctx.timeline_start_sec;
        if play_time < 0.0 {
            // Not yet started: hold the clock at zero.
            sink.set_position_sec(0.0);
            0.0
        } else {
            play_time
        }
    }

    fn is_ready_to_play(
        &self,
        buffered_chunks: usize,
        duration_sec: f64,
        tuning: &AudioTuning,
    ) -> bool {
        if buffered_chunks > tuning.ready_chunks {
            return true;
        }
        // Clips shorter than the ready window would otherwise never start.
        duration_sec < tuning.short_clip_max_duration_sec
            && buffered_chunks > tuning.short_clip_ready_chunks
    }

    fn handle_gap(
        &mut self,
        _gaps: &mut GapTracker,
        _sink: &mut dyn AudioSink,
        _tuning: &SyncTuning,
    ) -> Option<f64> {
        // Finite sources trust the decoder's pacing; no forced resync.
        None
    }

    fn allow_seek(&self) -> bool {
        true
    }

    fn clip_span_sec(&self, duration_sec: f64, tuning: &AudioTuning) -> f64 {
        duration_sec + tuning.file_clip_pad_sec
    }
}

/// Live sources: the sink clip is a fixed-length ring the clock keeps
/// wrapping through, so elapsed real time must account for completed wraps.
pub struct LiveIngestPolicy {
    loop_count: u64,
    wrap_armed: bool,
    wrap_arm_fraction: f64,
    wrap_low_sec: f64,
}

impl LiveIngestPolicy {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self {
            loop_count: 0,
            wrap_armed: false,
            wrap_arm_fraction: tuning.wrap_arm_fraction,
            wrap_low_sec: tuning.wrap_low_sec,
        }
    }

    pub fn loop_count(&self) -> u64 {
        self.loop_count
    }
}

impl SourcePolicy for LiveIngestPolicy {
    fn kind(&self) -> SourceKind {
        SourceKind::LiveIngest
    }

    fn compute_play_time(&mut self, sink: &mut dyn AudioSink, ctx: &ClockContext) -> f64 {
        let position = sink.position_sec();

        // Arm past the middle of the clip, count a wrap once the clock
        // falls back near zero.
        if position > ctx.clip_span_sec * self.wrap_arm_fraction {
            self.wrap_armed = true;
        }
        if position < self.wrap_low_sec && self.wrap_armed {
            self.loop_count += 1;
            self.wrap_armed = false;
            log::debug!("audio clip wrapped, loop count {}", self.loop_count);
        }

        position + ctx.start_audio_sec + self.loop_count as f64 * ctx.clip_span_sec
    }

    fn is_ready_to_play(
        &self,
        buffered_chunks: usize,
        _duration_sec: f64,
        tuning: &AudioTuning,
    ) -> bool {
        buffered_chunks > tuning.ready_chunks
    }

    fn handle_gap(
        &mut self,
        gaps: &mut GapTracker,
        sink: &mut dyn AudioSink,
        tuning: &SyncTuning,
    ) -> Option<f64> {
        let jump = gaps.resync_jump(tuning.resync_pad_sec)?;
        let rewound = (sink.position_sec() - jump).max(0.0);
        sink.set_position_sec(rewound);
        Some(jump)
    }

    fn allow_seek(&self) -> bool {
        false
    }

    fn clip_span_sec(&self, _duration_sec: f64, tuning: &AudioTuning) -> f64 {
        tuning.live_clip_span_sec
    }
}
