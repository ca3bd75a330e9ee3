//! Playback controller
//!
//! `MeshPlayer` orchestrates the open/play/pause/preview/seek lifecycle and
//! drives the per-cycle pulls. The host's render loop calls `update` once
//! per tick; each tick pulls at most one mesh unit, reconciles the audio
//! clock, feeds accumulated audio to the sink and publishes the frame once
//! the readiness gate passes. Audio units are pulled by a worker thread (or
//! by the host itself in `PumpMode::HostDriven`) and accumulated in the
//! shared audio log.
//!
//! Shutdown ordering is load-bearing: the repeating pulls are stopped and
//! joined before any buffer is released, so a task can never write into
//! freed storage.

mod events;
mod state;

pub use events::PlayerEvent;
pub use state::PlayerState;

use crate::buffer::{Appended, AudioLog, AudioLogConfig, FramePool, FrameSlot};
use crate::config::{PlayerConfig, PumpMode};
use crate::decoder::{DecoderAdapter, StreamDecoder, StreamHandle, StreamInfo};
use crate::error::PlayerError;
use crate::sink::AudioSink;
use crate::stats::PlayerStats;
use crate::sync::{ClockContext, GapTracker, SourceKind, SourcePolicy, policy_for};
use crate::utils::stop::StopSignal;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SUMMARY_INTERVAL_SECS: u64 = 30;
const PUMP_IDLE_BACKOFF: Duration = Duration::from_millis(2);

/// State shared between the controller tick and the audio-pull task.
struct PumpShared {
    log: AudioLog,
    first_mesh_arrived: AtomicBool,
    /// Bit pattern of the first mesh PTS (f64); -1.0 until recorded.
    first_mesh_pts_bits: AtomicU64,
    /// Leading chunks still to discard after open.
    leading_to_drop: AtomicU32,
}

impl PumpShared {
    fn first_mesh_pts(&self) -> f64 {
        f64::from_bits(self.first_mesh_pts_bits.load(Ordering::Relaxed))
    }
}

/// The audio-pull task body: pulls chunks from the decoder and accumulates
/// them, applying the live-source discard rules.
struct AudioPump {
    decoder: Arc<dyn StreamDecoder>,
    handle: StreamHandle,
    shared: Arc<PumpShared>,
    stats: Arc<PlayerStats>,
    kind: SourceKind,
    timeline_start_sec: f64,
}

impl AudioPump {
    /// Pull and process one audio unit. Returns whether a unit was pulled.
    fn pump_once(&self) -> bool {
        let Some(unit) = self.decoder.pull_audio_unit(self.handle) else {
            return false;
        };

        // Live sources: audio arriving before the first mesh frame is
        // unanchored and must be discarded, as is anything earlier than the
        // first mesh PTS.
        if self.kind.is_live() {
            if !self.shared.first_mesh_arrived.load(Ordering::Relaxed) {
                return true;
            }
            if unit.pts_sec < self.shared.first_mesh_pts() {
                return true;
            }
        }

        // The first few chunks after open carry codec warm-up artifacts.
        let remaining = self.shared.leading_to_drop.load(Ordering::Relaxed);
        if remaining > 0 {
            self.shared
                .leading_to_drop
                .store(remaining - 1, Ordering::Relaxed);
            return true;
        }

        if unit.pts_sec <= self.timeline_start_sec {
            return true;
        }

        match self.shared.log.append(unit.samples, unit.pts_sec) {
            Appended::Stored { .. } => self.stats.record_chunk_stored(),
            Appended::DroppedOverrun => {
                self.stats.record_chunk_dropped();
                log::debug!("audio overrun: sequence reset, chunk dropped");
            }
            Appended::SkippedPastDuration => {}
        }
        true
    }

    fn run(self, stop: StopSignal) {
        log::debug!("audio pump started");
        while !stop.is_stopped() {
            if !self.pump_once() {
                // Nothing available; back off without delaying shutdown.
                if stop.wait_timeout(PUMP_IDLE_BACKOFF) {
                    break;
                }
            }
        }
        log::debug!("audio pump stopped");
    }
}

/// Synchronized, double-buffered playback of a mesh+audio stream.
///
/// The player is driven from one thread (the host's update loop). The
/// decoder and sink are collaborators passed in at construction; exactly one
/// source can be open at a time.
pub struct MeshPlayer {
    config: PlayerConfig,
    stats: Arc<PlayerStats>,
    state: PlayerState,
    decoder: Arc<dyn StreamDecoder>,
    sink: Box<dyn AudioSink>,

    adapter: Option<DecoderAdapter>,
    pool: Option<FramePool>,
    policy: Option<Box<dyn SourcePolicy>>,
    shared: Option<Arc<PumpShared>>,
    pump_stop: Option<StopSignal>,
    pump_thread: Option<JoinHandle<()>>,

    gaps: GapTracker,
    kind: SourceKind,
    /// Audio presentation active for the open source.
    audio_mode: bool,
    /// Latched once the accumulator first reports ready.
    audio_ready: bool,
    /// One-time stale-prefix alignment done.
    audio_aligned: bool,
    start_audio_recorded: bool,
    /// PTS of the first accumulated audio chunk.
    start_audio_sec: f64,
    /// Sequence index the sink clip's origin maps to.
    audio_start_offset: u64,
    first_mesh_pts_recorded: bool,
    clip_span_sec: f64,
    /// Unified audio-driven play cursor, recomputed each audio cycle.
    play_time: f64,

    current_pts: f64,
    current_frame_idx: i64,

    events: VecDeque<PlayerEvent>,
    last_summary: Instant,
}

impl MeshPlayer {
    pub fn new(
        decoder: Arc<dyn StreamDecoder>,
        sink: Box<dyn AudioSink>,
        config: PlayerConfig,
    ) -> Self {
        let gap_threshold = config.sync.gap_threshold_sec;
        Self {
            config,
            stats: Arc::new(PlayerStats::new()),
            state: PlayerState::Closed,
            decoder,
            sink,
            adapter: None,
            pool: None,
            policy: None,
            shared: None,
            pump_stop: None,
            pump_thread: None,
            gaps: GapTracker::new(gap_threshold),
            kind: SourceKind::FilePlayback,
            audio_mode: false,
            audio_ready: false,
            audio_aligned: false,
            start_audio_recorded: false,
            start_audio_sec: 0.0,
            audio_start_offset: 0,
            first_mesh_pts_recorded: false,
            clip_span_sec: 0.0,
            play_time: 0.0,
            current_pts: -1.0,
            current_frame_idx: -1,
            events: VecDeque::new(),
            last_summary: Instant::now(),
        }
    }

    // ------------------------------------------------------------------
    // Transport controls
    // ------------------------------------------------------------------

    /// Bind a source. `rtmp://` URLs select live ingestion; everything else
    /// is finite file playback. Returns whether the open succeeded; on
    /// failure the player stays closed and a `SourceNotFound` event is
    /// queued for the next `update`.
    pub fn open(&mut self, source_url: &str, is_local_asset: bool) -> bool {
        if self.adapter.is_some() {
            self.close();
        }

        self.set_state(PlayerState::Opening);
        self.kind = SourceKind::from_url(source_url);
        let resolved = self.resolve_source(source_url, is_local_asset);
        log::info!("opening {} source {}", self.kind, resolved);

        let adapter = match DecoderAdapter::open(Arc::clone(&self.decoder), &resolved) {
            Ok(adapter) => adapter,
            Err(err) => {
                log::warn!("open failed for {}: {:#}", resolved, err);
                self.set_state(PlayerState::Closed);
                self.events.push_back(PlayerEvent::SourceNotFound);
                return false;
            }
        };

        let info = adapter.info().clone();
        self.audio_mode = self.config.audio_enabled && info.has_audio();

        let policy = policy_for(self.kind, &self.config.sync);
        self.clip_span_sec = policy.clip_span_sec(info.duration_sec, &self.config.audio);
        let clip_capacity = self
            .config
            .audio
            .clip_capacity_samples(info.sample_rate.max(1), self.clip_span_sec);

        if self.audio_mode {
            if let Err(err) = self
                .sink
                .configure(info.channels, info.sample_rate, clip_capacity)
            {
                log::warn!("audio sink unavailable, playing silent: {:#}", err);
                self.audio_mode = false;
            } else {
                self.sink.set_speed(self.config.speed_ratio);
            }
        }

        self.shared = Some(Arc::new(PumpShared {
            log: AudioLog::new(AudioLogConfig {
                kind: self.kind,
                duration_sec: info.duration_sec,
                sample_rate: info.sample_rate.max(1),
                chunk_samples: self.config.audio.chunk_samples,
                sink_capacity_samples: clip_capacity,
            }),
            first_mesh_arrived: AtomicBool::new(false),
            first_mesh_pts_bits: AtomicU64::new((-1.0f64).to_bits()),
            leading_to_drop: AtomicU32::new(self.config.audio.leading_chunks_to_drop),
        }));

        adapter.set_speed(self.config.speed_ratio);
        adapter.seek_to_second(self.config.start_second);

        self.pool = Some(FramePool::new(
            self.config.buffer_slots,
            Arc::clone(&self.stats),
        ));
        self.policy = Some(policy);
        self.adapter = Some(adapter);
        self.gaps = GapTracker::new(self.config.sync.gap_threshold_sec);
        self.audio_ready = false;
        self.audio_aligned = false;
        self.start_audio_recorded = false;
        self.start_audio_sec = 0.0;
        self.audio_start_offset = 0;
        self.first_mesh_pts_recorded = false;
        self.play_time = 0.0;
        self.current_pts = -1.0;
        self.current_frame_idx = -1;

        self.set_state(PlayerState::Ready);
        true
    }

    /// Start the per-cycle pulls. No-op while already playing or with no
    /// source bound.
    pub fn play(&mut self) {
        if self.state.is_playing() {
            return;
        }
        let Some(adapter) = self.adapter.as_ref() else {
            return;
        };

        adapter.play();
        if self.audio_mode && self.config.pump_mode == PumpMode::Threaded {
            self.start_pump();
        }
        self.set_state(PlayerState::Playing);
        log::info!("play");
    }

    /// Stop both pulls. Idempotent.
    pub fn pause(&mut self) {
        if !self.state.is_playing() {
            return;
        }

        self.stop_pump();
        if let Some(adapter) = self.adapter.as_ref() {
            adapter.pause();
        }
        if self.audio_mode {
            self.sink.pause();
        }
        self.set_state(PlayerState::Paused);
        log::info!("pause");
    }

    /// Seek to `at_second` and decode-publish exactly one frame without
    /// entering playback. Audio mode is restored afterwards and the player
    /// is left Paused (or Ready if it never played).
    pub fn preview(&mut self, at_second: f64) {
        if self.adapter.is_none() {
            return;
        }

        let return_state = if self.state.is_playing() {
            self.pause();
            PlayerState::Paused
        } else {
            self.state
        };
        let prev_audio_mode = self.audio_mode;
        self.audio_mode = false;
        self.set_state(PlayerState::Previewing);
        log::debug!("preview at {:.2}s", at_second);

        if let Some(adapter) = self.adapter.as_ref() {
            adapter.seek_to_second(at_second);
        }
        self.current_pts = at_second;

        if self.pull_mesh_tick() {
            self.publish_frame();
        }

        self.audio_mode = prev_audio_mode;
        self.set_state(return_state);
    }

    /// Seek the source. Rejected on live sources; returns whether the
    /// request was applied.
    pub fn goto_second(&mut self, sec: f64) -> bool {
        let Some(adapter) = self.adapter.as_ref() else {
            return false;
        };
        let allowed = self.policy.as_ref().is_some_and(|p| p.allow_seek());
        if !allowed {
            log::info!("seek to {:.2}s ignored: {}", sec, PlayerError::SeekUnsupported);
            return false;
        }

        self.current_pts = sec;
        adapter.seek_to_second(sec);
        true
    }

    pub fn set_speed_ratio(&mut self, ratio: f32) {
        self.config.speed_ratio = ratio;
        if let Some(adapter) = self.adapter.as_ref() {
            adapter.set_speed(ratio);
        }
        if self.audio_mode {
            self.sink.set_speed(ratio);
        }
    }

    /// Unbind the source and release all buffers. Safe to call while pulls
    /// are in flight: both repeating tasks are stopped and joined first.
    pub fn close(&mut self) {
        if self.adapter.is_none() {
            self.state = PlayerState::Closed;
            return;
        }

        // Stop tasks, then free buffers. The order is load-bearing.
        self.pause();
        self.stop_pump();

        self.pool = None;
        self.shared = None;
        if let Some(adapter) = self.adapter.take() {
            adapter.close();
        }
        self.policy = None;

        self.audio_mode = false;
        self.audio_ready = false;
        self.audio_aligned = false;
        self.start_audio_recorded = false;
        self.first_mesh_pts_recorded = false;
        self.current_pts = -1.0;
        self.current_frame_idx = -1;
        self.set_state(PlayerState::Closed);
        log::info!("closed");
    }

    // ------------------------------------------------------------------
    // Per-tick update cycle
    // ------------------------------------------------------------------

    /// Advance one scheduler tick: pull a mesh unit, reconcile the audio
    /// clock, feed the sink, publish the frame once ready. Returns the
    /// events produced this tick. Never blocks.
    pub fn update(&mut self) -> Vec<PlayerEvent> {
        self.maybe_log_summary();

        if self.adapter.is_none() {
            return self.drain_events();
        }

        if !self.state.is_playing() {
            if self.audio_mode && self.sink.is_playing() {
                self.sink.pause();
            }
            return self.drain_events();
        }

        let mesh_updated = self.pull_mesh_tick();

        if !self.presentation_ready() {
            return self.drain_events();
        }

        if self.audio_mode {
            self.update_audio_section();
        }

        if mesh_updated {
            self.publish_frame();
            self.handle_end_of_stream();
        }

        self.drain_events()
    }

    /// Pull one audio unit on behalf of the audio task. Hosts running in
    /// `PumpMode::HostDriven` call this once per tick; in threaded mode the
    /// worker owns it. Returns whether a unit was pulled.
    pub fn pump_audio_now(&self) -> bool {
        if !self.state.is_playing() || !self.audio_mode {
            return false;
        }
        let (Some(adapter), Some(shared)) = (self.adapter.as_ref(), self.shared.as_ref()) else {
            return false;
        };
        let pump = AudioPump {
            decoder: adapter.decoder(),
            handle: adapter.handle(),
            shared: Arc::clone(shared),
            stats: Arc::clone(&self.stats),
            kind: self.kind,
            timeline_start_sec: self.config.timeline_start_sec,
        };
        pump.pump_once()
    }

    // ------------------------------------------------------------------
    // Read-only surface
    // ------------------------------------------------------------------

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn source_kind(&self) -> SourceKind {
        self.kind
    }

    /// Source metadata; populated after a successful open.
    pub fn info(&self) -> Option<&StreamInfo> {
        self.adapter.as_ref().map(|a| a.info())
    }

    pub fn duration_sec(&self) -> f64 {
        self.info().map(|i| i.duration_sec).unwrap_or(0.0)
    }

    pub fn fps(&self) -> f32 {
        self.info().map(|i| i.fps).unwrap_or(0.0)
    }

    pub fn frame_count(&self) -> u32 {
        self.info().map(|i| i.frame_count).unwrap_or(0)
    }

    /// PTS of the most recently decoded frame; -1 before the first decode.
    pub fn current_sec(&self) -> f64 {
        self.current_pts
    }

    pub fn current_frame(&self) -> i64 {
        self.current_frame_idx
    }

    /// The audio-driven play cursor, as of the last audio cycle.
    pub fn play_time_sec(&self) -> f64 {
        self.play_time
    }

    /// The slot the renderer should read, valid until the rotation returns
    /// to its index.
    pub fn published_frame(&self) -> Option<&FrameSlot> {
        self.pool.as_ref().and_then(|pool| pool.published())
    }

    pub fn published_index(&self) -> Option<usize> {
        self.pool.as_ref().and_then(|pool| pool.published_index())
    }

    pub fn is_audio_ready(&self) -> bool {
        self.audio_ready
    }

    pub fn buffered_audio_chunks(&self) -> usize {
        self.shared.as_ref().map(|s| s.log.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> &PlayerStats {
        &self.stats
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn resolve_source(&self, url: &str, is_local_asset: bool) -> String {
        if is_local_asset && !url.starts_with("http") && !url.starts_with("rtmp") {
            if let Some(root) = &self.config.local_asset_root {
                return root.join(url).to_string_lossy().into_owned();
            }
        }
        url.to_string()
    }

    fn set_state(&mut self, next: PlayerState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(&next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    fn start_pump(&mut self) {
        let (Some(adapter), Some(shared)) = (self.adapter.as_ref(), self.shared.as_ref()) else {
            return;
        };

        let pump = AudioPump {
            decoder: adapter.decoder(),
            handle: adapter.handle(),
            shared: Arc::clone(shared),
            stats: Arc::clone(&self.stats),
            kind: self.kind,
            timeline_start_sec: self.config.timeline_start_sec,
        };
        let stop = StopSignal::new();
        let thread_stop = stop.clone();
        match thread::Builder::new()
            .name("meshcast-audio-pump".into())
            .spawn(move || pump.run(thread_stop))
        {
            Ok(handle) => {
                self.pump_stop = Some(stop);
                self.pump_thread = Some(handle);
            }
            Err(err) => log::warn!("failed to spawn audio pump: {}", err),
        }
    }

    fn stop_pump(&mut self) {
        if let Some(stop) = self.pump_stop.take() {
            stop.stop();
        }
        if let Some(handle) = self.pump_thread.take() {
            if handle.join().is_err() {
                log::warn!("audio pump terminated abnormally");
            }
        }
    }

    /// The per-tick mesh pull. Returns whether a new frame landed in the
    /// write slot.
    fn pull_mesh_tick(&mut self) -> bool {
        let fps = self.fps();
        let play_time = if self.audio_mode {
            Some(self.play_time)
        } else {
            None
        };

        let pull = {
            let Some(adapter) = self.adapter.as_ref() else {
                return false;
            };
            let Some(pool) = self.pool.as_mut() else {
                return false;
            };
            adapter.pull_mesh_unit(pool, play_time)
        };

        let Some(pull) = pull else {
            // No unit this tick; retried next cycle.
            self.stats.record_decode_miss();
            return false;
        };

        if self.audio_mode {
            if let Some(gap) = pull.audio_gap_sec {
                self.gaps.observe(gap);
            }
        }

        if let Some(shared) = self.shared.as_ref() {
            shared.first_mesh_arrived.store(true, Ordering::Relaxed);
            if !self.first_mesh_pts_recorded && pull.pts_sec > 0.0 {
                shared
                    .first_mesh_pts_bits
                    .store(pull.pts_sec.to_bits(), Ordering::Relaxed);
                self.first_mesh_pts_recorded = true;
            }
        }

        self.current_pts = pull.pts_sec;
        if fps > 0.0 {
            self.current_frame_idx = (pull.pts_sec * fps as f64).round() as i64;
        }
        true
    }

    /// Gate the presentation cycle on the first mesh frame and, in audio
    /// mode, on the accumulator reporting ready. Readiness latches.
    fn presentation_ready(&mut self) -> bool {
        let Some(shared) = self.shared.as_ref() else {
            return false;
        };
        let first_mesh = shared.first_mesh_arrived.load(Ordering::Relaxed);

        if !self.audio_mode {
            return first_mesh;
        }

        if !self.audio_ready {
            let chunks = shared.log.len();
            let duration = self.duration_sec();
            if let Some(policy) = self.policy.as_ref() {
                if policy.is_ready_to_play(chunks, duration, &self.config.audio) {
                    self.audio_ready = true;
                    log::debug!("audio ready with {} buffered chunks", chunks);
                }
            }
        }

        first_mesh && self.audio_ready
    }

    /// The audio half of the cycle: record stream origin, align stale
    /// audio, keep the sink running, reconcile the clock, feed the clip and
    /// drain consumed chunks.
    fn update_audio_section(&mut self) {
        let Some(shared) = self.shared.clone() else {
            return;
        };
        let Some(mut policy) = self.policy.take() else {
            return;
        };

        // The first accumulated chunk anchors the audio timeline; live
        // streams do not start at PTS zero.
        if !self.start_audio_recorded {
            if let Some(first_pts) = shared.log.first_pts_sec() {
                self.start_audio_sec = first_pts;
                self.start_audio_recorded = true;
                log::debug!("audio stream starts at {:.3}s", first_pts);
            }
        }

        // One-time alignment: audio buffered long before the current mesh
        // frame is stale and would push the sink origin back; evict it.
        if !self.audio_aligned && self.current_pts >= 0.0 {
            if let Some(first_pts) = shared.log.first_pts_sec() {
                if first_pts < self.current_pts {
                    let floor = self.current_pts - self.config.sync.max_mesh_audio_gap_sec;
                    let evicted = shared.log.evict_older_than(floor);
                    if evicted > 0 {
                        self.stats.record_chunks_evicted(evicted as u64);
                        log::debug!("evicted {} stale audio chunks", evicted);
                    }
                    if let Some(offset) = shared.log.first_offset() {
                        self.audio_start_offset = offset;
                    }
                    if let Some(pts) = shared.log.first_pts_sec() {
                        self.start_audio_sec = pts;
                    }
                }
                self.audio_aligned = true;
            }
        }

        if !self.sink.is_playing() {
            self.sink.play();
        }

        // Coarse resync when the gap keeps widening (live sources only).
        if let Some(jump) = policy.handle_gap(&mut self.gaps, &mut *self.sink, &self.config.sync) {
            self.stats.record_resync_jump();
            log::info!("forced audio clock resync by {:.2}s", jump);
        }

        let ctx = ClockContext {
            start_audio_sec: self.start_audio_sec,
            timeline_start_sec: self.config.timeline_start_sec,
            clip_span_sec: self.clip_span_sec,
        };
        self.play_time = policy.compute_play_time(&mut *self.sink, &ctx);

        // Write accumulated chunks into the sink clip at their sequence
        // offsets, then drop them once the sink is consuming.
        let origin = self.audio_start_offset;
        let capacity = self.sink.capacity_samples() as u64;
        if capacity > 0 {
            let sink = &mut self.sink;
            shared.log.for_each_chunk(|samples, offset, _pts| {
                let rel = offset.saturating_sub(origin) % capacity;
                sink.write_at(samples, rel as usize);
            });
        }
        if self.sink.is_playing() {
            shared.log.drain_consumed();
        }

        self.policy = Some(policy);
    }

    fn publish_frame(&mut self) {
        if let Some(pool) = self.pool.as_mut() {
            pool.publish();
            self.stats.record_frame_published();
            self.events.push_back(PlayerEvent::NewFrameReady);
        }
    }

    /// Finite sources only: loop from zero or report the end.
    fn handle_end_of_stream(&mut self) {
        if self.kind.is_live() {
            return;
        }
        let (duration, fps) = match self.adapter.as_ref() {
            Some(adapter) => (adapter.info().duration_sec, adapter.info().fps),
            None => return,
        };
        if duration <= 0.0 {
            return;
        }

        let frame_period = if fps > 0.0 { 1.0 / fps as f64 } else { 0.0 };
        if self.current_pts < 0.0 || self.current_pts + frame_period < duration {
            return;
        }

        if self.config.looping {
            log::debug!("end of clip, looping from zero");
            if let Some(adapter) = self.adapter.as_ref() {
                adapter.seek_to_second(0.0);
            }
            self.current_pts = -1.0;
            self.current_frame_idx = -1;
            if self.audio_mode {
                self.sink.set_position_sec(0.0);
            }
        } else {
            self.events.push_back(PlayerEvent::PlaybackEnded);
            self.pause();
        }
    }

    fn drain_events(&mut self) -> Vec<PlayerEvent> {
        self.events.drain(..).collect()
    }

    fn maybe_log_summary(&mut self) {
        if self.last_summary.elapsed().as_secs() >= SUMMARY_INTERVAL_SECS {
            self.stats.log_summary();
            self.last_summary = Instant::now();
        }
    }
}

impl Drop for MeshPlayer {
    fn drop(&mut self) {
        // Same ordering as close(): tasks down before buffers go.
        self.stop_pump();
    }
}
