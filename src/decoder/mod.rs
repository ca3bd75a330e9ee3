//! Decoder adapter
//!
//! The low-level decoder is an opaque collaborator: given a stream handle it
//! produces raw mesh geometry, texture colors and audio samples one unit at
//! a time. Its capability surface is the `StreamDecoder` trait; everything
//! behind it (container parsing, codecs, transport) is out of scope here.
//!
//! `DecoderAdapter` is the thin layer the player actually drives: it sizes a
//! frame-pool slot to the incoming unit and has the decoder fill it, and it
//! forwards audio units to the accumulator path. All pulls are non-blocking
//! best-effort: `None` means "no unit available right now", never an error.

use crate::buffer::{FramePool, MeshFrame, PixelFormat, TextureFrame};
use anyhow::Result;
use std::sync::Arc;

/// Opaque identifier bound 1:1 to an open source. Issued by
/// `StreamDecoder::open_stream`, owned by the playback controller, exactly
/// one active per player instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(u64);

impl StreamHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Source metadata, fetched once after a successful open.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub duration_sec: f64,
    pub fps: f32,
    pub frame_count: u32,
    pub texture_width: u32,
    pub texture_height: u32,
    pub texture_format: PixelFormat,
    pub channels: u16,
    pub sample_rate: u32,
}

impl StreamInfo {
    pub fn has_audio(&self) -> bool {
        self.channels > 0 && self.sample_rate > 0
    }
}

/// Header of a mesh unit the decoder has ready, reported before the
/// geometry is copied out.
#[derive(Debug, Clone, Copy)]
pub struct MeshUnitDesc {
    pub pts_sec: f64,
    pub triangle_count: usize,
    /// Lag of the audio play cursor behind this unit's PTS, reported when
    /// the pull ran against an audio clock.
    pub audio_gap_sec: Option<f64>,
}

/// One decoded audio chunk.
#[derive(Debug, Clone)]
pub struct AudioUnit {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub pts_sec: f64,
}

/// Capability interface of the opaque decoder.
///
/// Mesh units follow a begin/read/end protocol so the caller can size its
/// buffers from the header before the copy. Implementations synchronize
/// internally; methods take `&self` and may be called from the update tick
/// and the audio pump concurrently.
pub trait StreamDecoder: Send + Sync {
    fn open_stream(&self, url: &str) -> Result<StreamHandle>;

    fn stream_info(&self, handle: StreamHandle) -> Result<StreamInfo>;

    /// Begin a mesh unit pull. `play_time_sec` carries the audio-driven play
    /// cursor when audio leads presentation, letting the decoder pace frame
    /// delivery against it.
    fn begin_mesh_unit(&self, handle: StreamHandle, play_time_sec: Option<f64>)
    -> Option<MeshUnitDesc>;

    /// Copy the begun unit's geometry and colors into the given buffers.
    /// Only called between `begin_mesh_unit` and `end_mesh_unit`, with
    /// buffers sized from the unit's header.
    fn read_mesh_unit(
        &self,
        handle: StreamHandle,
        mesh: &mut MeshFrame,
        texture: &mut TextureFrame,
    ) -> Result<()>;

    fn end_mesh_unit(&self, handle: StreamHandle);

    fn pull_audio_unit(&self, handle: StreamHandle) -> Option<AudioUnit>;

    fn set_speed(&self, handle: StreamHandle, ratio: f32);

    fn play(&self, handle: StreamHandle);

    fn pause(&self, handle: StreamHandle);

    fn seek_to_second(&self, handle: StreamHandle, sec: f64);

    fn close_stream(&self, handle: StreamHandle);
}

/// Result of a successful mesh pull.
#[derive(Debug, Clone, Copy)]
pub struct MeshPull {
    pub pts_sec: f64,
    pub audio_gap_sec: Option<f64>,
}

/// Thin driver between the opaque decoder and the player's buffers.
pub struct DecoderAdapter {
    decoder: Arc<dyn StreamDecoder>,
    handle: StreamHandle,
    info: StreamInfo,
}

impl DecoderAdapter {
    /// Open the source and fetch its metadata.
    pub fn open(decoder: Arc<dyn StreamDecoder>, url: &str) -> Result<Self> {
        let handle = decoder.open_stream(url)?;
        let info = decoder.stream_info(handle)?;
        log::info!(
            "stream open: {:.2}s, {} frames @ {} fps, texture {}x{}, audio {}ch @ {} Hz",
            info.duration_sec,
            info.frame_count,
            info.fps,
            info.texture_width,
            info.texture_height,
            info.channels,
            info.sample_rate,
        );
        Ok(Self {
            decoder,
            handle,
            info,
        })
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle
    }

    pub fn decoder(&self) -> Arc<dyn StreamDecoder> {
        Arc::clone(&self.decoder)
    }

    /// Pull one mesh unit into the pool's write slot.
    ///
    /// Sizes the slot from the unit header, then lets the decoder fill it.
    /// Returns `None` when no unit is available this tick, or when the copy
    /// fails (logged, non-fatal: the cycle is simply skipped).
    pub fn pull_mesh_unit(
        &self,
        pool: &mut FramePool,
        play_time_sec: Option<f64>,
    ) -> Option<MeshPull> {
        let desc = self.decoder.begin_mesh_unit(self.handle, play_time_sec)?;

        {
            let mesh = pool.acquire_mesh_slot(desc.triangle_count);
            mesh.set_pts_sec(desc.pts_sec);
        }
        pool.acquire_texture_slot(
            self.info.texture_width,
            self.info.texture_height,
            self.info.texture_format,
        );

        let slot = pool.write_slot_mut();
        let read = self
            .decoder
            .read_mesh_unit(self.handle, &mut slot.mesh, &mut slot.texture);
        self.decoder.end_mesh_unit(self.handle);

        if let Err(err) = read {
            log::warn!("mesh unit read failed: {err:#}");
            return None;
        }

        Some(MeshPull {
            pts_sec: desc.pts_sec,
            audio_gap_sec: desc.audio_gap_sec,
        })
    }

    pub fn pull_audio_unit(&self) -> Option<AudioUnit> {
        self.decoder.pull_audio_unit(self.handle)
    }

    pub fn set_speed(&self, ratio: f32) {
        self.decoder.set_speed(self.handle, ratio);
    }

    pub fn play(&self) {
        self.decoder.play(self.handle);
    }

    pub fn pause(&self) {
        self.decoder.pause(self.handle);
    }

    pub fn seek_to_second(&self, sec: f64) {
        self.decoder.seek_to_second(self.handle, sec);
    }

    /// Close the stream and release the handle.
    pub fn close(self) {
        self.decoder.close_stream(self.handle);
    }
}
