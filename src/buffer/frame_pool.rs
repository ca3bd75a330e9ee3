//! Rotating mesh/texture frame slots
//!
//! The pool owns a small fixed rotation of geometry and color buffers so the
//! renderer can keep reading one slot while the decoder fills the next. Mesh
//! capacity only ever grows (with ~10% slack, so a briefly larger frame does
//! not force a reallocation per frame); texture storage is reallocated only
//! when the stream's dimensions or pixel format change.
//!
//! # Contract
//!
//! Single writer (the decode tick), single reader (the render tick),
//! synchronized by rotation distance: the writer fills the slot at
//! `write_index`, publishes it, and moves on; a published slot stays valid
//! for the reader until the rotation comes back around to that index. No
//! locks are involved, which is why the pool must not be shared across
//! threads; both ticks run on the host's update loop.

use crate::stats::PlayerStats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgba8,
    Argb8,
    Rgb8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Argb8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

/// One decoded mesh frame in non-indexed layout: one vertex per triangle
/// corner, so vertex count == index count == triangles * 3.
pub struct MeshFrame {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uv: Vec<[f32; 2]>,
    indices: Vec<u32>,
    /// Allocated extent of all four arrays, in corners.
    capacity: usize,
    /// Live extent of the current frame, in corners.
    vertex_count: usize,
    pts_sec: f64,
}

impl MeshFrame {
    fn new() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            uv: Vec::new(),
            indices: Vec::new(),
            capacity: 0,
            vertex_count: 0,
            pts_sec: -1.0,
        }
    }

    /// Grow storage to hold `triangle_count` triangles if needed.
    /// Returns whether a reallocation happened.
    fn ensure_capacity(&mut self, triangle_count: usize) -> bool {
        let needed = triangle_count * 3;
        if self.capacity >= needed {
            return false;
        }

        // ~10% slack, rounded up to a whole triangle
        let padded = needed + needed / 10;
        let capacity = (padded / 3 + 1) * 3;

        self.positions.resize(capacity, [0.0; 3]);
        self.normals.resize(capacity, [0.0; 3]);
        self.uv.resize(capacity, [0.0; 2]);
        self.indices.resize(capacity, 0);
        self.capacity = capacity;
        true
    }

    fn begin_frame(&mut self, triangle_count: usize) {
        self.vertex_count = triangle_count * 3;
        self.pts_sec = -1.0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn triangle_count(&self) -> usize {
        self.vertex_count / 3
    }

    pub fn pts_sec(&self) -> f64 {
        self.pts_sec
    }

    pub fn set_pts_sec(&mut self, pts_sec: f64) {
        self.pts_sec = pts_sec;
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions[..self.vertex_count]
    }

    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals[..self.vertex_count]
    }

    pub fn uv(&self) -> &[[f32; 2]] {
        &self.uv[..self.vertex_count]
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices[..self.vertex_count]
    }

    pub fn positions_mut(&mut self) -> &mut [[f32; 3]] {
        let n = self.vertex_count;
        &mut self.positions[..n]
    }

    pub fn normals_mut(&mut self) -> &mut [[f32; 3]] {
        let n = self.vertex_count;
        &mut self.normals[..n]
    }

    pub fn uv_mut(&mut self) -> &mut [[f32; 2]] {
        let n = self.vertex_count;
        &mut self.uv[..n]
    }

    pub fn indices_mut(&mut self) -> &mut [u32] {
        let n = self.vertex_count;
        &mut self.indices[..n]
    }
}

/// One decoded texture frame. Storage is keyed on dimensions and format.
pub struct TextureFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl TextureFrame {
    fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            format: PixelFormat::Rgba8,
            data: Vec::new(),
        }
    }

    /// Reallocate only when dimensions or format change.
    /// Returns whether a reallocation happened.
    fn ensure_dimensions(&mut self, width: u32, height: u32, format: PixelFormat) -> bool {
        if self.width == width && self.height == height && self.format == format {
            return false;
        }

        let bytes = width as usize * height as usize * format.bytes_per_pixel();
        self.data = vec![0u8; bytes];
        self.width = width;
        self.height = height;
        self.format = format;
        true
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// A mesh/texture pair sharing one rotation index.
pub struct FrameSlot {
    pub mesh: MeshFrame,
    pub texture: TextureFrame,
}

impl FrameSlot {
    fn new() -> Self {
        Self {
            mesh: MeshFrame::new(),
            texture: TextureFrame::new(),
        }
    }
}

/// Fixed rotation of frame slots with explicit write/published indices.
pub struct FramePool {
    slots: Vec<FrameSlot>,
    write_idx: usize,
    published_idx: Option<usize>,
    stats: Arc<PlayerStats>,
}

impl FramePool {
    pub fn new(slot_count: usize, stats: Arc<PlayerStats>) -> Self {
        let slot_count = slot_count.max(2);
        let mut slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            slots.push(FrameSlot::new());
        }
        Self {
            slots,
            write_idx: 0,
            published_idx: None,
            stats,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn write_index(&self) -> usize {
        self.write_idx
    }

    pub fn published_index(&self) -> Option<usize> {
        self.published_idx
    }

    /// Prepare the write slot's mesh buffer for `triangle_count` triangles.
    /// Capacity never shrinks; growth is counted and logged as a latency
    /// signal.
    pub fn acquire_mesh_slot(&mut self, triangle_count: usize) -> &mut MeshFrame {
        let mesh = &mut self.slots[self.write_idx].mesh;
        if mesh.ensure_capacity(triangle_count) {
            self.stats.record_buffer_growth();
            log::debug!(
                "mesh buffer {} grown to {} corners ({} triangles)",
                self.write_idx,
                mesh.capacity(),
                triangle_count
            );
        }
        mesh.begin_frame(triangle_count);
        mesh
    }

    /// Prepare the write slot's texture buffer.
    pub fn acquire_texture_slot(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> &mut TextureFrame {
        let texture = &mut self.slots[self.write_idx].texture;
        if texture.ensure_dimensions(width, height, format) {
            log::debug!("texture buffer {} sized {}x{}", self.write_idx, width, height);
        }
        texture
    }

    /// The slot currently being written, both halves at once.
    pub fn write_slot_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[self.write_idx]
    }

    /// Publish the write slot and advance the rotation.
    /// Returns the index that became readable.
    pub fn publish(&mut self) -> usize {
        let published = self.write_idx;
        self.published_idx = Some(published);
        self.write_idx = (self.write_idx + 1) % self.slots.len();
        published
    }

    /// The most recently published slot, if any frame was published yet.
    pub fn published(&self) -> Option<&FrameSlot> {
        self.published_idx.map(|idx| &self.slots[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(slots: usize) -> FramePool {
        FramePool::new(slots, Arc::new(PlayerStats::new()))
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let mut pool = pool(2);
        let mut running_max = 0usize;

        // Growth must only happen on the step exceeding prior capacity.
        for (step, tris) in [10usize, 5, 50, 3].into_iter().enumerate() {
            let before = pool.write_slot_mut().mesh.capacity();
            let mesh = pool.acquire_mesh_slot(tris);
            let after = mesh.capacity();

            assert!(after >= tris * 3);
            running_max = running_max.max(after);
            assert!(after >= before, "capacity shrank at step {}", step);
            if step > 0 && tris * 3 <= before {
                assert_eq!(after, before, "unexpected growth at step {}", step);
            }
            assert_eq!(mesh.vertex_count(), tris * 3);
            // Stay on one slot so the capacity history is observable.
        }

        assert_eq!(pool.write_slot_mut().mesh.capacity(), running_max);
        assert_eq!(pool.stats.buffer_growths(), 2); // steps 10 and 50
    }

    #[test]
    fn test_growth_has_slack() {
        let mut pool = pool(2);
        let cap = pool.acquire_mesh_slot(100).capacity();
        assert!(cap >= 300);
        assert!(cap % 3 == 0);
        // A slightly larger frame fits in the slack without reallocating.
        let before = cap;
        let after = pool.acquire_mesh_slot(105).capacity();
        assert_eq!(before, after);
    }

    #[test]
    fn test_rotation_contract() {
        let mut pool = pool(2);

        assert_eq!(pool.write_index(), 0);
        assert!(pool.published().is_none());

        pool.acquire_mesh_slot(4).set_pts_sec(0.1);
        let idx = pool.publish();
        assert_eq!(idx, 0);
        assert_eq!(pool.write_index(), 1);
        assert_eq!(pool.published_index(), Some(0));
        assert_eq!(pool.published().unwrap().mesh.pts_sec(), 0.1);

        pool.acquire_mesh_slot(4).set_pts_sec(0.2);
        let idx = pool.publish();
        assert_eq!(idx, 1);
        // Rotation wraps back to slot 0 for the next write.
        assert_eq!(pool.write_index(), 0);
        assert_eq!(pool.published().unwrap().mesh.pts_sec(), 0.2);
    }

    #[test]
    fn test_texture_realloc_only_on_change() {
        let mut pool = pool(2);

        let tex = pool.acquire_texture_slot(64, 64, PixelFormat::Rgba8);
        assert_eq!(tex.data().len(), 64 * 64 * 4);
        let ptr = tex.data().as_ptr();

        // Same dimensions: storage untouched.
        let tex = pool.acquire_texture_slot(64, 64, PixelFormat::Rgba8);
        assert_eq!(tex.data().as_ptr(), ptr);

        // Dimension change: reallocated.
        let tex = pool.acquire_texture_slot(128, 64, PixelFormat::Rgba8);
        assert_eq!(tex.data().len(), 128 * 64 * 4);
    }

    #[test]
    fn test_acquire_replaces_frame_extent() {
        let mut pool = pool(2);

        let mesh = pool.acquire_mesh_slot(50);
        mesh.positions_mut()[0] = [1.0, 2.0, 3.0];
        mesh.set_pts_sec(1.5);

        // A smaller frame in the same slot exposes only its own extent.
        let mesh = pool.acquire_mesh_slot(3);
        assert_eq!(mesh.vertex_count(), 9);
        assert_eq!(mesh.pts_sec(), -1.0);
        assert_eq!(mesh.positions().len(), 9);
    }
}
