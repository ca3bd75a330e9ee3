//! Presentation-side buffering
//!
//! Two storage disciplines live here, and they are deliberately different:
//! the frame pool is a lock-free slot rotation owned by the update tick
//! (single writer, single reader, synchronized by rotation distance), while
//! the audio log is cross-thread shared state guarded by a single mutex over
//! its three parallel columns.

mod audio_log;
mod frame_pool;

pub use audio_log::{Appended, AudioLog, AudioLogConfig};
pub use frame_pool::{FramePool, FrameSlot, MeshFrame, PixelFormat, TextureFrame};
