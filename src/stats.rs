//! Playback counters
//!
//! Lightweight profiling for the playback core: buffer growth and clock
//! resyncs are invisible to the host but matter for latency analysis, so
//! they are counted here and logged in a periodic summary.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct PlayerStats {
    pub frames_published: AtomicU64,
    pub decode_misses: AtomicU64,
    pub chunks_stored: AtomicU64,
    pub chunks_dropped: AtomicU64,
    pub chunks_evicted: AtomicU64,
    pub buffer_growths: AtomicU64,
    pub resync_jumps: AtomicU64,
}

impl PlayerStats {
    pub fn new() -> Self {
        Self {
            frames_published: AtomicU64::new(0),
            decode_misses: AtomicU64::new(0),
            chunks_stored: AtomicU64::new(0),
            chunks_dropped: AtomicU64::new(0),
            chunks_evicted: AtomicU64::new(0),
            buffer_growths: AtomicU64::new(0),
            resync_jumps: AtomicU64::new(0),
        }
    }

    pub fn record_frame_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    /// A pull returned no unit this tick. Not an error, retried next tick.
    pub fn record_decode_miss(&self) {
        self.decode_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_stored(&self) {
        self.chunks_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_dropped(&self) {
        self.chunks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunks_evicted(&self, count: u64) {
        self.chunks_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_buffer_growth(&self) {
        self.buffer_growths.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync_jump(&self) {
        self.resync_jumps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published.load(Ordering::Relaxed)
    }

    pub fn decode_misses(&self) -> u64 {
        self.decode_misses.load(Ordering::Relaxed)
    }

    pub fn chunks_stored(&self) -> u64 {
        self.chunks_stored.load(Ordering::Relaxed)
    }

    pub fn chunks_dropped(&self) -> u64 {
        self.chunks_dropped.load(Ordering::Relaxed)
    }

    pub fn chunks_evicted(&self) -> u64 {
        self.chunks_evicted.load(Ordering::Relaxed)
    }

    pub fn buffer_growths(&self) -> u64 {
        self.buffer_growths.load(Ordering::Relaxed)
    }

    pub fn resync_jumps(&self) -> u64 {
        self.resync_jumps.load(Ordering::Relaxed)
    }

    pub fn log_summary(&self) {
        log::info!(
            "Playback: published={} misses={} | audio stored={} dropped={} evicted={} | growths={} resyncs={}",
            self.frames_published(),
            self.decode_misses(),
            self.chunks_stored(),
            self.chunks_dropped(),
            self.chunks_evicted(),
            self.buffer_growths(),
            self.resync_jumps(),
        );
    }
}

impl Default for PlayerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = PlayerStats::new();

        stats.record_frame_published();
        stats.record_frame_published();
        stats.record_decode_miss();
        stats.record_chunk_stored();
        stats.record_chunk_dropped();
        stats.record_chunks_evicted(4);
        stats.record_buffer_growth();
        stats.record_resync_jump();

        assert_eq!(stats.frames_published(), 2);
        assert_eq!(stats.decode_misses(), 1);
        assert_eq!(stats.chunks_stored(), 1);
        assert_eq!(stats.chunks_dropped(), 1);
        assert_eq!(stats.chunks_evicted(), 4);
        assert_eq!(stats.buffer_growths(), 1);
        assert_eq!(stats.resync_jumps(), 1);
    }
}
