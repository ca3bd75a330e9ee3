//! Ordered audio chunk log
//!
//! The accumulator keeps three parallel columns per chunk: the sample data,
//! the sequence index (running chunk count times chunk size, in sample
//! frames) and the presentation timestamp in seconds. All three live in one
//! struct behind one mutex; every mutation covers all three in a single
//! critical section, so no reader can ever observe mismatched lengths.
//!
//! Chunks are only ever removed in bulk: a stale prefix during resync, or
//! the whole log once the sink has consumed it. Nothing is removed from the
//! middle.

use crate::sync::SourceKind;
use std::sync::Mutex;

/// Accumulation policy fixed at open time.
#[derive(Debug, Clone)]
pub struct AudioLogConfig {
    pub kind: SourceKind,
    pub duration_sec: f64,
    pub sample_rate: u32,
    pub chunk_samples: usize,
    /// Total capacity of the sink clip, in sample frames.
    pub sink_capacity_samples: usize,
}

/// Outcome of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    Stored { offset_samples: u64 },
    /// Finite source: the clip is fully buffered; looped playback does not
    /// re-buffer already-played audio.
    SkippedPastDuration,
    /// Live source: the running sample count reached sink capacity. The
    /// sequence counter restarts at zero and this chunk is lost. Deliberate
    /// lossy behavior under sustained overrun.
    DroppedOverrun,
}

struct Columns {
    chunks: Vec<Vec<f32>>,
    offsets: Vec<u64>,
    pts: Vec<f64>,
    /// Running chunk counter; the source of sequence indices. Keeps counting
    /// across drains, resets only on live overrun.
    chunk_counter: u64,
}

impl Columns {
    fn assert_aligned(&self) {
        debug_assert_eq!(self.chunks.len(), self.offsets.len());
        debug_assert_eq!(self.chunks.len(), self.pts.len());
    }

    fn evict_prefix(&mut self, count: usize) {
        let count = count.min(self.chunks.len());
        self.chunks.drain(..count);
        self.offsets.drain(..count);
        self.pts.drain(..count);
        self.assert_aligned();
    }
}

pub struct AudioLog {
    cfg: AudioLogConfig,
    columns: Mutex<Columns>,
}

impl AudioLog {
    pub fn new(cfg: AudioLogConfig) -> Self {
        Self {
            cfg,
            columns: Mutex::new(Columns {
                chunks: Vec::new(),
                offsets: Vec::new(),
                pts: Vec::new(),
                chunk_counter: 0,
            }),
        }
    }

    pub fn config(&self) -> &AudioLogConfig {
        &self.cfg
    }

    /// Append one chunk, applying the source-kind discard policy.
    pub fn append(&self, samples: Vec<f32>, pts_sec: f64) -> Appended {
        let mut columns = self.columns.lock().unwrap();

        let buffered_samples = columns.chunk_counter * self.cfg.chunk_samples as u64;
        match self.cfg.kind {
            SourceKind::FilePlayback => {
                let buffered_sec = buffered_samples as f64 / self.cfg.sample_rate as f64;
                if buffered_sec > self.cfg.duration_sec {
                    return Appended::SkippedPastDuration;
                }
            }
            SourceKind::LiveIngest => {
                if buffered_samples >= self.cfg.sink_capacity_samples as u64 {
                    columns.chunk_counter = 0;
                    return Appended::DroppedOverrun;
                }
            }
        }

        let offset_samples = columns.chunk_counter * self.cfg.chunk_samples as u64;
        columns.chunks.push(samples);
        columns.offsets.push(offset_samples);
        columns.pts.push(pts_sec);
        columns.chunk_counter += 1;
        columns.assert_aligned();

        Appended::Stored { offset_samples }
    }

    /// Drop the first `count` entries from all three columns atomically.
    pub fn evict_prefix(&self, count: usize) {
        let mut columns = self.columns.lock().unwrap();
        columns.evict_prefix(count);
    }

    /// Evict the prefix whose PTS is at or below `pts_floor_sec`.
    /// Returns the number of chunks evicted.
    pub fn evict_older_than(&self, pts_floor_sec: f64) -> usize {
        let mut columns = self.columns.lock().unwrap();
        let keep_from = columns
            .pts
            .iter()
            .position(|&pts| pts > pts_floor_sec)
            .unwrap_or(columns.pts.len());
        columns.evict_prefix(keep_from);
        keep_from
    }

    /// Clear all three columns once the sink has consumed them.
    pub fn drain_consumed(&self) {
        let mut columns = self.columns.lock().unwrap();
        columns.chunks.clear();
        columns.offsets.clear();
        columns.pts.clear();
        columns.assert_aligned();
    }

    pub fn len(&self) -> usize {
        self.columns.lock().unwrap().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first_pts_sec(&self) -> Option<f64> {
        self.columns.lock().unwrap().pts.first().copied()
    }

    pub fn first_offset(&self) -> Option<u64> {
        self.columns.lock().unwrap().offsets.first().copied()
    }

    /// Visit every buffered chunk under one lock, in append order.
    pub fn for_each_chunk<F>(&self, mut visit: F)
    where
        F: FnMut(&[f32], u64, f64),
    {
        let columns = self.columns.lock().unwrap();
        columns.assert_aligned();
        for i in 0..columns.chunks.len() {
            visit(&columns.chunks[i], columns.offsets[i], columns.pts[i]);
        }
    }

    /// Lengths of the three columns, read in one critical section.
    pub fn column_lengths(&self) -> (usize, usize, usize) {
        let columns = self.columns.lock().unwrap();
        (columns.chunks.len(), columns.offsets.len(), columns.pts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn file_log(duration_sec: f64) -> AudioLog {
        AudioLog::new(AudioLogConfig {
            kind: SourceKind::FilePlayback,
            duration_sec,
            sample_rate: 44100,
            chunk_samples: 1024,
            sink_capacity_samples: 44100 * 10,
        })
    }

    fn live_log(sink_capacity_samples: usize) -> AudioLog {
        AudioLog::new(AudioLogConfig {
            kind: SourceKind::LiveIngest,
            duration_sec: 0.0,
            sample_rate: 44100,
            chunk_samples: 1024,
            sink_capacity_samples,
        })
    }

    fn chunk(value: f32) -> Vec<f32> {
        vec![value; 1024]
    }

    #[test]
    fn test_columns_grow_together() {
        let log = file_log(60.0);

        for i in 0..10 {
            log.append(chunk(i as f32), i as f64 * 0.023);
            let (a, b, c) = log.column_lengths();
            assert_eq!(a, b);
            assert_eq!(b, c);
            assert_eq!(a, i + 1);
        }
    }

    #[test]
    fn test_sequence_offsets() {
        let log = file_log(60.0);

        assert_eq!(
            log.append(chunk(0.0), 0.0),
            Appended::Stored { offset_samples: 0 }
        );
        assert_eq!(
            log.append(chunk(1.0), 0.023),
            Appended::Stored {
                offset_samples: 1024
            }
        );
        assert_eq!(
            log.append(chunk(2.0), 0.046),
            Appended::Stored {
                offset_samples: 2048
            }
        );
    }

    #[test]
    fn test_evict_prefix_preserves_order() {
        let log = file_log(60.0);
        for i in 0..8 {
            log.append(chunk(i as f32), i as f64 * 0.1);
        }

        let before = log.len();
        log.evict_prefix(3);
        assert_eq!(log.len(), before - 3);

        // First remaining entry's PTS is at least the evicted entries' PTS.
        assert_eq!(log.first_pts_sec(), Some(0.3));
        assert_eq!(log.first_offset(), Some(3 * 1024));
    }

    #[test]
    fn test_evict_older_than() {
        let log = file_log(60.0);
        for i in 0..8 {
            log.append(chunk(i as f32), i as f64 * 0.1);
        }

        let evicted = log.evict_older_than(0.25);
        assert_eq!(evicted, 3); // pts 0.0, 0.1, 0.2
        assert_eq!(log.len(), 5);
        assert!(log.first_pts_sec().unwrap() > 0.25);
    }

    #[test]
    fn test_file_stops_past_duration() {
        // 0.04s clip: two chunks cover ~0.046s, so the third is refused.
        let log = file_log(0.04);

        assert!(matches!(log.append(chunk(0.0), 0.0), Appended::Stored { .. }));
        assert!(matches!(log.append(chunk(1.0), 0.02), Appended::Stored { .. }));
        assert!(matches!(
            log.append(chunk(2.0), 0.04),
            Appended::SkippedPastDuration
        ));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_live_overrun_resets_counter_and_drops() {
        // Capacity of exactly 4 chunks.
        let log = live_log(4 * 1024);

        for i in 0..4 {
            assert!(matches!(
                log.append(chunk(i as f32), i as f64),
                Appended::Stored { .. }
            ));
        }

        // Fifth chunk hits capacity: dropped, counter reset.
        assert_eq!(log.append(chunk(4.0), 4.0), Appended::DroppedOverrun);
        assert_eq!(log.len(), 4);

        // Next chunk restarts the sequence at offset zero, not a continuation.
        assert_eq!(
            log.append(chunk(5.0), 5.0),
            Appended::Stored { offset_samples: 0 }
        );
    }

    #[test]
    fn test_drain_clears_but_counter_continues() {
        let log = file_log(60.0);
        log.append(chunk(0.0), 0.0);
        log.append(chunk(1.0), 0.023);

        log.drain_consumed();
        assert!(log.is_empty());

        // The sequence keeps counting across drains.
        assert_eq!(
            log.append(chunk(2.0), 0.046),
            Appended::Stored {
                offset_samples: 2048
            }
        );
    }

    #[test]
    fn test_interleaved_mutations_never_expose_mismatched_lengths() {
        let log = Arc::new(file_log(600.0));

        // Writer appends, evictor trims prefixes, reader asserts alignment.
        let writer = {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..500 {
                    log.append(vec![i as f32; 64], i as f64 * 0.01);
                }
            })
        };

        let evictor = {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                // Deterministic pseudo-random eviction sizes.
                let mut state = 0x2545_f491u32;
                for _ in 0..200 {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    log.evict_prefix((state % 4) as usize);
                }
            })
        };

        let reader = {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let (a, b, c) = log.column_lengths();
                    assert_eq!(a, b, "columns out of step");
                    assert_eq!(b, c, "columns out of step");
                }
            })
        };

        writer.join().unwrap();
        evictor.join().unwrap();
        reader.join().unwrap();

        let (a, b, c) = log.column_lengths();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }
}
