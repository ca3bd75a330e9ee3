//! Playback clock reconciliation
//!
//! Mesh frames are presented against the audio hardware clock. This module
//! tracks the measured lag between the two streams, decides when a coarse
//! resync jump is warranted, and derives the unified play cursor per source
//! kind.

mod gap;
mod policy;

pub use gap::GapTracker;
pub use policy::{
    ClockContext, FilePlaybackPolicy, LiveIngestPolicy, SourceKind, SourcePolicy, policy_for,
};
