use thiserror::Error;

/// Structural playback failures surfaced to the host.
///
/// Transient conditions are not represented here: a decoder pull that yields
/// no unit is simply retried on the next tick.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("seek is unsupported on a live source")]
    SeekUnsupported,

    #[error("no stream is open")]
    NotOpen,
}
