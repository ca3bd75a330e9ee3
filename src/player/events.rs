/// Notifications for the rendering collaborator, returned as an explicit
/// batch from each `update` call rather than through registered callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A new mesh/texture frame was published and can be uploaded.
    NewFrameReady,
    /// Open failed; playback stays inert.
    SourceNotFound,
    /// A finite source reached its end with looping disabled.
    PlaybackEnded,
}

impl std::fmt::Display for PlayerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerEvent::NewFrameReady => write!(f, "NewFrameReady"),
            PlayerEvent::SourceNotFound => write!(f, "SourceNotFound"),
            PlayerEvent::PlaybackEnded => write!(f, "PlaybackEnded"),
        }
    }
}
