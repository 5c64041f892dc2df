use std::fmt;

/// Phase of the interaction loop.
///
/// ```text
/// Idle -> Recording -> Transcribing -> Dispatching -> Speaking -> Idle
/// ```
///
/// `Exit` is terminal and reachable from any phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Transcribing,
    Dispatching,
    Speaking,
    Exit,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Transcribing => "transcribing",
            SessionState::Dispatching => "dispatching",
            SessionState::Speaking => "speaking",
            SessionState::Exit => "exit",
        };
        f.write_str(name)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user spoke an exit phrase.
    Farewell,

    /// An external interrupt arrived.
    Interrupted,

    /// The stop-signal input closed, so no further recording can be stopped.
    InputClosed,

    /// The capture utility could not be launched.
    CaptureUnavailable,
}
