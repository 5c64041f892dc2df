//! Channel layer for pattern matching over a pseudo-terminal.
//!
//! This module handles the raw-terminal side of an exchange: spawning the
//! agent on a PTY, accumulating its output, and waiting for textual cues.

mod buffer;
mod patterns;
mod pty;

pub use buffer::PatternBuffer;
pub use patterns::{MatcherList, PatternHit, TaggedPattern};
pub use pty::{Expect, PtyChannel, PtyConfig};
