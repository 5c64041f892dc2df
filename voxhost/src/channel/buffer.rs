//! Pattern buffer for terminal output.
//!
//! Output is accumulated with ANSI escape codes and carriage returns
//! stripped. Matching is done against the unconsumed region; a match consumes
//! everything up to its end so that the next expectation only sees newer
//! output.

use bytes::BytesMut;

use super::patterns::{MatcherList, PatternHit};

/// Longest escape sequence held back while its terminator is outstanding.
const MAX_PENDING_ESCAPE: usize = 256;

/// Buffer for accumulating terminal output and matching cue patterns.
#[derive(Debug)]
pub struct PatternBuffer {
    /// Unconsumed output.
    buffer: BytesMut,

    /// Escape sequence cut off at the end of the last read.
    pending: Vec<u8>,
}

impl PatternBuffer {
    /// Create an empty pattern buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            pending: Vec::new(),
        }
    }

    /// Extend the buffer with new data, stripping ANSI escape codes.
    ///
    /// A sequence split across reads is held back until the rest arrives.
    pub fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        let split = unterminated_escape(&self.pending).unwrap_or(self.pending.len());
        let tail = self.pending.split_off(split);

        let cleaned = strip_ansi_escapes::strip(&self.pending);
        self.buffer.extend_from_slice(&cleaned);
        self.pending = tail;
    }

    /// Find the highest-priority match in the unconsumed output.
    pub fn find<T: Copy>(&self, matchers: &MatcherList<T>) -> Option<PatternHit<T>> {
        matchers.find(&self.buffer)
    }

    /// Consume the buffer through `hit`, returning the text before it.
    pub fn consume_through<T>(&mut self, hit: &PatternHit<T>) -> String {
        let consumed = self.buffer.split_to(hit.end.min(self.buffer.len()));
        let before = &consumed[..hit.start.min(consumed.len())];
        String::from_utf8_lossy(before).into_owned()
    }

    /// Take everything unconsumed as text and reset.
    pub fn take_string(&mut self) -> String {
        let data = self.buffer.split();
        String::from_utf8_lossy(&data).into_owned()
    }

    /// Get a reference to the unconsumed bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }
}

/// Offset of a trailing escape sequence that has not been terminated yet.
fn unterminated_escape(data: &[u8]) -> Option<usize> {
    let start = data.iter().rposition(|&b| b == 0x1b)?;
    let seq = &data[start..];
    if seq.len() > MAX_PENDING_ESCAPE {
        return None;
    }

    let open = match seq.get(1) {
        None => true,
        // CSI ends with a byte in 0x40..=0x7e
        Some(b'[') => !seq[2..].iter().any(|b| (0x40..=0x7e).contains(b)),
        // OSC ends with BEL, or with ST which starts a new escape
        Some(b']') => !seq[2..].contains(&0x07),
        Some(_) => false,
    };
    open.then_some(start)
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Cue {
        Ready,
    }

    #[test]
    fn test_basic_extend() {
        let mut buffer = PatternBuffer::new();
        buffer.extend(b"Hello, world!");
        assert_eq!(buffer.as_slice(), b"Hello, world!");
    }

    #[test]
    fn test_ansi_stripping() {
        let mut buffer = PatternBuffer::new();
        buffer.extend(b"\x1b[32mGreen text\x1b[0m");
        assert_eq!(buffer.as_slice(), b"Green text");
    }

    #[test]
    fn test_consume_through_match() {
        let mut buffer = PatternBuffer::new();
        buffer.extend(b"banner\r\nYou: rest");
        let matchers = MatcherList::new().with(Cue::Ready, r"You:").unwrap();

        let hit = buffer.find(&matchers).unwrap();
        let before = buffer.consume_through(&hit);

        assert_eq!(before, "banner\n");
        assert_eq!(buffer.as_slice(), b" rest");
    }

    #[test]
    fn test_carriage_returns_are_stripped() {
        let mut buffer = PatternBuffer::new();
        buffer.extend(b"Enter your prompt:\r\nAssistant: hi\r\n");
        assert_eq!(buffer.as_slice(), b"Enter your prompt:\nAssistant: hi\n");
    }

    #[test]
    fn test_escape_split_across_reads() {
        let mut buffer = PatternBuffer::new();

        buffer.extend(b"ok \x1b[3");
        assert_eq!(buffer.as_slice(), b"ok ");

        buffer.extend(b"2mGreen\x1b[0m");
        assert_eq!(buffer.as_slice(), b"ok Green");
    }

    #[test]
    fn test_lone_escape_and_title_split_across_reads() {
        let mut buffer = PatternBuffer::new();

        buffer.extend(b"a\x1b");
        buffer.extend(b"[1mb\x1b]0;ti");
        assert_eq!(buffer.as_slice(), b"ab");

        buffer.extend(b"tle\x07You: ");
        assert_eq!(buffer.as_slice(), b"abYou: ");
    }

    #[test]
    fn test_overlong_escape_is_not_held() {
        let mut buffer = PatternBuffer::new();
        let mut data = b"x\x1b[".to_vec();
        data.extend(std::iter::repeat_n(b'1', MAX_PENDING_ESCAPE));

        buffer.extend(&data);
        assert_eq!(buffer.as_slice(), b"x");
        assert!(buffer.pending.is_empty());
    }

    #[test]
    fn test_take_string_clears_buffer() {
        let mut buffer = PatternBuffer::new();
        buffer.extend(b"partial reply");
        assert_eq!(buffer.take_string(), "partial reply");
        assert!(buffer.as_slice().is_empty());
    }
}
