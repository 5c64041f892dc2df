//! Reply cleanup for speech.
//!
//! Agents interleave their answer with log lines, terminal noise and
//! markdown. Cleanup happens in two pure stages:
//!
//! 1. [`sanitize_response`] drops noise lines and flattens the rest into one
//!    line of plain text.
//! 2. [`shape_for_speech`] strips markdown, spells out acronyms and caps the
//!    length so a long answer does not monopolize the speaker.
//!
//! Both stages are idempotent: applying either to its own output is a no-op.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Longest reply spoken before truncation, in characters.
pub const MAX_SPOKEN_CHARS: usize = 500;

/// Appended to a reply cut at [`MAX_SPOKEN_CHARS`].
pub const TRUNCATION_NOTICE: &str = "... The response was truncated for speech.";

/// Lines containing any of these are agent chatter, not answer text.
const NOISE_MARKERS: &[&str] = &[
    "DEBUG",
    "INFO",
    "2025/",
    "creating message",
    "sending messages",
    "\x1b",
    "ESC",
    "command:",
    "args:",
    "buffer",
    "before",
    "after",
    "STDOUT:",
    "STDERR:",
];

const MAX_SHAPING_PASSES: usize = 8;

/// Go `log` package prefix, e.g. `2024/06/01 12:00:00`.
static LOG_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d{4}/\d{2}/\d{2}[ T]\d{2}:\d{2}").unwrap());

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());

static ACRONYM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(CLI|API|JSON|HTTP|URL|SSH|CPU|GPU|RAM)(s?)\b").unwrap());

/// Spoken forms, in the order they are documented.
static SPOKEN_ACRONYMS: Lazy<IndexMap<&'static str, &'static str>> = Lazy::new(|| {
    IndexMap::from([
        ("CLI", "command line"),
        ("API", "A P I"),
        ("JSON", "J SON"),
        ("HTTP", "H T T P"),
        ("URL", "U R L"),
        ("SSH", "S S H"),
        ("CPU", "C P U"),
        ("GPU", "G P U"),
        ("RAM", "R A M"),
    ])
});

/// Reduce raw agent output to a single line of speakable text.
///
/// Returns an empty string when nothing speakable survives.
pub fn sanitize_response(raw: &str) -> String {
    let mut current = sanitize_pass(raw);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Prepare sanitized text for the speech engine.
pub fn shape_for_speech(text: &str) -> String {
    let mut current = shape_pass(text);
    for _ in 1..MAX_SHAPING_PASSES {
        let next = shape_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn sanitize_pass(raw: &str) -> String {
    let kept: Vec<&str> = raw
        .lines()
        .filter(|line| !is_noise(line))
        .map(str::trim)
        .collect();

    let joined: String = kept.join(" ").chars().filter(|c| !c.is_control()).collect();
    let untagged = TAG.replace_all(&joined, "");
    WHITESPACE.replace_all(&untagged, " ").trim().to_string()
}

fn is_noise(line: &str) -> bool {
    if line.trim().is_empty() {
        return true;
    }
    if NOISE_MARKERS.iter().any(|marker| line.contains(marker)) {
        return true;
    }
    if LOG_TIMESTAMP.is_match(line) {
        return true;
    }

    let total = line.chars().count();
    let unprintable = line.chars().filter(|&c| (c as u32) < 32).count();
    unprintable * 2 > total
}

fn shape_pass(text: &str) -> String {
    let stripped = text.replace("**", "").replace(['*', '#', '`'], "");
    let unlinked = LINK.replace_all(&stripped, "${1}");
    let spoken = ACRONYM.replace_all(&unlinked, |caps: &Captures<'_>| {
        let word = &caps[1];
        let spelled = SPOKEN_ACRONYMS.get(word).copied().unwrap_or(word);
        format!("{}{}", spelled, &caps[2])
    });

    if spoken.chars().count() > MAX_SPOKEN_CHARS {
        let mut cut: String = spoken.chars().take(MAX_SPOKEN_CHARS).collect();
        cut.push_str(TRUNCATION_NOTICE);
        cut
    } else {
        spoken.into_owned()
    }
}
