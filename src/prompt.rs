//! Password-prompt detection over the pty output stream.
//!
//! Matching a regex against an unframed interactive byte stream is a
//! heuristic, not a protocol guarantee: the scanner looks at whatever the
//! child happens to have on its current display line. It accumulates chunks
//! into a bounded buffer, so a prompt split across read boundaries is still
//! seen as long as no line boundary lands between the pieces.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;

/// Detection stops permanently this long after session start.
pub const SCAN_WINDOW: Duration = Duration::from_secs(30);

const BUF_CAP: usize = 2048;

fn prompt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(password|passcode|pass ?phrase)\s*:?$").expect("prompt pattern"))
}

/// Scans pty output for an authentication prompt.
///
/// At most one match per scanner: after the first hit (or after the scan
/// window elapses) `push` always returns false. One injection per session
/// bounds retry loops fed by a stale secret.
pub struct PromptScanner {
    buf: Vec<u8>,
    deadline: Instant,
    done: bool,
}

impl PromptScanner {
    pub fn new() -> Self {
        Self::with_window(SCAN_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            deadline: Instant::now() + window,
            done: false,
        }
    }

    /// Feed one output chunk. Returns true when the current display line
    /// ends with a password prompt and injection should happen now.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if self.done {
            return false;
        }
        if Instant::now() >= self.deadline {
            self.done = true;
            return false;
        }

        self.buf.extend_from_slice(chunk);
        if self.buf.len() > BUF_CAP {
            let excess = self.buf.len() - BUF_CAP;
            self.buf.drain(..excess);
        }

        // Only the text after the last line boundary is the prompt candidate;
        // carriage returns count as boundaries since clients redraw with \r.
        let tail = match self.buf.iter().rposition(|&b| b == b'\r' || b == b'\n') {
            Some(i) => &self.buf[i + 1..],
            None => &self.buf[..],
        };

        let line = String::from_utf8_lossy(tail);
        if prompt_re().is_match(line.trim()) {
            self.done = true;
            return true;
        }
        false
    }
}

impl Default for PromptScanner {
    fn default() -> Self {
        Self::new()
    }
}
