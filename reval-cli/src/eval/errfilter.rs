//! Rewriting toolchain diagnostics so they do not mention scratch files.

use std::io::{self, Write};
use std::path::Path;

use regex::Regex;

/// A line-buffered writer that removes scratch directory noise from
/// compiler and runtime error output before passing it on.
///
/// - `--> <scratch>/...` location lines are dropped,
/// - `<scratch>/file.rs:L:C` locations, with a leading `at`, are cut from
///   other lines,
/// - the `aborting due to N previous errors` summary is dropped.
#[derive(Debug)]
pub struct ErrFilter<W: Write> {
    inner: W,
    pending: Vec<u8>,
    arrow: Regex,
    location: Regex,
    summary: Regex,
}

impl<W: Write> ErrFilter<W> {
    /// # Errors
    ///
    /// Fails only if the patterns built from `scratch` do not compile.
    pub fn new(scratch: &Path, inner: W) -> io::Result<Self> {
        let dir = regex::escape(&scratch.display().to_string());
        let compile = |pattern: String| Regex::new(&pattern).map_err(io::Error::other);
        Ok(Self {
            inner,
            pending: Vec::new(),
            arrow: compile(format!(r"^\s*-->\s*{dir}"))?,
            location: compile(format!(r"(\s+at)?\s*{dir}/[^:\s]*:\d+:\d+"))?,
            summary: compile(r"^error: aborting due to ".to_string())?,
        })
    }

    /// Write out any unterminated last line and return the inner writer.
    ///
    /// # Errors
    ///
    /// Propagates errors of the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.emit(&line)?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn emit(&mut self, raw: &[u8]) -> io::Result<()> {
        let text = String::from_utf8_lossy(raw);
        let (line, newline) = match text.strip_suffix('\n') {
            Some(line) => (line, "\n"),
            None => (text.as_ref(), ""),
        };
        if self.arrow.is_match(line) || self.summary.is_match(line) {
            return Ok(());
        }
        let line = self.location.replace_all(line, "");
        write!(self.inner, "{line}{newline}")
    }
}

impl<W: Write> Write for ErrFilter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.emit(&line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
