//! Paginated output against the terminal height.
//!
//! When a text is taller than the terminal, one page is written and the pager
//! waits for a single keystroke:
//!
//! | key     | effect                          |
//! |---------|---------------------------------|
//! | Enter   | next page                       |
//! | `a`     | everything that is left         |
//! | `q`     | stop                            |
//! | Ctrl-C  | stop and raise the cancel token |
//! | other   | one more line                   |
//!
//! The terminal is switched to raw mode only for the duration of each
//! keystroke read and is restored on every exit path.

use crate::error::ShellError;
use crate::interrupt::CancelToken;
use std::io::{self, Write};

const MORE_PROMPT: &str = ":";

/// A single keystroke as far as pagination cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Char(char),
    Interrupt,
    Other,
}

/// The terminal the shell runs in.
pub trait Terminal {
    /// Height in lines, or `None` when output is not a terminal.
    fn height(&self) -> Option<usize>;

    fn enable_raw_mode(&mut self) -> io::Result<()>;

    /// Must be a no-op when raw mode is not active.
    fn disable_raw_mode(&mut self) -> io::Result<()>;

    /// Block until a key is pressed. Only called while raw mode is active.
    fn read_key(&mut self) -> io::Result<Key>;
}

/// Raw mode held for as long as this guard lives.
struct RawMode<'a> {
    terminal: &'a mut dyn Terminal,
}

impl<'a> RawMode<'a> {
    fn enable(terminal: &'a mut dyn Terminal) -> io::Result<Self> {
        terminal.enable_raw_mode()?;
        Ok(Self { terminal })
    }

    fn read_key(&mut self) -> io::Result<Key> {
        self.terminal.read_key()
    }
}

impl Drop for RawMode<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.terminal.disable_raw_mode() {
            tracing::warn!(error = %e, "failed to restore terminal mode");
        }
    }
}

/// How a [`Pager::write`] call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paged {
    /// Everything was written.
    Complete,
    /// The user pressed `q`.
    Quit,
    /// Ctrl-C while waiting for a key, or a cancel request was pending.
    Interrupted,
    /// Reading a keystroke failed; the rest of the text was dropped.
    Aborted,
}

pub struct Pager<'a> {
    out: &'a mut dyn Write,
    terminal: &'a mut dyn Terminal,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Pager<'a> {
    pub fn new(out: &'a mut dyn Write, terminal: &'a mut dyn Terminal) -> Self {
        Self {
            out,
            terminal,
            cancel: None,
        }
    }

    /// Stop paging at the next keystroke wait if `cancel` has been raised.
    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Write `text`, paginating when `allow_paging` is set and the text does
    /// not fit the terminal.
    pub fn write(&mut self, text: &str, allow_paging: bool) -> io::Result<Paged> {
        let lines: Vec<&str> = text.lines().collect();
        let height = match allow_paging.then(|| self.terminal.height()).flatten() {
            Some(height) if height > 0 && lines.len() > height => height,
            _ => {
                writeln!(self.out, "{}", text.trim_end_matches('\n'))?;
                self.out.flush()?;
                return Ok(Paged::Complete);
            }
        };

        self.write_lines(&lines[..height])?;
        let mut written = height;
        while written < lines.len() {
            if self.cancel.is_some_and(CancelToken::is_requested) {
                return Ok(Paged::Interrupted);
            }
            write!(self.out, "{MORE_PROMPT}")?;
            self.out.flush()?;
            let key = self.read_key();
            write!(self.out, "\r \r")?;
            let key = match key {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(error = %ShellError::TerminalIo(e), "pagination aborted");
                    self.out.flush()?;
                    return Ok(Paged::Aborted);
                }
            };
            let step = match key {
                Key::Enter => height,
                Key::Char('a') => lines.len() - written,
                Key::Char('q') => {
                    self.out.flush()?;
                    return Ok(Paged::Quit);
                }
                Key::Interrupt => {
                    if let Some(cancel) = self.cancel {
                        cancel.request();
                    }
                    self.out.flush()?;
                    return Ok(Paged::Interrupted);
                }
                Key::Char(_) | Key::Other => 1,
            };
            let end = (written + step).min(lines.len());
            self.write_lines(&lines[written..end])?;
            written = end;
        }
        Ok(Paged::Complete)
    }

    fn read_key(&mut self) -> io::Result<Key> {
        let mut raw = RawMode::enable(&mut *self.terminal)?;
        raw.read_key()
    }

    fn write_lines(&mut self, lines: &[&str]) -> io::Result<()> {
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()
    }
}
