use crate::pager::{Key, Terminal};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Cursor, IsTerminal, Read, Result as IoResult, Write};
use std::rc::Rc;

/// Memory-backed line source, used to feed scripts to the interpreter.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            cursor: Cursor::new(buf.into()),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl BufRead for MemReader {
    fn fill_buf(&mut self) -> IoResult<&[u8]> {
        self.cursor.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.cursor.consume(amt)
    }
}

/// Memory-backed writer for capturing shell output.
#[derive(Default)]
pub struct MemWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return inner Rc so caller can read collected bytes after the writer is handed off.
    pub fn into_inner(self) -> Rc<RefCell<Vec<u8>>> {
        self.buf
    }

    /// Convenience: create writer and return (writer, rc_handle).
    pub fn with_handle() -> (Self, Rc<RefCell<Vec<u8>>>) {
        let mw = MemWriter::new();
        let rc = mw.buf.clone();
        (mw, rc)
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

/// The process terminal, driven through crossterm.
#[derive(Debug, Default)]
pub struct ConsoleTerminal {
    raw: bool,
}

impl ConsoleTerminal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Terminal for ConsoleTerminal {
    fn height(&self) -> Option<usize> {
        if !io::stdout().is_terminal() || !io::stdin().is_terminal() {
            return None;
        }
        crossterm::terminal::size()
            .ok()
            .map(|(_, rows)| usize::from(rows))
            .filter(|rows| *rows > 0)
    }

    fn enable_raw_mode(&mut self) -> io::Result<()> {
        crossterm::terminal::enable_raw_mode()?;
        self.raw = true;
        Ok(())
    }

    fn disable_raw_mode(&mut self) -> io::Result<()> {
        if self.raw {
            crossterm::terminal::disable_raw_mode()?;
            self.raw = false;
        }
        Ok(())
    }

    fn read_key(&mut self) -> io::Result<Key> {
        loop {
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            else {
                continue;
            };
            if kind != KeyEventKind::Press {
                continue;
            }
            return Ok(match code {
                KeyCode::Enter => Key::Enter,
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Key::Interrupt,
                KeyCode::Char(c) => Key::Char(c),
                KeyCode::Esc => Key::Char('q'),
                _ => Key::Other,
            });
        }
    }
}

/// What a [`ScriptedTerminal`] observed.
#[derive(Debug, Default)]
pub struct TerminalLog {
    /// Raw mode is currently on.
    pub raw: bool,
    /// Number of times raw mode was switched on.
    pub raw_sessions: usize,
    pub keys_read: usize,
}

/// Terminal with a fixed height that replays scripted keystrokes.
///
/// Reading past the end of the script fails with `UnexpectedEof`.
pub struct ScriptedTerminal {
    height: Option<usize>,
    keys: VecDeque<Key>,
    log: Rc<RefCell<TerminalLog>>,
}

impl ScriptedTerminal {
    pub fn new(height: Option<usize>, keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            height,
            keys: keys.into_iter().collect(),
            log: Rc::default(),
        }
    }

    /// Convenience: create terminal and return (terminal, log handle).
    pub fn with_handle(
        height: Option<usize>,
        keys: impl IntoIterator<Item = Key>,
    ) -> (Self, Rc<RefCell<TerminalLog>>) {
        let terminal = Self::new(height, keys);
        let log = terminal.log.clone();
        (terminal, log)
    }
}

impl Terminal for ScriptedTerminal {
    fn height(&self) -> Option<usize> {
        self.height
    }

    fn enable_raw_mode(&mut self) -> io::Result<()> {
        let mut log = self.log.borrow_mut();
        log.raw = true;
        log.raw_sessions += 1;
        Ok(())
    }

    fn disable_raw_mode(&mut self) -> io::Result<()> {
        self.log.borrow_mut().raw = false;
        Ok(())
    }

    fn read_key(&mut self) -> io::Result<Key> {
        let key = self
            .keys
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more scripted keys"))?;
        self.log.borrow_mut().keys_read += 1;
        Ok(key)
    }
}
