//! Raw-mode terminal input for the execution monitor

use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use pdkprog_core::monitor::{Console, ESCAPE};

/// Restores cooked mode when dropped
struct RawModeGuard;

impl RawModeGuard {
    fn new() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            log::error!("Failed to disable raw mode: {}", e)
        }
    }
}

/// Keyboard of the controlling terminal
///
/// The terminal stays in raw mode for the lifetime of the console, so
/// single key presses are delivered without waiting for Enter.
pub struct TerminalConsole {
    _raw_mode: RawModeGuard,
}

impl TerminalConsole {
    /// Switch the terminal to raw mode
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            _raw_mode: RawModeGuard::new()?,
        })
    }
}

impl Console for TerminalConsole {
    fn poll_key(&mut self, timeout: Duration) -> io::Result<bool> {
        poll(timeout)
    }

    fn read_key(&mut self) -> io::Result<Option<u8>> {
        if !poll(Duration::ZERO)? {
            return Ok(None);
        }
        match read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(key_byte(key)),
            _ => Ok(None),
        }
    }
}

/// Writer that turns bare `\n` into `\r\n`
///
/// Raw mode turns off the terminal's own newline translation.
pub struct RawOutput<W> {
    inner: W,
    prev_was_cr: bool,
}

impl<W: Write> RawOutput<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            prev_was_cr: false,
        }
    }
}

impl<W: Write> Write for RawOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut normalized = Vec::with_capacity(buf.len() * 2);
        for &byte in buf {
            if byte == b'\n' && !self.prev_was_cr {
                normalized.push(b'\r');
            }
            normalized.push(byte);
            self.prev_was_cr = byte == b'\r';
        }
        self.inner.write_all(&normalized)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Byte sent to the IC for a key press
fn key_byte(key: KeyEvent) -> Option<u8> {
    match key.code {
        KeyCode::Esc => Some(ESCAPE),
        KeyCode::Enter => Some(b'\r'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Char(ch) if ch.is_ascii() => {
            let byte = ch as u8;
            if key.modifiers.contains(KeyModifiers::CONTROL) && byte.is_ascii_alphabetic() {
                Some(byte & 0x1f)
            } else {
                Some(byte)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_key_bytes() {
        assert_eq!(key_byte(key(KeyCode::Esc, KeyModifiers::NONE)), Some(27));
        assert_eq!(key_byte(key(KeyCode::Char('a'), KeyModifiers::NONE)), Some(b'a'));
        assert_eq!(key_byte(key(KeyCode::Char('c'), KeyModifiers::CONTROL)), Some(3));
        assert_eq!(key_byte(key(KeyCode::Enter, KeyModifiers::NONE)), Some(b'\r'));
        assert_eq!(key_byte(key(KeyCode::Char('é'), KeyModifiers::NONE)), None);
        assert_eq!(key_byte(key(KeyCode::Left, KeyModifiers::NONE)), None);
    }

    fn normalize(chunks: &[&str]) -> Vec<u8> {
        let mut out = RawOutput::new(Vec::new());
        for chunk in chunks {
            out.write_all(chunk.as_bytes()).unwrap();
        }
        out.inner
    }

    #[test]
    fn test_line_feed_becomes_crlf() {
        assert_eq!(normalize(&["a\nb"]), b"a\r\nb");
        assert_eq!(normalize(&["\n\n"]), b"\r\n\r\n");
    }

    #[test]
    fn test_existing_crlf_is_kept() {
        assert_eq!(normalize(&["a\r\nb\r"]), b"a\r\nb\r");
        // CR and LF split across two debug chunks
        assert_eq!(normalize(&["x\r", "\ny"]), b"x\r\ny");
    }
}
