//! Execution monitor
//!
//! While a program runs on the IC, debug output from the programmer is
//! copied to the terminal and key presses are forwarded to the IC. Escape
//! stops the IC.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::programmer::Programmer;

/// Key that stops the running IC
pub const ESCAPE: u8 = 27;

/// Longest wait for either event source
pub const TICK: Duration = Duration::from_secs(1);

/// Maximum debug bytes read per tick
pub const DEBUG_CHUNK: usize = 255;

const POLL_SLICE: Duration = Duration::from_millis(20);

/// Local keyboard
pub trait Console {
    /// Wait up to `timeout` for a key press
    fn poll_key(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Take a pending key press without blocking
    fn read_key(&mut self) -> io::Result<Option<u8>>;
}

/// Whether the IC is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Powered and executing
    Running,
    /// Not running
    Stopped,
}

/// Runs a program on the IC and relays its debug channel
pub struct ExecutionMonitor<'a, P: Programmer> {
    programmer: &'a mut P,
    state: ExecutionState,
}

impl<'a, P: Programmer> ExecutionMonitor<'a, P> {
    /// Create a monitor for a stopped IC
    pub fn new(programmer: &'a mut P) -> Self {
        Self {
            programmer,
            state: ExecutionState::Stopped,
        }
    }

    /// Current state
    pub fn state(&self) -> ExecutionState {
        self.state
    }

    /// Power the IC at `vdd_mv` and start it
    pub fn start(&mut self, vdd_mv: u16) -> Result<()> {
        self.programmer.start_execution(vdd_mv)?;
        log::debug!("IC running at {} mV", vdd_mv);
        self.state = ExecutionState::Running;
        Ok(())
    }

    /// Wait for one tick and handle both event sources
    ///
    /// Returns false once Escape was pressed.
    pub fn tick<C: Console, W: Write>(&mut self, console: &mut C, out: &mut W) -> Result<bool> {
        let deadline = Instant::now() + TICK;
        loop {
            if self.programmer.debug_pending(Duration::ZERO)? || console.poll_key(POLL_SLICE)? {
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        let mut buf = [0u8; DEBUG_CHUNK];
        let n = self.programmer.receive_debug(&mut buf)?;
        if n > 0 {
            out.write_all(&buf[..n])?;
            out.flush()?;
        }

        match console.read_key()? {
            Some(ESCAPE) => Ok(false),
            Some(key) => {
                self.programmer.send_debug(&[key])?;
                Ok(true)
            }
            None => Ok(true),
        }
    }

    /// Stop the IC
    pub fn stop(&mut self) -> Result<()> {
        self.programmer.stop_execution()?;
        self.state = ExecutionState::Stopped;
        Ok(())
    }

    /// Relay until Escape, then stop the IC
    ///
    /// The IC is stopped even if relaying fails.
    pub fn relay<C: Console, W: Write>(&mut self, console: &mut C, out: &mut W) -> Result<()> {
        let relayed = loop {
            match self.tick(console, out) {
                Ok(true) => continue,
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        let stopped = self.stop();
        relayed.and(stopped)
    }
}
