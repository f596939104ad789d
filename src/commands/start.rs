//! Start command implementation

use crate::console::{RawOutput, TerminalConsole};
use pdkprog_core::monitor::ExecutionMonitor;
use pdkprog_core::programmer::Programmer;
use pdkprog_core::session::Session;
use std::io::{self, Write};

/// Run the IC and relay its debug channel until Escape is pressed
pub fn run_start<P: Programmer>(
    session: &mut Session<P>,
    vdd: f32,
) -> Result<(), Box<dyn std::error::Error>> {
    let vdd_mv = (vdd * 1000.0).round() as u16;

    print!("Running IC ({:.2}V)... ", vdd);
    io::stdout().flush()?;

    let mut monitor = ExecutionMonitor::new(session.programmer_mut());
    monitor
        .start(vdd_mv)
        .map_err(|e| format!("Could not start IC: {}", e))?;
    println!("IC started, press [Esc] to stop.");

    let mut console = match TerminalConsole::new() {
        Ok(console) => console,
        Err(e) => {
            monitor.stop()?;
            return Err(e.into());
        }
    };
    let relayed = monitor.relay(&mut console, &mut RawOutput::new(io::stdout()));
    drop(console);

    println!("\nIC stopped");
    relayed.map_err(Into::into)
}
