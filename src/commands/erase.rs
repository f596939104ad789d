//! Erase command implementation

use crate::commands::SpinnerProgress;
use pdkprog_core::programmer::Programmer;
use pdkprog_core::session::Session;

/// Erase a FLASH IC, followed by a blank check unless disabled
pub fn run_erase<P: Programmer>(
    session: &mut Session<P>,
    blank_check: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    session.erase(blank_check, &mut SpinnerProgress::new())?;
    Ok(())
}
