//! Read command implementation

use crate::commands::SpinnerProgress;
use crate::hexfile::{write_image, FileFormat};
use pdkprog_core::programmer::Programmer;
use pdkprog_core::session::Session;
use std::path::Path;

/// Read the IC, writing the contents to `output` if given
pub fn run_read<P: Programmer>(
    session: &mut Session<P>,
    output: Option<&Path>,
    binary: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = session.read(&mut SpinnerProgress::new())?;

    if let Some(path) = output {
        let format = if binary {
            FileFormat::Binary
        } else {
            FileFormat::Hex
        };
        write_image(path, &data, format)
            .map_err(|e| format!("Could not write file: {}", e))?;
        log::info!("Wrote {} bytes to {}", data.len(), path.display());
    }

    Ok(())
}
