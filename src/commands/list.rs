//! List command implementation

use pdkprog_core::chip::{ChipDatabase, ChipDescriptor};
use std::io::{self, Write};

/// List all supported ICs, one line per name and alias
pub fn list_chips(db: &ChipDatabase) -> io::Result<()> {
    let stdout = io::stdout();
    write_chip_list(db, &mut stdout.lock())
}

fn write_chip_list<W: Write>(db: &ChipDatabase, out: &mut W) -> io::Result<()> {
    writeln!(out, "Supported ICs:")?;
    for chip in db.iter() {
        for name in chip.names() {
            writeln!(out, "{}", chip_line(name, chip))?;
        }
    }
    Ok(())
}

fn chip_line(name: &str, chip: &ChipDescriptor) -> String {
    format!(
        " {:<8} (0x{:03X}): {:<5}: {} ({} bit), RAM: {:>3} bytes",
        name,
        chip.id12(),
        chip.memory_kind.label(),
        chip.code_words,
        chip.code_bits,
        chip.ram_size
    )
}
