//! Programmer selection
//!
//! The `--port` argument picks the backend: `dummy` (optionally
//! `dummy:chip=NAME`) for the emulator, a serial device path for an EASY
//! PDK, or nothing to search all serial ports.

use pdkprog_core::chip::{ChipDatabase, ChipDescriptor};
use pdkprog_core::programmer::Programmer;
use pdkprog_core::Error;

/// Port name that selects the emulator
pub const DUMMY_PORT: &str = "dummy";

/// An opened programmer
pub struct Connection {
    /// Port the programmer was found on
    pub port: String,
    /// The programmer
    pub programmer: Box<dyn Programmer>,
}

/// Open the programmer named by `port`
///
/// `selected` is the IC chosen on the command line; the emulator attaches
/// it unless the port string names another one.
pub fn open_programmer(
    port: Option<&str>,
    db: &ChipDatabase,
    selected: Option<&ChipDescriptor>,
) -> Result<Connection, Error> {
    match port.map(parse_programmer_string) {
        Some((DUMMY_PORT, options)) => open_dummy(&options, db, selected),
        _ => open_serial(port),
    }
}

#[cfg(feature = "dummy")]
fn open_dummy(
    options: &[(&str, &str)],
    db: &ChipDatabase,
    selected: Option<&ChipDescriptor>,
) -> Result<Connection, Error> {
    let named = options.iter().find(|(k, _)| *k == "chip").map(|(_, v)| *v);
    let chip = match named {
        Some(name) => db
            .find_by_name(name)
            .ok_or_else(|| Error::UnknownChip(name.to_string()))?,
        None => selected
            .or_else(|| db.iter().next())
            .ok_or_else(|| Error::Database("no ICs defined".into()))?,
    };
    log::info!("Using emulated programmer with {} attached", chip);

    Ok(Connection {
        port: DUMMY_PORT.to_string(),
        programmer: Box::new(pdkprog_dummy::DummyPdk::with_chip(chip.clone())),
    })
}

#[cfg(not(feature = "dummy"))]
fn open_dummy(
    _options: &[(&str, &str)],
    _db: &ChipDatabase,
    _selected: Option<&ChipDescriptor>,
) -> Result<Connection, Error> {
    Err(Error::Transport(
        "emulator not available (recompile with the `dummy` feature)".into(),
    ))
}

#[cfg(feature = "easypdk")]
fn open_serial(port: Option<&str>) -> Result<Connection, Error> {
    log::debug!("Searching programmer...");
    let (port, pdk) = match port {
        Some(device) => (device.to_string(), pdkprog_easypdk::open(device)?),
        None => pdkprog_easypdk::open_auto()?,
    };
    log::debug!(" found: {}", port);

    Ok(Connection {
        port,
        programmer: Box::new(pdk),
    })
}

#[cfg(not(feature = "easypdk"))]
fn open_serial(_port: Option<&str>) -> Result<Connection, Error> {
    log::warn!("EASY PDK support not compiled in");
    Err(Error::ProgrammerNotFound)
}

/// Parse a port string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_programmer_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}
