//! pdkprog - Programmer for PADAUK microcontrollers
//!
//! Reads, writes, erases and runs PADAUK OTP and FLASH ICs through an
//! EASY PDK programmer.
//!
//! # Exit status
//!
//! Pre-flight failures exit with a negative status: -2 when the IC or the
//! input file is missing or unknown, -1 when no programmer answers. Once
//! a programmer is connected, failures are reported and the exit status
//! is 0.

mod cli;
mod commands;
mod console;
mod hexfile;
mod programmers;

use clap::Parser;
use cli::{ChipArgs, Cli, Commands};
use pdkprog_core::calibration::NoCalibration;
use pdkprog_core::chip::{ChipDatabase, ChipDescriptor};
use pdkprog_core::programmer::Programmer;
use pdkprog_core::session::{Session, WriteOptions};
use std::path::Path;
use std::process;

/// Exit status for a missing or unknown IC or input file
const EXIT_PREFLIGHT: i32 = -2;
/// Exit status when no programmer could be used
const EXIT_NO_PROGRAMMER: i32 = -1;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let db = match load_chip_database(cli.chip_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load chip database: {}", e);
            process::exit(1);
        }
    };
    log::debug!("Loaded {} IC definitions", db.len());

    if let Commands::List = cli.command {
        if let Err(e) = commands::list_chips(&db) {
            eprintln!("ERROR: {}", e);
        }
        return;
    }

    // Pre-flight checks, before any programmer is opened
    let chip = match &cli.command {
        Commands::Read { chip, .. } | Commands::Write { chip, .. } | Commands::Erase { chip, .. } => {
            Some(select_chip(&db, chip))
        }
        _ => None,
    };
    if let Commands::Write { file: None, .. } = cli.command {
        println!("ERROR: Write requires an input file.");
        process::exit(EXIT_PREFLIGHT);
    }

    let port = match &cli.command {
        Commands::Probe { port }
        | Commands::Read { port, .. }
        | Commands::Write { port, .. }
        | Commands::Erase { port, .. }
        | Commands::Start { port, .. } => port.port.clone(),
        Commands::List => None,
    };

    let connection = match programmers::open_programmer(port.as_deref(), &db, chip.as_ref()) {
        Ok(connection) => connection,
        Err(pdkprog_core::Error::ProgrammerNotFound) => {
            println!("No programmer found");
            process::exit(EXIT_NO_PROGRAMMER);
        }
        Err(e) => {
            println!(
                "Error connecting to programmer on port: {}: {}",
                port.as_deref().unwrap_or("auto"),
                e
            );
            process::exit(EXIT_NO_PROGRAMMER);
        }
    };

    let mut session = match Session::open(connection.programmer) {
        Ok(session) => session,
        Err(e) => {
            println!("Programmer on {} did not answer: {}", connection.port, e);
            process::exit(EXIT_NO_PROGRAMMER);
        }
    };
    log::debug!("FREE-PDK EASY PROG - {}", session.version());

    if let Some(chip) = chip {
        session.select_chip(chip);
    }

    if let Err(e) = run_command(cli.command, &mut session, &db) {
        println!("ERROR: {}", e);
    }
}

/// Resolve the IC named on the command line or exit
fn select_chip(db: &ChipDatabase, args: &ChipArgs) -> ChipDescriptor {
    match db.select(args.icname.as_deref(), args.icid) {
        Ok(chip) => chip.clone(),
        Err(e) => {
            println!("ERROR: {}", e);
            process::exit(EXIT_PREFLIGHT);
        }
    }
}

fn run_command<P: Programmer>(
    command: Commands,
    session: &mut Session<P>,
    db: &ChipDatabase,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::List => commands::list_chips(db).map_err(Into::into),
        Commands::Probe { .. } => commands::run_probe(session, db),
        Commands::Read { bin, file, .. } => commands::run_read(session, file.as_deref(), bin),
        Commands::Write {
            noerase,
            noblankchk,
            securefill,
            noverify,
            nocalibrate,
            fuse,
            file,
            ..
        } => {
            let options = WriteOptions {
                skip_erase: noerase,
                skip_blank_check: noblankchk,
                secure_fill: securefill,
                skip_verify: noverify,
                skip_calibration: nocalibrate,
                fuse: None,
            }
            .with_fuse(fuse);
            let input = file.ok_or("Write requires an input file.")?;
            commands::run_write(session, &input, &options, &NoCalibration)
        }
        Commands::Erase { noblankchk, .. } => commands::run_erase(session, !noblankchk),
        Commands::Start { runvdd, .. } => commands::run_start(session, runvdd),
    }
}

/// Load the chip database from the specified file or the built-in table
fn load_chip_database(path: Option<&Path>) -> Result<ChipDatabase, Box<dyn std::error::Error>> {
    match path {
        Some(path) if path.is_file() => {
            let mut db = ChipDatabase::new();
            let count = db.load_file(path)?;
            log::debug!("Loaded {} ICs from {}", count, path.display());
            Ok(db)
        }
        Some(path) => Err(format!("Chip database not found: {}", path.display()).into()),
        None => Ok(ChipDatabase::builtin()?),
    }
}
