//! pdkprog-core - Core library for programming PADAUK microcontrollers
//!
//! This crate holds everything with real decision logic in pdkprog:
//!
//! - [`chip`] - the chip descriptor table and identity resolution from a
//!   name, a 12-bit ID or a raw probe response
//! - [`image`] - turning loaded hex cells into a length-bounded write buffer
//! - [`calibration`] - coordinating oscillator/band-gap calibration stubs
//! - [`programmer`] - the operation-level interface a programmer backend
//!   implements
//! - [`session`] - the workflow orchestrator driving read, write, erase and
//!   probe against a programmer
//! - [`monitor`] - the interactive loop used while a program runs on the IC
//!
//! The wire protocol to the programmer lives in backend crates
//! (`pdkprog-easypdk`, `pdkprog-dummy`), which implement
//! [`programmer::Programmer`].
//!
//! # Example
//!
//! ```ignore
//! use pdkprog_core::chip::ChipDatabase;
//! use pdkprog_core::session::{NoProgress, Session};
//!
//! let db = ChipDatabase::builtin()?;
//! let chip = db.select(Some("PFS154"), None)?;
//! let mut session = Session::open(programmer)?;
//! session.select_chip(chip.clone());
//! let contents = session.read(&mut NoProgress)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod calibration;
pub mod chip;
pub mod error;
pub mod image;
pub mod monitor;
pub mod programmer;
pub mod session;

pub use error::{DeviceError, Error, Operation, Result};
