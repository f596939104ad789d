//! Chip descriptors and the chip database

mod database;
mod types;

pub use database::*;
pub use types::*;
