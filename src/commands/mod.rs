//! CLI command implementations
//!
//! Every command except `list` runs against an open [`Session`], reporting
//! device steps through [`SpinnerProgress`].
//!
//! [`Session`]: pdkprog_core::session::Session

mod erase;
mod list;
mod probe;
mod progress;
mod read;
mod start;
mod write;

pub use erase::run_erase;
pub use list::list_chips;
pub use probe::run_probe;
pub use progress::SpinnerProgress;
pub use read::run_read;
pub use start::run_start;
pub use write::run_write;
