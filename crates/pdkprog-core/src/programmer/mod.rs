//! Programmer interface
//!
//! Backends implement [`Programmer`]; the session builds the request
//! structs from the selected chip and interprets the echoed IDs.

#[cfg(test)]
pub(crate) mod mock;
mod requests;
mod traits;

pub use requests::*;
pub use traits::*;
