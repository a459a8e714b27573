//! Command implementations.

mod read;
mod scan;

pub use read::cmd_read;
pub use scan::cmd_scan;
