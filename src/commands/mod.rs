//! CLI command implementations
//!
//! `program` drives a full session against any device provider, so the USB
//! and emulated backends share one code path.

mod list;
mod program;

pub use list::list_mcus;
pub use program::run_program;
