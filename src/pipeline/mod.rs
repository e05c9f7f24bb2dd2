//! Pipeline module - snapshot reading, batch submission and the submission log.

mod journal;
mod runner;
mod source;

pub use journal::*;
pub use runner::*;
pub use source::*;
