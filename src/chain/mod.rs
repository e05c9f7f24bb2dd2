//! Chain client module.

mod dry_run;
mod submitter;
mod substrate;

pub use dry_run::*;
pub use submitter::*;
pub use substrate::*;
