//! Types shared across the image resize engine: sectors, human-readable
//! sizes, partition tables, and filesystem usage snapshots.

#[macro_use]
extern crate failure_derive;

mod fs;
mod sector;
mod size;
mod table;
mod usage;

pub use self::{fs::*, sector::*, size::*, table::*, usage::*};
