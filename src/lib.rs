//! azbridge: authenticated command execution against a lazily loaded,
//! shared execution unit.

pub mod cli;
pub mod command;
pub mod internal;
pub mod utils;
