//! CLI subcommands

pub mod commitment;
pub mod info;
pub mod replay;
