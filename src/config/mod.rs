//! Configuration module
//!
//! Holds the upgrade policy shared by every connection and loads the optional
//! TOML config file.

mod file;
mod upgrade;

pub use file::*;
pub use upgrade::*;
