//! HOLODECK Manager Library
//!
//! Command implementations behind the `holodeck` binary.

pub mod commands;
