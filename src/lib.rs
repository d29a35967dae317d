//! labkit: a small home-lab automation toolkit.
//!
//! The library holds the filesystem utilities (archive, copy, verify, hashing),
//! thin wrappers for command execution, logging and Telegram notifications, and
//! the TOML configuration that drives them. The `lk` binary wires them together.

pub mod archive;
pub mod check;
pub mod commands;
pub mod config;
pub mod constants;
pub mod copy;
pub mod file_util;
pub mod host;
pub mod logging;
pub mod sysexits;
pub mod telegram;
pub mod tree;
