//! Allow-listed script execution.
//!
//! [`resolver`] maps keys to files, [`shell`] builds the argv for a run,
//! [`subprocess`] spawns and either collects or streams output, [`format`]
//! frames streamed lines for the wire, and [`service`] ties them together.

pub mod executor;
pub mod format;
pub mod permissions;
pub mod resolver;
pub mod service;
pub mod shell;
pub mod subprocess;
