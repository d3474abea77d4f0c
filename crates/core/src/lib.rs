//! Domain logic for the scriptgate service.
//!
//! Resolves allow-listed scripts, runs them as child processes (collected or
//! streamed line by line), and materializes the script directory from a
//! remote repository via a sparse checkout. Nothing in here knows about HTTP;
//! the `api` crate is a thin transport over [`scripting::service`] and
//! [`sync`].

pub mod config;
pub mod error;
pub mod scripting;
pub mod sync;
