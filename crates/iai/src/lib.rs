//! An out-of-the-box assistant for exploring the projects of an Ignition
//! gateway, assembling the turn orchestrator, built-in tools, a model
//! provider and conversation storage.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring the assistant into your own host apps.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

mod session;
pub mod tools;

pub use session::{Session, SessionBuilder};

/// Re-exports of [`iai_core`] crate.
pub mod core {
    pub use iai_core::*;
}
