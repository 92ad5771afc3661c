//! An abstraction layer for generative model providers.
//!
//! This crate establishes an unified protocol for the orchestrator to
//! interact with the model endpoint, so that the conversation core never
//! depends on a concrete wire format.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.
//!
//! Content blocks are serializable with a `type` tag, which makes them
//! suitable for persisting a transcript as text and reading it back.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
