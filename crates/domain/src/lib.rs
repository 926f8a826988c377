//! Shared types for the FieldRep assistant gateway.
//!
//! Everything that crosses a crate boundary lives here: configuration,
//! the error type, citation records, the wire protocol spoken between the
//! gateway and its clients, and structured trace events.

pub mod citation;
pub mod config;
pub mod error;
pub mod stream;
pub mod trace;
pub mod wire;
