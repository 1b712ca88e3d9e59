//! Shared types for the chatrelay crates: messages, sessions, stream
//! deltas, character parameters, configuration, errors and trace events.

pub mod character;
pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod stream;
pub mod trace;
