//! chatrelay gateway: the completion relay, the turn orchestrator, and the
//! command-line front end that drives them.

pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
