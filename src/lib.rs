//! Cascading country → state → city picker over a remote location lookup
//! service.
//!
//! - [`location`]: the remote lookups and shared vocabulary.
//! - [`cascade`]: the reset-cascade state machine and its async controller.
//! - [`server`]: a JSON HTTP facade over one controller session.
//! - [`config`]: settings from file, environment and flags.

pub mod cascade;
pub mod config;
pub mod location;
pub mod server;
