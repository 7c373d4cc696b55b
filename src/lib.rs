//! pollgate
//!
//! Poll engine core for a chat-platform bot gateway: poll creation,
//! concurrent vote handling, live tally synchronization, timed and
//! manual termination, and private result reporting. The surrounding
//! bot (command parsing, message formatting, channel bindings) plugs in
//! through the [`polls::PresentationAdapter`] trait.

pub mod config;
pub mod logging;
pub mod polls;
