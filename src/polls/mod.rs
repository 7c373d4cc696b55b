//! Poll Engine
//!
//! Creates polls, applies concurrent votes, keeps the public tally
//! synchronized, and enforces the poll lifecycle through to private
//! result reporting and cleanup.

pub mod adapter;
pub mod config;
pub mod engine;
pub mod store;
pub mod tally;
pub mod votes;

pub use adapter::{AdapterError, DeliveryError, LoggingAdapter, NameResolver, PresentationAdapter};
pub use config::{PollAction, PollConfig, PollError, PollMeta};
pub use engine::{ActionReply, PollEngine, PollEngineStats, PollReport};
pub use store::{MemoryPollStore, PollStore, StoreError, VoteApplied};
pub use tally::{Tally, TallyAggregator, TallyEntry};
pub use votes::{VoteOutcome, VoteProcessor};
