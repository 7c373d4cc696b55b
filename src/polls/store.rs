//! Poll Store
//!
//! Abstraction over the shared, expiring key-value store that owns all
//! poll state: metadata, per-option voter sets, the per-user choice
//! index, and vote-cooldown markers. Every entry carries an expiry so
//! abandoned polls clean themselves up.
//!
//! The store is the only shared mutable resource in the subsystem; all
//! mutation goes through the vote processor or the lifecycle engine.

use super::config::PollMeta;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result of atomically applying a vote (see [`PollStore::apply_vote`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteApplied {
    /// The transition ran. `previous` is the option the user held
    /// before this vote, if any.
    Applied { previous: Option<String> },
    /// The poll is absent or already ending; nothing was changed.
    Rejected,
}

/// Shared expiring store for poll state.
///
/// Conceptual key space: `poll:{id}:meta`, `poll:{id}:voters:{option}`,
/// `poll:{id}:choice`, `cooldown:vote:{user_id}`. All operations are
/// async I/O against the shared store; none holds a lock across an
/// await point.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Write metadata and empty voter sets for a new poll. `expiry`
    /// bounds the lifetime of every key belonging to this poll.
    async fn create_poll(&self, meta: PollMeta, expiry: Duration) -> StoreResult<()>;

    /// Fetch metadata. `None` covers never-existed, expired, and deleted.
    async fn get_meta(&self, poll_id: &str) -> StoreResult<Option<PollMeta>>;

    /// Record the public message currently displaying the poll.
    async fn set_message_id(&self, poll_id: &str, message_id: &str) -> StoreResult<()>;

    /// Conditionally set the `ending` flag. Returns `true` only for the
    /// caller that actually flipped it; a racing second caller gets
    /// `false`. This is the first-trigger-wins termination guard.
    async fn mark_ending(&self, poll_id: &str) -> StoreResult<bool>;

    /// Add a user to an option's voter set (no-op if already present).
    async fn add_voter(&self, poll_id: &str, option: &str, user_id: &str) -> StoreResult<()>;

    /// Remove a user from an option's voter set (no-op if absent).
    async fn remove_voter(&self, poll_id: &str, option: &str, user_id: &str) -> StoreResult<()>;

    /// Current size of an option's voter set.
    async fn voter_count(&self, poll_id: &str, option: &str) -> StoreResult<usize>;

    /// Members of an option's voter set, in insertion order.
    async fn voters(&self, poll_id: &str, option: &str) -> StoreResult<Vec<String>>;

    /// The option a user currently has selected, if any.
    async fn user_choice(&self, poll_id: &str, user_id: &str) -> StoreResult<Option<String>>;

    /// Record a user's current selection in the choice index.
    async fn set_user_choice(&self, poll_id: &str, user_id: &str, option: &str)
        -> StoreResult<()>;

    /// Atomically move a user onto `option`: read their current choice,
    /// remove them from the old option's voter set, add them to the new
    /// one, and update the choice index, as one transaction. No
    /// concurrent reader can observe a partial application, and two
    /// submissions by the same user serialize here (later one wins).
    ///
    /// The `ending` flag is re-checked inside the same transaction, so
    /// a submission racing a termination cannot land after the final
    /// tally; it observes [`VoteApplied::Rejected`] instead.
    ///
    /// On success, returns the user's previous choice. A repeat of the
    /// same option changes nothing and reports `previous == Some(option)`.
    async fn apply_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        option: &str,
    ) -> StoreResult<VoteApplied>;

    /// Remove metadata, all voter sets, and the choice index.
    /// Idempotent: deleting an absent poll is a no-op.
    async fn delete_poll(&self, poll_id: &str) -> StoreResult<()>;

    /// Claim the per-user vote cooldown slot. Returns `true` if the
    /// marker was created (the vote may proceed) or `false` if one is
    /// still live. The marker expires on its own after `ttl`.
    async fn acquire_vote_cooldown(&self, user_id: &str, ttl: Duration) -> StoreResult<bool>;
}

/// All state belonging to one poll, expiring as a unit.
#[derive(Debug)]
struct PollRecord {
    meta: PollMeta,
    /// option label -> voter user ids, insertion order, set semantics
    voters: HashMap<String, Vec<String>>,
    /// user id -> currently selected option label
    choices: HashMap<String, String>,
    expires_at: Instant,
}

/// In-process implementation of [`PollStore`].
///
/// Expiry is enforced lazily: any access to an expired record evicts it
/// first, so callers observe the same "absent" they would get from a
/// TTL-based external store.
#[derive(Debug, Default)]
pub struct MemoryPollStore {
    polls: Mutex<HashMap<String, PollRecord>>,
    cooldowns: Mutex<HashMap<String, Instant>>,
}

impl MemoryPollStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` over the live record for `poll_id`, evicting it first if
    /// its expiry has passed.
    fn with_live<T>(&self, poll_id: &str, f: impl FnOnce(&mut PollRecord) -> T) -> Option<T> {
        let mut polls = self.polls.lock();
        let expired = polls
            .get(poll_id)
            .map(|r| r.expires_at <= Instant::now())
            .unwrap_or(false);
        if expired {
            polls.remove(poll_id);
            return None;
        }
        polls.get_mut(poll_id).map(f)
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn create_poll(&self, meta: PollMeta, expiry: Duration) -> StoreResult<()> {
        let mut voters = HashMap::new();
        for option in &meta.options {
            voters.insert(option.clone(), Vec::new());
        }
        let now = Instant::now();
        let record = PollRecord {
            meta: meta.clone(),
            voters,
            choices: HashMap::new(),
            expires_at: now + expiry,
        };
        let mut polls = self.polls.lock();
        // Lazy eviction only fires on access; sweep the rest here so
        // records nobody reads again do not accumulate.
        polls.retain(|_, r| r.expires_at > now);
        polls.insert(meta.id, record);
        Ok(())
    }

    async fn get_meta(&self, poll_id: &str) -> StoreResult<Option<PollMeta>> {
        Ok(self.with_live(poll_id, |r| r.meta.clone()))
    }

    async fn set_message_id(&self, poll_id: &str, message_id: &str) -> StoreResult<()> {
        self.with_live(poll_id, |r| {
            r.meta.message_id = Some(message_id.to_string());
        });
        Ok(())
    }

    async fn mark_ending(&self, poll_id: &str) -> StoreResult<bool> {
        Ok(self
            .with_live(poll_id, |r| {
                if r.meta.ending {
                    false
                } else {
                    r.meta.ending = true;
                    true
                }
            })
            .unwrap_or(false))
    }

    async fn add_voter(&self, poll_id: &str, option: &str, user_id: &str) -> StoreResult<()> {
        self.with_live(poll_id, |r| {
            let set = r.voters.entry(option.to_string()).or_default();
            if !set.iter().any(|u| u == user_id) {
                set.push(user_id.to_string());
            }
        });
        Ok(())
    }

    async fn remove_voter(&self, poll_id: &str, option: &str, user_id: &str) -> StoreResult<()> {
        self.with_live(poll_id, |r| {
            if let Some(set) = r.voters.get_mut(option) {
                set.retain(|u| u != user_id);
            }
        });
        Ok(())
    }

    async fn voter_count(&self, poll_id: &str, option: &str) -> StoreResult<usize> {
        Ok(self
            .with_live(poll_id, |r| {
                r.voters.get(option).map(|s| s.len()).unwrap_or(0)
            })
            .unwrap_or(0))
    }

    async fn voters(&self, poll_id: &str, option: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .with_live(poll_id, |r| r.voters.get(option).cloned().unwrap_or_default())
            .unwrap_or_default())
    }

    async fn user_choice(&self, poll_id: &str, user_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .with_live(poll_id, |r| r.choices.get(user_id).cloned())
            .flatten())
    }

    async fn set_user_choice(
        &self,
        poll_id: &str,
        user_id: &str,
        option: &str,
    ) -> StoreResult<()> {
        self.with_live(poll_id, |r| {
            r.choices.insert(user_id.to_string(), option.to_string());
        });
        Ok(())
    }

    async fn apply_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        option: &str,
    ) -> StoreResult<VoteApplied> {
        // The whole read-modify-write happens under the record lock, so
        // same-user submissions serialize and readers never see a user
        // in two voter sets.
        Ok(self
            .with_live(poll_id, |r| {
                if r.meta.ending {
                    return VoteApplied::Rejected;
                }
                let previous = r.choices.get(user_id).cloned();
                match previous.as_deref() {
                    Some(prev) if prev == option => {}
                    Some(prev) => {
                        if let Some(set) = r.voters.get_mut(prev) {
                            set.retain(|u| u != user_id);
                        }
                        let set = r.voters.entry(option.to_string()).or_default();
                        if !set.iter().any(|u| u == user_id) {
                            set.push(user_id.to_string());
                        }
                        r.choices.insert(user_id.to_string(), option.to_string());
                    }
                    None => {
                        let set = r.voters.entry(option.to_string()).or_default();
                        if !set.iter().any(|u| u == user_id) {
                            set.push(user_id.to_string());
                        }
                        r.choices.insert(user_id.to_string(), option.to_string());
                    }
                }
                VoteApplied::Applied { previous }
            })
            .unwrap_or(VoteApplied::Rejected))
    }

    async fn delete_poll(&self, poll_id: &str) -> StoreResult<()> {
        self.polls.lock().remove(poll_id);
        Ok(())
    }

    async fn acquire_vote_cooldown(&self, user_id: &str, ttl: Duration) -> StoreResult<bool> {
        let mut cooldowns = self.cooldowns.lock();
        let now = Instant::now();
        // Sweep spent markers so the map stays bounded by the set of
        // users active inside one cooldown window.
        cooldowns.retain(|_, deadline| *deadline > now);
        if cooldowns.contains_key(user_id) {
            return Ok(false);
        }
        cooldowns.insert(user_id.to_string(), now + ttl);
        Ok(true)
    }
}
