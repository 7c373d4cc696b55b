//! Vote Transition Processor
//!
//! Validates and applies a single user's vote against the poll store:
//! first vote, vote change, or rejection. The store's atomic vote
//! transition keeps the choice index and the voter sets in agreement at
//! every instant.

use super::config::{PollError, PollMeta};
use super::store::{PollStore, VoteApplied};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What a successful vote submission did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First vote by this user in this poll.
    Accepted,
    /// The user moved from a previously selected option.
    Changed { from: String },
    /// The user re-picked the option they already had. Not an error;
    /// no state changed.
    Unchanged,
}

/// Applies vote transitions for one store.
pub struct VoteProcessor {
    store: Arc<dyn PollStore>,
    cooldown: Duration,
}

impl VoteProcessor {
    /// Create a processor with the given per-user vote cooldown.
    pub fn new(store: Arc<dyn PollStore>, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    /// Submit one user's vote for one poll.
    ///
    /// Every attempt that passes the cooldown gate stamps a fresh
    /// cooldown marker, including a repeat of the option the user
    /// already holds.
    pub async fn submit_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        option: &str,
    ) -> Result<VoteOutcome, PollError> {
        if !self
            .store
            .acquire_vote_cooldown(user_id, self.cooldown)
            .await?
        {
            return Err(PollError::RateLimited);
        }

        let meta = self
            .store
            .get_meta(poll_id)
            .await?
            .ok_or(PollError::PollNotFound)?;
        self.check_open(&meta)?;

        if !meta.has_option(option) {
            return Err(PollError::Validation(format!(
                "no such option: {}",
                option
            )));
        }

        let outcome = match self.store.apply_vote(poll_id, user_id, option).await? {
            // The poll closed between the open check and the transition
            VoteApplied::Rejected => return Err(PollError::PollClosed),
            VoteApplied::Applied { previous: None } => VoteOutcome::Accepted,
            VoteApplied::Applied {
                previous: Some(prev),
            } if prev == option => VoteOutcome::Unchanged,
            VoteApplied::Applied {
                previous: Some(prev),
            } => VoteOutcome::Changed { from: prev },
        };
        debug!(poll_id = %poll_id, user_id = %user_id, option = %option, outcome = ?outcome, "vote applied");
        Ok(outcome)
    }

    fn check_open(&self, meta: &PollMeta) -> Result<(), PollError> {
        if !meta.accepts_votes() {
            return Err(PollError::PollClosed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polls::config::PollConfig;
    use crate::polls::store::MemoryPollStore;

    const COOLDOWN: Duration = Duration::from_secs(3);
    const DAY: Duration = Duration::from_secs(86_400);

    async fn setup(poll_id: &str) -> (Arc<MemoryPollStore>, VoteProcessor) {
        let store = Arc::new(MemoryPollStore::new());
        let config = PollConfig::new("Question?", "chan-1", "guild-1", "owner")
            .with_options(vec!["A", "B", "C"]);
        store
            .create_poll(PollMeta::from_config(poll_id, &config), DAY)
            .await
            .unwrap();
        let processor = VoteProcessor::new(store.clone() as Arc<dyn PollStore>, COOLDOWN);
        (store, processor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_vote_accepted() {
        let (_store, processor) = setup("p1").await;
        let outcome = processor.submit_vote("p1", "u1", "A").await.unwrap();
        assert_eq!(outcome, VoteOutcome::Accepted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_second_submission() {
        let (store, processor) = setup("p1").await;

        processor.submit_vote("p1", "u1", "A").await.unwrap();
        let err = processor.submit_vote("p1", "u1", "B").await.unwrap_err();
        assert!(matches!(err, PollError::RateLimited));

        // Rejected submission mutated nothing
        assert_eq!(store.voters("p1", "A").await.unwrap(), vec!["u1"]);
        assert_eq!(store.voter_count("p1", "B").await.unwrap(), 0);

        // After the window the change goes through
        tokio::time::advance(Duration::from_secs(4)).await;
        let outcome = processor.submit_vote("p1", "u1", "B").await.unwrap();
        assert_eq!(
            outcome,
            VoteOutcome::Changed {
                from: "A".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_change_round_trip() {
        let (store, processor) = setup("p1").await;

        // A, then B, then back to A; net effect equals one vote for A
        for target in ["A", "B", "A"] {
            processor.submit_vote("p1", "u1", target).await.unwrap();
            tokio::time::advance(Duration::from_secs(4)).await;
        }

        assert_eq!(store.voters("p1", "A").await.unwrap(), vec!["u1"]);
        assert_eq!(store.voter_count("p1", "B").await.unwrap(), 0);
        assert_eq!(
            store.user_choice("p1", "u1").await.unwrap(),
            Some("A".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_same_option_unchanged() {
        let (store, processor) = setup("p1").await;

        processor.submit_vote("p1", "u1", "A").await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;

        let outcome = processor.submit_vote("p1", "u1", "A").await.unwrap();
        assert_eq!(outcome, VoteOutcome::Unchanged);
        assert_eq!(store.voter_count("p1", "A").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_poll_rejected() {
        let (_store, processor) = setup("p1").await;
        let err = processor.submit_vote("ghost", "u1", "A").await.unwrap_err();
        assert!(matches!(err, PollError::PollNotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_option_rejected() {
        let (store, processor) = setup("p1").await;
        let err = processor.submit_vote("p1", "u1", "Z").await.unwrap_err();
        assert!(matches!(err, PollError::Validation(_)));
        assert!(store.user_choice("p1", "u1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_end_time_rejected() {
        let store = Arc::new(MemoryPollStore::new());
        let config = PollConfig::new("Question?", "chan-1", "guild-1", "owner")
            .with_options(vec!["A", "B"])
            .with_time_limit(10);
        let mut meta = PollMeta::from_config("p1", &config);
        // End time already in the past
        meta.ends_at = Some(meta.created_at - 1000);
        store.create_poll(meta, DAY).await.unwrap();

        let processor = VoteProcessor::new(store.clone() as Arc<dyn PollStore>, COOLDOWN);
        let err = processor.submit_vote("p1", "u1", "A").await.unwrap_err();
        assert!(matches!(err, PollError::PollClosed));
        assert_eq!(store.voter_count("p1", "A").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ending_poll_rejected() {
        let (store, processor) = setup("p1").await;
        store.mark_ending("p1").await.unwrap();

        let err = processor.submit_vote("p1", "u1", "A").await.unwrap_err();
        assert!(matches!(err, PollError::PollClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_users_do_not_contend() {
        let (store, processor) = setup("p1").await;

        processor.submit_vote("p1", "u1", "A").await.unwrap();
        processor.submit_vote("p1", "u2", "A").await.unwrap();
        processor.submit_vote("p1", "u3", "B").await.unwrap();

        assert_eq!(store.voters("p1", "A").await.unwrap(), vec!["u1", "u2"]);
        assert_eq!(store.voters("p1", "B").await.unwrap(), vec!["u3"]);
    }
}
