//! Poll Lifecycle Manager
//!
//! Owns poll creation, the per-poll refresh loop, the optional end
//! timer, and termination. Each active poll gets one cancellation token
//! held in the engine's task registry; the engine is the only component
//! that mutates that registry.

use crate::config::PollSettings;
use crate::polls::adapter::{AdapterError, DynAdapter, PresentationAdapter};
use crate::polls::config::{PollAction, PollConfig, PollError, PollMeta};
use crate::polls::store::PollStore;
use crate::polls::tally::{Tally, TallyAggregator};
use crate::polls::votes::{VoteOutcome, VoteProcessor};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What caused a poll to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTrigger {
    /// An authorized user ended the poll early
    Manual,
    /// The configured end timer fired
    Timer,
}

/// Outcome of a completed termination.
#[derive(Debug, Clone)]
pub struct PollReport {
    /// Final tally with full voter rosters
    pub tally: Tally,
    /// Whether the private report reached the poll owner. Delivery is
    /// best-effort; `false` never undoes the termination.
    pub report_delivered: bool,
}

/// Reply to a dispatched [`PollAction`].
#[derive(Debug)]
pub enum ActionReply {
    Created { poll_id: String },
    Voted(VoteOutcome),
    Ended(PollReport),
}

/// Running-task state for one active poll.
struct PollHandle {
    cancel: CancellationToken,
}

/// Counts of engine activity since start.
#[derive(Debug, Clone, Default)]
pub struct PollEngineStats {
    pub active_polls: usize,
    pub polls_created: u64,
    pub polls_ended: u64,
    pub votes_accepted: u64,
}

/// What a single refresh tick observed.
enum RefreshStatus {
    Rendered,
    PollGone,
    SurfaceGone,
}

/// Poll engine: the lifecycle manager over one store and one adapter.
pub struct PollEngine {
    store: Arc<dyn PollStore>,
    adapter: DynAdapter,
    votes: VoteProcessor,
    tally: TallyAggregator,
    settings: PollSettings,
    handles: Mutex<HashMap<String, PollHandle>>,
    polls_created: AtomicU64,
    polls_ended: AtomicU64,
    votes_accepted: AtomicU64,
}

impl PollEngine {
    /// Create an engine over the given store and presentation adapter.
    pub fn new<A>(store: Arc<dyn PollStore>, adapter: Arc<A>, settings: PollSettings) -> Arc<Self>
    where
        A: PresentationAdapter + 'static,
    {
        let votes = VoteProcessor::new(store.clone(), settings.vote_cooldown());
        let tally = TallyAggregator::new(store.clone(), adapter.clone());
        Arc::new(Self {
            store,
            adapter,
            votes,
            tally,
            settings,
            handles: Mutex::new(HashMap::new()),
            polls_created: AtomicU64::new(0),
            polls_ended: AtomicU64::new(0),
            votes_accepted: AtomicU64::new(0),
        })
    }

    /// Dispatch a boundary action to the matching operation.
    pub async fn handle(self: &Arc<Self>, action: PollAction) -> Result<ActionReply, PollError> {
        match action {
            PollAction::CreatePoll { config } => {
                let poll_id = self.create_poll(config).await?;
                Ok(ActionReply::Created { poll_id })
            }
            PollAction::SubmitVote {
                poll_id,
                user_id,
                option,
            } => {
                let outcome = self.submit_vote(&poll_id, &user_id, &option).await?;
                Ok(ActionReply::Voted(outcome))
            }
            PollAction::ManualEnd { poll_id, user_id } => {
                let report = self.end_poll(&poll_id, &user_id).await?;
                Ok(ActionReply::Ended(report))
            }
        }
    }

    /// Create a poll: validate, persist, render the initial view, and
    /// start the refresh loop plus the end timer if a limit was set.
    pub async fn create_poll(self: &Arc<Self>, config: PollConfig) -> Result<String, PollError> {
        config.validate(&self.settings)?;

        let poll_id = uuid::Uuid::new_v4().to_string();
        let meta = PollMeta::from_config(&poll_id, &config);

        // Time-boxed polls outlive their limit by the grace period;
        // untimed polls get the safety expiry.
        let expiry = match config.time_limit_secs {
            Some(limit) => std::time::Duration::from_secs(limit) + self.settings.grace_period(),
            None => self.settings.default_expiry(),
        };
        self.store.create_poll(meta.clone(), expiry).await?;

        match self
            .adapter
            .render_poll(&meta, &Tally::empty(&meta), false)
            .await
        {
            Ok(message_id) => {
                // The poll is live either way; the refresh loop
                // re-records the id on its next tick.
                if let Err(e) = self.store.set_message_id(&poll_id, &message_id).await {
                    warn!(poll_id = %poll_id, error = %e, "recording poll message id failed");
                }
            }
            Err(e) => {
                // The refresh loop retries or cleans up shortly.
                warn!(poll_id = %poll_id, error = %e, "initial poll render failed");
            }
        }

        let cancel = CancellationToken::new();
        self.handles.lock().insert(
            poll_id.clone(),
            PollHandle {
                cancel: cancel.clone(),
            },
        );

        let engine = self.clone();
        let id = poll_id.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            engine.refresh_loop(&id, token).await;
        });

        if let Some(limit) = config.time_limit_secs {
            let engine = self.clone();
            let id = poll_id.clone();
            tokio::spawn(async move {
                engine
                    .end_timer(&id, std::time::Duration::from_secs(limit), cancel)
                    .await;
            });
        }

        self.polls_created.fetch_add(1, Ordering::Relaxed);
        info!(poll_id = %poll_id, channel = %meta.channel_id, options = meta.options.len(), "poll created");
        Ok(poll_id)
    }

    /// Cast or change a vote. See [`VoteProcessor::submit_vote`].
    pub async fn submit_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        option: &str,
    ) -> Result<VoteOutcome, PollError> {
        let outcome = self.votes.submit_vote(poll_id, user_id, option).await?;
        if !matches!(outcome, VoteOutcome::Unchanged) {
            self.votes_accepted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    /// Manually end a poll. The acting user must be the creator or hold
    /// elevated standing on the hosting surface.
    pub async fn end_poll(
        self: &Arc<Self>,
        poll_id: &str,
        acting_user: &str,
    ) -> Result<PollReport, PollError> {
        let meta = self
            .store
            .get_meta(poll_id)
            .await?
            .ok_or(PollError::PollNotFound)?;

        if acting_user != meta.created_by
            && !self
                .adapter
                .is_surface_admin(acting_user, &meta.channel_id, &meta.guild_id)
                .await
        {
            return Err(PollError::Unauthorized);
        }

        self.finalize(poll_id, EndTrigger::Manual).await
    }

    /// Ids of polls this engine currently runs tasks for.
    pub fn active_polls(&self) -> Vec<String> {
        self.handles.lock().keys().cloned().collect()
    }

    /// Engine activity counters.
    pub fn stats(&self) -> PollEngineStats {
        PollEngineStats {
            active_polls: self.handles.lock().len(),
            polls_created: self.polls_created.load(Ordering::Relaxed),
            polls_ended: self.polls_ended.load(Ordering::Relaxed),
            votes_accepted: self.votes_accepted.load(Ordering::Relaxed),
        }
    }

    /// Cancel every active poll task. Store state is left to expire on
    /// its own; this only stops this process's loops and timers.
    pub fn shutdown(&self) {
        let mut handles = self.handles.lock();
        for (poll_id, handle) in handles.drain() {
            debug!(poll_id = %poll_id, "cancelling poll tasks");
            handle.cancel.cancel();
        }
    }

    /// Drive the poll into `ENDING` and finish it: exactly one caller
    /// wins the `mark_ending` race; every other trigger observes
    /// `AlreadyEnded` and must not re-process.
    async fn finalize(
        self: &Arc<Self>,
        poll_id: &str,
        trigger: EndTrigger,
    ) -> Result<PollReport, PollError> {
        if !self.store.mark_ending(poll_id).await? {
            return Err(PollError::AlreadyEnded);
        }
        self.remove_handle(poll_id);

        let meta = self
            .store
            .get_meta(poll_id)
            .await?
            .ok_or(PollError::PollNotFound)?;

        let tally = self.tally.compute(&meta, true).await?;

        if let Err(e) = self.adapter.render_poll(&meta, &tally, true).await {
            warn!(poll_id = %poll_id, error = %e, "final render failed");
        }

        let report = tally.render_report(&meta.title);
        let report_delivered = match self
            .adapter
            .deliver_private_report(&meta.created_by, &report)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(poll_id = %poll_id, recipient = %meta.created_by, error = %e, "report delivery failed");
                false
            }
        };

        // Keep the entries around for late readers, then drop them.
        let store = self.store.clone();
        let grace = self.settings.grace_period();
        let id = poll_id.to_string();
        tokio::spawn(async move {
            sleep(grace).await;
            if let Err(e) = store.delete_poll(&id).await {
                warn!(poll_id = %id, error = %e, "scheduled poll deletion failed");
            }
        });

        self.polls_ended.fetch_add(1, Ordering::Relaxed);
        info!(poll_id = %poll_id, trigger = ?trigger, total_votes = tally.total_votes, report_delivered, "poll ended");

        Ok(PollReport {
            tally,
            report_delivered,
        })
    }

    /// One-shot auto-termination task for time-boxed polls.
    async fn end_timer(
        self: &Arc<Self>,
        poll_id: &str,
        limit: std::time::Duration,
        cancel: CancellationToken,
    ) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(limit) => {}
        }

        // The poll may already be gone or ended; check before acting.
        match self.store.get_meta(poll_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(poll_id = %poll_id, "end timer fired for deleted poll");
                return;
            }
            Err(e) => {
                warn!(poll_id = %poll_id, error = %e, "end timer could not read poll");
                return;
            }
        }

        match self.finalize(poll_id, EndTrigger::Timer).await {
            Ok(_) => {}
            Err(PollError::AlreadyEnded) => {
                debug!(poll_id = %poll_id, "end timer lost termination race");
            }
            Err(e) => {
                warn!(poll_id = %poll_id, error = %e, "timed termination failed");
            }
        }
    }

    /// Periodic public-view refresh for one poll. Runs until the token
    /// cancels, the poll or its surface disappears, the store fails
    /// repeatedly, or the hard safety cutoff elapses.
    async fn refresh_loop(self: &Arc<Self>, poll_id: &str, cancel: CancellationToken) {
        let mut ticker = interval(self.settings.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        let mut store_failures: u32 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(poll_id = %poll_id, "refresh loop cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if started.elapsed() >= self.settings.safety_cutoff() {
                warn!(poll_id = %poll_id, "refresh loop hit safety cutoff");
                self.remove_handle(poll_id);
                return;
            }

            match self.refresh_once(poll_id).await {
                Ok(RefreshStatus::Rendered) => {
                    store_failures = 0;
                }
                Ok(RefreshStatus::PollGone) => {
                    debug!(poll_id = %poll_id, "poll gone, stopping refresh");
                    self.remove_handle(poll_id);
                    return;
                }
                Ok(RefreshStatus::SurfaceGone) => {
                    warn!(poll_id = %poll_id, "poll surface gone, cleaning up");
                    if let Err(e) = self.store.delete_poll(poll_id).await {
                        warn!(poll_id = %poll_id, error = %e, "cleanup after lost surface failed");
                    }
                    self.remove_handle(poll_id);
                    return;
                }
                Err(e) => {
                    store_failures += 1;
                    warn!(poll_id = %poll_id, error = %e, failures = store_failures, "refresh tick failed");
                    if store_failures >= self.settings.store_failure_limit {
                        warn!(poll_id = %poll_id, "too many store failures, stopping refresh");
                        self.remove_handle(poll_id);
                        return;
                    }
                }
            }
        }
    }

    async fn refresh_once(&self, poll_id: &str) -> Result<RefreshStatus, PollError> {
        let meta = match self.store.get_meta(poll_id).await? {
            Some(meta) => meta,
            None => return Ok(RefreshStatus::PollGone),
        };
        if meta.ending {
            // Termination owns the final render.
            return Ok(RefreshStatus::PollGone);
        }

        // Rosters stay hidden until termination; whether the running
        // counts are shown at all is the renderer's call, driven by
        // `meta.show_running_tally`.
        let tally = self.tally.compute(&meta, false).await?;

        match self.adapter.render_poll(&meta, &tally, false).await {
            Ok(message_id) => {
                if meta.message_id.as_deref() != Some(message_id.as_str()) {
                    self.store.set_message_id(poll_id, &message_id).await?;
                }
                Ok(RefreshStatus::Rendered)
            }
            Err(AdapterError::SurfaceGone) => Ok(RefreshStatus::SurfaceGone),
            Err(e) => {
                warn!(poll_id = %poll_id, error = %e, "render failed, will retry");
                Ok(RefreshStatus::Rendered)
            }
        }
    }

    fn remove_handle(&self, poll_id: &str) {
        if let Some(handle) = self.handles.lock().remove(poll_id) {
            handle.cancel.cancel();
        }
    }
}
