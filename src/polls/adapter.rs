//! Presentation Adapter
//!
//! Seam between the poll engine and the surrounding bot framework. The
//! framework renders poll state as channel messages with vote buttons
//! and delivers private reports; the engine only ever talks to these
//! traits.

use super::config::PollMeta;
use super::tally::Tally;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Errors from rendering the public poll view
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The message or channel displaying the poll no longer exists.
    /// Signals the refresh loop to stop and clean the poll up.
    #[error("rendered surface is gone")]
    SurfaceGone,

    #[error("render failed: {0}")]
    RenderFailed(String),
}

/// Errors from delivering the private result report.
///
/// Delivery is best-effort: a failure is reported to the terminating
/// actor but never rolls back termination.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("recipient unreachable: {0}")]
    Unreachable(String),

    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Best-effort resolution of user ids to display names.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolve a display name from the hosting surface. `None` means
    /// resolution failed for this user; callers degrade to a
    /// placeholder rather than aborting.
    async fn display_name(&self, user_id: &str) -> Option<String>;
}

/// Outbound interface to the bot framework.
#[async_trait]
pub trait PresentationAdapter: NameResolver {
    /// Render or update the public poll view. On a final render the
    /// voting controls must be presented as disabled. Returns the id of
    /// the message now displaying the poll.
    async fn render_poll(
        &self,
        meta: &PollMeta,
        tally: &Tally,
        is_final: bool,
    ) -> Result<String, AdapterError>;

    /// Deliver the final result report privately to `recipient`.
    async fn deliver_private_report(
        &self,
        recipient: &str,
        report: &str,
    ) -> Result<(), DeliveryError>;

    /// Whether `user_id` holds elevated standing on the hosting
    /// surface (may end polls they did not create).
    async fn is_surface_admin(&self, user_id: &str, channel_id: &str, guild_id: &str) -> bool;
}

/// Type-erased adapter handle
pub type DynAdapter = Arc<dyn PresentationAdapter>;

/// Adapter that only logs. Used by the binary skeleton and anywhere a
/// real channel binding is not wired up yet.
#[derive(Debug, Default)]
pub struct LoggingAdapter;

#[async_trait]
impl NameResolver for LoggingAdapter {
    async fn display_name(&self, _user_id: &str) -> Option<String> {
        None
    }
}

#[async_trait]
impl PresentationAdapter for LoggingAdapter {
    async fn render_poll(
        &self,
        meta: &PollMeta,
        tally: &Tally,
        is_final: bool,
    ) -> Result<String, AdapterError> {
        info!(
            poll_id = %meta.id,
            channel = %meta.channel_id,
            total_votes = tally.total_votes,
            is_final,
            "render poll"
        );
        Ok(meta
            .message_id
            .clone()
            .unwrap_or_else(|| format!("log:{}", meta.id)))
    }

    async fn deliver_private_report(
        &self,
        recipient: &str,
        report: &str,
    ) -> Result<(), DeliveryError> {
        info!(recipient = %recipient, report = %report, "private report");
        Ok(())
    }

    async fn is_surface_admin(&self, _user_id: &str, _channel_id: &str, _guild_id: &str) -> bool {
        false
    }
}
