//! Tally Aggregator
//!
//! Reads the poll store and produces a ranked summary: per-option
//! counts, voter rosters, and the participant total. Used by the
//! periodic refresh (counts only, unless the poll publishes its running
//! tally) and by termination (full rosters).

use super::adapter::NameResolver;
use super::config::{PollError, PollMeta};
use super::store::PollStore;
use serde::Serialize;
use std::sync::Arc;

/// One option's slice of the tally.
#[derive(Debug, Clone, Serialize)]
pub struct TallyEntry {
    /// Option label
    pub option: String,
    /// Current voter count
    pub count: usize,
    /// Resolved voter display names, empty when rosters are withheld
    pub voters: Vec<String>,
}

/// Aggregated poll results.
#[derive(Debug, Clone, Serialize)]
pub struct Tally {
    /// Poll ID
    pub poll_id: String,
    /// Entries sorted by descending count; ties keep declaration order
    pub entries: Vec<TallyEntry>,
    /// Total participants across all options
    pub total_votes: usize,
}

impl Tally {
    /// An all-zero tally for a freshly created poll.
    pub fn empty(meta: &PollMeta) -> Self {
        Self {
            poll_id: meta.id.clone(),
            entries: meta
                .options
                .iter()
                .map(|option| TallyEntry {
                    option: option.clone(),
                    count: 0,
                    voters: Vec::new(),
                })
                .collect(),
            total_votes: 0,
        }
    }

    /// Render the final report text delivered privately to the owner.
    pub fn render_report(&self, title: &str) -> String {
        let mut out = format!("Results for \"{}\" — {} vote(s)\n", title, self.total_votes);
        for (rank, entry) in self.entries.iter().enumerate() {
            out.push_str(&format!(
                "{}. {} — {}",
                rank + 1,
                entry.option,
                entry.count
            ));
            if !entry.voters.is_empty() {
                out.push_str(&format!(" ({})", entry.voters.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

/// Computes tallies from the store, resolving voter names best-effort.
pub struct TallyAggregator {
    store: Arc<dyn PollStore>,
    names: Arc<dyn NameResolver>,
}

impl TallyAggregator {
    pub fn new(store: Arc<dyn PollStore>, names: Arc<dyn NameResolver>) -> Self {
        Self { store, names }
    }

    /// Compute the current tally for `meta`'s poll.
    ///
    /// With `include_voters`, each entry carries its roster of display
    /// names; a user whose name cannot be resolved appears under their
    /// raw id instead of aborting the tally.
    pub async fn compute(
        &self,
        meta: &PollMeta,
        include_voters: bool,
    ) -> Result<Tally, PollError> {
        let mut entries = Vec::with_capacity(meta.options.len());
        let mut total_votes = 0usize;

        // Options are read in declaration order; the stable sort below
        // preserves that order among equal counts.
        for option in &meta.options {
            let voter_ids = self.store.voters(&meta.id, option).await?;
            let count = voter_ids.len();
            total_votes += count;

            let voters = if include_voters {
                let mut names = Vec::with_capacity(voter_ids.len());
                for user_id in &voter_ids {
                    match self.names.display_name(user_id).await {
                        Some(name) => names.push(name),
                        None => names.push(user_id.clone()),
                    }
                }
                names
            } else {
                Vec::new()
            };

            entries.push(TallyEntry {
                option: option.clone(),
                count,
                voters,
            });
        }

        entries.sort_by(|a, b| b.count.cmp(&a.count));

        Ok(Tally {
            poll_id: meta.id.clone(),
            entries,
            total_votes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polls::config::PollConfig;
    use crate::polls::store::MemoryPollStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    struct MapResolver(HashMap<String, String>);

    #[async_trait]
    impl NameResolver for MapResolver {
        async fn display_name(&self, user_id: &str) -> Option<String> {
            self.0.get(user_id).cloned()
        }
    }

    async fn setup(options: Vec<&str>) -> (Arc<MemoryPollStore>, PollMeta) {
        let store = Arc::new(MemoryPollStore::new());
        let config =
            PollConfig::new("Question?", "chan-1", "guild-1", "owner").with_options(options);
        let meta = PollMeta::from_config("p1", &config);
        store
            .create_poll(meta.clone(), Duration::from_secs(86_400))
            .await
            .unwrap();
        (store, meta)
    }

    fn aggregator(store: &Arc<MemoryPollStore>, names: HashMap<String, String>) -> TallyAggregator {
        TallyAggregator::new(
            store.clone() as Arc<dyn PollStore>,
            Arc::new(MapResolver(names)),
        )
    }

    #[tokio::test]
    async fn test_counts_and_rosters() {
        let (store, meta) = setup(vec!["A", "B", "C"]).await;
        store.apply_vote("p1", "u1", "A").await.unwrap();
        store.apply_vote("p1", "u2", "B").await.unwrap();
        store.apply_vote("p1", "u3", "A").await.unwrap();

        let names = HashMap::from([
            ("u1".to_string(), "Uma".to_string()),
            ("u2".to_string(), "Viktor".to_string()),
            ("u3".to_string(), "Wen".to_string()),
        ]);
        let tally = aggregator(&store, names)
            .compute(&meta, true)
            .await
            .unwrap();

        assert_eq!(tally.total_votes, 3);
        assert_eq!(tally.entries[0].option, "A");
        assert_eq!(tally.entries[0].count, 2);
        assert_eq!(tally.entries[0].voters, vec!["Uma", "Wen"]);
        assert_eq!(tally.entries[1].option, "B");
        assert_eq!(tally.entries[1].count, 1);
        assert_eq!(tally.entries[2].option, "C");
        assert_eq!(tally.entries[2].count, 0);
    }

    #[tokio::test]
    async fn test_ties_keep_declaration_order() {
        let (store, meta) = setup(vec!["First", "Second", "Third"]).await;
        store.apply_vote("p1", "u1", "Third").await.unwrap();
        store.apply_vote("p1", "u2", "First").await.unwrap();

        let tally = aggregator(&store, HashMap::new())
            .compute(&meta, false)
            .await
            .unwrap();

        // First and Third tie at 1; First was declared earlier
        assert_eq!(tally.entries[0].option, "First");
        assert_eq!(tally.entries[1].option, "Third");
        assert_eq!(tally.entries[2].option, "Second");
    }

    #[tokio::test]
    async fn test_unresolvable_name_degrades_to_id() {
        let (store, meta) = setup(vec!["A", "B"]).await;
        store.apply_vote("p1", "u1", "A").await.unwrap();
        store.apply_vote("p1", "u2", "A").await.unwrap();

        let names = HashMap::from([("u1".to_string(), "Uma".to_string())]);
        let tally = aggregator(&store, names)
            .compute(&meta, true)
            .await
            .unwrap();

        assert_eq!(tally.entries[0].voters, vec!["Uma", "u2"]);
    }

    #[tokio::test]
    async fn test_rosters_withheld() {
        let (store, meta) = setup(vec!["A", "B"]).await;
        store.apply_vote("p1", "u1", "A").await.unwrap();

        let tally = aggregator(&store, HashMap::new())
            .compute(&meta, false)
            .await
            .unwrap();

        assert_eq!(tally.entries[0].count, 1);
        assert!(tally.entries[0].voters.is_empty());
    }

    #[tokio::test]
    async fn test_vote_detour_does_not_inflate_total() {
        let (store, meta) = setup(vec!["A", "B", "C"]).await;
        store.apply_vote("p1", "u1", "A").await.unwrap();
        store.apply_vote("p1", "u2", "B").await.unwrap();
        store.apply_vote("p1", "u3", "A").await.unwrap();
        // u1 moves to C; total stays 3
        store.apply_vote("p1", "u1", "C").await.unwrap();

        let tally = aggregator(&store, HashMap::new())
            .compute(&meta, false)
            .await
            .unwrap();

        assert_eq!(tally.total_votes, 3);
        let by_option: HashMap<_, _> = tally
            .entries
            .iter()
            .map(|e| (e.option.as_str(), e.count))
            .collect();
        assert_eq!(by_option["A"], 1);
        assert_eq!(by_option["B"], 1);
        assert_eq!(by_option["C"], 1);
    }

    #[test]
    fn test_render_report() {
        let tally = Tally {
            poll_id: "p1".to_string(),
            entries: vec![
                TallyEntry {
                    option: "A".to_string(),
                    count: 2,
                    voters: vec!["Uma".to_string(), "Wen".to_string()],
                },
                TallyEntry {
                    option: "B".to_string(),
                    count: 0,
                    voters: Vec::new(),
                },
            ],
            total_votes: 2,
        };

        let report = tally.render_report("Question?");
        assert!(report.contains("Results for \"Question?\""));
        assert!(report.contains("1. A — 2 (Uma, Wen)"));
        assert!(report.contains("2. B — 0"));
    }
}
