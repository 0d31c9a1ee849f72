//! Session history index
//!
//! Read-side shaping over the persistence layer: deduplicated listings,
//! search pass-through, and recency bucketing for display. Nothing here
//! mutates stored sessions.

use crate::error::{ParlanceError, Result};
use crate::persistence::{ConversationSummary, PersistenceService, SearchHit};
use chrono::{DateTime, Datelike, Duration, TimeZone};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Default number of summaries fetched per listing
const DEFAULT_LIST_LIMIT: usize = 50;

/// Default number of search hits fetched per query
const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Upper bound on summaries scanned when resolving an id prefix
const RESOLVE_SCAN_LIMIT: usize = 1000;

/// Read-side view over saved sessions
pub struct HistoryIndex {
    persistence: Arc<dyn PersistenceService>,
    user_id: String,
}

impl HistoryIndex {
    /// Creates an index scoped to one user
    pub fn new(persistence: Arc<dyn PersistenceService>, user_id: impl Into<String>) -> Self {
        Self {
            persistence,
            user_id: user_id.into(),
        }
    }

    /// Lists summaries, newest first, deduplicated by id
    pub async fn list(&self, include_archived: bool) -> Result<Vec<ConversationSummary>> {
        let summaries = self
            .persistence
            .get_conversations(&self.user_id, DEFAULT_LIST_LIMIT, include_archived)
            .await?;
        Ok(dedup_by_recency(summaries))
    }

    /// Searches titles and message bodies
    ///
    /// Hits are returned in the backing store's rank order; the index
    /// never re-ranks them.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.persistence
            .search_conversations(&self.user_id, query, DEFAULT_SEARCH_LIMIT)
            .await
    }

    /// Resolves a possibly-shortened session id to its full form
    ///
    /// Listings shorten ids for display; delete, archive, and resume
    /// accept such a prefix as long as it matches exactly one session.
    /// Archived sessions participate so an archived id can still be
    /// unarchived.
    pub async fn resolve_id(&self, input: &str) -> Result<String> {
        let summaries = self
            .persistence
            .get_conversations(&self.user_id, RESOLVE_SCAN_LIMIT, true)
            .await?;
        resolve_id_prefix(&summaries, input)
    }
}

/// Matches an id prefix against summaries, requiring uniqueness
fn resolve_id_prefix(summaries: &[ConversationSummary], input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(ParlanceError::Storage("empty session id".to_string()).into());
    }
    let mut matches = summaries.iter().filter(|s| s.id.starts_with(input));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Ok(only.id.clone()),
        (Some(_), Some(_)) => Err(ParlanceError::Storage(format!(
            "session id prefix is ambiguous: {}",
            input
        ))
        .into()),
        (None, _) => {
            Err(ParlanceError::Storage(format!("session not found: {}", input)).into())
        }
    }
}

/// Collapses duplicate ids, keeping the entry with the larger `updated_at`
///
/// The result is sorted newest-updated-first. Keeping the larger
/// timestamp makes the operation commutative: feeding the same
/// summaries in any order produces the same listing.
pub fn dedup_by_recency(summaries: Vec<ConversationSummary>) -> Vec<ConversationSummary> {
    let mut by_id: HashMap<String, ConversationSummary> = HashMap::new();
    for summary in summaries {
        match by_id.get(&summary.id) {
            Some(existing) if existing.updated_at >= summary.updated_at => {}
            _ => {
                by_id.insert(summary.id.clone(), summary);
            }
        }
    }

    let mut deduped: Vec<ConversationSummary> = by_id.into_values().collect();
    deduped.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    deduped
}

/// Display bucket for a session's last activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecencyBucket {
    Today,
    Yesterday,
    ThisWeek,
    ThisMonth,
    Older,
}

impl RecencyBucket {
    /// All buckets in display order
    pub const ORDER: [RecencyBucket; 5] = [
        RecencyBucket::Today,
        RecencyBucket::Yesterday,
        RecencyBucket::ThisWeek,
        RecencyBucket::ThisMonth,
        RecencyBucket::Older,
    ];
}

impl fmt::Display for RecencyBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecencyBucket::Today => "Today",
            RecencyBucket::Yesterday => "Yesterday",
            RecencyBucket::ThisWeek => "This week",
            RecencyBucket::ThisMonth => "This month",
            RecencyBucket::Older => "Older",
        };
        write!(f, "{}", label)
    }
}

/// Buckets summaries by how recently they were updated
///
/// Boundaries are local-day boundaries of `now`; the timezone is a
/// parameter so tests can pin it. Each summary lands in exactly one
/// bucket, checked in `ORDER`: same local date is Today; the previous
/// local date is Yesterday; within the last seven days is ThisWeek;
/// the same local calendar month is ThisMonth; everything else Older.
/// Empty buckets are omitted.
pub fn group_by_recency<Tz: TimeZone>(
    summaries: Vec<ConversationSummary>,
    now: DateTime<Tz>,
) -> Vec<(RecencyBucket, Vec<ConversationSummary>)> {
    let mut buckets: HashMap<RecencyBucket, Vec<ConversationSummary>> = HashMap::new();
    for summary in summaries {
        let bucket = bucket_for(&summary, &now);
        buckets.entry(bucket).or_default().push(summary);
    }

    RecencyBucket::ORDER
        .iter()
        .filter_map(|bucket| buckets.remove(bucket).map(|entries| (*bucket, entries)))
        .collect()
}

fn bucket_for<Tz: TimeZone>(summary: &ConversationSummary, now: &DateTime<Tz>) -> RecencyBucket {
    let updated = summary.updated_at.with_timezone(&now.timezone());
    let today = now.date_naive();
    let updated_date = updated.date_naive();

    if updated_date == today {
        RecencyBucket::Today
    } else if updated_date == today - Duration::days(1) {
        RecencyBucket::Yesterday
    } else if updated >= now.clone() - Duration::days(7) {
        RecencyBucket::ThisWeek
    } else if updated_date.year() == today.year() && updated_date.month() == today.month() {
        RecencyBucket::ThisMonth
    } else {
        RecencyBucket::Older
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn summary(id: &str, updated_at: DateTime<Utc>) -> ConversationSummary {
        ConversationSummary {
            id: id.to_string(),
            user_id: "alice".to_string(),
            agent_id: "assistant".to_string(),
            title: Some(id.to_string()),
            created_at: updated_at,
            updated_at,
            message_count: 0,
            archived: false,
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_dedup_keeps_larger_updated_at() {
        let older = summary("a", at(2026, 3, 1, 10));
        let newer = summary("a", at(2026, 3, 2, 10));

        let deduped = dedup_by_recency(vec![older.clone(), newer.clone()]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].updated_at, newer.updated_at);

        // Commutative: reversed input produces the same result
        let reversed = dedup_by_recency(vec![newer.clone(), older]);
        assert_eq!(reversed[0].updated_at, newer.updated_at);
    }

    #[test]
    fn test_dedup_sorts_newest_first() {
        let deduped = dedup_by_recency(vec![
            summary("a", at(2026, 3, 1, 10)),
            summary("b", at(2026, 3, 3, 10)),
            summary("c", at(2026, 3, 2, 10)),
        ]);
        let ids: Vec<&str> = deduped.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_resolve_id_prefix_unique_match() {
        let summaries = vec![
            summary("3f2a9c11-aaaa", at(2026, 3, 1, 10)),
            summary("8b40d7e2-bbbb", at(2026, 3, 2, 10)),
        ];
        let resolved = resolve_id_prefix(&summaries, "3f2a9c11").unwrap();
        assert_eq!(resolved, "3f2a9c11-aaaa");

        // A full id resolves to itself
        let resolved = resolve_id_prefix(&summaries, "8b40d7e2-bbbb").unwrap();
        assert_eq!(resolved, "8b40d7e2-bbbb");
    }

    #[test]
    fn test_resolve_id_prefix_ambiguous_is_an_error() {
        let summaries = vec![
            summary("3f2a9c11-aaaa", at(2026, 3, 1, 10)),
            summary("3f2a9c11-bbbb", at(2026, 3, 2, 10)),
        ];
        let err = resolve_id_prefix(&summaries, "3f2a").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_resolve_id_prefix_no_match_is_an_error() {
        let summaries = vec![summary("3f2a9c11-aaaa", at(2026, 3, 1, 10))];
        let err = resolve_id_prefix(&summaries, "ffff").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_resolve_id_prefix_rejects_empty_input() {
        let summaries = vec![summary("3f2a9c11-aaaa", at(2026, 3, 1, 10))];
        assert!(resolve_id_prefix(&summaries, "").is_err());
    }

    #[test]
    fn test_bucket_local_midnight_is_today() {
        let now = at(2026, 3, 5, 15);
        let s = summary("a", at(2026, 3, 5, 0));
        assert_eq!(bucket_for(&s, &now), RecencyBucket::Today);
    }

    #[test]
    fn test_bucket_yesterday() {
        let now = at(2026, 3, 5, 15);
        let s = summary("a", at(2026, 3, 4, 23));
        assert_eq!(bucket_for(&s, &now), RecencyBucket::Yesterday);
    }

    #[test]
    fn test_bucket_within_seven_days_is_this_week() {
        let now = at(2026, 3, 5, 15);
        let s = summary("a", at(2026, 3, 1, 10));
        assert_eq!(bucket_for(&s, &now), RecencyBucket::ThisWeek);
    }

    #[test]
    fn test_bucket_eight_days_across_month_boundary_is_older() {
        // Eight days before March 5 is February 25: not this week, and
        // not this calendar month either.
        let now = at(2026, 3, 5, 15);
        let s = summary("a", at(2026, 2, 25, 10));
        assert_eq!(bucket_for(&s, &now), RecencyBucket::Older);
    }

    #[test]
    fn test_bucket_same_month_beyond_week_is_this_month() {
        let now = at(2026, 3, 25, 15);
        let s = summary("a", at(2026, 3, 2, 10));
        assert_eq!(bucket_for(&s, &now), RecencyBucket::ThisMonth);
    }

    #[test]
    fn test_bucket_previous_year_same_month_is_older() {
        let now = at(2026, 3, 25, 15);
        let s = summary("a", at(2025, 3, 25, 15));
        assert_eq!(bucket_for(&s, &now), RecencyBucket::Older);
    }

    #[test]
    fn test_group_by_recency_omits_empty_buckets_and_orders() {
        let now = at(2026, 3, 5, 15);
        let grouped = group_by_recency(
            vec![
                summary("old", at(2025, 6, 1, 10)),
                summary("today", at(2026, 3, 5, 8)),
            ],
            now,
        );

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, RecencyBucket::Today);
        assert_eq!(grouped[0].1[0].id, "today");
        assert_eq!(grouped[1].0, RecencyBucket::Older);
        assert_eq!(grouped[1].1[0].id, "old");
    }

    #[test]
    fn test_each_summary_lands_in_exactly_one_bucket() {
        let now = at(2026, 3, 15, 12);
        let summaries: Vec<ConversationSummary> = (0..30)
            .map(|i| summary(&format!("s{}", i), now - Duration::days(i)))
            .collect();

        let grouped = group_by_recency(summaries, now);
        let total: usize = grouped.iter().map(|(_, entries)| entries.len()).sum();
        assert_eq!(total, 30);
    }
}
