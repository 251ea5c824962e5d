use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};

use super::conversation::Conversation;

const DAY_SECONDS: i64 = 60 * 60 * 24;

/// Fixed elapsed-time window, listed in display precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelativeWindow {
    Today,
    Yesterday,
    Last7Days,
    Last30Days,
}

impl RelativeWindow {
    pub fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Yesterday => "Yesterday",
            Self::Last7Days => "Last 7 days",
            Self::Last30Days => "Last 30 days",
        }
    }

    fn max_age_seconds(self) -> i64 {
        match self {
            Self::Today => DAY_SECONDS,
            Self::Yesterday => DAY_SECONDS * 2,
            Self::Last7Days => DAY_SECONDS * 7,
            Self::Last30Days => DAY_SECONDS * 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryBucket {
    Relative(RelativeWindow),
    Month { year: i32, month: u32 },
}

/// Which relative windows apply before falling back to month-year buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingPolicy {
    windows: Vec<RelativeWindow>,
}

impl Default for GroupingPolicy {
    fn default() -> Self {
        Self::new(vec![
            RelativeWindow::Today,
            RelativeWindow::Yesterday,
            RelativeWindow::Last7Days,
            RelativeWindow::Last30Days,
        ])
    }
}

impl GroupingPolicy {
    pub fn new(mut windows: Vec<RelativeWindow>) -> Self {
        windows.sort();
        windows.dedup();
        Self { windows }
    }

    /// Relative windows up to one week; anything older is grouped by month.
    pub fn compact() -> Self {
        Self::new(vec![
            RelativeWindow::Today,
            RelativeWindow::Yesterday,
            RelativeWindow::Last7Days,
        ])
    }

    pub fn windows(&self) -> &[RelativeWindow] {
        &self.windows
    }

    pub fn classify(&self, date: DateTime<Utc>, now: DateTime<Utc>) -> HistoryBucket {
        // Elapsed-time windows keep grouping independent of the viewer's timezone.
        let age_seconds = (now - date).num_seconds().max(0);

        self.windows
            .iter()
            .find(|window| age_seconds < window.max_age_seconds())
            .map(|window| HistoryBucket::Relative(*window))
            .unwrap_or(HistoryBucket::Month {
                year: date.year(),
                month: date.month(),
            })
    }
}

/// Derived display group; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryGroup {
    pub bucket: HistoryBucket,
    pub label: String,
    pub entries: Vec<Conversation>,
}

/// Buckets conversations with the default policy.
pub fn group_conversations(conversations: &[Conversation], now: DateTime<Utc>) -> Vec<HistoryGroup> {
    group_conversations_with(conversations, now, &GroupingPolicy::default())
}

/// Buckets conversations into ordered, non-empty groups.
///
/// Relative windows come first in precedence order, then month-year buckets newest first.
/// Entries inside each group are ordered newest first.
pub fn group_conversations_with(
    conversations: &[Conversation],
    now: DateTime<Utc>,
    policy: &GroupingPolicy,
) -> Vec<HistoryGroup> {
    let mut groups: Vec<HistoryGroup> = Vec::new();

    for conversation in conversations {
        let bucket = policy.classify(conversation.date, now);
        match groups.iter_mut().find(|group| group.bucket == bucket) {
            Some(group) => group.entries.push(conversation.clone()),
            None => groups.push(HistoryGroup {
                bucket,
                label: bucket_label(bucket, conversation.date),
                entries: vec![conversation.clone()],
            }),
        }
    }

    for group in &mut groups {
        group.entries.sort_by(newest_first);
    }
    groups.retain(|group| !group.entries.is_empty());
    groups.sort_by(|left, right| bucket_order(left.bucket, right.bucket));
    groups
}

/// Appends a fetched page, skipping conversations already present by id.
///
/// Returns the number of conversations actually appended.
pub fn merge_page(existing: &mut Vec<Conversation>, page: Vec<Conversation>) -> usize {
    let mut known = existing
        .iter()
        .map(|conversation| conversation.id.clone())
        .collect::<HashSet<_>>();
    let before = existing.len();

    for conversation in page {
        if known.insert(conversation.id.clone()) {
            existing.push(conversation);
        }
    }

    existing.len() - before
}

/// Case-insensitive title match; an empty query matches everything.
pub fn matches_title_query(conversation: &Conversation, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }

    conversation.title.to_lowercase().contains(&query)
}

fn bucket_label(bucket: HistoryBucket, date: DateTime<Utc>) -> String {
    match bucket {
        HistoryBucket::Relative(window) => window.label().to_string(),
        HistoryBucket::Month { .. } => date.format("%B %Y").to_string(),
    }
}

fn bucket_order(left: HistoryBucket, right: HistoryBucket) -> Ordering {
    match (left, right) {
        (HistoryBucket::Relative(left), HistoryBucket::Relative(right)) => left.cmp(&right),
        (HistoryBucket::Relative(_), HistoryBucket::Month { .. }) => Ordering::Less,
        (HistoryBucket::Month { .. }, HistoryBucket::Relative(_)) => Ordering::Greater,
        (
            HistoryBucket::Month {
                year: left_year,
                month: left_month,
            },
            HistoryBucket::Month {
                year: right_year,
                month: right_month,
            },
        ) => (right_year, right_month).cmp(&(left_year, left_month)),
    }
}

fn newest_first(left: &Conversation, right: &Conversation) -> Ordering {
    right
        .date
        .cmp(&left.date)
        .then_with(|| left.id.cmp(&right.id))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::ids::ConversationId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap()
    }

    fn conversation(id: &str, title: &str, date: DateTime<Utc>) -> Conversation {
        Conversation::new(ConversationId::new(id), title, date)
    }

    fn titles(group: &HistoryGroup) -> Vec<&str> {
        group.entries.iter().map(|entry| entry.title.as_str()).collect()
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_conversations(&[], now()).is_empty());
    }

    #[test]
    fn relative_windows_precede_months_in_fixed_order() {
        let input = vec![
            conversation("1", "old", now() - Duration::days(90)),
            conversation("2", "month", now() - Duration::days(20)),
            conversation("3", "week", now() - Duration::days(3)),
            conversation("4", "yesterday", now() - Duration::hours(30)),
            conversation("5", "today", now() - Duration::hours(2)),
        ];

        let labels = group_conversations(&input, now())
            .into_iter()
            .map(|group| group.label)
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec!["Today", "Yesterday", "Last 7 days", "Last 30 days", "March 2024"]
        );
    }

    #[test]
    fn entries_within_group_are_newest_first() {
        let input = vec![
            conversation("a", "older", now() - Duration::days(40)),
            conversation("b", "newer", now() - Duration::days(35)),
        ];

        let groups = group_conversations(&input, now());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label, "May 2024");
        assert_eq!(titles(&groups[0]), vec!["newer", "older"]);
    }

    #[test]
    fn month_buckets_are_newest_first_and_every_entry_lands_once() {
        let input = vec![
            conversation("1", "jan", Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()),
            conversation("2", "mar", Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap()),
            conversation("3", "jan-late", Utc.with_ymd_and_hms(2024, 1, 25, 0, 0, 0).unwrap()),
            conversation("4", "dec", Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap()),
        ];

        let groups = group_conversations(&input, now());
        let labels = groups.iter().map(|group| group.label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["March 2024", "January 2024", "December 2023"]);
        assert_eq!(titles(&groups[1]), vec!["jan-late", "jan"]);

        let total = groups.iter().map(|group| group.entries.len()).sum::<usize>();
        assert_eq!(total, input.len());
    }

    #[test]
    fn compact_policy_sends_two_week_old_entries_to_their_month() {
        let recent = now();
        let older = now() - Duration::days(15);
        let very_old = now() - Duration::days(365);
        let input = vec![
            conversation("3", "Very Old Chat", very_old),
            conversation("1", "Recent Chat", recent),
            conversation("2", "Older Chat", older),
        ];

        let groups = group_conversations_with(&input, now(), &GroupingPolicy::compact());
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].label, "Today");
        assert_eq!(titles(&groups[0]), vec!["Recent Chat"]);
        assert_eq!(groups[1].label, older.format("%B %Y").to_string());
        assert_eq!(titles(&groups[1]), vec!["Older Chat"]);
        assert_eq!(groups[2].label, very_old.format("%B %Y").to_string());
        assert_eq!(titles(&groups[2]), vec!["Very Old Chat"]);
    }

    #[test]
    fn future_dates_count_as_today() {
        let groups = group_conversations(
            &[conversation("1", "clock skew", now() + Duration::minutes(5))],
            now(),
        );
        assert_eq!(groups[0].bucket, HistoryBucket::Relative(RelativeWindow::Today));
    }

    #[test]
    fn merge_page_skips_known_ids() {
        let mut existing = vec![conversation("1", "a", now()), conversation("2", "b", now())];
        let page = vec![
            conversation("2", "b-dup", now()),
            conversation("3", "c", now()),
            conversation("3", "c-dup", now()),
        ];

        assert_eq!(merge_page(&mut existing, page), 1);
        assert_eq!(existing.len(), 3);
        assert_eq!(existing[1].title, "b");
        assert_eq!(existing[2].title, "c");
    }

    #[test]
    fn title_query_is_case_insensitive() {
        let entry = conversation("1", "Quarterly Proposal", now());
        assert!(matches_title_query(&entry, "proposal"));
        assert!(matches_title_query(&entry, "  "));
        assert!(!matches_title_query(&entry, "budget"));
    }
}
