//! Backup retention: decide which remote objects to delete.
//!
//! A *backup group* is every object sharing the first path segment after
//! the backup prefix (`hytale/backups/<group>/...`). Groups are ranked by
//! their representative timestamp, the newest `last_modified` among their
//! members, and everything outside the `keep` newest groups is deleted in
//! full. The decision is a pure function of the listing; nothing is
//! carried between runs.

use crate::models::object::RemoteObject;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Maps the part of a key after the prefix to the group it belongs to.
///
/// Returning `None` leaves the object out of every group, which also
/// means it is never deleted.
pub trait KeyGrouping {
    fn group_of<'a>(&self, rest: &'a str) -> Option<&'a str>;
}

/// Groups by the first `/`-separated segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSegment;

impl KeyGrouping for FirstSegment {
    fn group_of<'a>(&self, rest: &'a str) -> Option<&'a str> {
        key_to_group(rest)
    }
}

/// First path segment of `rest`, or all of `rest` when it has no `/`.
///
/// Empty segments (`""`, `"/x"`) have no group.
pub fn key_to_group(rest: &str) -> Option<&str> {
    let group = match rest.find('/') {
        Some(end) => &rest[..end],
        None => rest,
    };
    (!group.is_empty()).then_some(group)
}

/// One logical backup as seen in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupGroup {
    pub id: String,
    /// Newest `last_modified` among the group's objects.
    pub representative: DateTime<Utc>,
    /// Member keys, sorted.
    pub keys: Vec<String>,
}

/// Outcome of applying a [`RetentionPolicy`] to a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionDecision {
    /// All groups, newest first.
    pub ranked: Vec<BackupGroup>,
    /// Ids of the groups that survive by rank.
    pub kept: Vec<String>,
    /// Ids of groups inside the grace window. They are never deleted and do
    /// not count toward `keep`.
    pub protected: Vec<String>,
    /// Keys to delete, in rank order then key order.
    pub deletions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RetentionPolicy<G = FirstSegment> {
    pub prefix: String,
    /// Number of newest groups to keep. Zero or negative disables pruning.
    pub keep: i64,
    /// Groups touched more recently than `now - grace` are never deleted,
    /// so a backup that is still being uploaded survives.
    pub grace: Option<Duration>,
    grouping: G,
}

impl RetentionPolicy {
    pub fn new(prefix: impl Into<String>, keep: i64) -> Self {
        Self {
            prefix: prefix.into(),
            keep,
            grace: None,
            grouping: FirstSegment,
        }
    }
}

impl<G: KeyGrouping> RetentionPolicy<G> {
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = Some(grace);
        self
    }

    /// Swap the grouping convention without touching ranking.
    pub fn with_grouping<H: KeyGrouping>(self, grouping: H) -> RetentionPolicy<H> {
        RetentionPolicy {
            prefix: self.prefix,
            keep: self.keep,
            grace: self.grace,
            grouping,
        }
    }

    /// Partition `objects` into groups, newest first.
    ///
    /// Ties on the representative timestamp are broken by group id,
    /// descending. Objects outside the prefix or without a group are
    /// skipped.
    pub fn group_objects(&self, objects: &[RemoteObject]) -> Vec<BackupGroup> {
        let mut groups: BTreeMap<&str, (DateTime<Utc>, Vec<String>)> = BTreeMap::new();

        for obj in objects {
            let Some(rest) = obj.key.strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            let Some(group) = self.grouping.group_of(rest) else {
                continue;
            };
            let entry = groups
                .entry(group)
                .or_insert_with(|| (obj.last_modified, Vec::new()));
            entry.0 = entry.0.max(obj.last_modified);
            entry.1.push(obj.key.clone());
        }

        let mut ranked: Vec<BackupGroup> = groups
            .into_iter()
            .map(|(id, (representative, mut keys))| {
                keys.sort();
                keys.dedup();
                BackupGroup {
                    id: id.to_string(),
                    representative,
                    keys,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.representative
                .cmp(&a.representative)
                .then_with(|| b.id.cmp(&a.id))
        });
        ranked
    }

    /// Rank `objects` and split the groups into kept, protected and
    /// deleted as of `now`.
    pub fn decide(&self, objects: &[RemoteObject], now: DateTime<Utc>) -> RetentionDecision {
        let cutoff = self.grace.map(|grace| now - grace);
        self.select(self.group_objects(objects), cutoff)
    }

    /// Groups newer than `cutoff` are protected and never take a keep slot;
    /// the `keep` newest of the rest survive.
    fn select(&self, ranked: Vec<BackupGroup>, cutoff: Option<DateTime<Utc>>) -> RetentionDecision {
        if self.keep <= 0 {
            return RetentionDecision {
                kept: ranked.iter().map(|g| g.id.clone()).collect(),
                ranked,
                ..RetentionDecision::default()
            };
        }

        let keep = usize::try_from(self.keep).unwrap_or(usize::MAX);

        let mut kept = Vec::new();
        let mut protected = Vec::new();
        let mut deletions = Vec::new();
        for group in &ranked {
            if cutoff.is_some_and(|cutoff| group.representative > cutoff) {
                protected.push(group.id.clone());
            } else if kept.len() < keep {
                kept.push(group.id.clone());
            } else {
                deletions.extend(group.keys.iter().cloned());
            }
        }

        RetentionDecision {
            ranked,
            kept,
            protected,
            deletions,
        }
    }
}

/// Keys to delete so that only the `keep` newest groups under `prefix`
/// remain. No grace window applies and the clock is never read.
pub fn compute_deletions(objects: &[RemoteObject], prefix: &str, keep: i64) -> Vec<String> {
    let policy = RetentionPolicy::new(prefix, keep);
    policy.select(policy.group_objects(objects), None).deletions
}
