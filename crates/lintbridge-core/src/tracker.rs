//! Per-scope issue tracking.
//!
//! The tracker matches each analysis run's findings against the records kept
//! from previous runs of the same file, creates records for new findings, and
//! drops records whose finding disappeared. Matching prefers an identical
//! rule, message, and range, then falls back to rule and message so a finding
//! keeps its identity when surrounding code moves it. Among several fallback
//! candidates the one at the nearest line wins.
//!
//! Resolved issues compete in the same matching as live records, so a
//! resolution stays attached to the issue it was made for.
//!
//! All operations are serialized by an internal lock.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::finding::{Finding, IssueSeverity, RuleType, TextRange};
use crate::overlay::{merge, MergedFinding, TrackedRecord};

/// Identifies a tracked issue within one tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingKey(u64);

impl TrackingKey {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: TrackingKey,
    rule_key: String,
    message: String,
    text_range: Option<TextRange>,
    record: TrackedRecord,
}

/// Rule, message, and last known location of an issue the user resolved.
#[derive(Debug, Clone)]
struct ResolvedSignature {
    rule_key: String,
    message: String,
    text_range: Option<TextRange>,
}

/// Something a fresh finding can inherit its identity from.
#[derive(Debug, Clone)]
enum Candidate {
    Live(Entry),
    Resolved(ResolvedSignature),
}

impl Candidate {
    fn parts(&self) -> (&str, &str, Option<TextRange>) {
        match self {
            Candidate::Live(entry) => (&entry.rule_key, &entry.message, entry.text_range),
            Candidate::Resolved(sig) => (&sig.rule_key, &sig.message, sig.text_range),
        }
    }

    fn matches_exactly(&self, finding: &Finding) -> bool {
        self.matches_loosely(finding) && self.parts().2 == finding.text_range
    }

    fn matches_loosely(&self, finding: &Finding) -> bool {
        let (rule_key, message, _) = self.parts();
        rule_key == finding.rule_key && message == finding.message
    }

    fn distance_to(&self, finding: &Finding) -> u32 {
        match (self.parts().2, finding.text_range) {
            (Some(ours), Some(theirs)) => ours.start_line.abs_diff(theirs.start_line),
            (None, None) => 0,
            _ => u32::MAX,
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    next_key: u64,
    by_file: FxHashMap<String, Vec<Entry>>,
    file_of: FxHashMap<TrackingKey, String>,
    resolved: FxHashMap<String, Vec<ResolvedSignature>>,
}

impl TrackerState {
    fn allocate_key(&mut self) -> TrackingKey {
        self.next_key += 1;
        TrackingKey(self.next_key)
    }

    fn entry_mut(&mut self, key: TrackingKey) -> Option<&mut Entry> {
        let file = self.file_of.get(&key)?;
        self.by_file
            .get_mut(file)?
            .iter_mut()
            .find(|entry| entry.key == key)
    }
}

#[derive(Debug, Default)]
pub struct IssueTracker {
    state: Mutex<TrackerState>,
}

impl IssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches a fresh analysis of `file_uri` against tracked records and
    /// returns the merged findings, in the order the engine produced them.
    pub fn track(&self, file_uri: &str, findings: Vec<Finding>) -> Vec<(TrackingKey, MergedFinding)> {
        let mut state = self.state.lock();
        let live = state.by_file.remove(file_uri).unwrap_or_default();
        let resolved = state.resolved.remove(file_uri).unwrap_or_default();
        let mut candidates: Vec<Option<Candidate>> = live
            .into_iter()
            .map(Candidate::Live)
            .chain(resolved.into_iter().map(Candidate::Resolved))
            .map(Some)
            .collect();

        let mut matched: Vec<Option<Candidate>> = vec![None; findings.len()];
        for (slot, finding) in matched.iter_mut().zip(&findings) {
            *slot = take_match(&mut candidates, |candidate| candidate.matches_exactly(finding));
        }
        match_nearest(&findings, &mut candidates, &mut matched);

        for stale in candidates.into_iter().flatten() {
            if let Candidate::Live(entry) = stale {
                state.file_of.remove(&entry.key);
            }
        }

        let mut still_resolved = Vec::new();
        let mut entries = Vec::with_capacity(findings.len());
        let mut merged = Vec::with_capacity(findings.len());
        for (finding, existing) in findings.into_iter().zip(matched) {
            let entry = match existing {
                Some(Candidate::Live(mut entry)) => {
                    entry.text_range = finding.text_range;
                    entry
                }
                Some(Candidate::Resolved(mut signature)) => {
                    signature.text_range = finding.text_range;
                    still_resolved.push(signature);
                    continue;
                }
                None => {
                    let key = state.allocate_key();
                    state.file_of.insert(key, file_uri.to_string());
                    Entry {
                        key,
                        rule_key: finding.rule_key.clone(),
                        message: finding.message.clone(),
                        text_range: finding.text_range,
                        record: TrackedRecord::for_finding(&finding),
                    }
                }
            };
            merged.push((entry.key, merge(finding, &entry.record)));
            entries.push(entry);
        }

        debug!(
            "Tracked {} findings in {file_uri} ({} resolved signatures kept)",
            merged.len(),
            still_resolved.len()
        );
        if !entries.is_empty() {
            state.by_file.insert(file_uri.to_string(), entries);
        }
        if !still_resolved.is_empty() {
            state.resolved.insert(file_uri.to_string(), still_resolved);
        }
        merged
    }

    /// Sets or clears the user severity override.
    pub fn override_severity(&self, key: TrackingKey, severity: Option<IssueSeverity>) -> bool {
        self.update(key, |record| record.severity_override = severity)
    }

    /// Records the identity the server assigned to the issue.
    pub fn assign_server_key(&self, key: TrackingKey, server_issue_key: Option<String>) -> bool {
        self.update(key, |record| record.server_issue_key = server_issue_key)
    }

    /// Applies a server-side reclassification.
    pub fn reclassify(&self, key: TrackingKey, rule_type: RuleType) -> bool {
        self.update(key, |record| record.rule_type = rule_type)
    }

    /// Removes the record and hides the finding until it stops matching.
    pub fn mark_resolved(&self, key: TrackingKey) -> bool {
        let mut state = self.state.lock();
        let Some(file) = state.file_of.remove(&key) else {
            return false;
        };
        let Some(entries) = state.by_file.get_mut(&file) else {
            return false;
        };
        let Some(index) = entries.iter().position(|entry| entry.key == key) else {
            return false;
        };
        let entry = entries.remove(index);
        if entries.is_empty() {
            state.by_file.remove(&file);
        }
        state.resolved.entry(file).or_default().push(ResolvedSignature {
            rule_key: entry.rule_key,
            message: entry.message,
            text_range: entry.text_range,
        });
        true
    }

    pub fn record(&self, key: TrackingKey) -> Option<TrackedRecord> {
        let mut state = self.state.lock();
        state.entry_mut(key).map(|entry| entry.record.clone())
    }

    pub fn records_for(&self, file_uri: &str) -> Vec<(TrackingKey, TrackedRecord)> {
        self.state
            .lock()
            .by_file
            .get(file_uri)
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| (entry.key, entry.record.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Forgets every record and resolution for `file_uri`.
    pub fn forget_file(&self, file_uri: &str) {
        let mut state = self.state.lock();
        if let Some(entries) = state.by_file.remove(file_uri) {
            for entry in entries {
                state.file_of.remove(&entry.key);
            }
        }
        state.resolved.remove(file_uri);
    }

    pub fn len(&self) -> usize {
        self.state.lock().file_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(&self, key: TrackingKey, apply: impl FnOnce(&mut TrackedRecord)) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.entry_mut(key) else {
            return false;
        };
        apply(&mut entry.record);
        true
    }
}

fn take_match(
    candidates: &mut [Option<Candidate>],
    matches: impl Fn(&Candidate) -> bool,
) -> Option<Candidate> {
    let index = candidates
        .iter()
        .position(|slot| slot.as_ref().is_some_and(|candidate| matches(candidate)))?;
    candidates[index].take()
}

/// Pairs the still unmatched findings with rule and message candidates,
/// closest lines first.
fn match_nearest(
    findings: &[Finding],
    candidates: &mut [Option<Candidate>],
    matched: &mut [Option<Candidate>],
) {
    let mut pairs = Vec::new();
    for (finding_index, finding) in findings.iter().enumerate() {
        if matched[finding_index].is_some() {
            continue;
        }
        for (candidate_index, candidate) in candidates.iter().enumerate() {
            if let Some(candidate) = candidate.as_ref().filter(|c| c.matches_loosely(finding)) {
                pairs.push((candidate.distance_to(finding), finding_index, candidate_index));
            }
        }
    }
    pairs.sort_unstable();
    for (_, finding_index, candidate_index) in pairs {
        if matched[finding_index].is_none() {
            if let Some(candidate) = candidates[candidate_index].take() {
                matched[finding_index] = Some(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "file:///work/app.py";

    fn finding(rule: &str, message: &str, line: u32) -> Finding {
        Finding {
            rule_key: rule.to_string(),
            message: message.to_string(),
            severity: IssueSeverity::Major,
            rule_type: Some(RuleType::CodeSmell),
            text_range: Some(TextRange {
                start_line: line,
                start_line_offset: 0,
                end_line: line,
                end_line_offset: 10,
            }),
            input_file: None,
            flows: Vec::new(),
            quick_fixes: Vec::new(),
            rule_description_context_key: None,
            vulnerability_probability: None,
        }
    }

    #[test]
    fn identity_survives_moved_finding() {
        let tracker = IssueTracker::new();
        let first = tracker.track(FILE, vec![finding("python:S1481", "unused", 3)]);
        let key = first[0].0;
        assert!(tracker.override_severity(key, Some(IssueSeverity::Blocker)));

        let second = tracker.track(FILE, vec![finding("python:S1481", "unused", 7)]);
        assert_eq!(second[0].0, key);
        assert_eq!(second[0].1.severity(), IssueSeverity::Blocker);
        assert_eq!(second[0].1.start_line(), Some(7));
    }

    #[test]
    fn exact_match_wins_over_loose_match() {
        let tracker = IssueTracker::new();
        let first = tracker.track(
            FILE,
            vec![
                finding("python:S1481", "unused", 3),
                finding("python:S1481", "unused", 9),
            ],
        );
        let key_line_nine = first[1].0;

        let second = tracker.track(FILE, vec![finding("python:S1481", "unused", 9)]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, key_line_nine);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn records_without_fresh_match_are_removed() {
        let tracker = IssueTracker::new();
        let first = tracker.track(FILE, vec![finding("python:S1481", "unused", 3)]);
        let key = first[0].0;
        tracker.track(FILE, Vec::new());
        assert!(tracker.record(key).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn resolved_findings_stay_hidden_while_they_match() {
        let tracker = IssueTracker::new();
        let first = tracker.track(FILE, vec![finding("python:S1481", "unused", 3)]);
        assert!(tracker.mark_resolved(first[0].0));

        let second = tracker.track(FILE, vec![finding("python:S1481", "unused", 4)]);
        assert!(second.is_empty());

        tracker.track(FILE, Vec::new());
        let third = tracker.track(FILE, vec![finding("python:S1481", "unused", 4)]);
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn shifted_duplicates_keep_their_own_identity_and_resolution() {
        let tracker = IssueTracker::new();
        let first = tracker.track(
            FILE,
            vec![
                finding("python:S1481", "unused", 3),
                finding("python:S1481", "unused", 9),
            ],
        );
        let (resolved_key, kept_key) = (first[0].0, first[1].0);
        assert!(tracker.override_severity(kept_key, Some(IssueSeverity::Blocker)));
        assert!(tracker.mark_resolved(resolved_key));

        let shifted = tracker.track(
            FILE,
            vec![
                finding("python:S1481", "unused", 4),
                finding("python:S1481", "unused", 10),
            ],
        );
        let shown: Vec<_> = shifted
            .iter()
            .map(|(key, merged)| (*key, merged.start_line(), merged.severity()))
            .collect();
        assert_eq!(shown, vec![(kept_key, Some(10), IssueSeverity::Blocker)]);
    }

    #[test]
    fn nearest_previous_location_wins_loose_match() {
        let tracker = IssueTracker::new();
        let first = tracker.track(
            FILE,
            vec![
                finding("python:S1481", "unused", 2),
                finding("python:S1481", "unused", 20),
            ],
        );
        let nearby_key = first[1].0;

        let second = tracker.track(FILE, vec![finding("python:S1481", "unused", 18)]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, nearby_key);
    }

    #[test]
    fn server_sync_updates_identity_and_classification() {
        let tracker = IssueTracker::new();
        let first = tracker.track(FILE, vec![finding("python:S5131", "xss", 1)]);
        let key = first[0].0;
        assert!(tracker.assign_server_key(key, Some("AYx-42".to_string())));
        assert!(tracker.reclassify(key, RuleType::Vulnerability));

        let second = tracker.track(FILE, vec![finding("python:S5131", "xss", 1)]);
        assert_eq!(second[0].1.server_issue_key(), Some("AYx-42"));
        assert_eq!(second[0].1.rule_type(), RuleType::Vulnerability);
        assert!(!tracker.assign_server_key(TrackingKey::new(999), None));
    }
}
