//! Listing-versus-store reconciliation.

use std::collections::{BTreeMap, HashSet};

use lodestar_core::{TorrentRecord, TorrentSummary};

/// Disjoint partition of the identifiers that differ between the store and a listing.
#[derive(Debug, Default, Clone)]
pub struct TorrentDiff {
    /// Listed but not stored.
    pub additions: Vec<TorrentSummary>,
    /// Listed and stored, with at least one changed attribute.
    pub updates: Vec<TorrentSummary>,
    /// Stored but no longer listed.
    pub removals: Vec<String>,
    /// Listed and stored with no change.
    pub unchanged: usize,
}

impl TorrentDiff {
    /// Whether applying the diff would change the store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.updates.is_empty() && self.removals.is_empty()
    }
}

/// Compare the stored records with a full listing.
///
/// `listing` must already be deduplicated by identifier.
#[must_use]
pub fn diff(current: &BTreeMap<String, TorrentRecord>, listing: &[TorrentSummary]) -> TorrentDiff {
    let mut result = TorrentDiff::default();
    let mut listed = HashSet::with_capacity(listing.len());

    for summary in listing {
        listed.insert(summary.id.as_str());
        match current.get(&summary.id) {
            None => result.additions.push(summary.clone()),
            Some(record) if record.differs_from(summary) => result.updates.push(summary.clone()),
            Some(_) => result.unchanged += 1,
        }
    }

    result.removals = current
        .keys()
        .filter(|id| !listed.contains(id.as_str()))
        .cloned()
        .collect();
    result
}

#[cfg(test)]
mod tests {
    use lodestar_core::TorrentStatus;
    use lodestar_test_support::fixtures::{fixed_time, movie, summary_of};

    use super::*;

    fn stored(details: &[lodestar_core::TorrentDetail]) -> BTreeMap<String, TorrentRecord> {
        details
            .iter()
            .map(|detail| {
                (
                    detail.id.clone(),
                    TorrentRecord::from_detail(detail, fixed_time()),
                )
            })
            .collect()
    }

    #[test]
    fn partitions_are_disjoint_and_cover_the_symmetric_difference() {
        let a = movie("A", "a");
        let b = movie("B", "b");
        let c = movie("C", "c");
        let d = movie("D", "d");
        let current = stored(&[a.clone(), b.clone(), c]);

        let mut changed_b = summary_of(&b);
        changed_b.status = TorrentStatus::Error;
        let listing = vec![summary_of(&a), changed_b, summary_of(&d)];

        let result = diff(&current, &listing);
        let added: Vec<_> = result.additions.iter().map(|s| s.id.as_str()).collect();
        let updated: Vec<_> = result.updates.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(added, ["D"]);
        assert_eq!(updated, ["B"]);
        assert_eq!(result.removals, ["C"]);
        assert_eq!(result.unchanged, 1);

        for id in &added {
            assert!(!current.contains_key(*id));
        }
        for id in &result.removals {
            assert!(listing.iter().all(|summary| &summary.id != id));
        }
    }

    struct Case {
        name: &'static str,
        stored: &'static [&'static str],
        listed: &'static [&'static str],
        changed: &'static [&'static str],
        expected: (usize, usize, usize),
    }

    const CASES: &[Case] = &[
        Case {
            name: "removal only",
            stored: &["A", "B", "C"],
            listed: &["A"],
            changed: &[],
            expected: (0, 0, 2),
        },
        Case {
            name: "update only",
            stored: &["A", "B", "C"],
            listed: &["A", "B", "C"],
            changed: &["A", "C"],
            expected: (0, 2, 0),
        },
        Case {
            name: "addition only",
            stored: &[],
            listed: &["A", "B"],
            changed: &[],
            expected: (2, 0, 0),
        },
        Case {
            name: "mixed",
            stored: &["A", "B", "C", "D"],
            listed: &["B", "C", "E", "F"],
            changed: &["C"],
            expected: (2, 1, 2),
        },
        Case {
            name: "complete turnover",
            stored: &["A", "B"],
            listed: &["C", "D"],
            changed: &[],
            expected: (2, 0, 2),
        },
    ];

    #[test]
    fn partitions_stay_disjoint_and_complete_across_listings() {
        for case in CASES {
            let current = stored(
                &case
                    .stored
                    .iter()
                    .map(|id| movie(id, &id.to_lowercase()))
                    .collect::<Vec<_>>(),
            );
            let listing: Vec<_> = case
                .listed
                .iter()
                .map(|id| {
                    let mut summary = summary_of(&movie(id, &id.to_lowercase()));
                    if case.changed.contains(id) {
                        summary.status = TorrentStatus::Error;
                    }
                    summary
                })
                .collect();

            let result = diff(&current, &listing);
            let added: HashSet<&str> = result.additions.iter().map(|s| s.id.as_str()).collect();
            let updated: HashSet<&str> = result.updates.iter().map(|s| s.id.as_str()).collect();
            let removed: HashSet<&str> = result.removals.iter().map(String::as_str).collect();

            assert_eq!(
                (added.len(), updated.len(), removed.len()),
                case.expected,
                "{}",
                case.name
            );
            assert!(added.is_disjoint(&updated), "{}", case.name);
            assert!(added.is_disjoint(&removed), "{}", case.name);
            assert!(updated.is_disjoint(&removed), "{}", case.name);

            let stored_ids: HashSet<&str> = case.stored.iter().copied().collect();
            let listed_ids: HashSet<&str> = case.listed.iter().copied().collect();
            let mut differing: HashSet<&str> = stored_ids
                .symmetric_difference(&listed_ids)
                .copied()
                .collect();
            differing.extend(case.changed.iter().copied());
            let covered: HashSet<&str> = added
                .iter()
                .chain(&updated)
                .chain(&removed)
                .copied()
                .collect();
            assert_eq!(covered, differing, "{}", case.name);
            assert_eq!(
                result.unchanged + added.len() + updated.len(),
                listing.len(),
                "{}",
                case.name
            );
        }
    }

    #[test]
    fn identical_listing_is_empty_diff() {
        let a = movie("A", "a");
        let current = stored(std::slice::from_ref(&a));
        let result = diff(&current, &[summary_of(&a)]);
        assert!(result.is_empty());
        assert_eq!(result.unchanged, 1);
    }

    #[test]
    fn empty_listing_removes_everything() {
        let current = stored(&[movie("A", "a"), movie("B", "b")]);
        let result = diff(&current, &[]);
        assert_eq!(result.removals, ["A", "B"]);
    }
}
