use crate::domain::top_items::{
    ItemTypeBehavior, MetricField, PositionChange, RankedEntry, SnapshotEntry, SortOrder,
};
use crate::error::TopItemsError;
use std::collections::{HashMap, HashSet};

/// What to do when there is no previous snapshot to compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPreviousPolicy {
    /// Every latest item is classified `New`.
    TreatAsNew,
    /// No classification is attached at all.
    OmitChanges,
}

/// Left-joins `latest` against `previous` by item id and classifies each latest item.
///
/// Items only present in `previous` are dropped. The delta is `previous - latest` for
/// every metric: positive is `Up`, negative is `Down`, zero carries no tag. The result
/// is ordered by the metric in the item type's direction, ties broken by position. Pure
/// and deterministic.
pub fn compute_changes(
    latest: &[SnapshotEntry],
    previous: &[SnapshotEntry],
    behavior: ItemTypeBehavior,
    policy: MissingPreviousPolicy,
) -> Result<Vec<RankedEntry>, TopItemsError> {
    ensure_unique(latest, "latest")?;

    let metric = behavior.metric;
    let mut previous_by_id: HashMap<&str, f64> = HashMap::with_capacity(previous.len());
    for entry in previous {
        let value = metric_value(metric, entry)?;
        previous_by_id.entry(entry.item_id.as_str()).or_insert(value);
    }

    let omit = previous.is_empty() && policy == MissingPreviousPolicy::OmitChanges;

    let mut keyed = Vec::with_capacity(latest.len());
    for entry in latest {
        let current = metric_value(metric, entry)?;
        let change = if omit {
            None
        } else {
            match previous_by_id.get(entry.item_id.as_str()) {
                None => Some(PositionChange::New),
                Some(&prev) => classify(prev, current),
            }
        };
        keyed.push((
            current,
            RankedEntry {
                entry: entry.clone(),
                change,
            },
        ));
    }

    keyed.sort_by(|(a_value, a), (b_value, b)| {
        let by_metric = match behavior.order {
            SortOrder::Ascending => a_value.total_cmp(b_value),
            SortOrder::Descending => b_value.total_cmp(a_value),
        };
        by_metric.then_with(|| a.entry.position.cmp(&b.entry.position))
    });

    Ok(keyed.into_iter().map(|(_, ranked)| ranked).collect())
}

fn classify(previous: f64, latest: f64) -> Option<PositionChange> {
    let delta = previous - latest;
    if delta > 0.0 {
        Some(PositionChange::Up)
    } else if delta < 0.0 {
        Some(PositionChange::Down)
    } else {
        None
    }
}

fn metric_value(metric: MetricField, entry: &SnapshotEntry) -> Result<f64, TopItemsError> {
    metric.value(entry).ok_or_else(|| {
        TopItemsError::consistency(format!(
            "snapshot entry {} has no {} value",
            entry.item_id,
            metric.column()
        ))
    })
}

/// Rejects a snapshot with a repeated item id or position.
pub(crate) fn ensure_unique(entries: &[SnapshotEntry], which: &str) -> Result<(), TopItemsError> {
    let mut ids = HashSet::with_capacity(entries.len());
    let mut positions = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !ids.insert(entry.item_id.as_str()) {
            return Err(TopItemsError::consistency(format!(
                "duplicate item id {} in {which} snapshot",
                entry.item_id
            )));
        }
        if !positions.insert(entry.position) {
            return Err(TopItemsError::consistency(format!(
                "duplicate position {} in {which} snapshot",
                entry.position
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::top_items::ItemType;
    use proptest::prelude::*;

    fn ranked(ids: &[&str]) -> Vec<SnapshotEntry> {
        ids.iter()
            .zip(1..)
            .map(|(id, pos)| SnapshotEntry::ranked(*id, pos))
            .collect()
    }

    fn changes_of(out: &[RankedEntry]) -> Vec<(&str, Option<PositionChange>)> {
        out.iter()
            .map(|r| (r.entry.item_id.as_str(), r.change))
            .collect()
    }

    const ARTIST: ItemTypeBehavior = ItemType::Artist.behavior();

    #[test]
    fn swapped_items_move_up_and_down() {
        let latest = ranked(&["A", "B"]);
        let previous = ranked(&["B", "A"]);
        let out =
            compute_changes(&latest, &previous, ARTIST, MissingPreviousPolicy::TreatAsNew).unwrap();
        assert_eq!(
            changes_of(&out),
            vec![
                ("A", Some(PositionChange::Up)),
                ("B", Some(PositionChange::Down))
            ]
        );
        assert_eq!(out[0].entry.position, 1);
        assert_eq!(out[1].entry.position, 2);
    }

    #[test]
    fn item_missing_from_previous_is_new() {
        let latest = ranked(&["A", "C", "B"]);
        let previous = ranked(&["A", "B"]);
        let out =
            compute_changes(&latest, &previous, ARTIST, MissingPreviousPolicy::OmitChanges).unwrap();
        assert_eq!(
            changes_of(&out),
            vec![
                ("A", None),
                ("C", Some(PositionChange::New)),
                ("B", Some(PositionChange::Down))
            ]
        );
    }

    #[test]
    fn items_only_in_previous_are_dropped() {
        let latest = ranked(&["A"]);
        let previous = ranked(&["Z", "A"]);
        let out =
            compute_changes(&latest, &previous, ARTIST, MissingPreviousPolicy::TreatAsNew).unwrap();
        assert_eq!(changes_of(&out), vec![("A", Some(PositionChange::Up))]);
    }

    #[test]
    fn empty_previous_follows_policy() {
        let latest = ranked(&["A", "B"]);
        let as_new =
            compute_changes(&latest, &[], ARTIST, MissingPreviousPolicy::TreatAsNew).unwrap();
        assert!(as_new
            .iter()
            .all(|r| r.change == Some(PositionChange::New)));

        let omitted =
            compute_changes(&latest, &[], ARTIST, MissingPreviousPolicy::OmitChanges).unwrap();
        assert!(omitted.iter().all(|r| r.change.is_none()));
    }

    #[test]
    fn output_is_sorted_by_position_for_artists() {
        let latest = vec![
            SnapshotEntry::ranked("C", 3),
            SnapshotEntry::ranked("A", 1),
            SnapshotEntry::ranked("B", 2),
        ];
        let out = compute_changes(&latest, &[], ARTIST, MissingPreviousPolicy::OmitChanges).unwrap();
        let ids: Vec<_> = out.iter().map(|r| r.entry.item_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn genres_sort_by_count_descending_with_previous_minus_latest_delta() {
        let genre = ItemType::Genre.behavior();
        let latest = vec![
            SnapshotEntry::ranked("indie", 2).with_count(5),
            SnapshotEntry::ranked("rock", 1).with_count(9),
            SnapshotEntry::ranked("jazz", 3).with_count(2),
        ];
        let previous = vec![
            SnapshotEntry::ranked("rock", 1).with_count(9),
            SnapshotEntry::ranked("indie", 2).with_count(3),
            SnapshotEntry::ranked("jazz", 3).with_count(4),
        ];
        let out =
            compute_changes(&latest, &previous, genre, MissingPreviousPolicy::TreatAsNew).unwrap();
        assert_eq!(
            changes_of(&out),
            vec![
                ("rock", None),
                ("indie", Some(PositionChange::Down)),
                ("jazz", Some(PositionChange::Up))
            ]
        );
    }

    #[test]
    fn emotions_compare_percentages() {
        let emotion = ItemType::Emotion.behavior();
        let latest = vec![
            SnapshotEntry::ranked("joy", 1).with_percentage(0.5, Some("t1".into())),
            SnapshotEntry::ranked("fear", 2).with_percentage(0.2, Some("t2".into())),
        ];
        let previous = vec![
            SnapshotEntry::ranked("fear", 1).with_percentage(0.6, Some("t2".into())),
            SnapshotEntry::ranked("joy", 2).with_percentage(0.5, Some("t1".into())),
        ];
        let out =
            compute_changes(&latest, &previous, emotion, MissingPreviousPolicy::TreatAsNew).unwrap();
        assert_eq!(
            changes_of(&out),
            vec![("joy", None), ("fear", Some(PositionChange::Up))]
        );
    }

    #[test]
    fn duplicate_ids_in_latest_fail() {
        let latest = vec![SnapshotEntry::ranked("A", 1), SnapshotEntry::ranked("A", 2)];
        let err = compute_changes(&latest, &[], ARTIST, MissingPreviousPolicy::TreatAsNew)
            .unwrap_err();
        assert!(matches!(err, TopItemsError::DataConsistency(_)));
    }

    #[test]
    fn duplicate_positions_in_latest_fail() {
        let latest = vec![SnapshotEntry::ranked("A", 1), SnapshotEntry::ranked("B", 1)];
        let err = compute_changes(&latest, &[], ARTIST, MissingPreviousPolicy::TreatAsNew)
            .unwrap_err();
        assert!(matches!(err, TopItemsError::DataConsistency(_)));
    }

    #[test]
    fn missing_metric_fails() {
        let latest = vec![SnapshotEntry::ranked("rock", 1)];
        let err = compute_changes(
            &latest,
            &[],
            ItemType::Genre.behavior(),
            MissingPreviousPolicy::OmitChanges,
        )
        .unwrap_err();
        assert!(matches!(err, TopItemsError::DataConsistency(_)));

        let previous = vec![SnapshotEntry::ranked("rock", 1)];
        let latest = vec![SnapshotEntry::ranked("rock", 1).with_count(1)];
        assert!(compute_changes(
            &latest,
            &previous,
            ItemType::Genre.behavior(),
            MissingPreviousPolicy::OmitChanges,
        )
        .is_err());
    }

    fn permuted_snapshot(prefix: &'static str, max: usize) -> impl Strategy<Value = Vec<SnapshotEntry>> {
        (1..=max)
            .prop_flat_map(|n| Just((1..=n as i32).collect::<Vec<_>>()).prop_shuffle())
            .prop_map(move |positions| {
                positions
                    .into_iter()
                    .enumerate()
                    .map(|(i, pos)| SnapshotEntry::ranked(format!("{prefix}{i}"), pos))
                    .collect()
            })
    }

    proptest! {
        #[test]
        fn disjoint_snapshots_are_all_new(
            latest in permuted_snapshot("l", 30),
            previous in permuted_snapshot("p", 30),
        ) {
            let out = compute_changes(&latest, &previous, ARTIST, MissingPreviousPolicy::OmitChanges).unwrap();
            prop_assert_eq!(out.len(), latest.len());
            prop_assert!(out.iter().all(|r| r.change == Some(PositionChange::New)));
        }

        #[test]
        fn equal_positions_are_never_up_or_down(
            latest in permuted_snapshot("x", 30),
            previous in permuted_snapshot("x", 30),
        ) {
            let prev_pos: HashMap<_, _> = previous.iter().map(|e| (e.item_id.clone(), e.position)).collect();
            let out = compute_changes(&latest, &previous, ARTIST, MissingPreviousPolicy::TreatAsNew).unwrap();
            for r in &out {
                if prev_pos.get(&r.entry.item_id) == Some(&r.entry.position) {
                    prop_assert_eq!(r.change, None);
                }
            }
        }

        #[test]
        fn compute_changes_is_idempotent(
            latest in permuted_snapshot("x", 30),
            previous in permuted_snapshot("x", 30),
        ) {
            let first = compute_changes(&latest, &previous, ARTIST, MissingPreviousPolicy::TreatAsNew).unwrap();
            let second = compute_changes(&latest, &previous, ARTIST, MissingPreviousPolicy::TreatAsNew).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn output_positions_ascend(latest in permuted_snapshot("x", 30)) {
            let out = compute_changes(&latest, &[], ARTIST, MissingPreviousPolicy::OmitChanges).unwrap();
            let positions: Vec<i32> = out.iter().map(|r| r.entry.position).collect();
            let expected: Vec<i32> = (1..=latest.len() as i32).collect();
            prop_assert_eq!(positions, expected);
        }
    }
}
