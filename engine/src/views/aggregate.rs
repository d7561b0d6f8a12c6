//! Pure aggregation over task snapshots.
//!
//! Everything here is deterministic and allocation-only: no I/O, no store
//! handles, no failure modes. Each function recomputes from the full slice
//! it is given; callers re-run them whenever a snapshot changes.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;

use chrono::{TimeZone, Timelike};
use uuid::Uuid;

use shared::models::{Folder, List, Task, TaskFilter};

/// Display name for the task group with no folder
pub const UNSORTED_LABEL: &str = "Unsorted";

/// Hours of the day shown by the agenda view
pub const AGENDA_HOURS: RangeInclusive<u32> = 7..=21;

/// Number of lists per folder. Folders with no lists are absent.
pub fn list_counts_by_folder(lists: &[List]) -> HashMap<Uuid, usize> {
    let mut counts = HashMap::new();
    for list in lists {
        *counts.entry(list.folder_id).or_insert(0) += 1;
    }
    counts
}

/// Completion percentage (0..=100) per list, keyed by `list_id`; the `None`
/// key covers tasks outside any list. Lists with no tasks are absent.
pub fn progress_by_list(tasks: &[Task]) -> HashMap<Option<Uuid>, f64> {
    let mut tallies: HashMap<Option<Uuid>, (usize, usize)> = HashMap::new();
    for task in tasks {
        let (done, total) = tallies.entry(task.list_id).or_insert((0, 0));
        *total += 1;
        if task.done {
            *done += 1;
        }
    }
    tallies
        .into_iter()
        .map(|(list_id, (done, total))| (list_id, 100.0 * done as f64 / total as f64))
        .collect()
}

/// Apply `filter`, then group by folder. The `None` group (Unsorted) sorts
/// first; within a group, tasks order by start time with the id as the
/// tie-break so equal times stay stable.
pub fn group_tasks_by_folder(
    tasks: &[Task],
    filter: TaskFilter,
) -> BTreeMap<Option<Uuid>, Vec<Task>> {
    let mut groups: BTreeMap<Option<Uuid>, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        let keep = match filter {
            TaskFilter::Upcoming => !task.done,
            TaskFilter::Done => task.done,
            TaskFilter::All => true,
        };
        if keep {
            groups.entry(task.folder_id).or_default().push(task.clone());
        }
    }
    for group in groups.values_mut() {
        group.sort_by_key(|task| (task.starts_at, task.id));
    }
    groups
}

/// Display label for a folder group key. `None` and ids with no matching
/// folder both render as the Unsorted group.
pub fn folder_label(folders: &[Folder], folder_id: Option<Uuid>) -> &str {
    folder_id
        .and_then(|id| folders.iter().find(|folder| folder.id == id))
        .map(|folder| folder.name.as_str())
        .unwrap_or(UNSORTED_LABEL)
}

/// Bucket tasks by wall-clock hour in `tz`. Tasks outside `hours` are
/// dropped; the caller passes one day's tasks, so no date check happens here.
pub fn bucket_tasks_by_hour<Tz: TimeZone>(
    tasks: &[Task],
    tz: &Tz,
    hours: RangeInclusive<u32>,
) -> BTreeMap<u32, Vec<Task>> {
    let mut buckets: BTreeMap<u32, Vec<Task>> = BTreeMap::new();
    for task in tasks {
        let hour = task.starts_at.with_timezone(tz).hour();
        if hours.contains(&hour) {
            buckets.entry(hour).or_default().push(task.clone());
        }
    }
    for bucket in buckets.values_mut() {
        bucket.sort_by_key(|task| (task.starts_at, task.id));
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, Utc};
    use shared::models::Priority;

    fn task(
        starts_at: DateTime<Utc>,
        done: bool,
        folder_id: Option<Uuid>,
        list_id: Option<Uuid>,
    ) -> Task {
        Task {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "task".to_string(),
            priority: Priority::Low,
            starts_at,
            done,
            folder_id,
            list_id,
            created_at: starts_at,
            updated_at: starts_at,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_list_counts_by_folder() {
        let chores = Uuid::new_v4();
        let errands = Uuid::new_v4();
        let list = |folder_id| List {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            folder_id,
            name: "list".to_string(),
            created_at: Utc::now(),
        };
        let counts = list_counts_by_folder(&[list(chores), list(chores), list(errands)]);
        assert_eq!(counts[&chores], 2);
        assert_eq!(counts[&errands], 1);
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_progress_by_list_halfway() {
        let groceries = Uuid::new_v4();
        let tasks = [
            task(at(9, 0), true, None, Some(groceries)),
            task(at(10, 0), false, None, Some(groceries)),
            task(at(11, 0), true, None, None),
        ];
        let progress = progress_by_list(&tasks);
        assert_eq!(progress[&Some(groceries)], 50.0);
        assert_eq!(progress[&None], 100.0);
        // No phantom entries for untouched lists.
        assert_eq!(progress.len(), 2);
        assert!(progress_by_list(&[]).is_empty());
    }

    #[test]
    fn test_grouping_applies_filter_and_orders_unsorted_first() {
        let chores = Uuid::new_v4();
        let done = task(at(8, 0), true, Some(chores), None);
        let later = task(at(12, 0), false, Some(chores), None);
        let earlier = task(at(9, 0), false, Some(chores), None);
        let loose = task(at(7, 0), false, None, None);
        let tasks = [done.clone(), later.clone(), earlier.clone(), loose.clone()];

        let groups = group_tasks_by_folder(&tasks, TaskFilter::Upcoming);
        let keys: Vec<Option<Uuid>> = groups.keys().copied().collect();
        assert_eq!(keys, vec![None, Some(chores)]);
        assert_eq!(groups[&None].len(), 1);
        let ids: Vec<Uuid> = groups[&Some(chores)].iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]); // done task filtered out

        let all = group_tasks_by_folder(&tasks, TaskFilter::All);
        assert_eq!(all[&Some(chores)].len(), 3);
        let only_done = group_tasks_by_folder(&tasks, TaskFilter::Done);
        assert_eq!(only_done[&Some(chores)].len(), 1);
        assert!(!only_done.contains_key(&None));
    }

    #[test]
    fn test_folder_label_falls_back_to_unsorted() {
        let folder = Folder {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Medicine".to_string(),
            color: "#DB2777".to_string(),
            created_at: Utc::now(),
        };
        let folders = [folder.clone()];

        assert_eq!(folder_label(&folders, Some(folder.id)), "Medicine");
        assert_eq!(folder_label(&folders, None), UNSORTED_LABEL);
        assert_eq!(folder_label(&folders, Some(Uuid::new_v4())), UNSORTED_LABEL);
    }

    #[test]
    fn test_grouping_breaks_start_time_ties_by_id() {
        let first = task(at(9, 0), false, None, None);
        let second = task(at(9, 0), false, None, None);
        let forward = group_tasks_by_folder(&[first.clone(), second.clone()], TaskFilter::All);
        let reversed = group_tasks_by_folder(&[second, first], TaskFilter::All);
        let forward_ids: Vec<Uuid> = forward[&None].iter().map(|t| t.id).collect();
        let reversed_ids: Vec<Uuid> = reversed[&None].iter().map(|t| t.id).collect();
        assert_eq!(forward_ids, reversed_ids); // input order does not leak
    }

    #[test]
    fn test_bucketing_drops_hours_outside_range() {
        let tasks = [
            task(at(6, 59), false, None, None),
            task(at(7, 0), false, None, None),
            task(at(13, 30), false, None, None),
            task(at(21, 59), false, None, None),
            task(at(22, 0), false, None, None),
        ];
        let buckets = bucket_tasks_by_hour(&tasks, &Utc, AGENDA_HOURS);
        let hours: Vec<u32> = buckets.keys().copied().collect();
        assert_eq!(hours, vec![7, 13, 21]);
        assert_eq!(buckets[&7].len(), 1);
    }

    #[test]
    fn test_bucketing_uses_wall_clock_hour() {
        // 06:30 UTC is 07:30 in UTC+1; only the offset zone shows it.
        let task = task(at(6, 30), false, None, None);
        let plus_one = FixedOffset::east_opt(3600).unwrap();

        let local = bucket_tasks_by_hour(std::slice::from_ref(&task), &plus_one, AGENDA_HOURS);
        assert_eq!(local[&7].len(), 1);

        let utc = bucket_tasks_by_hour(std::slice::from_ref(&task), &Utc, AGENDA_HOURS);
        assert!(utc.is_empty());
    }
}
