use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::datetime::DayBounds;
use crate::error::{Error, Result};
use crate::filter::TaskFilter;
use crate::sort::SortStrategy;
use crate::task::Task;
use crate::view::ViewName;

/// What a mutation did to one open view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Inserted,
    Replaced,
    Removed,
    Unchanged,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
            Self::Removed => "removed",
            Self::Unchanged => "unchanged",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewChange {
    pub view: ViewName,
    pub transition: Transition,
}

#[derive(Debug, Clone)]
struct DisplayedView {
    /// Every snapshot satisfying the view predicate, kept in `sort` order.
    members: Vec<Task>,
    filter: TaskFilter,
    sort: SortStrategy,
}

impl DisplayedView {
    fn resync(&mut self, name: &ViewName, task: &Task, bounds: &DayBounds) -> Transition {
        let position = self.members.iter().position(|member| member.id == task.id);
        let belongs = name.contains(task, bounds);

        match (position, belongs) {
            (Some(idx), true) => {
                let key_changed = self.sort.compare(&self.members[idx], task).is_ne();
                self.members[idx] = task.clone();
                if key_changed {
                    self.sort.sort(&mut self.members);
                }
                Transition::Replaced
            }
            (Some(idx), false) => {
                self.members.remove(idx);
                Transition::Removed
            }
            (None, true) => {
                self.members.push(task.clone());
                self.sort.sort(&mut self.members);
                Transition::Inserted
            }
            (None, false) => Transition::Unchanged,
        }
    }
}

/// Holds the displayed collection of every open view and keeps them in step
/// with confirmed task mutations. Never talks to a repository and never reads
/// a clock: callers hand in snapshots and `now`.
#[derive(Debug, Clone)]
pub struct ViewEngine {
    tz: Tz,
    views: BTreeMap<ViewName, DisplayedView>,
}

impl ViewEngine {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            views: BTreeMap::new(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn bounds(&self, now: DateTime<Utc>) -> DayBounds {
        DayBounds::at(now, self.tz)
    }

    /// Evaluates `view` afresh over `tasks`. Re-opening an open view keeps its
    /// filter and sort.
    #[tracing::instrument(skip(self, view, tasks, now), fields(view = %view, candidates = tasks.len()))]
    pub fn open(&mut self, view: ViewName, tasks: &[Task], now: DateTime<Utc>) -> Result<usize> {
        for task in tasks {
            if let Err(err) = task.check_completion_invariant() {
                warn!(id = task.id, error = %err, "inconsistent completion record; ordering falls back to created_at");
            }
        }

        let bounds = self.bounds(now);
        let (filter, sort) = match self.views.get(&view) {
            Some(existing) => (existing.filter.clone(), existing.sort),
            None => (TaskFilter::default(), view.default_sort()),
        };

        let mut members: Vec<Task> = tasks
            .iter()
            .filter(|task| view.contains(task, &bounds))
            .cloned()
            .collect();
        sort.sort(&mut members);

        let count = members.len();
        info!(view = %view, members = count, sort = %sort, "opened view");
        self.views.insert(
            view,
            DisplayedView {
                members,
                filter,
                sort,
            },
        );
        Ok(count)
    }

    pub fn close(&mut self, view: &ViewName) -> bool {
        let closed = self.views.remove(view).is_some();
        debug!(view = %view, closed, "closed view");
        closed
    }

    pub fn is_open(&self, view: &ViewName) -> bool {
        self.views.contains_key(view)
    }

    pub fn open_views(&self) -> impl Iterator<Item = &ViewName> {
        self.views.keys()
    }

    /// Ordered, filtered tasks for `view`.
    pub fn displayed(&self, view: &ViewName) -> Result<Vec<Task>> {
        let state = self.view(view)?;
        Ok(state.filter.apply(&state.members))
    }

    /// Number of tasks in the view before search and priority filters.
    pub fn member_count(&self, view: &ViewName) -> Result<usize> {
        Ok(self.view(view)?.members.len())
    }

    pub fn filter(&self, view: &ViewName) -> Result<&TaskFilter> {
        Ok(&self.view(view)?.filter)
    }

    pub fn sort_strategy(&self, view: &ViewName) -> Result<SortStrategy> {
        Ok(self.view(view)?.sort)
    }

    pub fn apply_filter(&mut self, view: &ViewName, filter: TaskFilter) -> Result<()> {
        let state = self.view_mut(view)?;
        debug!(view = %view, query = ?filter.query(), priority = %filter.priority_filter(), "applying filter");
        state.filter = filter;
        Ok(())
    }

    pub fn apply_sort(&mut self, view: &ViewName, strategy: SortStrategy) -> Result<()> {
        let state = self.view_mut(view)?;
        debug!(view = %view, sort = %strategy, "applying sort");
        state.sort = strategy;
        strategy.sort(&mut state.members);
        Ok(())
    }

    #[tracing::instrument(skip(self, task, now), fields(id = task.id))]
    pub fn on_created(&mut self, task: &Task, now: DateTime<Utc>) -> Result<Vec<ViewChange>> {
        task.check_completion_invariant()?;
        Ok(self.resync_all(task, now))
    }

    /// Stored records written without a completion stamp are accepted here:
    /// an edit that leaves completion alone cannot repair them.
    #[tracing::instrument(skip(self, task, now), fields(id = task.id))]
    pub fn on_updated(&mut self, task: &Task, now: DateTime<Utc>) -> Result<Vec<ViewChange>> {
        if let Err(err) = task.check_completion_invariant() {
            warn!(id = task.id, error = %err, "inconsistent completion record");
        }
        Ok(self.resync_all(task, now))
    }

    #[tracing::instrument(skip(self, task, now), fields(id = task.id, completed = task.completed))]
    pub fn on_toggled(&mut self, task: &Task, now: DateTime<Utc>) -> Result<Vec<ViewChange>> {
        task.check_completion_invariant()?;
        Ok(self.resync_all(task, now))
    }

    #[tracing::instrument(skip(self))]
    pub fn on_deleted(&mut self, id: u64) -> Vec<ViewChange> {
        self.views
            .iter_mut()
            .map(|(name, state)| {
                let before = state.members.len();
                state.members.retain(|member| member.id != id);
                let transition = if state.members.len() < before {
                    Transition::Removed
                } else {
                    Transition::Unchanged
                };
                debug!(view = %name, id, %transition, "resynced view after delete");
                ViewChange {
                    view: name.clone(),
                    transition,
                }
            })
            .collect()
    }

    fn resync_all(&mut self, task: &Task, now: DateTime<Utc>) -> Vec<ViewChange> {
        let bounds = self.bounds(now);

        self
            .views
            .iter_mut()
            .map(|(name, state)| {
                let transition = state.resync(name, task, &bounds);
                debug!(view = %name, id = task.id, %transition, "resynced view");
                ViewChange {
                    view: name.clone(),
                    transition,
                }
            })
            .collect()
    }

    fn view(&self, view: &ViewName) -> Result<&DisplayedView> {
        self.views
            .get(view)
            .ok_or_else(|| Error::ViewNotOpen(view.clone()))
    }

    fn view_mut(&mut self, view: &ViewName) -> Result<&mut DisplayedView> {
        self.views
            .get_mut(view)
            .ok_or_else(|| Error::ViewNotOpen(view.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{Transition, ViewChange, ViewEngine};
    use crate::filter::{PriorityFilter, TaskFilter};
    use crate::sort::SortStrategy;
    use crate::task::{Priority, Task, TaskDraft, TaskPatch};
    use crate::view::ViewName;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 15, 0, 0).unwrap()
    }

    fn task(id: u64, title: &str, category: &str, due_in_days: Option<i64>) -> Task {
        let mut draft = TaskDraft::new(title);
        draft.category_id = Some(category.to_string());
        draft.due_date = due_in_days.map(|days| now() + Duration::days(days));
        Task::from_draft(id, draft, now() + Duration::minutes(id as i64)).unwrap()
    }

    fn ids(tasks: &[Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id).collect()
    }

    fn change(changes: &[ViewChange], view: &ViewName) -> Transition {
        changes
            .iter()
            .find(|c| &c.view == view)
            .map(|c| c.transition)
            .unwrap()
    }

    fn snapshot() -> Vec<Task> {
        vec![
            task(1, "Buy milk", "home", Some(0)),
            task(2, "Write report", "work", Some(2)),
            task(3, "Plan trip", "home", None),
            task(4, "Fix bug", "work", Some(0)),
        ]
    }

    #[test]
    fn open_selects_and_sorts_members() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        let today = ViewName::Today;
        assert_eq!(engine.open(today.clone(), &snapshot(), now()).unwrap(), 2);
        // Same priority: newest first.
        assert_eq!(ids(&engine.displayed(&today).unwrap()), vec![4, 1]);

        engine.open(ViewName::AllActive, &snapshot(), now()).unwrap();
        assert_eq!(
            ids(&engine.displayed(&ViewName::AllActive).unwrap()),
            vec![4, 3, 2, 1]
        );
    }

    #[test]
    fn category_change_moves_task_out_of_view() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        let work = ViewName::category("work");
        engine.open(work.clone(), &snapshot(), now()).unwrap();

        let mut moved = snapshot()[1].clone();
        moved
            .apply_patch(
                TaskPatch {
                    category_id: Some("home".to_string()),
                    ..TaskPatch::default()
                },
                now(),
            )
            .unwrap();

        let changes = engine.on_updated(&moved, now()).unwrap();
        assert_eq!(change(&changes, &work), Transition::Removed);
        assert_eq!(ids(&engine.displayed(&work).unwrap()), vec![4]);

        let mut repo = snapshot();
        repo[1] = moved;
        let home = ViewName::category("home");
        engine.open(home.clone(), &repo, now()).unwrap();
        assert!(ids(&engine.displayed(&home).unwrap()).contains(&2));
    }

    #[test]
    fn toggling_complete_leaves_active_and_joins_completed() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        engine.open(ViewName::AllActive, &snapshot(), now()).unwrap();
        engine.open(ViewName::Completed, &snapshot(), now()).unwrap();

        let mut done = snapshot()[0].clone();
        done.apply_patch(TaskPatch::completion(true), now()).unwrap();
        let changes = engine.on_toggled(&done, now()).unwrap();

        assert_eq!(change(&changes, &ViewName::AllActive), Transition::Removed);
        assert_eq!(change(&changes, &ViewName::Completed), Transition::Inserted);
        assert!(!ids(&engine.displayed(&ViewName::AllActive).unwrap()).contains(&1));
        assert_eq!(ids(&engine.displayed(&ViewName::Completed).unwrap()), vec![1]);

        done.apply_patch(TaskPatch::completion(false), now()).unwrap();
        let changes = engine.on_toggled(&done, now()).unwrap();
        assert_eq!(change(&changes, &ViewName::Completed), Transition::Removed);
        assert_eq!(change(&changes, &ViewName::AllActive), Transition::Inserted);
    }

    #[test]
    fn created_task_only_enters_matching_views() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        engine.open(ViewName::Today, &snapshot(), now()).unwrap();
        engine.open(ViewName::Upcoming, &snapshot(), now()).unwrap();

        let fresh = task(9, "Dentist", "home", Some(1));
        let changes = engine.on_created(&fresh, now()).unwrap();
        assert_eq!(change(&changes, &ViewName::Today), Transition::Unchanged);
        assert_eq!(change(&changes, &ViewName::Upcoming), Transition::Inserted);
        assert_eq!(ids(&engine.displayed(&ViewName::Upcoming).unwrap()), vec![9, 2]);
    }

    #[test]
    fn update_that_newly_matches_inserts() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        engine.open(ViewName::Today, &snapshot(), now()).unwrap();

        let mut rescheduled = snapshot()[2].clone();
        rescheduled
            .apply_patch(
                TaskPatch {
                    due_date: Some(Some(now())),
                    ..TaskPatch::default()
                },
                now(),
            )
            .unwrap();
        let changes = engine.on_updated(&rescheduled, now()).unwrap();
        assert_eq!(change(&changes, &ViewName::Today), Transition::Inserted);
    }

    #[test]
    fn replacing_resorts_when_key_changes() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        engine.open(ViewName::Today, &snapshot(), now()).unwrap();
        assert_eq!(ids(&engine.displayed(&ViewName::Today).unwrap()), vec![4, 1]);

        let mut urgent = snapshot()[0].clone();
        urgent.priority = Priority::High;
        let changes = engine.on_updated(&urgent, now()).unwrap();
        assert_eq!(change(&changes, &ViewName::Today), Transition::Replaced);
        assert_eq!(ids(&engine.displayed(&ViewName::Today).unwrap()), vec![1, 4]);
    }

    #[test]
    fn delete_removes_from_every_view() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        engine.open(ViewName::Today, &snapshot(), now()).unwrap();
        engine.open(ViewName::category("home"), &snapshot(), now()).unwrap();
        engine.open(ViewName::Upcoming, &snapshot(), now()).unwrap();

        let changes = engine.on_deleted(1);
        assert_eq!(change(&changes, &ViewName::Today), Transition::Removed);
        assert_eq!(change(&changes, &ViewName::category("home")), Transition::Removed);
        assert_eq!(change(&changes, &ViewName::Upcoming), Transition::Unchanged);
    }

    #[test]
    fn filter_and_sort_apply_on_read() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        let all = ViewName::AllActive;
        engine.open(all.clone(), &snapshot(), now()).unwrap();

        engine.apply_filter(&all, TaskFilter::search("i")).unwrap();
        engine.apply_sort(&all, SortStrategy::Title).unwrap();
        // "Buy milk", "Fix bug", "Plan trip", "Write report"
        assert_eq!(ids(&engine.displayed(&all).unwrap()), vec![1, 4, 3, 2]);

        engine
            .apply_filter(&all, TaskFilter::priority(PriorityFilter::Only(Priority::High)))
            .unwrap();
        assert!(engine.displayed(&all).unwrap().is_empty());
        assert_eq!(engine.member_count(&all).unwrap(), 4);

        // A filtered-out creation is still tracked for when the filter clears.
        let fresh = task(9, "Low key", "home", None);
        engine.on_created(&fresh, now()).unwrap();
        engine.apply_filter(&all, TaskFilter::default()).unwrap();
        assert_eq!(engine.displayed(&all).unwrap()[0].id, 1);
        assert_eq!(engine.member_count(&all).unwrap(), 5);
    }

    #[test]
    fn reopen_keeps_filter_and_sort() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        let all = ViewName::AllActive;
        engine.open(all.clone(), &snapshot(), now()).unwrap();
        engine.apply_sort(&all, SortStrategy::DueDate).unwrap();
        engine.apply_filter(&all, TaskFilter::search("milk")).unwrap();

        engine.open(all.clone(), &snapshot(), now()).unwrap();
        assert_eq!(engine.sort_strategy(&all).unwrap(), SortStrategy::DueDate);
        assert_eq!(engine.filter(&all).unwrap().query(), Some("milk"));
    }

    #[test]
    fn closed_views_ignore_notifications() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        engine.open(ViewName::Today, &snapshot(), now()).unwrap();
        assert!(engine.close(&ViewName::Today));

        let changes = engine.on_deleted(1);
        assert!(changes.is_empty());
        let err = engine.displayed(&ViewName::Today).unwrap_err();
        assert_eq!(err.code(), "view_not_open");
    }

    #[test]
    fn broken_completion_invariant_is_rejected() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        engine.open(ViewName::AllActive, &snapshot(), now()).unwrap();
        let before = engine.displayed(&ViewName::AllActive).unwrap();

        let mut broken = snapshot()[0].clone();
        broken.completed = true;
        assert!(engine.on_toggled(&broken, now()).is_err());
        assert_eq!(engine.displayed(&ViewName::AllActive).unwrap(), before);
    }

    #[test]
    fn completed_record_without_stamp_still_opens() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        let active = task(1, "Buy milk", "home", Some(0));
        let mut finished = task(2, "Fix bug", "work", None);
        finished.set_completed(true, now() + Duration::hours(1));
        let mut legacy = task(3, "Old chore", "home", None);
        legacy.completed = true;

        let tasks = vec![active, finished, legacy];
        assert_eq!(engine.open(ViewName::AllActive, &tasks, now()).unwrap(), 1);
        assert_eq!(engine.open(ViewName::Completed, &tasks, now()).unwrap(), 2);
        // Stamped completion (16:00) is newer than the legacy creation time.
        assert_eq!(ids(&engine.displayed(&ViewName::Completed).unwrap()), vec![2, 3]);

        let mut renamed = tasks[2].clone();
        renamed.title = "Old chore, renamed".to_string();
        let changes = engine.on_updated(&renamed, now()).unwrap();
        assert_eq!(change(&changes, &ViewName::Completed), Transition::Replaced);
        assert_eq!(change(&changes, &ViewName::AllActive), Transition::Unchanged);
    }

    #[test]
    fn day_rollover_is_lazy() {
        let mut engine = ViewEngine::new(chrono_tz::UTC);
        engine.open(ViewName::Today, &snapshot(), now()).unwrap();
        let tomorrow = now() + Duration::days(1);

        // Still shows yesterday's classification until re-opened.
        assert_eq!(engine.member_count(&ViewName::Today).unwrap(), 2);
        engine.open(ViewName::Today, &snapshot(), tomorrow).unwrap();
        assert_eq!(engine.member_count(&ViewName::Today).unwrap(), 0);
    }
}
