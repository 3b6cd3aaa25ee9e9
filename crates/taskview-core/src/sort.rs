use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use deunicode::deunicode;

use crate::error::{Error, Result};
use crate::task::Task;

/// Named orderings for a task list. Every strategy ends with `id`
/// ascending, so the result never depends on input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortStrategy {
    #[default]
    Created,
    DueDate,
    Priority,
    Title,
    /// Priority, then newest first. Used by today, upcoming and category views.
    ActiveDefault,
    /// Most recently completed first, falling back to creation time.
    CompletedDefault,
}

impl SortStrategy {
    pub const ALL: [SortStrategy; 6] = [
        Self::Created,
        Self::DueDate,
        Self::Priority,
        Self::Title,
        Self::ActiveDefault,
        Self::CompletedDefault,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::DueDate => "due-date",
            Self::Priority => "priority",
            Self::Title => "title",
            Self::ActiveDefault => "active-default",
            Self::CompletedDefault => "completed-default",
        }
    }

    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        let primary = match self {
            Self::Created => newest_first(a, b),
            Self::DueDate => cmp_due_date(a, b).then_with(|| newest_first(a, b)),
            Self::Priority => cmp_priority_desc(a, b).then_with(|| newest_first(a, b)),
            Self::Title => cmp_title(a, b).then_with(|| newest_first(a, b)),
            Self::ActiveDefault => cmp_priority_desc(a, b).then_with(|| newest_first(a, b)),
            Self::CompletedDefault => {
                let a_key = a.completed_at.unwrap_or(a.created_at);
                let b_key = b.completed_at.unwrap_or(b.created_at);
                b_key.cmp(&a_key).then_with(|| newest_first(a, b))
            }
        };

        primary.then_with(|| a.id.cmp(&b.id))
    }

    pub fn sort(self, tasks: &mut [Task]) {
        tasks.sort_by(|a, b| self.compare(a, b));
    }
}

impl fmt::Display for SortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "created-at" | "newest" => Ok(Self::Created),
            "due-date" | "duedate" | "due" => Ok(Self::DueDate),
            "priority" => Ok(Self::Priority),
            "title" => Ok(Self::Title),
            "active-default" => Ok(Self::ActiveDefault),
            "completed-default" => Ok(Self::CompletedDefault),
            other => Err(Error::validation(format!("unknown sort strategy: {other}"))),
        }
    }
}

fn newest_first(a: &Task, b: &Task) -> Ordering {
    b.created_at.cmp(&a.created_at)
}

fn cmp_priority_desc(a: &Task, b: &Task) -> Ordering {
    b.priority.rank().cmp(&a.priority.rank())
}

// Undated tasks go last in either direction.
fn cmp_due_date(a: &Task, b: &Task) -> Ordering {
    match (a.due_date, b.due_date) {
        (Some(a_due), Some(b_due)) => a_due.cmp(&b_due),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// Accents fold to their base letter first, so "Éclair" sits with the e's.
fn cmp_title(a: &Task, b: &Task) -> Ordering {
    collation_key(&a.title)
        .cmp(&collation_key(&b.title))
        .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        .then_with(|| a.title.cmp(&b.title))
}

fn collation_key(title: &str) -> String {
    deunicode(title).to_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::SortStrategy;
    use crate::task::{Priority, Task, TaskDraft};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 16, 5, 0, 0).unwrap()
    }

    fn task(id: u64, title: &str, priority: Priority, created_offset: i64) -> Task {
        let mut draft = TaskDraft::new(title);
        draft.priority = Some(priority);
        Task::from_draft(id, draft, base() + Duration::minutes(created_offset)).unwrap()
    }

    fn ids(tasks: &[Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn priority_puts_high_before_low() {
        let mut tasks = vec![
            task(1, "low", Priority::Low, 1),
            task(2, "high", Priority::High, 2),
        ];
        SortStrategy::Priority.sort(&mut tasks);
        assert_eq!(ids(&tasks), vec![2, 1]);
    }

    #[test]
    fn priority_ties_break_newest_first() {
        let mut tasks = vec![
            task(1, "a", Priority::Medium, 1),
            task(2, "b", Priority::High, 0),
            task(3, "c", Priority::Medium, 5),
        ];
        SortStrategy::Priority.sort(&mut tasks);
        assert_eq!(ids(&tasks), vec![2, 3, 1]);
    }

    #[test]
    fn created_is_newest_first_with_id_tiebreak() {
        let mut tasks = vec![
            task(3, "c", Priority::Low, 0),
            task(1, "a", Priority::Low, 0),
            task(2, "b", Priority::Low, 9),
        ];
        SortStrategy::Created.sort(&mut tasks);
        assert_eq!(ids(&tasks), vec![2, 1, 3]);
    }

    #[test]
    fn due_date_sorts_undated_last() {
        let mut undated = task(1, "undated", Priority::High, 0);
        undated.due_date = None;
        let mut later = task(2, "later", Priority::Low, 0);
        later.due_date = Some(base() + Duration::days(3));
        let mut sooner = task(3, "sooner", Priority::Low, 0);
        sooner.due_date = Some(base() + Duration::days(1));

        let mut tasks = vec![undated, later, sooner];
        SortStrategy::DueDate.sort(&mut tasks);
        assert_eq!(ids(&tasks), vec![3, 2, 1]);

        tasks.reverse();
        SortStrategy::DueDate.sort(&mut tasks);
        assert_eq!(ids(&tasks), vec![3, 2, 1]);
    }

    #[test]
    fn title_ignores_case_first() {
        let mut tasks = vec![
            task(1, "banana", Priority::Low, 0),
            task(2, "Apple", Priority::Low, 0),
            task(3, "apple", Priority::Low, 0),
            task(4, "Cherry", Priority::Low, 0),
        ];
        SortStrategy::Title.sort(&mut tasks);
        assert_eq!(ids(&tasks), vec![2, 3, 1, 4]);
    }

    #[test]
    fn title_folds_accents_before_comparing() {
        let mut tasks = vec![
            task(1, "zebra", Priority::Low, 0),
            task(2, "Éclair", Priority::Low, 0),
            task(3, "apple", Priority::Low, 0),
            task(4, "eclair", Priority::Low, 0),
        ];
        SortStrategy::Title.sort(&mut tasks);
        assert_eq!(ids(&tasks), vec![3, 4, 2, 1]);
    }

    #[test]
    fn completed_default_prefers_completion_time() {
        let mut old_done = task(1, "old", Priority::Low, 0);
        old_done.set_completed(true, base() + Duration::days(2));
        let mut recent_done = task(2, "recent", Priority::Low, 0);
        recent_done.set_completed(true, base() + Duration::days(5));
        // Completed without a stamp: falls back to creation time.
        let mut legacy = task(3, "legacy", Priority::Low, 60 * 24 * 3);
        legacy.completed = true;

        let mut tasks = vec![old_done, legacy, recent_done];
        SortStrategy::CompletedDefault.sort(&mut tasks);
        assert_eq!(ids(&tasks), vec![2, 3, 1]);
    }

    #[test]
    fn strategy_names_parse() {
        for strategy in SortStrategy::ALL {
            assert_eq!(strategy.as_str().parse::<SortStrategy>().unwrap(), strategy);
        }
        assert_eq!("dueDate".parse::<SortStrategy>().unwrap(), SortStrategy::DueDate);
        assert!("random".parse::<SortStrategy>().is_err());
    }
}
