use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::datetime::DayBounds;
use crate::error::{Error, Result};
use crate::sort::SortStrategy;
use crate::task::{Task, TaskDraft};

const CATEGORY_PREFIX: &str = "category:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewName {
    AllActive,
    Today,
    Upcoming,
    Completed,
    Category(String),
}

impl ViewName {
    pub fn category(id: impl Into<String>) -> Self {
        Self::Category(id.into())
    }

    /// Membership test for this view at the instant `bounds` was computed for.
    pub fn contains(&self, task: &Task, bounds: &DayBounds) -> bool {
        let ok = match self {
            Self::AllActive => !task.completed,
            Self::Today => {
                !task.completed
                    && task
                        .due_date
                        .is_some_and(|due| bounds.day_of(due) == bounds.today)
            }
            Self::Upcoming => {
                !task.completed
                    && task
                        .due_date
                        .is_some_and(|due| bounds.day_of(due) >= bounds.tomorrow)
            }
            Self::Completed => task.completed,
            Self::Category(id) => !task.completed && task.category_id == *id,
        };

        trace!(view = %self, id = task.id, ok, "view predicate evaluation");
        ok
    }

    /// Ordering used when a view is opened without an explicit sort.
    pub fn default_sort(&self) -> SortStrategy {
        match self {
            Self::AllActive => SortStrategy::Created,
            Self::Completed => SortStrategy::CompletedDefault,
            Self::Today | Self::Upcoming | Self::Category(_) => SortStrategy::ActiveDefault,
        }
    }

    /// Pre-fills fields of a quick-added task so it lands in this view.
    /// Values the caller already set are kept.
    pub fn quick_add_defaults(&self, mut draft: TaskDraft, bounds: &DayBounds) -> TaskDraft {
        match self {
            Self::Today => {
                draft.due_date.get_or_insert(bounds.start_of_today);
            }
            Self::Upcoming => {
                draft.due_date.get_or_insert(bounds.start_of_tomorrow);
            }
            Self::Category(id) => {
                draft.category_id.get_or_insert_with(|| id.clone());
            }
            Self::AllActive | Self::Completed => {}
        }
        draft
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllActive => f.write_str("all-active"),
            Self::Today => f.write_str("today"),
            Self::Upcoming => f.write_str("upcoming"),
            Self::Completed => f.write_str("completed"),
            Self::Category(id) => write!(f, "{CATEGORY_PREFIX}{id}"),
        }
    }
}

impl FromStr for ViewName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Some(id) = trimmed.strip_prefix(CATEGORY_PREFIX) {
            if id.is_empty() {
                return Err(Error::validation("category view needs an id"));
            }
            return Ok(Self::Category(id.to_string()));
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "all-active" | "all" | "active" => Ok(Self::AllActive),
            "today" => Ok(Self::Today),
            "upcoming" => Ok(Self::Upcoming),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(Error::validation(format!("unknown view: {other}"))),
        }
    }
}

/// Every view `task` belongs to, including its category view.
pub fn classify(task: &Task, bounds: &DayBounds) -> Vec<ViewName> {
    let candidates = [
        ViewName::AllActive,
        ViewName::Today,
        ViewName::Upcoming,
        ViewName::Completed,
        ViewName::Category(task.category_id.clone()),
    ];

    candidates
        .into_iter()
        .filter(|view| view.contains(task, bounds))
        .collect()
}

/// Fresh evaluation of a view over a repository snapshot, unfiltered and unsorted.
pub fn select<'a>(view: &ViewName, tasks: &'a [Task], bounds: &DayBounds) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|task| view.contains(task, bounds))
        .collect()
}
