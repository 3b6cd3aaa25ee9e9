use std::collections::HashMap;

use serde::Serialize;

use crate::datetime::DayBounds;
use crate::task::{Category, Task};
use crate::view::ViewName;

/// Sidebar badge counts, derived from a task snapshot with the same
/// predicates the views use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewCounts {
    pub total: usize,
    pub today: usize,
    pub upcoming: usize,
    pub completed: usize,
}

pub fn count_views(tasks: &[Task], bounds: &DayBounds) -> ViewCounts {
    tasks.iter().fold(ViewCounts::default(), |mut counts, task| {
        if ViewName::AllActive.contains(task, bounds) {
            counts.total += 1;
        }
        if ViewName::Today.contains(task, bounds) {
            counts.today += 1;
        }
        if ViewName::Upcoming.contains(task, bounds) {
            counts.upcoming += 1;
        }
        if ViewName::Completed.contains(task, bounds) {
            counts.completed += 1;
        }
        counts
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub active_tasks: usize,
}

/// Pairs each category with its recomputed active-task count. The stored
/// `task_count` is ignored and left as the repository returned it.
pub fn category_summaries(categories: &[Category], tasks: &[Task]) -> Vec<CategorySummary> {
    let mut active: HashMap<&str, usize> = HashMap::new();
    for task in tasks.iter().filter(|task| !task.completed) {
        *active.entry(task.category_id.as_str()).or_insert(0) += 1;
    }

    categories
        .iter()
        .map(|category| CategorySummary {
            category: category.clone(),
            active_tasks: active.get(category.id.as_str()).copied().unwrap_or(0),
        })
        .collect()
}
