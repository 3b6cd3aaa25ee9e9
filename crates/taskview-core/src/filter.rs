use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::error::{
  Error,
  Result
};
use crate::task::{
  Priority,
  Task
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub enum PriorityFilter {
  #[default]
  All,
  Only(Priority)
}

impl PriorityFilter {
  pub fn matches(
    self,
    task: &Task
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Only(priority) => {
        task.priority == priority
      }
    }
  }
}

impl fmt::Display for PriorityFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::All => f.write_str("all"),
      | Self::Only(priority) => {
        write!(f, "{priority}")
      }
    }
  }
}

impl FromStr for PriorityFilter {
  type Err = Error;

  fn from_str(
    s: &str
  ) -> Result<Self> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Self::All);
    }
    s.parse::<Priority>()
      .map(Self::Only)
  }
}

/// Search and attribute filters shown
/// above a task list. Stages run
/// search first, then priority.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskFilter {
  search:   Option<String>,
  priority: PriorityFilter
}

impl TaskFilter {
  pub fn new(
    search: Option<&str>,
    priority: PriorityFilter
  ) -> Self {
    let search = search
      .map(str::trim)
      .filter(|q| !q.is_empty())
      .map(str::to_lowercase);

    Self {
      search,
      priority
    }
  }

  pub fn search(
    query: &str
  ) -> Self {
    Self::new(
      Some(query),
      PriorityFilter::All
    )
  }

  pub fn priority(
    priority: PriorityFilter
  ) -> Self {
    Self::new(None, priority)
  }

  pub fn query(&self) -> Option<&str> {
    self.search.as_deref()
  }

  pub fn priority_filter(
    &self
  ) -> PriorityFilter {
    self.priority
  }

  pub fn is_pass_through(
    &self
  ) -> bool {
    self.search.is_none()
      && self.priority
        == PriorityFilter::All
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    let ok = self.matches_search(task)
      && self.priority.matches(task);
    trace!(
      id = task.id,
      query = ?self.search,
      priority = %self.priority,
      ok,
      "filter evaluation"
    );
    ok
  }

  fn matches_search(
    &self,
    task: &Task
  ) -> bool {
    let Some(query) =
      self.search.as_deref()
    else {
      return true;
    };

    task
      .title
      .to_lowercase()
      .contains(query)
      || task
        .description
        .to_lowercase()
        .contains(query)
  }

  pub fn apply<'a, I>(
    &self,
    tasks: I
  ) -> Vec<Task>
  where
    I: IntoIterator<Item = &'a Task>
  {
    tasks
      .into_iter()
      .filter(|task| self.matches(task))
      .cloned()
      .collect()
  }
}
