use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_CATEGORY_ID: &str = "personal";
pub const DEFAULT_CATEGORY_COLOR: &str = "#5B4FE5";
pub const DEFAULT_CATEGORY_ICON: &str = "Folder";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(Error::validation(format!("unknown priority: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: u64,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub category_id: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Builds a fresh, incomplete task from a validated draft.
    pub fn from_draft(id: u64, draft: TaskDraft, now: DateTime<Utc>) -> Result<Self> {
        let draft = draft.validated()?;
        Ok(Self {
            id,
            title: draft.title,
            description: draft.description.unwrap_or_default(),
            category_id: draft
                .category_id
                .unwrap_or_else(|| DEFAULT_CATEGORY_ID.to_string()),
            priority: draft.priority.unwrap_or_default(),
            due_date: draft.due_date,
            completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Merges `patch` into the task. Nothing is written when validation fails.
    pub fn apply_patch(&mut self, patch: TaskPatch, now: DateTime<Utc>) -> Result<()> {
        let title = match patch.title {
            Some(title) => Some(validate_title(&title)?),
            None => None,
        };

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(category_id) = patch.category_id {
            self.category_id = category_id;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(completed) = patch.completed {
            self.set_completed(completed, now);
        }

        self.updated_at = now;
        Ok(())
    }

    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        if completed == self.completed && completed == self.completed_at.is_some() {
            return;
        }
        self.completed = completed;
        self.completed_at = completed.then_some(now);
    }

    pub fn check_completion_invariant(&self) -> Result<()> {
        if self.completed != self.completed_at.is_some() {
            return Err(Error::validation(format!(
                "task {} has completed={} but completed_at={:?}",
                self.id, self.completed, self.completed_at
            )));
        }
        Ok(())
    }
}

/// Fields accepted when creating a task. The repository assigns the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn validated(self) -> Result<Self> {
        Ok(Self {
            title: validate_title(&self.title)?,
            description: self.description.map(|d| d.trim().to_string()),
            ..self
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn completion(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn validate_title(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("title is required"));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,

    /// Stored cache from the backend. Never read for display; see
    /// `summary::category_summaries`.
    #[serde(default)]
    pub task_count: usize,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Category {
    pub fn from_draft(id: String, draft: CategoryDraft, now: DateTime<Utc>) -> Result<Self> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(Error::validation("category name is required"));
        }
        Ok(Self {
            id,
            name: name.to_string(),
            color: draft
                .color
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            icon: draft
                .icon
                .unwrap_or_else(|| DEFAULT_CATEGORY_ICON.to_string()),
            task_count: 0,
            created_at: Some(now),
        })
    }

    pub fn apply_patch(&mut self, patch: CategoryPatch) -> Result<()> {
        if let Some(name) = patch.name.as_deref()
            && name.trim().is_empty()
        {
            return Err(Error::validation("category name is required"));
        }

        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
        if let Some(icon) = patch.icon {
            self.icon = icon;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub color: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}
