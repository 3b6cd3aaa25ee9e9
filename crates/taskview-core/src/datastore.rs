use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::datetime::Clock;
use crate::error::{Error, Result};
use crate::repository::{
    CategoryRepository, TaskRepository, new_category_id, next_task_id, patch_in_place,
};
use crate::task::{
    Category, CategoryDraft, CategoryPatch, DEFAULT_CATEGORY_COLOR, DEFAULT_CATEGORY_ICON,
    DEFAULT_CATEGORY_ID, Task, TaskDraft, TaskPatch,
};

/// File-backed task and category repository: one JSON object per line,
/// rewritten atomically on every mutation.
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub categories_path: PathBuf,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir, clock))]
    pub fn open(data_dir: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|err| {
            Error::repository(format!("failed to create {}: {err}", data_dir.display()))
        })?;

        let tasks_path = data_dir.join("tasks.data");
        let categories_path = data_dir.join("categories.data");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }
        if !categories_path.exists() {
            let fallback = Category {
                id: DEFAULT_CATEGORY_ID.to_string(),
                name: "Personal".to_string(),
                color: DEFAULT_CATEGORY_COLOR.to_string(),
                icon: DEFAULT_CATEGORY_ICON.to_string(),
                task_count: 0,
                created_at: Some(clock.now()),
            };
            save_jsonl_atomic(&categories_path, &[fallback])?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            categories = %categories_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            categories_path,
            clock,
            write_lock: Mutex::new(()),
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> Result<Vec<Task>> {
        load_jsonl(&self.tasks_path)
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks)
    }

    #[tracing::instrument(skip(self))]
    pub fn load_categories(&self) -> Result<Vec<Category>> {
        load_jsonl(&self.categories_path)
    }

    #[tracing::instrument(skip(self, categories))]
    pub fn save_categories(&self, categories: &[Category]) -> Result<()> {
        save_jsonl_atomic(&self.categories_path, categories)
    }
}

#[async_trait]
impl TaskRepository for DataStore {
    async fn list_all(&self) -> Result<Vec<Task>> {
        self.load_tasks()
    }

    async fn get_by_id(&self, id: u64) -> Result<Task> {
        self.load_tasks()?
            .into_iter()
            .find(|task| task.id == id)
            .ok_or_else(|| Error::task_not_found(id))
    }

    #[tracing::instrument(skip(self, draft), fields(title_len = draft.title.len()))]
    async fn create(&self, draft: TaskDraft) -> Result<Task> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load_tasks()?;
        let task = Task::from_draft(next_task_id(&tasks), draft, self.clock.now())?;
        tasks.insert(0, task.clone());
        self.save_tasks(&tasks)?;
        debug!(id = task.id, "created task");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch))]
    async fn update(&self, id: u64, patch: TaskPatch) -> Result<Task> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load_tasks()?;
        let updated = patch_in_place(&mut tasks, id, patch, self.clock.now())?;
        self.save_tasks(&tasks)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: u64) -> Result<Task> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load_tasks()?;
        let idx = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| Error::task_not_found(id))?;
        let removed = tasks.remove(idx);
        self.save_tasks(&tasks)?;
        Ok(removed)
    }
}

#[async_trait]
impl CategoryRepository for DataStore {
    async fn list_all(&self) -> Result<Vec<Category>> {
        self.load_categories()
    }

    async fn get_by_id(&self, id: &str) -> Result<Category> {
        self.load_categories()?
            .into_iter()
            .find(|category| category.id == id)
            .ok_or_else(|| Error::category_not_found(id))
    }

    #[tracing::instrument(skip(self, draft))]
    async fn create(&self, draft: CategoryDraft) -> Result<Category> {
        let _guard = self.write_lock.lock();
        let mut categories = self.load_categories()?;
        let category = Category::from_draft(new_category_id(), draft, self.clock.now())?;
        categories.push(category.clone());
        self.save_categories(&categories)?;
        Ok(category)
    }

    #[tracing::instrument(skip(self, patch))]
    async fn update(&self, id: &str, patch: CategoryPatch) -> Result<Category> {
        let _guard = self.write_lock.lock();
        let mut categories = self.load_categories()?;
        let category = categories
            .iter_mut()
            .find(|category| category.id == id)
            .ok_or_else(|| Error::category_not_found(id))?;
        category.apply_patch(patch)?;
        let updated = category.clone();
        self.save_categories(&categories)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<Category> {
        let _guard = self.write_lock.lock();
        let mut categories = self.load_categories()?;
        let idx = categories
            .iter()
            .position(|category| category.id == id)
            .ok_or_else(|| Error::category_not_found(id))?;
        let removed = categories.remove(idx);
        self.save_categories(&categories)?;
        Ok(removed)
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)
        .map_err(|err| Error::repository(format!("failed to open {}: {err}", path.display())))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(trimmed).map_err(|err| {
            Error::repository(format!(
                "failed parsing {} line {}: {err}",
                path.display(),
                idx + 1
            ))
        })?;
        out.push(item);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, items))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for item in items {
        let serialized = serde_json::to_string(item)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path).map_err(|err| {
        Error::repository(format!("failed to persist {}: {}", path.display(), err))
    })?;

    Ok(())
}
